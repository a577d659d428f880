//! Merge preserves environment history; apply squashes it. Conflicts leave
//! the merge in progress.

use container_use::core::ContainerUseError;
use container_use::test_utils::TestProject;

use crate::common::{create_env, write_and_commit};

#[tokio::test]
async fn merge_preserves_individual_commits() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();
    let env = create_env(&project, &repo, "merge me").await.unwrap();

    write_and_commit(&repo, &env, "a.txt", "a\n", "first").await.unwrap();
    write_and_commit(&repo, &env, "b.txt", "b\n", "second").await.unwrap();
    write_and_commit(&repo, &env, "c.txt", "c\n", "third").await.unwrap();

    let mut out = Vec::new();
    repo.merge(&env.id, &mut out).await.unwrap();

    let subjects = project.git().log_subjects().unwrap();
    for subject in ["first", "second", "third"] {
        assert!(subjects.iter().any(|s| s == subject), "{subject} missing from {subjects:?}");
    }
    assert!(
        subjects.iter().any(|s| s == &format!("Merge environment {}", env.id)),
        "merge commit missing from {subjects:?}"
    );
    assert_eq!(std::fs::read_to_string(project.source_path().join("c.txt")).unwrap(), "c\n");
}

#[tokio::test]
async fn apply_stages_changes_without_committing() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();
    let env = create_env(&project, &repo, "apply me").await.unwrap();

    write_and_commit(&repo, &env, "a.txt", "a\n", "first").await.unwrap();
    write_and_commit(&repo, &env, "b.txt", "b\n", "second").await.unwrap();
    write_and_commit(&repo, &env, "c.txt", "c\n", "third").await.unwrap();

    let head_before = project.git().head().unwrap();
    let mut out = Vec::new();
    repo.apply(&env.id, &mut out).await.unwrap();

    // No commit was made; the combined changes sit staged in the index.
    assert_eq!(project.git().head().unwrap(), head_before);
    let status = project.git().run(&["status", "--porcelain"]).unwrap();
    for file in ["a.txt", "b.txt", "c.txt"] {
        assert!(status.contains(file), "{file} not staged:\n{status}");
    }

    let subjects = project.git().log_subjects().unwrap();
    for subject in ["first", "second", "third"] {
        assert!(!subjects.iter().any(|s| s == subject), "{subject} leaked into {subjects:?}");
    }
}

#[tokio::test]
async fn conflicting_merge_surfaces_and_stays_in_progress() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();
    let env = create_env(&project, &repo, "conflict").await.unwrap();

    write_and_commit(&repo, &env, "README.md", "# agent version\n", "agent edit")
        .await
        .unwrap();

    // Humans move the same file differently.
    project.write_source_file("README.md", "# human version\n").unwrap();
    let git = project.git();
    git.add_all().unwrap();
    git.commit("human edit").unwrap();

    let mut out = Vec::new();
    let err = repo.merge(&env.id, &mut out).await.unwrap_err();
    match err.downcast_ref::<ContainerUseError>() {
        Some(ContainerUseError::MergeConflict {
            id,
            output,
        }) => {
            assert_eq!(id, &env.id);
            assert!(output.contains("CONFLICT") || output.contains("conflict"));
        }
        other => panic!("expected MergeConflict, got {other:?}"),
    }

    // The merge is left in progress for the human to resolve.
    assert!(project.source_path().join(".git/MERGE_HEAD").exists());
    git.run(&["merge", "--abort"]).unwrap();
}

#[tokio::test]
async fn merge_stashes_and_restores_local_changes() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();
    let env = create_env(&project, &repo, "merge around local edits").await.unwrap();

    write_and_commit(&repo, &env, "feature.txt", "feature\n", "add feature").await.unwrap();

    // Unrelated local, uncommitted edit in the source tree.
    project.write_source_file("local.txt", "local work\n").unwrap();

    let mut out = Vec::new();
    repo.merge(&env.id, &mut out).await.unwrap();

    assert_eq!(
        std::fs::read_to_string(project.source_path().join("feature.txt")).unwrap(),
        "feature\n"
    );
    // The local edit came back after the stash round trip.
    assert_eq!(
        std::fs::read_to_string(project.source_path().join("local.txt")).unwrap(),
        "local work\n"
    );
}

#[tokio::test]
async fn checkout_realizes_the_environment_branch() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();
    let env = create_env(&project, &repo, "check me out").await.unwrap();

    write_and_commit(&repo, &env, "delivered.txt", "done\n", "deliver").await.unwrap();

    let realized = repo.checkout(&env.id, None).await.unwrap();
    assert_eq!(realized, env.id);
    assert_eq!(project.git().current_branch().unwrap(), env.id);
    assert_eq!(
        std::fs::read_to_string(project.source_path().join("delivered.txt")).unwrap(),
        "done\n"
    );
}

#[tokio::test]
async fn checkout_with_explicit_branch_name() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();
    let env = create_env(&project, &repo, "named checkout").await.unwrap();

    let realized = repo.checkout(&env.id, Some("review/agent-work")).await.unwrap();
    assert_eq!(realized, "review/agent-work");
    assert_eq!(project.git().current_branch().unwrap(), "review/agent-work");
}

#[tokio::test]
async fn diff_shows_environment_changes_against_merge_base() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();
    let env = create_env(&project, &repo, "diff me").await.unwrap();

    write_and_commit(&repo, &env, "new-feature.rs", "fn feature() {}\n", "add feature")
        .await
        .unwrap();

    let mut out = Vec::new();
    repo.diff(&env.id, &mut out).await.unwrap();
    let diff = String::from_utf8(out).unwrap();
    assert!(diff.contains("new-feature.rs"), "diff was:\n{diff}");
    assert!(diff.contains("fn feature"), "diff was:\n{diff}");
}
