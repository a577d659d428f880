//! Environment creation: id uniqueness, branch/worktree bijection,
//! dirty-source seeding, and the not-a-git-repo failure.

use container_use::core::ContainerUseError;
use container_use::repository::Repository;
use container_use::test_utils::{TestGit, TestProject};

use crate::common::create_env;

#[tokio::test]
async fn open_outside_a_git_repo_fails() {
    let plain_dir = tempfile::tempdir().unwrap();
    let base = tempfile::tempdir().unwrap();
    let err = Repository::open_with_base(plain_dir.path(), base.path()).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ContainerUseError>(),
        Some(ContainerUseError::NotAGitRepository { .. })
    ));
}

#[tokio::test]
async fn same_title_creations_get_distinct_ids() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();

    let first = create_env(&project, &repo, "identical title").await.unwrap();
    let second = create_env(&project, &repo, "identical title").await.unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(first.title(), second.title());
}

#[tokio::test]
async fn create_produces_branch_worktree_and_tracking_branch() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();
    let env = create_env(&project, &repo, "wire up the API").await.unwrap();

    // Branch in the bare remote.
    let bare = TestGit::new(repo.remote_path());
    bare.run(&["rev-parse", "--verify", &format!("refs/heads/{}", env.id)]).unwrap();

    // Worktree on disk, linked to the bare store.
    let worktree = repo.worktrees_dir().join(&env.id);
    assert!(worktree.join(".git").exists());
    assert!(worktree.join("README.md").exists());

    // Local tracking branch in the source repo.
    let source = project.git();
    source.run(&["rev-parse", "--verify", &format!("refs/heads/{}", env.id)]).unwrap();
    let upstream = source
        .run(&["rev-parse", "--abbrev-ref", &format!("{}@{{upstream}}", env.id)])
        .unwrap();
    assert_eq!(upstream, format!("container-use/{}", env.id));

    // The source repo gained the container-use remote.
    let url = source.run(&["remote", "get-url", "container-use"]).unwrap();
    assert_eq!(url, repo.remote_path().display().to_string());
}

#[tokio::test]
async fn delete_removes_branch_worktree_and_tracking_branch() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();
    let env = create_env(&project, &repo, "short-lived").await.unwrap();
    let id = env.id.clone();
    drop(env);

    repo.delete(&id).await.unwrap();

    let bare = TestGit::new(repo.remote_path());
    assert!(bare.run(&["rev-parse", "--verify", &format!("refs/heads/{id}")]).is_err());
    assert!(!repo.worktrees_dir().join(&id).exists());
    assert!(
        project.git().run(&["rev-parse", "--verify", &format!("refs/heads/{id}")]).is_err()
    );

    // Deleting again is not an error.
    repo.delete(&id).await.unwrap();
}

#[tokio::test]
async fn dirty_source_changes_seed_the_initial_commit() {
    let project = TestProject::new().unwrap();

    // Tracked modification + untracked file, neither committed.
    project.write_source_file("README.md", "# test project\nwith local edits\n").unwrap();
    project.write_source_file("scratch/notes.txt", "work in progress\n").unwrap();

    let repo = project.repository().await.unwrap();
    let (dirty, _) = repo.is_dirty().await.unwrap();
    assert!(dirty);

    let env = create_env(&project, &repo, "from dirty tree").await.unwrap();

    let worktree = repo.worktrees_dir().join(&env.id);
    let readme = std::fs::read_to_string(worktree.join("README.md")).unwrap();
    assert!(readme.contains("with local edits"));
    let notes = std::fs::read_to_string(worktree.join("scratch/notes.txt")).unwrap();
    assert_eq!(notes, "work in progress\n");

    let subjects = TestGit::new(&worktree).log_subjects().unwrap();
    assert!(
        subjects.iter().any(|s| s == "Copy uncommitted changes"),
        "missing copy commit in {subjects:?}"
    );

    // The user's working tree itself is untouched.
    let (still_dirty, _) = repo.is_dirty().await.unwrap();
    assert!(still_dirty);
}

#[tokio::test]
async fn environment_state_survives_a_fresh_repository_handle() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();
    let env = create_env(&project, &repo, "note-state round trip").await.unwrap();
    let expected = env.state();
    let id = env.id.clone();
    drop(env);
    drop(repo);

    let reopened = project.repository().await.unwrap();
    let reloaded = reopened.get(&id, project.runtime_handle()).await.unwrap();
    let actual = reloaded.state();

    assert_eq!(actual.title, expected.title);
    assert_eq!(actual.container, expected.container);
    assert_eq!(actual.config, expected.config);
    assert_eq!(actual.created_at, expected.created_at);
}

#[tokio::test]
async fn legacy_state_array_migrates_to_last_revision() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();
    let env = create_env(&project, &repo, "will be downgraded").await.unwrap();
    let id = env.id.clone();
    let container = env.container_id();
    drop(env);
    drop(repo);

    let legacy = format!(
        r#"[
            {{"version": 1, "name": "first-name", "created_at": "2025-02-01T00:00:00Z", "state": "sha256:old"}},
            {{"version": 2, "name": "final-name", "output": "done", "created_at": "2025-02-02T00:00:00Z", "state": "{container}"}}
        ]"#
    );
    let reopened = project.repository().await.unwrap();
    TestGit::new(reopened.remote_path())
        .run(&["notes", "--ref", "container-use-state", "add", "-f", "-m", &legacy, &id])
        .unwrap();

    let info = reopened.info(&id).await.unwrap();
    assert_eq!(info.state.title, "final-name");
    assert_eq!(info.state.container, container);
    assert_eq!(info.state.created_at, info.state.updated_at);
}
