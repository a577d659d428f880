//! Recovery from damaged worktrees.

use container_use::test_utils::TestProject;

use crate::common::create_env;

#[tokio::test]
async fn orphaned_worktree_does_not_block_new_environments() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();

    let first = create_env(&project, &repo, "same title").await.unwrap();
    let first_id = first.id.clone();
    drop(first);

    // Sever the worktree from its git store.
    let orphaned = repo.worktrees_dir().join(&first_id);
    std::fs::remove_file(orphaned.join(".git")).unwrap();

    let second = create_env(&project, &repo, "same title").await.unwrap();
    assert_ne!(second.id, first_id);
    assert!(repo.worktrees_dir().join(&second.id).join(".git").exists());

    // The orphaned directory is still on disk, just ignored.
    assert!(orphaned.exists());
}

#[tokio::test]
async fn get_recreates_a_missing_worktree_from_the_branch() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();
    let env = create_env(&project, &repo, "to be recreated").await.unwrap();
    let id = env.id.clone();
    drop(env);
    drop(repo);

    let reopened = project.repository().await.unwrap();
    std::fs::remove_dir_all(reopened.worktrees_dir().join(&id)).unwrap();

    let reloaded = reopened.get(&id, project.runtime_handle()).await.unwrap();
    assert!(reopened.worktrees_dir().join(&id).join(".git").exists());
    assert!(reopened.worktrees_dir().join(&id).join("README.md").exists());
    assert_eq!(reloaded.id, id);
}
