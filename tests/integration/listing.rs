//! Listing order and note round-trips.

use container_use::test_utils::{TestGit, TestProject};

use crate::common::{create_env, run_and_commit};

#[tokio::test]
async fn list_orders_by_updated_at_descending() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();

    let first = create_env(&project, &repo, "older").await.unwrap();
    let second = create_env(&project, &repo, "newer").await.unwrap();

    let listed = repo.list().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, second.id);
    assert_eq!(listed[1].id, first.id);

    // Updating the older environment moves it to the front.
    run_and_commit(&repo, &first, "echo bump").await.unwrap();
    let listed = repo.list().await.unwrap();
    assert_eq!(listed[0].id, first.id);
    assert!(listed[0].state.updated_at >= listed[1].state.updated_at);
}

#[tokio::test]
async fn title_updates_are_persisted_through_the_state_note() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();
    let env = create_env(&project, &repo, "working title").await.unwrap();

    {
        let _applying = env.lock_applying().await;
        env.set_title("final title".to_string());
        repo.update(&env, "rename").await.unwrap();
    }

    let info = repo.info(&env.id).await.unwrap();
    assert_eq!(info.state.title, "final title");
}

#[tokio::test]
async fn notes_refs_are_synced_into_the_source_repo() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();
    let env = create_env(&project, &repo, "notes sync").await.unwrap();

    // Two updates: the state note is rewritten, the log note appended.
    run_and_commit(&repo, &env, "echo one").await.unwrap();
    run_and_commit(&repo, &env, "echo two").await.unwrap();

    let bare = TestGit::new(repo.remote_path());
    let source = project.git();
    for notes_ref in ["refs/notes/container-use", "refs/notes/container-use-state"] {
        let in_bare = bare.run(&["rev-parse", notes_ref]).unwrap();
        let in_source = source.run(&["rev-parse", notes_ref]).unwrap();
        assert_eq!(in_bare, in_source, "{notes_ref} out of sync");
    }

    // The human entry point works: git log with notes in the source repo.
    let log = source
        .run(&["log", "--notes=container-use", &format!("container-use/{}", env.id)])
        .unwrap();
    assert!(log.contains("$ echo two"), "log was:\n{log}");
}

#[tokio::test]
async fn unknown_environment_is_a_not_found_error() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();

    let err = repo.info("no-such-env").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<container_use::core::ContainerUseError>(),
        Some(container_use::core::ContainerUseError::EnvironmentNotFound { .. })
    ));

    let err = repo.get("no-such-env", project.runtime_handle()).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<container_use::core::ContainerUseError>(),
        Some(container_use::core::ContainerUseError::EnvironmentNotFound { .. })
    ));
}
