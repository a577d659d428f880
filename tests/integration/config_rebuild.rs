//! Configuration changes rebuild the container and discard in-snapshot
//! state; omitted env vars are forgotten.

use container_use::test_utils::{TestGit, TestProject};

use crate::common::{create_env, run_and_commit};

#[tokio::test]
async fn config_rebuild_discards_state_outside_the_workdir() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();
    let env = create_env(&project, &repo, "config rebuild").await.unwrap();

    // Give the environment an env var, confirm it is visible.
    {
        let _applying = env.lock_applying().await;
        let mut config = env.config();
        config.set_env_list(&["API_URL=https://api.example.com".to_string()]).unwrap();
        env.update_config(config).await.unwrap();
        repo.update(&env, "set API_URL").await.unwrap();
    }
    let output = run_and_commit(&repo, &env, "echo $API_URL").await.unwrap();
    assert!(output.contains("https://api.example.com"));

    // Leave a mark outside the workdir, and one inside.
    run_and_commit(&repo, &env, "touch /tmp/marker").await.unwrap();
    run_and_commit(&repo, &env, "echo keep > kept.txt").await.unwrap();

    // Reconfigure with a new setup command and an empty env list.
    {
        let _applying = env.lock_applying().await;
        let mut config = env.config();
        config.setup_commands = vec!["echo setting up".to_string()];
        config.set_env_list(&[]).unwrap();
        env.update_config(config).await.unwrap();
        repo.update(&env, "reconfigure").await.unwrap();
    }

    // The marker outside the workdir is gone.
    let output = run_and_commit(&repo, &env, "test -e /tmp/marker").await.unwrap();
    assert!(output.contains("exit code: 1"), "marker survived rebuild: {output:?}");

    // The forgotten env var reads as empty.
    let output = run_and_commit(&repo, &env, "echo $API_URL").await.unwrap();
    assert_eq!(output.lines().next().unwrap_or("").trim(), "");

    // Workdir content survives: it rides the worktree, not the snapshot.
    let kept = env.file_read("kept.txt", true, None, None).await.unwrap();
    assert_eq!(kept, "keep\n");
}

#[tokio::test]
async fn setup_commands_run_and_are_logged() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();
    let env = create_env(&project, &repo, "setup logging").await.unwrap();

    {
        let _applying = env.lock_applying().await;
        let mut config = env.config();
        config.setup_commands = vec!["echo installing toolchain".to_string()];
        env.update_config(config).await.unwrap();
        repo.update(&env, "add setup command").await.unwrap();
    }

    let bare = TestGit::new(repo.remote_path());
    let notes = bare.run(&["notes", "--ref", "container-use", "show", &env.id]).unwrap();
    assert!(notes.contains("$ echo installing toolchain"), "notes were: {notes}");
}

#[tokio::test]
async fn failing_setup_command_aborts_and_is_recorded() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();
    let env = create_env(&project, &repo, "setup failure").await.unwrap();
    let head_before = env.container_id();

    let err = {
        let _applying = env.lock_applying().await;
        let mut config = env.config();
        config.setup_commands = vec!["echo about to fail; exit 3".to_string()];
        env.update_config(config).await.unwrap_err()
    };
    let classified = err.downcast_ref::<container_use::core::ContainerUseError>();
    assert!(
        matches!(
            classified,
            Some(container_use::core::ContainerUseError::SetupCommandFailed {
                exit_code: 3,
                ..
            })
        ),
        "unexpected error: {err:#}"
    );

    // The failing command is preserved in the notes buffer for the next
    // commit; the head was not advanced.
    assert_eq!(env.container_id(), head_before);
    let drained = env.notes.drain().expect("failure note buffered");
    assert!(drained.contains("$ echo about to fail; exit 3"));
    assert!(drained.contains("exit 3"));
}

#[tokio::test]
async fn on_disk_defaults_seed_new_environments() {
    let project = TestProject::new().unwrap();
    project
        .write_source_file(
            ".container-use/environment.json",
            r#"{"base_image": "node:22", "install_commands": ["echo npm ci"]}"#,
        )
        .unwrap();
    let git = project.git();
    git.add_all().unwrap();
    git.commit("add environment defaults").unwrap();

    let repo = project.repository().await.unwrap();
    let env = create_env(&project, &repo, "uses defaults").await.unwrap();

    let config = env.config();
    assert_eq!(config.base_image, "node:22");
    assert_eq!(config.install_commands, vec!["echo npm ci"]);

    let bare = TestGit::new(repo.remote_path());
    let notes = bare.run(&["notes", "--ref", "container-use", "show", &env.id]).unwrap();
    assert!(notes.contains("$ echo npm ci"), "install command not logged: {notes}");
}
