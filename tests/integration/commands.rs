//! Command execution: non-zero exits are preserved, snapshots advance on
//! mutation and stand still on reads.

use container_use::test_utils::{TestGit, TestProject};

use crate::common::{create_env, run_and_commit};

#[tokio::test]
async fn command_failure_is_preserved_not_fatal() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();
    let env = create_env(&project, &repo, "failure handling").await.unwrap();

    let output = run_and_commit(&repo, &env, "echo hi; exit 7").await.unwrap();
    assert!(output.contains("hi"), "missing stdout in {output:?}");
    assert!(output.contains("exit code: 7"), "missing exit code in {output:?}");

    // The run log records the command and its exit code.
    let bare = TestGit::new(repo.remote_path());
    let notes = bare.run(&["notes", "--ref", "container-use", "show", &env.id]).unwrap();
    assert!(notes.contains("$ echo hi; exit 7"), "notes were: {notes}");
    assert!(notes.contains("exit 7"), "notes were: {notes}");

    // The environment keeps working.
    let output = run_and_commit(&repo, &env, "echo still-alive").await.unwrap();
    assert!(output.contains("still-alive"));
}

#[tokio::test]
async fn failed_command_side_effects_survive_in_the_snapshot() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();
    let env = create_env(&project, &repo, "partial side effects").await.unwrap();

    run_and_commit(&repo, &env, "echo partial > partial.txt; exit 1").await.unwrap();

    let contents = env.file_read("partial.txt", true, None, None).await.unwrap();
    assert_eq!(contents, "partial\n");
    // And the workdir change was committed despite the failure.
    assert!(repo.worktrees_dir().join(&env.id).join("partial.txt").exists());
}

#[tokio::test]
async fn mutations_advance_the_snapshot_head_reads_do_not() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();
    let env = create_env(&project, &repo, "snapshot chain").await.unwrap();

    let after_create = env.container_id();
    assert!(!after_create.is_empty());

    run_and_commit(&repo, &env, "echo one > one.txt").await.unwrap();
    let after_run = env.container_id();
    assert_ne!(after_run, after_create);

    // Even a command that changes nothing produces a new snapshot.
    run_and_commit(&repo, &env, "true").await.unwrap();
    let after_noop = env.container_id();
    assert_ne!(after_noop, after_run);

    // Reads leave the head alone and store no new snapshots.
    let snapshots_before = project.runtime.snapshot_count();
    env.file_read("one.txt", true, None, None).await.unwrap();
    env.file_list(".").await.unwrap();
    assert_eq!(env.container_id(), after_noop);
    assert_eq!(project.runtime.snapshot_count(), snapshots_before);

    let _applying = env.lock_applying().await;
    env.file_write("two.txt", "2\n").await.unwrap();
    assert_ne!(env.container_id(), after_noop);
}

#[tokio::test]
async fn run_log_accumulates_in_order() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();
    let env = create_env(&project, &repo, "log order").await.unwrap();

    run_and_commit(&repo, &env, "echo first").await.unwrap();
    run_and_commit(&repo, &env, "echo second").await.unwrap();

    let mut log = Vec::new();
    repo.log(&env.id, false, &mut log).await.unwrap();
    let log = String::from_utf8(log).unwrap();
    let first_pos = log.find("$ echo first").expect("first command in log");
    let second_pos = log.find("$ echo second").expect("second command in log");
    // git log is newest-first.
    assert!(second_pos < first_pos, "log order wrong:\n{log}");
}

#[tokio::test]
async fn background_commands_expose_tunneled_ports() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();
    let env = create_env(&project, &repo, "background server").await.unwrap();

    let endpoints = {
        let _applying = env.lock_applying().await;
        let endpoints =
            env.run_background("python -m http.server 8000", "sh", false, &[8000]).await.unwrap();
        repo.update(&env, "start dev server").await.unwrap();
        endpoints
    };

    let mapping = endpoints.get(&8000).expect("mapping for port 8000");
    assert!(mapping.external.starts_with("127.0.0.1:"));
    assert!(mapping.internal.ends_with(":8000"));

    let bare = TestGit::new(repo.remote_path());
    let notes = bare.run(&["notes", "--ref", "container-use", "show", &env.id]).unwrap();
    assert!(notes.contains("$ python -m http.server 8000 &"), "notes were: {notes}");

    let services = env.running_services();
    assert_eq!(services.len(), 1);
}
