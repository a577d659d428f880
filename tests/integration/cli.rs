//! CLI smoke tests for the `cu` binary.

use assert_cmd::Command;
use predicates::prelude::*;

use container_use::test_utils::TestProject;

fn cu() -> Command {
    Command::cargo_bin("cu").expect("cu binary")
}

#[test]
fn help_lists_the_subcommands() {
    cu().arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("stdio"))
        .stdout(predicate::str::contains("checkout"))
        .stdout(predicate::str::contains("merge"));
}

#[test]
fn list_in_a_fresh_repo_reports_no_environments() {
    let project = TestProject::new().unwrap();
    cu().current_dir(project.source_path())
        .env("CONTAINER_USE_CONFIG_DIR", project.base_path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No environments"));
}

#[test]
fn list_outside_a_git_repo_fails_with_guidance() {
    let plain = tempfile::tempdir().unwrap();
    let base = tempfile::tempdir().unwrap();
    cu().current_dir(plain.path())
        .env("CONTAINER_USE_CONFIG_DIR", base.path())
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a git repository"));
}

#[test]
fn stdio_without_an_engine_binding_fails_fast() {
    let project = TestProject::new().unwrap();
    cu().current_dir(project.source_path())
        .env("CONTAINER_USE_CONFIG_DIR", project.base_path())
        .env("CONTAINER_USE_STDERR_FILE", project.base_path().join("cu.log"))
        .arg("stdio")
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("container engine"));
}

#[test]
fn log_without_descendant_environment_explains_itself() {
    let project = TestProject::new().unwrap();
    cu().current_dir(project.source_path())
        .env("CONTAINER_USE_CONFIG_DIR", project.base_path())
        .arg("log")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no environment descends"));
}
