//! Shared helpers for the integration suite.

use anyhow::Result;
use std::sync::Arc;

use container_use::environment::Environment;
use container_use::repository::Repository;
use container_use::test_utils::TestProject;

/// Create an environment the way the dispatcher does.
pub async fn create_env(
    project: &TestProject,
    repo: &Repository,
    title: &str,
) -> Result<Arc<Environment>> {
    repo.create(title, &format!("Create environment: {title}"), project.runtime_handle()).await
}

/// Run a command and commit the result, mirroring the
/// `environment_run_cmd` tool.
pub async fn run_and_commit(
    repo: &Repository,
    env: &Arc<Environment>,
    command: &str,
) -> Result<String> {
    let _applying = env.lock_applying().await;
    let output = env.run(command, "sh", false).await?;
    repo.update(env, &format!("Run: {command}")).await?;
    Ok(output)
}

/// Write a file and commit the result, mirroring the
/// `environment_file_write` tool.
pub async fn write_and_commit(
    repo: &Repository,
    env: &Arc<Environment>,
    path: &str,
    contents: &str,
    explanation: &str,
) -> Result<()> {
    let _applying = env.lock_applying().await;
    env.file_write(path, contents).await?;
    repo.update(env, explanation).await?;
    Ok(())
}
