//! Shared helpers for CLI commands.

use anyhow::{Context, Result, bail};

use crate::git::GitCommand;
use crate::repository::Repository;

/// Open the repository for the current working directory.
pub async fn open_repository() -> Result<Repository> {
    let cwd = std::env::current_dir().context("failed to resolve current directory")?;
    Repository::open(&cwd).await
}

/// Resolve an explicit environment id, or pick the single environment
/// descending from the current HEAD when none was given.
pub async fn resolve_environment_id(repo: &Repository, id: Option<String>) -> Result<String> {
    if let Some(id) = id {
        return Ok(id);
    }

    let head = GitCommand::new(["rev-parse", "HEAD"])
        .current_dir(repo.user_repo_path())
        .execute_stdout()
        .await?;
    let descendants = repo.list_descendant_environments(&head).await?;
    match descendants.as_slice() {
        [] => bail!(
            "no environment descends from the current HEAD; pass an environment id explicitly \
             (see `cu list`)"
        ),
        [only] => Ok(only.id.clone()),
        many => {
            let ids: Vec<&str> = many.iter().map(|i| i.id.as_str()).collect();
            bail!(
                "multiple environments descend from the current HEAD ({}); pass one explicitly",
                ids.join(", ")
            )
        }
    }
}
