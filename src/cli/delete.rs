//! `cu delete` - discard an environment.

use anyhow::Result;
use clap::Args;

use crate::cli::common::{open_repository, resolve_environment_id};

/// Delete an environment: its worktree, its branch in the container-use
/// remote, and the local tracking branch. The content is unrecoverable.
#[derive(Debug, Args)]
pub struct DeleteCommand {
    /// Environment id (defaults to the one descending from HEAD)
    id: Option<String>,

    /// Delete every environment of this repository
    #[arg(long, conflicts_with = "id")]
    all: bool,
}

impl DeleteCommand {
    pub async fn execute(self) -> Result<()> {
        let repo = open_repository().await?;
        if self.all {
            for info in repo.list().await? {
                repo.delete(&info.id).await?;
                println!("Environment '{}' deleted", info.id);
            }
            return Ok(());
        }
        let id = resolve_environment_id(&repo, self.id).await?;
        repo.delete(&id).await?;
        println!("Environment '{id}' deleted");
        Ok(())
    }
}
