//! `cu merge` - merge an environment into the current branch.

use anyhow::Result;
use clap::Args;

use crate::cli::common::{open_repository, resolve_environment_id};

/// Merge the environment branch into the current branch with a merge
/// commit, preserving the environment's history.
#[derive(Debug, Args)]
pub struct MergeCommand {
    /// Environment id (defaults to the one descending from HEAD)
    id: Option<String>,

    /// Delete the environment after a successful merge
    #[arg(long)]
    delete: bool,
}

impl MergeCommand {
    pub async fn execute(self) -> Result<()> {
        let repo = open_repository().await?;
        let id = resolve_environment_id(&repo, self.id).await?;
        let mut stdout = std::io::stdout();
        repo.merge(&id, &mut stdout).await?;
        if self.delete {
            repo.delete(&id).await?;
            println!("Environment '{id}' deleted");
        }
        Ok(())
    }
}
