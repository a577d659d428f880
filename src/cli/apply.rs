//! `cu apply` - squash an environment's changes into the working tree.

use anyhow::Result;
use clap::Args;

use crate::cli::common::{open_repository, resolve_environment_id};

/// Stage the environment's combined changes in the working tree without
/// committing, collapsing its history.
#[derive(Debug, Args)]
pub struct ApplyCommand {
    /// Environment id (defaults to the one descending from HEAD)
    id: Option<String>,

    /// Delete the environment after a successful apply
    #[arg(long)]
    delete: bool,
}

impl ApplyCommand {
    pub async fn execute(self) -> Result<()> {
        let repo = open_repository().await?;
        let id = resolve_environment_id(&repo, self.id).await?;
        let mut stdout = std::io::stdout();
        repo.apply(&id, &mut stdout).await?;
        if self.delete {
            repo.delete(&id).await?;
            println!("Environment '{id}' deleted");
        }
        Ok(())
    }
}
