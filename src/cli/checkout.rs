//! `cu checkout` - check an environment's branch out in the source repo.

use anyhow::Result;
use clap::Args;

use crate::cli::common::{open_repository, resolve_environment_id};

/// Check the environment branch out locally, tracking `container-use/<id>`.
#[derive(Debug, Args)]
pub struct CheckoutCommand {
    /// Environment id (defaults to the one descending from HEAD)
    id: Option<String>,

    /// Name for the local branch (defaults to the environment id)
    #[arg(long, short = 'b')]
    branch: Option<String>,
}

impl CheckoutCommand {
    pub async fn execute(self) -> Result<()> {
        let repo = open_repository().await?;
        let id = resolve_environment_id(&repo, self.id).await?;
        let realized = repo.checkout(&id, self.branch.as_deref()).await?;
        println!("Switched to branch '{realized}'");
        Ok(())
    }
}
