//! `cu log` - show an environment's commit and command history.

use anyhow::Result;
use clap::Args;

use crate::cli::common::{open_repository, resolve_environment_id};

/// Show the commits and run log of an environment branch.
#[derive(Debug, Args)]
pub struct LogCommand {
    /// Environment id (defaults to the one descending from HEAD)
    id: Option<String>,

    /// Include patches
    #[arg(long, short)]
    patch: bool,
}

impl LogCommand {
    pub async fn execute(self) -> Result<()> {
        let repo = open_repository().await?;
        let id = resolve_environment_id(&repo, self.id).await?;
        let mut stdout = std::io::stdout();
        repo.log(&id, self.patch, &mut stdout).await
    }
}
