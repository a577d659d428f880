//! `cu diff` - diff an environment against its merge-base with HEAD.

use anyhow::Result;
use clap::Args;

use crate::cli::common::{open_repository, resolve_environment_id};

/// Show what an environment changed relative to the current branch.
#[derive(Debug, Args)]
pub struct DiffCommand {
    /// Environment id (defaults to the one descending from HEAD)
    id: Option<String>,
}

impl DiffCommand {
    pub async fn execute(self) -> Result<()> {
        let repo = open_repository().await?;
        let id = resolve_environment_id(&repo, self.id).await?;
        let mut stdout = std::io::stdout();
        repo.diff(&id, &mut stdout).await
    }
}
