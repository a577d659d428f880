//! `cu terminal` - attach an interactive shell to an environment.

use anyhow::Result;
use clap::Args;

use crate::cli::common::{open_repository, resolve_environment_id};

/// Open an interactive terminal in the environment's current snapshot.
#[derive(Debug, Args)]
pub struct TerminalCommand {
    /// Environment id (defaults to the one descending from HEAD)
    id: Option<String>,
}

impl TerminalCommand {
    pub async fn execute(self) -> Result<()> {
        let repo = open_repository().await?;
        let id = resolve_environment_id(&repo, self.id).await?;
        let runtime = super::stdio::connect_runtime()?;
        let env = repo.get(&id, runtime).await?;
        env.terminal().await
    }
}
