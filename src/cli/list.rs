//! `cu list` - list environments of the current repository.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use crate::cli::common::open_repository;

/// List environments, most recently updated first.
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Only print environment ids
    #[arg(long, short)]
    quiet: bool,
}

impl ListCommand {
    pub async fn execute(self) -> Result<()> {
        let repo = open_repository().await?;
        let infos = repo.list().await?;

        if self.quiet {
            for info in infos {
                println!("{}", info.id);
            }
            return Ok(());
        }

        if infos.is_empty() {
            println!("No environments. Agents create them via the MCP tools (`cu stdio`).");
            return Ok(());
        }

        println!("{:<24} {:<40} {}", "ID".bold(), "TITLE".bold(), "UPDATED".bold());
        for info in infos {
            let title = if info.state.title.chars().count() > 38 {
                let shortened: String = info.state.title.chars().take(37).collect();
                format!("{shortened}…")
            } else {
                info.state.title.clone()
            };
            println!(
                "{:<24} {:<40} {}",
                info.id,
                title,
                info.state.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        Ok(())
    }
}
