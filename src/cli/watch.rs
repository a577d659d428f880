//! `cu watch` - live view of environment activity.

use anyhow::Result;
use clap::Args;
use std::time::Duration;

use crate::cli::common::open_repository;
use crate::git::GitCommand;
use crate::repository::REMOTE_NAME;

/// Continuously render the commit graph of all environment branches.
#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Refresh interval in seconds
    #[arg(long, default_value_t = 2)]
    interval: u64,
}

impl WatchCommand {
    pub async fn execute(self) -> Result<()> {
        let repo = open_repository().await?;
        let mut ticker = tokio::time::interval(Duration::from_secs(self.interval.max(1)));
        loop {
            ticker.tick().await;
            GitCommand::new(["fetch", REMOTE_NAME])
                .current_dir(repo.user_repo_path())
                .execute()
                .await
                .ok();
            let output = GitCommand::new([
                "log",
                "--remotes=container-use",
                "--oneline",
                "--graph",
                "--color=always",
                "--decorate",
            ])
            .current_dir(repo.user_repo_path())
            .execute()
            .await?;
            // ANSI clear screen + home, then the fresh graph.
            print!("\x1b[2J\x1b[H{}", output.stdout);
        }
    }
}
