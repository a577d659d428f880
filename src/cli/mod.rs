//! Command-line interface for container-use.
//!
//! The primary entry point for agents is `cu stdio`, which serves the MCP
//! dispatcher. Everything else is a thin human-facing wrapper over the
//! repository layer:
//!
//! - `cu list` / `cu log` / `cu diff` / `cu watch` - review agent work
//! - `cu checkout` / `cu merge` / `cu apply` - bring it into the workspace
//! - `cu delete` - discard it
//! - `cu terminal` - drop into the environment's container
//!
//! Commands that take an environment id resolve it from the current HEAD
//! when omitted: if exactly one environment descends from HEAD, that is the
//! one.

mod apply;
mod checkout;
pub mod common;
mod delete;
mod diff;
mod list;
mod log;
mod merge;
pub mod stdio;
mod terminal;
mod watch;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Containerized environments for coding agents.
#[derive(Debug, Parser)]
#[command(name = "cu", version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve MCP tools to an agent over stdio
    Stdio(stdio::StdioCommand),
    /// List environments
    List(list::ListCommand),
    /// Show an environment's commits and run log
    Log(log::LogCommand),
    /// Diff an environment against the current branch
    Diff(diff::DiffCommand),
    /// Check an environment's branch out locally
    Checkout(checkout::CheckoutCommand),
    /// Merge an environment into the current branch
    Merge(merge::MergeCommand),
    /// Stage an environment's changes without committing
    Apply(apply::ApplyCommand),
    /// Delete environments
    Delete(delete::DeleteCommand),
    /// Watch environment activity
    Watch(watch::WatchCommand),
    /// Attach an interactive terminal to an environment
    Terminal(terminal::TerminalCommand),
}

impl Cli {
    /// Initialize logging. The stdio server logs to the file named by
    /// `CONTAINER_USE_STDERR_FILE` (stdout carries the JSON-RPC stream);
    /// every other command logs to stderr honoring `RUST_LOG`, or debug
    /// level with `--verbose`.
    pub fn init_logging(&self) -> Result<()> {
        if matches!(self.command, Commands::Stdio(_)) {
            return stdio::init_logging();
        }

        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error"))
        } else if self.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("off")
        };
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    }

    /// Run the selected command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Stdio(cmd) => cmd.execute().await,
            Commands::List(cmd) => cmd.execute().await,
            Commands::Log(cmd) => cmd.execute().await,
            Commands::Diff(cmd) => cmd.execute().await,
            Commands::Checkout(cmd) => cmd.execute().await,
            Commands::Merge(cmd) => cmd.execute().await,
            Commands::Apply(cmd) => cmd.execute().await,
            Commands::Delete(cmd) => cmd.execute().await,
            Commands::Watch(cmd) => cmd.execute().await,
            Commands::Terminal(cmd) => cmd.execute().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_checkout_with_branch() {
        let cli = Cli::parse_from(["cu", "checkout", "sunny-otter", "-b", "feature/x"]);
        assert!(matches!(cli.command, Commands::Checkout(_)));
    }
}
