//! `cu` entry point.
//!
//! Parses arguments, wires logging (file-backed for the stdio server,
//! stderr otherwise), runs the command, and renders failures as
//! user-friendly errors.

use anyhow::Result;
use clap::Parser;

use container_use::cli::Cli;
use container_use::core::user_friendly_error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.init_logging()?;

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            user_friendly_error(e).display();
            std::process::exit(1);
        }
    }
}
