//! `cu stdio` - run the MCP dispatcher over stdin/stdout.

use anyhow::Result;
use clap::Args;
use std::sync::Arc;

use crate::core::ContainerUseError;
use crate::runtime::ContainerRuntime;

/// Environment variable naming the log file for the stdio server. Stdout
/// carries the JSON-RPC stream, so logs must go elsewhere.
pub const STDERR_FILE_ENV: &str = "CONTAINER_USE_STDERR_FILE";

/// Environment variable selecting the log level (`debug|info|warn|error`).
pub const LOG_LEVEL_ENV: &str = "CONTAINER_USE_LOG_LEVEL";

/// Default log file path.
pub const DEFAULT_STDERR_FILE: &str = "/tmp/container-use.debug.stderr.log";

/// Serve MCP tools to an agent over stdio.
#[derive(Debug, Args)]
pub struct StdioCommand {}

impl StdioCommand {
    pub async fn execute(self) -> Result<()> {
        crate::utils::platform::ensure_git_installed()?;
        let runtime = connect_runtime()?;
        crate::mcp::serve_stdio(runtime).await
    }
}

/// Initialize logging for the stdio server: everything goes to the file
/// named by `CONTAINER_USE_STDERR_FILE` at the level named by
/// `CONTAINER_USE_LOG_LEVEL`.
pub fn init_logging() -> Result<()> {
    let path = std::env::var(STDERR_FILE_ENV)
        .ok()
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_STDERR_FILE.to_string());
    let level = std::env::var(LOG_LEVEL_ENV)
        .ok()
        .filter(|l| matches!(l.as_str(), "debug" | "info" | "warn" | "error"))
        .unwrap_or_else(|| "info".to_string());

    let file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
    let (writer, guard) = tracing_appender::non_blocking(file);
    // The guard must outlive the process; leak it deliberately.
    std::mem::forget(guard);

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(level))
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(())
}

/// Connect to the container engine this build was linked against.
///
/// The orchestration core is engine-agnostic: it drives any
/// [`ContainerRuntime`] implementation, and embedding builds are expected to
/// supply one to [`crate::mcp::serve_stdio`]. This binary ships without an
/// engine binding.
pub(crate) fn connect_runtime() -> Result<Arc<dyn ContainerRuntime>> {
    Err(ContainerUseError::RuntimeFailure {
        operation: "connect".to_string(),
        reason: "no container engine binding is linked into this build; embed the \
                 container_use crate and pass a ContainerRuntime to mcp::serve_stdio"
            .to_string(),
    }
    .into())
}
