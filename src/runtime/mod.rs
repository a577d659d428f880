//! Abstract Container Runtime interface.
//!
//! The core never talks to a container engine directly; it consumes these
//! traits. A runtime models containers as immutable values: every builder
//! method returns a new [`Container`] describing the next state, and
//! [`Container::sync`] evaluates the pending operations into a
//! content-addressed snapshot id. Two snapshots with the same id describe
//! the same filesystem and config; ids are not forgeable by the core.
//!
//! Command exits are data, not errors: [`Container::sync`] reports a
//! [`ExecOutcome::NonZero`] alongside the snapshot id so the engine can keep
//! the snapshot (preserving partial side effects) while surfacing the exit
//! code in the response text and notes. Only genuine engine failures (image
//! pull, export, publish, transport) come back as `Err`.
//!
//! The crate ships no production engine binding; the dispatcher accepts any
//! `Arc<dyn ContainerRuntime>`. The `test-utils` feature provides a hermetic
//! in-memory implementation used by the integration suite.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::core::Result;

/// Outcome of executing a command inside a container.
///
/// `NonZero` is deliberately not an error: the snapshot produced by the
/// failed command is kept, and the exit code travels in responses and notes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    /// The last exec (if any) exited 0.
    Success {
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
    },
    /// The last exec exited non-zero.
    NonZero {
        /// The command's exit code
        exit_code: i32,
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
    },
}

impl ExecOutcome {
    /// Exit code of the command (0 on success).
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Success {
                ..
            } => 0,
            Self::NonZero {
                exit_code, ..
            } => *exit_code,
        }
    }

    /// Captured standard output.
    #[must_use]
    pub fn stdout(&self) -> &str {
        match self {
            Self::Success {
                stdout, ..
            }
            | Self::NonZero {
                stdout, ..
            } => stdout,
        }
    }

    /// Captured standard error.
    #[must_use]
    pub fn stderr(&self) -> &str {
        match self {
            Self::Success {
                stderr, ..
            }
            | Self::NonZero {
                stderr, ..
            } => stderr,
        }
    }
}

/// Options for a single container exec.
#[derive(Debug, Clone, Default)]
pub struct ExecOpts {
    /// Run the image's entrypoint with the argv appended, instead of the
    /// argv alone.
    pub use_entrypoint: bool,
}

/// Result of evaluating a container's pending operations.
#[derive(Debug, Clone)]
pub struct SyncResult {
    /// Content-addressed snapshot id of the evaluated container state
    pub snapshot_id: String,
    /// Outcome of the last exec in the pending chain (Success with empty
    /// output when the chain contained no exec)
    pub outcome: ExecOutcome,
}

/// Address pair for one exposed service port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndpointMapping {
    /// Address reachable from inside the environment's network
    pub internal: String,
    /// Address reachable from the host
    pub external: String,
}

/// Port to endpoint mapping for a running service.
pub type EndpointMappings = BTreeMap<u16, EndpointMapping>;

/// A container engine: the only thing the core knows how to ask for
/// containers, reloads, and host-side tunnels.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Start a new container definition from an image reference.
    async fn container_from(&self, image: &str) -> Result<Box<dyn Container>>;

    /// Reload a container from a previously synced snapshot id.
    async fn load_container(&self, snapshot_id: &str) -> Result<Box<dyn Container>>;

    /// Open host-side TCP tunnels to the given ports of a started service.
    /// Front-end ports are allocated by the runtime.
    async fn tunnel(
        &self,
        service: Arc<dyn ContainerService>,
        ports: &[u16],
    ) -> Result<Box<dyn Tunnel>>;
}

/// An immutable container value. Builder methods are cheap and lazy;
/// evaluation happens on [`sync`](Container::sync) and the accessors.
#[async_trait]
pub trait Container: Send + Sync {
    /// Set the working directory.
    fn with_workdir(&self, path: &str) -> Box<dyn Container>;

    /// Set an environment variable.
    fn with_env(&self, key: &str, value: &str) -> Box<dyn Container>;

    /// Mount a secret as a protected environment variable. The `uri` uses
    /// one of the `file://`, `env://`, or `op://` schemes; resolution happens
    /// at evaluation time and failures surface as runtime errors from
    /// [`sync`](Container::sync).
    fn with_secret(&self, key: &str, uri: &str) -> Box<dyn Container>;

    /// Append a command execution.
    fn with_exec(&self, argv: &[String], opts: &ExecOpts) -> Box<dyn Container>;

    /// Create or replace a file.
    fn with_new_file(&self, path: &str, contents: &str) -> Box<dyn Container>;

    /// Remove a file.
    fn without_file(&self, path: &str) -> Box<dyn Container>;

    /// Overlay a host directory at the given container path.
    fn with_directory(&self, path: &str, host_dir: &Path) -> Box<dyn Container>;

    /// Bind a started service into this container's network namespace under
    /// the given hostname.
    fn with_service_binding(
        &self,
        name: &str,
        service: Arc<dyn ContainerService>,
    ) -> Box<dyn Container>;

    /// Evaluate all pending operations into a snapshot.
    async fn sync(&self) -> Result<SyncResult>;

    /// Contents of a file in the evaluated container.
    async fn file_contents(&self, path: &str) -> Result<String>;

    /// Entries of a directory in the evaluated container.
    async fn directory_entries(&self, path: &str) -> Result<Vec<String>>;

    /// Export a container directory to the host. With `wipe`, the host path
    /// is replaced wholesale instead of merged.
    async fn export_directory(&self, path: &str, host_path: &Path, wipe: bool) -> Result<()>;

    /// Turn this container into a startable service running `argv` (or the
    /// image's default command when `argv` is None).
    async fn as_service(
        &self,
        argv: Option<Vec<String>>,
        use_entrypoint: bool,
    ) -> Result<Arc<dyn ContainerService>>;

    /// Attach an interactive terminal running the given argv.
    async fn terminal(&self, argv: &[String]) -> Result<()>;

    /// Publish the evaluated container to a registry; returns the pushed
    /// (content-addressed) reference.
    async fn publish(&self, reference: &str) -> Result<String>;
}

/// A startable sidecar produced by [`Container::as_service`].
#[async_trait]
pub trait ContainerService: Send + Sync {
    /// Start the service. Blocks until the service is up or the runtime
    /// gives up; the engine bounds this with its own deadline.
    async fn start(&self) -> Result<()>;

    /// Stop the service.
    async fn stop(&self) -> Result<()>;

    /// Address of the given port as reachable from inside the environment's
    /// network.
    async fn endpoint(&self, port: u16) -> Result<String>;
}

/// Host-side TCP tunnels to a running service.
#[async_trait]
pub trait Tunnel: Send + Sync {
    /// Host-reachable address for the given service port.
    fn endpoint(&self, port: u16) -> Option<String>;

    /// Tear the tunnels down.
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_outcome_accessors() {
        let ok = ExecOutcome::Success {
            stdout: "hi\n".to_string(),
            stderr: String::new(),
        };
        assert_eq!(ok.exit_code(), 0);
        assert_eq!(ok.stdout(), "hi\n");

        let failed = ExecOutcome::NonZero {
            exit_code: 7,
            stdout: "hi\n".to_string(),
            stderr: "boom\n".to_string(),
        };
        assert_eq!(failed.exit_code(), 7);
        assert_eq!(failed.stderr(), "boom\n");
    }
}
