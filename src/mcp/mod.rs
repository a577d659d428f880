//! MCP dispatcher for container-use.
//!
//! Exposes environment operations to agents as typed MCP tools over a
//! line-delimited JSON-RPC stream on stdin/stdout. A tool call resolves the
//! repository and environment, performs the operation against the container
//! runtime, and commits the result (worktree diff, state note, log note)
//! before the response is emitted.

mod models;
mod rules;
mod server;

pub use models::{EnvironmentResponse, EnvironmentSummary};
pub use rules::AGENT_RULES;
pub use server::{EnvironmentServer, serve_stdio};
