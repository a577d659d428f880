//! container-use - isolated containerized environments for coding agents
//!
//! Each agent conversation can spawn one or more **environments**: an
//! ephemeral, content-addressed container snapshot paired with a dedicated
//! git branch that records every filesystem mutation and every command the
//! agent ran. Humans review the work with `cu log` / `cu diff`, adopt it
//! with `cu checkout` / `cu merge` / `cu apply`, or discard it with
//! `cu delete` - all standard git underneath.
//!
//! # Architecture
//!
//! - [`git`] - pure subprocess driver running verbatim git argument vectors
//! - [`repository`] - bare "container-use remote" + per-environment
//!   worktrees, branch/note lifecycle, merge/apply/checkout semantics
//! - [`environment`] - container snapshot chain, configuration, services,
//!   run log
//! - [`runtime`] - abstract container engine interface the core consumes
//! - [`mcp`] - stdio JSON-RPC dispatcher exposing environment tools to
//!   agents
//! - [`cli`] - the `cu` command-line front end
//! - [`core`] - error taxonomy shared by every layer
//!
//! A tool call flows dispatcher → repository → environment → runtime, then
//! back up: the new container snapshot's workdir is exported into the
//! worktree, committed, and the state/log notes are synced before the
//! response is emitted.

pub mod cli;
pub mod core;
pub mod environment;
pub mod git;
pub mod mcp;
pub mod repository;
pub mod runtime;
pub mod utils;

// Available to unit tests and to integration tests via the test-utils
// feature.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
