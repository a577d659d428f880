//! Integration test suite for container-use.
//!
//! Drives the full orchestration core - repository layer, environment
//! engine, commit filter, notes plumbing - against real git repositories
//! (tempdirs) and the hermetic in-memory container runtime.
//!
//! ```bash
//! cargo test --test integration
//! ```

mod common;

mod cli;
mod commands;
mod config_rebuild;
mod create;
mod descendants;
mod filter;
mod isolation;
mod listing;
mod merge_apply;
mod recovery;
