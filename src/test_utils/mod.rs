//! Test utilities.
//!
//! Available to unit tests and, through the `test-utils` feature, to the
//! integration suite: a git helper, isolated project scaffolding, and a
//! hermetic in-memory container runtime with a minimal shell interpreter.

pub mod git_helper;
pub mod project;
pub mod runtime;
pub mod shell;

pub use git_helper::TestGit;
pub use project::TestProject;
pub use runtime::InMemoryRuntime;
