//! Error handling for container-use
//!
//! Two layers, mirroring how failures travel through the system:
//! 1. **Strongly-typed errors** ([`ContainerUseError`]) classified at the
//!    point of failure and preserved across layer boundaries
//! 2. **User-friendly contexts** ([`ErrorContext`]) with actionable
//!    suggestions for CLI users
//!
//! Two outcomes are deliberately *not* errors anywhere in this crate: a
//! container command exiting non-zero (the snapshot is kept and the exit code
//! travels in the response text and notes), and creating an environment from
//! a dirty source tree (the result carries a warning block instead).

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for container-use operations.
///
/// Each variant corresponds to one failure kind in the error taxonomy;
/// callers match on variants, users see the rendered messages.
#[derive(Error, Debug)]
pub enum ContainerUseError {
    /// Git command returned a non-zero exit code.
    ///
    /// The message embeds the exit code and the captured output verbatim;
    /// several callers match on substrings of that output (`no note found`,
    /// `[rejected]`, `conflict`).
    #[error("git {command} failed (exit {exit_code}): {output}")]
    GitCommandError {
        /// The argument vector that was executed, joined for display
        command: String,
        /// Exit code reported by git (-1 when killed by a signal)
        exit_code: i32,
        /// Combined stdout + stderr, verbatim
        output: String,
    },

    /// Git executable not found in PATH
    #[error("git is not installed or not found in PATH")]
    GitNotFound,

    /// The given path is not inside a git working tree
    #[error("not a git repository: {path}")]
    NotAGitRepository {
        /// The path that was probed
        path: String,
    },

    /// No environment branch with this id exists in the container-use remote
    #[error("environment '{id}' not found")]
    EnvironmentNotFound {
        /// The environment id that could not be resolved
        id: String,
    },

    /// The state note for an environment could not be decoded, even after
    /// the legacy-array retry
    #[error("failed to decode state for environment '{id}': {reason}")]
    StateDecodeError {
        /// Environment whose state note is unreadable
        id: String,
        /// Serde error from the final decode attempt
        reason: String,
    },

    /// Container Runtime failure other than a non-zero command exit
    #[error("container runtime failure: {operation}: {reason}")]
    RuntimeFailure {
        /// The runtime operation that failed (e.g. "exec", "export", "publish")
        operation: String,
        /// Reason reported by the runtime
        reason: String,
    },

    /// A setup command failed while building the base container
    #[error("setup command failed (exit {exit_code}): {command}")]
    SetupCommandFailed {
        /// The failing command
        command: String,
        /// Its exit code
        exit_code: i32,
        /// Combined output of the failing command
        output: String,
    },

    /// An install command failed after the source tree was mounted
    #[error("install command failed (exit {exit_code}): {command}")]
    InstallCommandFailed {
        /// The failing command
        command: String,
        /// Its exit code
        exit_code: i32,
        /// Combined output of the failing command
        output: String,
    },

    /// A service did not come up within the start deadline
    #[error("service '{name}' did not start within {timeout_secs}s")]
    ServiceStartTimeout {
        /// Service name
        name: String,
        /// The deadline that was exceeded
        timeout_secs: u64,
    },

    /// A service name collides with one already configured
    #[error("service '{name}' already exists in this environment")]
    ServiceExists {
        /// The duplicate name
        name: String,
    },

    /// Merge or apply hit conflicts; the merge is left in progress in the
    /// source repository
    #[error("merge of environment '{id}' conflicts:\n{output}")]
    MergeConflict {
        /// Environment being merged
        id: String,
        /// Git's conflict output, verbatim
        output: String,
    },

    /// Exporting the container workdir into the worktree failed
    #[error("failed to export workdir for environment '{id}': {reason}")]
    WorktreeExportFailed {
        /// Environment being updated
        id: String,
        /// Reason reported by the runtime
        reason: String,
    },

    /// A secret URI does not use one of the supported schemes
    #[error("invalid secret '{name}': {reason}")]
    InvalidSecret {
        /// Secret key
        name: String,
        /// Why the URI was rejected
        reason: String,
    },

    /// Configuration error (on-disk defaults or tool arguments)
    #[error("configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Other error
    #[error("{message}")]
    Other {
        /// Generic error message
        message: String,
    },
}

impl ContainerUseError {
    /// True when this error carries git output containing the given needle.
    ///
    /// The notes-propagation retry and the merge/apply conflict detection
    /// both classify by substring of git's verbatim output.
    #[must_use]
    pub fn git_output_contains(&self, needle: &str) -> bool {
        match self {
            Self::GitCommandError {
                output, ..
            } => output.contains(needle),
            _ => false,
        }
    }
}

/// Error context wrapper that provides user-friendly error information.
///
/// Wraps a [`ContainerUseError`] with an optional suggestion (green) and
/// details (yellow) for terminal display. This is how the `cu` CLI presents
/// failures; the MCP dispatcher sends the bare error instead.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: ContainerUseError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub const fn new(error: ContainerUseError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add an actionable suggestion, rendered in green.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add details explaining the error, rendered in yellow.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error, details, and suggestion to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into a user-friendly [`ErrorContext`] with suggestions.
///
/// Walks the anyhow chain looking for a [`ContainerUseError`]; everything
/// else gets generic formatting.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let mut current: &dyn std::error::Error = error.as_ref();
    loop {
        if let Some(cu_error) = current.downcast_ref::<ContainerUseError>() {
            return contextualize(cu_error);
        }
        match current.source() {
            Some(source) => current = source,
            None => break,
        }
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>()
        && io_error.kind() == std::io::ErrorKind::PermissionDenied
    {
        return ErrorContext::new(ContainerUseError::Other {
            message: format!("{error:#}"),
        })
        .with_suggestion("Check file permissions on the container-use config directory");
    }

    ErrorContext::new(ContainerUseError::Other {
        message: format!("{error:#}"),
    })
}

fn contextualize(error: &ContainerUseError) -> ErrorContext {
    match error {
        ContainerUseError::GitNotFound => ErrorContext::new(ContainerUseError::GitNotFound)
            .with_suggestion("Install git from https://git-scm.com/ or via your package manager"),
        ContainerUseError::NotAGitRepository {
            path,
        } => ErrorContext::new(ContainerUseError::NotAGitRepository {
            path: path.clone(),
        })
        .with_suggestion("Run this command from inside a git repository, or `git init` first"),
        ContainerUseError::EnvironmentNotFound {
            id,
        } => ErrorContext::new(ContainerUseError::EnvironmentNotFound {
            id: id.clone(),
        })
        .with_suggestion("List available environments with `cu list`"),
        ContainerUseError::MergeConflict {
            id,
            output,
        } => ErrorContext::new(ContainerUseError::MergeConflict {
            id: id.clone(),
            output: output.clone(),
        })
        .with_details("The merge was left in progress in your repository")
        .with_suggestion("Resolve the conflicts and commit, or run `git merge --abort`"),
        other => ErrorContext::new(ContainerUseError::Other {
            message: other.to_string(),
        }),
    }
}
