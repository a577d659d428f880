//! Git driver for container-use.
//!
//! A pure subprocess wrapper around the system `git` command: it executes a
//! verbatim argument vector in a given directory and returns the captured
//! output. Uses system git (not libgit2) for maximum compatibility with
//! authentication, configurations, and platforms.
//!
//! The driver interprets nothing and adds no implicit flags. Error
//! classification happens above it: a non-zero exit becomes a
//! [`ContainerUseError::GitCommandError`] whose message embeds the exit code
//! and the combined output verbatim, because callers in the repository layer
//! match on substrings of that output (`no note found`, `[rejected]`,
//! `conflict`).

use anyhow::{Context, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use crate::core::ContainerUseError;
use crate::utils::platform::get_git_command;

/// Builder for constructing and executing a single git invocation.
///
/// # Examples
///
/// ```rust,ignore
/// let status = GitCommand::new(["status", "--porcelain"])
///     .current_dir(&repo_path)
///     .execute_stdout()
///     .await?;
/// ```
pub struct GitCommand {
    /// Argument vector passed to git verbatim
    args: Vec<String>,

    /// Working directory for the child process
    current_dir: Option<std::path::PathBuf>,

    /// Environment variables to set for the git process
    env_vars: Vec<(String, String)>,

    /// Bytes piped into the child's stdin (used by `git apply`)
    stdin: Option<Vec<u8>>,

    /// Maximum duration to wait for completion (None = no timeout)
    timeout_duration: Option<Duration>,

    /// Optional context string for log messages (typically an environment id)
    context: Option<String>,
}

impl GitCommand {
    /// Create a command from an argument vector.
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            current_dir: None,
            env_vars: Vec::new(),
            stdin: None,
            // Local git operations are fast; 5 minutes covers worst-case
            // clones of large source repositories.
            timeout_duration: Some(Duration::from_secs(300)),
            context: None,
        }
    }

    /// Set the working directory for the git invocation.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Append a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the git process.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Pipe the given bytes into the child's stdin.
    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Set a custom timeout (None for no timeout).
    pub const fn with_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Set a context identifier included in debug logs, to distinguish
    /// concurrent operations on different environments.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Execute the command and return the captured output.
    pub async fn execute(self) -> Result<GitOutput> {
        let start = std::time::Instant::now();
        let git_command = get_git_command();
        let mut cmd = Command::new(git_command);
        cmd.args(&self.args);

        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }

        if let Some(ref ctx) = self.context {
            tracing::debug!(target: "git", "({}) git {}", ctx, self.args.join(" "));
        } else {
            tracing::debug!(target: "git", "git {}", self.args.join(" "));
        }

        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }

        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.stdin(if self.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                anyhow::Error::new(ContainerUseError::GitNotFound)
            } else {
                anyhow::Error::new(e)
                    .context(format!("failed to spawn git {}", self.args.join(" ")))
            }
        })?;

        if let Some(input) = self.stdin {
            let mut handle = child.stdin.take().context("child stdin unavailable")?;
            handle.write_all(&input).await.context("failed to write to git stdin")?;
            drop(handle);
        }

        let output_future = child.wait_with_output();
        let output = if let Some(duration) = self.timeout_duration {
            match timeout(duration, output_future).await {
                Ok(result) => {
                    result.context(format!("failed to execute git {}", self.args.join(" ")))?
                }
                Err(_) => {
                    tracing::warn!(
                        target: "git",
                        "command timed out after {}s: git {}",
                        duration.as_secs(),
                        self.args.join(" ")
                    );
                    return Err(ContainerUseError::GitCommandError {
                        command: self.args.join(" "),
                        exit_code: -1,
                        output: format!("timed out after {} seconds", duration.as_secs()),
                    }
                    .into());
                }
            }
        } else {
            output_future.await.context(format!("failed to execute git {}", self.args.join(" ")))?
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            tracing::debug!(
                target: "git",
                "git {} failed with exit code {}",
                self.args.join(" "),
                exit_code
            );
            let mut combined = stdout;
            if !stderr.is_empty() {
                if !combined.is_empty() && !combined.ends_with('\n') {
                    combined.push('\n');
                }
                combined.push_str(&stderr);
            }
            return Err(ContainerUseError::GitCommandError {
                command: self.args.join(" "),
                exit_code,
                output: combined,
            }
            .into());
        }

        let elapsed = start.elapsed();
        if elapsed.as_millis() > 100 {
            let operation = self.args.first().cloned().unwrap_or_else(|| "unknown".to_string());
            tracing::debug!(
                target: "git::perf",
                "git {} took {}ms",
                operation,
                elapsed.as_millis()
            );
        }

        Ok(GitOutput {
            stdout,
            stderr,
        })
    }

    /// Execute and return stdout as a trimmed string.
    pub async fn execute_stdout(self) -> Result<String> {
        let output = self.execute().await?;
        Ok(output.stdout.trim().to_string())
    }

    /// Execute and check for success, discarding output.
    pub async fn execute_success(self) -> Result<()> {
        self.execute().await?;
        Ok(())
    }
}

/// Captured output from a git command.
#[derive(Debug)]
pub struct GitOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

impl GitOutput {
    /// Stdout followed by stderr, newline-separated when both are non-empty.
    #[must_use]
    pub fn combined(&self) -> String {
        let mut combined = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&self.stderr);
        }
        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder_basic() {
        let cmd = GitCommand::new(["status", "--porcelain"]).arg("-z");
        assert_eq!(cmd.args, vec!["status", "--porcelain", "-z"]);
    }

    #[test]
    fn test_command_builder_with_dir() {
        let cmd = GitCommand::new(["status"]).current_dir("/tmp/repo");
        assert_eq!(cmd.current_dir, Some(std::path::PathBuf::from("/tmp/repo")));
    }

    #[tokio::test]
    async fn test_version_succeeds() {
        let output = GitCommand::new(["--version"]).execute().await.unwrap();
        assert!(output.stdout.contains("git version"));
    }

    #[tokio::test]
    async fn test_error_embeds_exit_code_and_output() {
        let dir = tempfile::tempdir().unwrap();
        let err = GitCommand::new(["rev-parse", "--verify", "refs/heads/missing"])
            .current_dir(dir.path())
            .execute()
            .await
            .unwrap_err();
        let cu = err.downcast_ref::<ContainerUseError>().expect("classified error");
        match cu {
            ContainerUseError::GitCommandError {
                exit_code,
                output,
                ..
            } => {
                assert_ne!(*exit_code, 0);
                assert!(!output.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_stdin_payload() {
        let dir = tempfile::tempdir().unwrap();
        // `git hash-object --stdin` reads the payload and prints an oid.
        let oid = GitCommand::new(["hash-object", "--stdin"])
            .current_dir(dir.path())
            .stdin("hello\n")
            .execute_stdout()
            .await
            .unwrap();
        assert_eq!(oid.len(), 40);
    }
}
