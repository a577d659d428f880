//! Git helper for tests.
//!
//! A safe wrapper around git commands with proper error handling and test
//! isolation. Use this instead of raw `std::process::Command` for git
//! operations in tests.

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Git command runner scoped to one repository path.
pub struct TestGit {
    repo_path: PathBuf,
}

impl TestGit {
    /// Create a new runner for the given repository path.
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }

    /// Run a git command, returning trimmed stdout.
    pub fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .output()
            .with_context(|| format!("failed to run git {}", args.join(" ")))?;
        if !output.status.success() {
            bail!(
                "git {} failed: {}{}",
                args.join(" "),
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Initialize a repository on branch `main`.
    pub fn init(&self) -> Result<()> {
        self.run(&["init", "-b", "main"])?;
        Ok(())
    }

    /// Configure a deterministic committer identity.
    pub fn config_user(&self) -> Result<()> {
        self.run(&["config", "user.email", "test@container-use.example"])?;
        self.run(&["config", "user.name", "Test User"])?;
        Ok(())
    }

    /// Stage everything.
    pub fn add_all(&self) -> Result<()> {
        self.run(&["add", "."])?;
        Ok(())
    }

    /// Commit with the given message.
    pub fn commit(&self, message: &str) -> Result<()> {
        self.run(&["commit", "-m", message])?;
        Ok(())
    }

    /// Commit with `--allow-empty`.
    pub fn commit_empty(&self, message: &str) -> Result<()> {
        self.run(&["commit", "--allow-empty", "-m", message])?;
        Ok(())
    }

    /// Current HEAD commit sha.
    pub fn head(&self) -> Result<String> {
        self.run(&["rev-parse", "HEAD"])
    }

    /// Current branch name.
    pub fn current_branch(&self) -> Result<String> {
        self.run(&["branch", "--show-current"])
    }

    /// Subjects of `git log --format=%s`, newest first.
    pub fn log_subjects(&self) -> Result<Vec<String>> {
        Ok(self.run(&["log", "--format=%s"])?.lines().map(String::from).collect())
    }

    /// The repository path.
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }
}
