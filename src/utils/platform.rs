//! Platform-specific helpers
//!
//! Small abstractions over platform differences so container-use behaves the
//! same on Windows, macOS, and Linux.

use anyhow::Result;
use std::path::PathBuf;

use crate::core::ContainerUseError;

/// Checks if the current platform is Windows.
#[must_use]
pub const fn is_windows() -> bool {
    cfg!(windows)
}

/// Returns the appropriate git command name for the current platform.
///
/// Returns `"git.exe"` on Windows, `"git"` on Unix-like systems.
#[must_use]
pub const fn get_git_command() -> &'static str {
    if is_windows() {
        "git.exe"
    } else {
        "git"
    }
}

/// Gets the home directory path for the current user.
pub fn get_home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| {
        let platform_help = if is_windows() {
            "On Windows: Check that the USERPROFILE environment variable is set"
        } else {
            "On Unix/Linux: Check that the HOME environment variable is set"
        };
        anyhow::anyhow!("Could not determine home directory.\n\n{platform_help}")
    })
}

/// Checks if a command is available in the system PATH.
#[must_use]
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Fails fast with a classified error when git is not installed.
pub fn ensure_git_installed() -> Result<()> {
    if command_exists(get_git_command()) {
        Ok(())
    } else {
        Err(ContainerUseError::GitNotFound.into())
    }
}
