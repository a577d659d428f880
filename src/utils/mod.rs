//! Cross-platform utilities and helpers
//!
//! - [`platform`] - platform-specific helpers (git discovery, home dir)
//! - [`fs`] - small file system helpers used by the repository layer

pub mod fs;
pub mod platform;

pub use fs::{copy_file_with_parents, ensure_dir};
pub use platform::{command_exists, ensure_git_installed, get_git_command, get_home_dir};
