//! File system helpers
//!
//! Thin wrappers used by the repository layer when copying uncommitted
//! changes between the user's source tree and an environment worktree.

use anyhow::{Context, Result};
use std::path::Path;

/// Create a directory and all parents, tolerating existing directories.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))
}

/// Copy a single file, creating any missing parent directories of the
/// destination first.
pub fn copy_file_with_parents(src: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        ensure_dir(parent)?;
    }
    std::fs::copy(src, dest)
        .with_context(|| format!("failed to copy {} to {}", src.display(), dest.display()))?;
    Ok(())
}
