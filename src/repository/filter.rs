//! Commit filter for environment worktrees.
//!
//! Agent workloads routinely materialize large dependency trees and binary
//! artifacts inside the workdir; committing those into the environment
//! branch makes `log`/`diff`/`merge` useless. Before every commit a file is
//! staged iff:
//!
//! - it is not already staged as `A`,
//! - its extension is not on the binary blacklist,
//! - its path contains no blacklisted segment,
//! - for files up to 10 MiB, the first 8000 bytes contain no NUL byte
//!   (larger files are treated as binary).
//!
//! Deletions are always staged. This is a robustness net for demo
//! workloads, not a `.gitignore` substitute, and its semantics are load
//! bearing for existing workflows; do not rationalize it.

use anyhow::Result;
use std::io::Read;
use std::path::Path;

use crate::git::GitCommand;

/// Extensions that are never staged: archives, executables, images, audio,
/// video, office documents, compiled artifacts.
const BINARY_EXTENSIONS: &[&str] = &[
    "tar", "tgz", "zip", "gz", "bz2", "xz", "7z", "rar", "exe", "msi", "bin", "so", "dylib",
    "dll", "a", "o", "obj", "pyc", "class", "jar", "war", "png", "jpg", "jpeg", "gif", "bmp",
    "ico", "webp", "tiff", "mp3", "wav", "ogg", "flac", "mp4", "avi", "mov", "mkv", "webm",
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx",
];

/// Path segments that are never staged.
const BLACKLISTED_SEGMENTS: &[&str] = &[
    "node_modules",
    ".git",
    "__pycache__",
    ".DS_Store",
    "target",
    "build",
    "dist",
    ".next",
    "venv",
    ".venv",
];

/// File name suffixes that are never staged.
const BLACKLISTED_SUFFIXES: &[&str] = &[".tmp", ".cache", ".log"];

/// Files larger than this are binary without looking at their content.
const MAX_TEXT_CHECK_SIZE: u64 = 10 * 1024 * 1024;

/// How much of a file is probed for NUL bytes.
const TEXT_PROBE_BYTES: usize = 8000;

/// Stage eligible changes in a worktree. Returns true when anything was
/// added to the index.
pub async fn stage_changes(worktree: &Path) -> Result<bool> {
    // -uall expands untracked directories into individual files; the filter
    // decides per file, never per directory.
    let status = GitCommand::new(["status", "--porcelain", "-uall", "-z"])
        .current_dir(worktree)
        .execute()
        .await?;

    let mut to_add = Vec::new();
    for entry in parse_porcelain(&status.stdout) {
        if entry.index_status == 'A' {
            continue;
        }
        let deleted = entry.index_status == 'D' || entry.worktree_status == 'D';
        if deleted || should_stage(worktree, &entry.path) {
            to_add.push(entry.path);
        }
    }

    if to_add.is_empty() {
        return Ok(false);
    }

    GitCommand::new(["add", "--"])
        .args(to_add)
        .current_dir(worktree)
        .execute_success()
        .await?;
    Ok(true)
}

/// True when the index holds staged changes.
pub async fn has_staged_changes(worktree: &Path) -> Result<bool> {
    // diff --cached --quiet exits 1 when the index differs from HEAD
    match GitCommand::new(["diff", "--cached", "--quiet"]).current_dir(worktree).execute().await {
        Ok(_) => Ok(false),
        Err(e) => {
            if let Some(crate::core::ContainerUseError::GitCommandError {
                exit_code: 1, ..
            }) = e.downcast_ref::<crate::core::ContainerUseError>()
            {
                Ok(true)
            } else {
                Err(e)
            }
        }
    }
}

/// Decide whether a (present) file passes the filter.
pub fn should_stage(worktree: &Path, rel_path: &str) -> bool {
    let path = Path::new(rel_path);

    for component in path.components() {
        let segment = component.as_os_str().to_string_lossy();
        if BLACKLISTED_SEGMENTS.iter().any(|s| segment.eq_ignore_ascii_case(s)) {
            return false;
        }
        if BLACKLISTED_SUFFIXES.iter().any(|s| segment.to_ascii_lowercase().ends_with(s)) {
            return false;
        }
    }

    if let Some(ext) = path.extension().map(|e| e.to_string_lossy().to_ascii_lowercase())
        && BINARY_EXTENSIONS.contains(&ext.as_str())
    {
        return false;
    }

    looks_textual(&worktree.join(path))
}

fn looks_textual(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        // Races with concurrent deletion; deletions are staged separately.
        return false;
    };
    if metadata.len() > MAX_TEXT_CHECK_SIZE {
        return false;
    }

    let Ok(mut file) = std::fs::File::open(path) else {
        return false;
    };
    let mut probe = [0u8; TEXT_PROBE_BYTES];
    let mut filled = 0;
    while filled < TEXT_PROBE_BYTES {
        match file.read(&mut probe[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(_) => return false,
        }
    }
    !probe[..filled].contains(&0)
}

struct StatusEntry {
    index_status: char,
    worktree_status: char,
    path: String,
}

/// Parse `git status --porcelain -z` output. Entries are NUL-terminated;
/// rename/copy entries carry a second NUL-terminated origin path which is
/// skipped.
fn parse_porcelain(raw: &str) -> Vec<StatusEntry> {
    let mut entries = Vec::new();
    let mut fields = raw.split('\0').filter(|f| !f.is_empty()).peekable();
    while let Some(field) = fields.next() {
        if field.len() < 4 {
            continue;
        }
        let mut chars = field.chars();
        let index_status = chars.next().unwrap_or(' ');
        let worktree_status = chars.next().unwrap_or(' ');
        let path = field[3..].to_string();
        if index_status == 'R' || index_status == 'C' {
            fields.next();
        }
        entries.push(StatusEntry {
            index_status,
            worktree_status,
            path,
        });
    }
    entries
}
