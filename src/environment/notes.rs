//! Runtime notes buffer.
//!
//! Every operation on an environment appends a human-readable entry here;
//! `Repository::update` drains the buffer into the branch's
//! `refs/notes/container-use` note after each successful mutation.
//!
//! Entry format, one entry per command:
//!
//! ```text
//! $ <command>
//! exit <code>          (only when non-zero)
//! <stdout>             (only when non-blank)
//! stderr: <stderr>     (only when non-blank)
//! ```

use std::sync::Mutex;

use crate::runtime::ExecOutcome;

/// Append-only in-memory buffer of notable events.
///
/// Appended by any in-flight operation; drained by `Repository::update`.
#[derive(Debug, Default)]
pub struct Notes {
    buffer: Mutex<Vec<String>>,
}

impl Notes {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a foreground command and its outcome.
    pub fn append_command(&self, command: &str, outcome: &ExecOutcome) {
        let mut entry = format!("$ {command}\n");
        if outcome.exit_code() != 0 {
            entry.push_str(&format!("exit {}\n", outcome.exit_code()));
        }
        if !outcome.stdout().trim().is_empty() {
            entry.push_str(outcome.stdout());
            if !entry.ends_with('\n') {
                entry.push('\n');
            }
        }
        if !outcome.stderr().trim().is_empty() {
            entry.push_str(&format!("stderr: {}", outcome.stderr()));
            if !entry.ends_with('\n') {
                entry.push('\n');
            }
        }
        self.push(entry);
    }

    /// Record a command started in the background.
    pub fn append_background_command(&self, command: &str) {
        self.push(format!("$ {command} &\n"));
    }

    /// Record a background command that never came up. The synthetic exit
    /// code mirrors a SIGKILLed process.
    pub fn append_service_timeout(&self, command: &str) {
        self.push(format!("$ {command} &\nexit 137\n"));
    }

    /// Record a file write.
    pub fn append_write(&self, path: &str) {
        self.push(format!("Write {path}\n"));
    }

    /// Record a file deletion.
    pub fn append_delete(&self, path: &str) {
        self.push(format!("Delete {path}\n"));
    }

    /// Record a sidecar addition.
    pub fn append_add_service(&self, name: &str) {
        self.push(format!("Add service {name}\n"));
    }

    /// Take the buffered entries, leaving the buffer empty. Returns None
    /// when nothing was recorded since the last drain.
    pub fn drain(&self) -> Option<String> {
        let mut buffer = self.buffer.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if buffer.is_empty() {
            None
        } else {
            Some(buffer.drain(..).collect::<Vec<_>>().join("\n"))
        }
    }

    fn push(&self, entry: String) {
        let mut buffer = self.buffer.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        buffer.push(entry);
    }
}
