//! Git-notes plumbing for environment branches.
//!
//! Each environment branch carries two note refs in the bare remote's store
//! (which worktrees share):
//!
//! - `refs/notes/container-use` - appended human-readable run log
//! - `refs/notes/container-use-state` - serialized state JSON, overwritten
//!   on every commit
//!
//! After writing, both refs are fetched back into the source repository so
//! `git log --notes=container-use` works there too. The state ref is
//! rewritten (not appended), so that fetch is non-fast-forward by design:
//! on `[rejected]`, the local ref is deleted and the fetch retried once.

use anyhow::Result;
use std::path::Path;

use crate::core::ContainerUseError;
use crate::git::GitCommand;

/// Note ref carrying the human-readable run log.
pub const LOG_NOTES_REF: &str = "container-use";

/// Note ref carrying the serialized environment state.
pub const STATE_NOTES_REF: &str = "container-use-state";

/// Overwrite the state note on the worktree's HEAD commit.
pub async fn write_state_note(worktree: &Path, state_json: &str) -> Result<()> {
    GitCommand::new(["notes", "--ref", STATE_NOTES_REF, "add", "-f", "-m", state_json, "HEAD"])
        .current_dir(worktree)
        .execute_success()
        .await
}

/// Append a run-log entry to the note on the worktree's HEAD commit.
pub async fn append_log_note(worktree: &Path, text: &str) -> Result<()> {
    GitCommand::new(["notes", "--ref", LOG_NOTES_REF, "append", "-m", text, "HEAD"])
        .current_dir(worktree)
        .execute_success()
        .await
}

/// Read the state note attached to the tip of an environment branch in the
/// bare remote. Returns None when no note exists.
pub async fn read_state_note(bare: &Path, id: &str) -> Result<Option<String>> {
    match GitCommand::new(["notes", "--ref", STATE_NOTES_REF, "show", id])
        .current_dir(bare)
        .execute()
        .await
    {
        Ok(output) => Ok(Some(output.stdout)),
        Err(e) => {
            let classified = e.downcast_ref::<ContainerUseError>();
            if classified.is_some_and(|c| c.git_output_contains("no note found")) {
                Ok(None)
            } else {
                Err(e)
            }
        }
    }
}

/// Fetch both note refs from the container-use remote into the source
/// repository, force-updating a ref that was rewritten.
pub async fn fetch_notes_into_source(source: &Path, remote: &str) -> Result<()> {
    for notes_ref in [LOG_NOTES_REF, STATE_NOTES_REF] {
        fetch_note_ref(source, remote, notes_ref).await?;
    }
    Ok(())
}

async fn fetch_note_ref(source: &Path, remote: &str, notes_ref: &str) -> Result<()> {
    let refspec = format!("refs/notes/{notes_ref}:refs/notes/{notes_ref}");
    match GitCommand::new(["fetch", remote])
        .arg(refspec.as_str())
        .current_dir(source)
        .execute()
        .await
    {
        Ok(_) => Ok(()),
        Err(e) => {
            let rejected = e.downcast_ref::<ContainerUseError>().is_some_and(|c| {
                c.git_output_contains("[rejected]") || c.git_output_contains("non-fast-forward")
            });
            if !rejected {
                return Err(e);
            }
            // The ref was rewritten upstream (state notes are overwritten on
            // every commit); a force-update is intended.
            tracing::debug!(
                target: "git",
                "notes ref {} rejected, deleting local ref and retrying",
                notes_ref
            );
            GitCommand::new(["update-ref", "-d"])
                .arg(format!("refs/notes/{notes_ref}"))
                .current_dir(source)
                .execute_success()
                .await?;
            GitCommand::new(["fetch", remote])
                .arg(refspec)
                .current_dir(source)
                .execute_success()
                .await
        }
    }
}
