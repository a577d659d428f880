//! Environment worktree lifecycle.
//!
//! Every environment branch is checked out in a detached worktree under
//! `worktrees/<env-id>` whose git store is the bare container-use remote.
//! The worktree's filesystem mirrors the container workdir: container state
//! is exported into it before every commit.

use anyhow::Result;
use std::path::PathBuf;

use crate::core::ContainerUseError;
use crate::git::GitCommand;
use crate::repository::{REMOTE_NAME, Repository, filter};
use crate::utils::fs::{copy_file_with_parents, ensure_dir};

/// Bring branch `<id>` into `worktrees/<id>`, seeding a fresh branch from
/// the source repository's current branch when it does not exist yet.
///
/// Any uncommitted changes in the source working tree (tracked and
/// untracked) are copied into the worktree and committed as
/// `"Copy uncommitted changes"`, so the environment starts from what the
/// user actually has on disk.
pub(crate) async fn initialize(repo: &Repository, id: &str) -> Result<PathBuf> {
    let source = repo.user_repo_path();
    let bare = repo.remote_path();
    let worktree_path = repo.worktrees_dir().join(id);

    GitCommand::new(["fetch", REMOTE_NAME]).current_dir(source).execute().await?;

    let current_branch =
        GitCommand::new(["branch", "--show-current"]).current_dir(source).execute_stdout().await?;
    if current_branch.is_empty() {
        return Err(ContainerUseError::ConfigError {
            message: "source repository is on a detached HEAD; check out a branch first"
                .to_string(),
        }
        .into());
    }

    // Known race: two concurrent creations from diverging human commits can
    // interleave these pushes. Git ref updates stay atomic; the loser's base
    // simply moves. Accepted.
    GitCommand::new(["push", "--force", REMOTE_NAME])
        .arg(current_branch.as_str())
        .current_dir(source)
        .execute()
        .await?;

    ensure_dir(repo.worktrees_dir())?;
    GitCommand::new(["worktree", "prune"]).current_dir(bare).execute().await.ok();

    if repo.branch_exists(id).await? {
        GitCommand::new(["worktree", "add"])
            .arg(worktree_path.display().to_string())
            .arg(id)
            .current_dir(bare)
            .execute_success()
            .await?;
    } else {
        GitCommand::new(["worktree", "add", "-b", id])
            .arg(worktree_path.display().to_string())
            .arg(current_branch)
            .current_dir(bare)
            .execute_success()
            .await?;
    }

    copy_uncommitted_changes(repo, &worktree_path).await?;

    GitCommand::new(["fetch", REMOTE_NAME]).current_dir(source).execute().await?;
    ensure_tracking_branch(repo, id).await?;

    Ok(worktree_path)
}

/// Make sure an existing environment's worktree is present on disk,
/// recreating it from the branch when the directory (or its `.git` link)
/// has gone missing.
pub(crate) async fn ensure(repo: &Repository, id: &str) -> Result<PathBuf> {
    let worktree_path = repo.worktrees_dir().join(id);
    if worktree_path.join(".git").exists() {
        return Ok(worktree_path);
    }

    if worktree_path.exists() {
        std::fs::remove_dir_all(&worktree_path).ok();
    }
    ensure_dir(repo.worktrees_dir())?;
    GitCommand::new(["worktree", "prune"]).current_dir(repo.remote_path()).execute().await.ok();
    GitCommand::new(["worktree", "add"])
        .arg(worktree_path.display().to_string())
        .arg(id)
        .current_dir(repo.remote_path())
        .execute_success()
        .await?;
    Ok(worktree_path)
}

async fn copy_uncommitted_changes(repo: &Repository, worktree_path: &PathBuf) -> Result<()> {
    let source = repo.user_repo_path();

    let tracked_diff = GitCommand::new(["diff", "HEAD"]).current_dir(source).execute().await?;
    if !tracked_diff.stdout.trim().is_empty() {
        GitCommand::new(["apply"])
            .current_dir(worktree_path)
            .stdin(tracked_diff.stdout.clone())
            .execute_success()
            .await?;
    }

    let untracked = GitCommand::new(["ls-files", "--others", "--exclude-standard"])
        .current_dir(source)
        .execute()
        .await?;
    let untracked_files: Vec<&str> =
        untracked.stdout.lines().filter(|l| !l.is_empty()).collect();
    for rel in &untracked_files {
        copy_file_with_parents(&source.join(rel), &worktree_path.join(rel))?;
    }

    if tracked_diff.stdout.trim().is_empty() && untracked_files.is_empty() {
        return Ok(());
    }

    filter::stage_changes(worktree_path).await?;
    if filter::has_staged_changes(worktree_path).await? {
        GitCommand::new(["commit", "-m", "Copy uncommitted changes"])
            .current_dir(worktree_path)
            .execute_success()
            .await?;
    }
    Ok(())
}

async fn ensure_tracking_branch(repo: &Repository, id: &str) -> Result<()> {
    let source = repo.user_repo_path();
    let local_exists = GitCommand::new(["rev-parse", "--verify"])
        .arg(format!("refs/heads/{id}"))
        .current_dir(source)
        .execute()
        .await
        .is_ok();
    if local_exists {
        return Ok(());
    }
    GitCommand::new(["branch", "--track", id])
        .arg(format!("{REMOTE_NAME}/{id}"))
        .current_dir(source)
        .execute_success()
        .await
}
