//! Repository layer.
//!
//! Binds one source git repository into a private bare "container-use
//! remote" plus per-environment worktrees, and mediates every git
//! touch-point of the system:
//!
//! - `repos/<basename>/` under the config base dir is a bare clone of the
//!   source repo; every environment is a branch `refs/heads/<env-id>` in it.
//! - `worktrees/<env-id>/` is a checkout of that branch whose filesystem
//!   mirrors the environment's container workdir.
//! - The source repo keeps a remote named `container-use` pointing at the
//!   bare path, a local tracking branch per environment, and fetched copies
//!   of the two note refs.
//!
//! The repository owns the map of loaded environments; nothing else is
//! reachable across requests. It holds no long-lived locks: inter-process
//! coordination on the bare remote is delegated to git itself.

pub mod filter;
pub mod notes;
mod worktree;

use anyhow::{Context, Result};
use dashmap::DashMap;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::ContainerUseError;
use crate::environment::config::EnvironmentConfig;
use crate::environment::id::{generate_id, is_valid_id};
use crate::environment::{Environment, State};
use crate::git::GitCommand;
use crate::runtime::ContainerRuntime;
use crate::utils::fs::ensure_dir;
use crate::utils::platform::get_home_dir;

/// Name of the remote added to the source repository.
pub const REMOTE_NAME: &str = "container-use";

/// Environment variable overriding the config base directory.
pub const CONFIG_DIR_ENV: &str = "CONTAINER_USE_CONFIG_DIR";

/// Metadata of one environment, readable without touching the container
/// runtime.
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentInfo {
    /// Environment id (branch name in the bare remote)
    pub id: String,
    /// Persisted state decoded from the state note
    #[serde(flatten)]
    pub state: State,
}

/// Handle on one source repository and its environments.
pub struct Repository {
    user_repo_path: PathBuf,
    remote_path: PathBuf,
    worktrees_dir: PathBuf,
    environments: DashMap<String, Arc<Environment>>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("user_repo_path", &self.user_repo_path)
            .field("remote_path", &self.remote_path)
            .field("worktrees_dir", &self.worktrees_dir)
            .finish()
    }
}

impl Repository {
    /// Open the repository containing `source`.
    ///
    /// Fails with *not-a-git-repo* when `source` is not inside a git working
    /// tree. On first use, clones the source into the bare container-use
    /// remote and wires the `container-use` remote into the source repo.
    pub async fn open(source: impl AsRef<Path>) -> Result<Self> {
        let base_dir = config_base_dir()?;
        Self::open_with_base(source, &base_dir).await
    }

    /// Like [`open`](Self::open) with an explicit base directory instead of
    /// the `CONTAINER_USE_CONFIG_DIR`/`~/.config/container-use` default.
    pub async fn open_with_base(source: impl AsRef<Path>, base_dir: &Path) -> Result<Self> {
        let source = source.as_ref();
        let toplevel = match GitCommand::new(["rev-parse", "--show-toplevel"])
            .current_dir(source)
            .execute_stdout()
            .await
        {
            Ok(path) => PathBuf::from(path),
            Err(_) => {
                return Err(ContainerUseError::NotAGitRepository {
                    path: source.display().to_string(),
                }
                .into());
            }
        };
        let basename = toplevel
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| ContainerUseError::NotAGitRepository {
                path: source.display().to_string(),
            })?;

        let repo = Self {
            user_repo_path: toplevel,
            remote_path: base_dir.join("repos").join(basename),
            worktrees_dir: base_dir.join("worktrees"),
            environments: DashMap::new(),
        };
        repo.bootstrap_remote().await?;
        Ok(repo)
    }

    /// Path of the source working tree this repository was opened for.
    #[must_use]
    pub fn user_repo_path(&self) -> &Path {
        &self.user_repo_path
    }

    /// Path of the bare container-use remote.
    #[must_use]
    pub fn remote_path(&self) -> &Path {
        &self.remote_path
    }

    /// Directory holding the per-environment worktrees.
    #[must_use]
    pub fn worktrees_dir(&self) -> &Path {
        &self.worktrees_dir
    }

    async fn bootstrap_remote(&self) -> Result<()> {
        if !self.remote_path.exists() {
            ensure_dir(
                self.remote_path.parent().context("remote path has no parent")?,
            )?;
            GitCommand::new(["clone", "--bare"])
                .arg(self.user_repo_path.display().to_string())
                .arg(self.remote_path.display().to_string())
                .current_dir(&self.user_repo_path)
                .execute_success()
                .await?;
            self.seed_commit_identity().await;
        }

        let bare_url = self.remote_path.display().to_string();
        match GitCommand::new(["remote", "get-url", REMOTE_NAME])
            .current_dir(&self.user_repo_path)
            .execute_stdout()
            .await
        {
            Ok(url) if url == bare_url => {}
            Ok(_) => {
                GitCommand::new(["remote", "set-url", REMOTE_NAME])
                    .arg(bare_url)
                    .current_dir(&self.user_repo_path)
                    .execute_success()
                    .await?;
            }
            Err(_) => {
                GitCommand::new(["remote", "add", REMOTE_NAME])
                    .arg(bare_url)
                    .current_dir(&self.user_repo_path)
                    .execute_success()
                    .await?;
            }
        }
        Ok(())
    }

    /// Commits in environment worktrees use the bare repo's identity; copy
    /// the user's when resolvable, fall back to a fixed one otherwise.
    async fn seed_commit_identity(&self) {
        for (key, fallback) in
            [("user.name", "container-use"), ("user.email", "mcp@container-use.local")]
        {
            let value = GitCommand::new(["config", "--get", key])
                .current_dir(&self.user_repo_path)
                .execute_stdout()
                .await
                .unwrap_or_default();
            let value = if value.is_empty() {
                fallback.to_string()
            } else {
                value
            };
            GitCommand::new(["config", key])
                .arg(value)
                .current_dir(&self.remote_path)
                .execute()
                .await
                .ok();
        }
    }

    pub(crate) async fn branch_exists(&self, id: &str) -> Result<bool> {
        Ok(GitCommand::new(["rev-parse", "--verify"])
            .arg(format!("refs/heads/{id}"))
            .current_dir(&self.remote_path)
            .execute()
            .await
            .is_ok())
    }

    async fn branches(&self) -> Result<Vec<String>> {
        let output =
            GitCommand::new(["for-each-ref", "--format=%(refname:short)", "refs/heads"])
                .current_dir(&self.remote_path)
                .execute()
                .await?;
        Ok(output.stdout.lines().filter(|l| !l.is_empty()).map(String::from).collect())
    }

    /// Create a new environment: fresh id, branch seeded from the source
    /// repo's current branch (including any uncommitted changes), base
    /// container built, first commit and notes written.
    pub async fn create(
        &self,
        title: &str,
        explanation: &str,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Result<Arc<Environment>> {
        let id = loop {
            let candidate = generate_id();
            if !self.branch_exists(&candidate).await?
                && !self.worktrees_dir.join(&candidate).exists()
            {
                break candidate;
            }
        };
        tracing::info!(target: "env", "creating environment {id}");

        let worktree_path = worktree::initialize(self, &id).await?;
        let config = EnvironmentConfig::load_defaults(&self.user_repo_path)?;
        let env = Arc::new(Environment::new(
            id.clone(),
            title.to_string(),
            config,
            runtime,
            worktree_path,
        ));

        let _applying = env.lock_applying().await;
        env.build_base(env.worktree_path()).await?;
        self.commit_update(&env, explanation, true).await?;
        drop(_applying);

        self.environments.insert(id, Arc::clone(&env));
        Ok(env)
    }

    /// Load an environment, reconstructing its state from the state note and
    /// recreating the worktree when needed.
    pub async fn get(&self, id: &str, runtime: Arc<dyn ContainerRuntime>) -> Result<Arc<Environment>> {
        if !is_valid_id(id) {
            return Err(ContainerUseError::EnvironmentNotFound {
                id: id.to_string(),
            }
            .into());
        }
        if let Some(env) = self.environments.get(id) {
            return Ok(Arc::clone(&env));
        }

        let info = self.info(id).await?;
        let worktree_path = worktree::ensure(self, id).await?;
        let env = Arc::new(Environment::from_state(
            id.to_string(),
            info.state,
            runtime,
            worktree_path,
        ));
        self.environments.insert(id.to_string(), Arc::clone(&env));
        Ok(env)
    }

    /// Metadata of an environment, without touching the container runtime.
    pub async fn info(&self, id: &str) -> Result<EnvironmentInfo> {
        if !is_valid_id(id) || !self.branch_exists(id).await? {
            return Err(ContainerUseError::EnvironmentNotFound {
                id: id.to_string(),
            }
            .into());
        }
        let raw = notes::read_state_note(&self.remote_path, id).await?.ok_or_else(|| {
            ContainerUseError::StateDecodeError {
                id: id.to_string(),
                reason: "state note missing".to_string(),
            }
        })?;
        Ok(EnvironmentInfo {
            id: id.to_string(),
            state: State::decode(id, &raw)?,
        })
    }

    /// Every environment branch under the remote, sorted by `updated_at`
    /// descending. Branches without a readable state note are skipped.
    pub async fn list(&self) -> Result<Vec<EnvironmentInfo>> {
        let mut infos = Vec::new();
        for id in self.branches().await? {
            match self.info(&id).await {
                Ok(info) => infos.push(info),
                Err(e) => {
                    tracing::warn!(target: "env", "skipping branch {id}: {e:#}");
                }
            }
        }
        infos.sort_by(|a, b| b.state.updated_at.cmp(&a.state.updated_at));
        Ok(infos)
    }

    /// Environments whose branch tip descends from the given commit. Used to
    /// auto-select the environment matching the source repo's HEAD.
    pub async fn list_descendant_environments(&self, commit: &str) -> Result<Vec<EnvironmentInfo>> {
        let mut descendants = Vec::new();
        for id in self.branches().await? {
            let is_ancestor = GitCommand::new(["merge-base", "--is-ancestor", commit])
                .arg(format!("refs/heads/{id}"))
                .current_dir(&self.remote_path)
                .execute()
                .await;
            match is_ancestor {
                Ok(_) => {
                    if let Ok(info) = self.info(&id).await {
                        descendants.push(info);
                    }
                }
                Err(e) => {
                    // Exit 1 means "not an ancestor"; anything else is a
                    // genuine failure (unknown commit, corrupt repo).
                    match e.downcast_ref::<ContainerUseError>() {
                        Some(ContainerUseError::GitCommandError {
                            exit_code: 1, ..
                        }) => {}
                        _ => return Err(e),
                    }
                }
            }
        }
        Ok(descendants)
    }

    /// Commit the environment's new container state: export the workdir into
    /// the worktree, stage what passes the commit filter, commit, write the
    /// state and log notes, and fetch everything back into the source repo.
    ///
    /// Callers must hold the environment's Applying lock.
    pub async fn update(&self, env: &Environment, explanation: &str) -> Result<()> {
        self.commit_update(env, explanation, false).await
    }

    async fn commit_update(&self, env: &Environment, explanation: &str, allow_empty: bool) -> Result<()> {
        env.export_workdir().await?;

        let worktree = env.worktree_path();
        filter::stage_changes(worktree).await?;

        let message = if explanation.trim().is_empty() {
            format!("Update environment {}", env.id)
        } else {
            explanation.to_string()
        };
        if filter::has_staged_changes(worktree).await? {
            GitCommand::new(["commit", "-m"])
                .arg(message.as_str())
                .current_dir(worktree)
                .with_context(env.id.clone())
                .execute_success()
                .await?;
        } else if allow_empty {
            // A fresh environment needs its own tip commit so its notes never
            // collide with a sibling branch pointing at the same commit.
            GitCommand::new(["commit", "--allow-empty", "-m"])
                .arg(message.as_str())
                .current_dir(worktree)
                .with_context(env.id.clone())
                .execute_success()
                .await?;
        }

        let state_json = env.state().encode()?;
        notes::write_state_note(worktree, &state_json).await?;
        if let Some(log) = env.notes.drain() {
            notes::append_log_note(worktree, &log).await?;
        }

        GitCommand::new(["fetch", REMOTE_NAME])
            .current_dir(&self.user_repo_path)
            .execute()
            .await?;
        notes::fetch_notes_into_source(&self.user_repo_path, REMOTE_NAME).await?;
        Ok(())
    }

    /// Delete an environment: worktree directory, bare branch, local
    /// tracking branch, stale remote refs. Best-effort; deleting something
    /// that is already gone is not an error.
    pub async fn delete(&self, id: &str) -> Result<()> {
        if !is_valid_id(id) {
            return Err(ContainerUseError::EnvironmentNotFound {
                id: id.to_string(),
            }
            .into());
        }
        self.environments.remove(id);

        let worktree_path = self.worktrees_dir.join(id);
        if worktree_path.exists() {
            std::fs::remove_dir_all(&worktree_path).ok();
        }
        GitCommand::new(["worktree", "prune"]).current_dir(&self.remote_path).execute().await.ok();
        GitCommand::new(["branch", "-D", id]).current_dir(&self.remote_path).execute().await.ok();
        GitCommand::new(["branch", "-D", id]).current_dir(&self.user_repo_path).execute().await.ok();
        GitCommand::new(["remote", "prune", REMOTE_NAME])
            .current_dir(&self.user_repo_path)
            .execute()
            .await
            .ok();
        Ok(())
    }

    /// Check the environment's branch out in the source repository, tracking
    /// `container-use/<id>`. Returns the realized branch name.
    pub async fn checkout(&self, id: &str, local_branch: Option<&str>) -> Result<String> {
        if !self.branch_exists(id).await? {
            return Err(ContainerUseError::EnvironmentNotFound {
                id: id.to_string(),
            }
            .into());
        }
        GitCommand::new(["fetch", REMOTE_NAME]).current_dir(&self.user_repo_path).execute().await?;

        if let Some(name) = local_branch {
            GitCommand::new(["checkout", "-b", name])
                .arg(format!("{REMOTE_NAME}/{id}"))
                .current_dir(&self.user_repo_path)
                .execute_success()
                .await?;
            return Ok(name.to_string());
        }

        let local_exists = GitCommand::new(["rev-parse", "--verify"])
            .arg(format!("refs/heads/{id}"))
            .current_dir(&self.user_repo_path)
            .execute()
            .await
            .is_ok();
        if !local_exists {
            GitCommand::new(["branch", "--track", id])
                .arg(format!("{REMOTE_NAME}/{id}"))
                .current_dir(&self.user_repo_path)
                .execute_success()
                .await?;
        }
        GitCommand::new(["checkout", id])
            .current_dir(&self.user_repo_path)
            .execute_success()
            .await?;
        // Catch the tracking branch up when it is plainly behind; a diverged
        // branch is the user's to sort out.
        GitCommand::new(["merge", "--ff-only"])
            .arg(format!("{REMOTE_NAME}/{id}"))
            .current_dir(&self.user_repo_path)
            .execute()
            .await
            .ok();
        Ok(id.to_string())
    }

    /// Merge the environment's branch into the source repo's current branch
    /// with a merge commit, stashing and restoring any local changes.
    /// Conflicts leave the merge in progress.
    pub async fn merge(&self, id: &str, out: &mut (dyn Write + Send)) -> Result<()> {
        self.integrate(id, out, IntegrateMode::Merge).await
    }

    /// Like merge, but `--squash`: the working tree receives the combined
    /// changes staged but uncommitted, and no merge commit is made.
    pub async fn apply(&self, id: &str, out: &mut (dyn Write + Send)) -> Result<()> {
        self.integrate(id, out, IntegrateMode::Squash).await
    }

    async fn integrate(
        &self,
        id: &str,
        out: &mut (dyn Write + Send),
        mode: IntegrateMode,
    ) -> Result<()> {
        if !self.branch_exists(id).await? {
            return Err(ContainerUseError::EnvironmentNotFound {
                id: id.to_string(),
            }
            .into());
        }
        GitCommand::new(["fetch", REMOTE_NAME]).current_dir(&self.user_repo_path).execute().await?;

        let (dirty, _) = self.is_dirty().await?;
        if dirty {
            GitCommand::new(["stash", "push", "--include-untracked", "-m", "container-use"])
                .current_dir(&self.user_repo_path)
                .execute_success()
                .await?;
        }

        let remote_ref = format!("{REMOTE_NAME}/{id}");
        let merge_message = format!("Merge environment {id}");
        let result = match mode {
            IntegrateMode::Merge => {
                GitCommand::new(["merge", "--no-ff", "-m"])
                    .arg(merge_message.as_str())
                    .arg(remote_ref.as_str())
                    .current_dir(&self.user_repo_path)
                    .execute()
                    .await
            }
            IntegrateMode::Squash => {
                GitCommand::new(["merge", "--squash"])
                    .arg(remote_ref.as_str())
                    .current_dir(&self.user_repo_path)
                    .execute()
                    .await
            }
        };

        match result {
            Ok(output) => {
                writeln!(out, "{}", output.combined().trim_end())?;
                if dirty {
                    GitCommand::new(["stash", "pop"])
                        .current_dir(&self.user_repo_path)
                        .execute()
                        .await
                        .ok();
                }
                Ok(())
            }
            Err(e) => {
                let conflicted = e.downcast_ref::<ContainerUseError>().is_some_and(|c| {
                    c.git_output_contains("CONFLICT") || c.git_output_contains("conflict")
                });
                if conflicted {
                    let output = match e.downcast_ref::<ContainerUseError>() {
                        Some(ContainerUseError::GitCommandError {
                            output, ..
                        }) => output.clone(),
                        _ => e.to_string(),
                    };
                    // The merge stays in progress; the stash (if any) stays
                    // put so resolution happens on the merge result alone.
                    Err(ContainerUseError::MergeConflict {
                        id: id.to_string(),
                        output,
                    }
                    .into())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Stream `git log --notes=container-use` of the environment branch.
    pub async fn log(&self, id: &str, with_patch: bool, out: &mut (dyn Write + Send)) -> Result<()> {
        if !self.branch_exists(id).await? {
            return Err(ContainerUseError::EnvironmentNotFound {
                id: id.to_string(),
            }
            .into());
        }
        let mut cmd =
            GitCommand::new(["log"]).arg(format!("--notes={}", notes::LOG_NOTES_REF));
        if with_patch {
            cmd = cmd.arg("-p");
        }
        let output = cmd.arg(id).arg("--").current_dir(&self.remote_path).execute().await?;
        write!(out, "{}", output.stdout)?;
        Ok(())
    }

    /// Stream the diff between the merge-base of the source HEAD and the
    /// environment tip, and the environment tip.
    pub async fn diff(&self, id: &str, out: &mut (dyn Write + Send)) -> Result<()> {
        if !self.branch_exists(id).await? {
            return Err(ContainerUseError::EnvironmentNotFound {
                id: id.to_string(),
            }
            .into());
        }
        GitCommand::new(["fetch", REMOTE_NAME]).current_dir(&self.user_repo_path).execute().await?;
        let remote_ref = format!("{REMOTE_NAME}/{id}");
        let base = GitCommand::new(["merge-base", "HEAD"])
            .arg(remote_ref.as_str())
            .current_dir(&self.user_repo_path)
            .execute_stdout()
            .await?;
        let output = GitCommand::new(["diff"])
            .arg(base)
            .arg(remote_ref.as_str())
            .current_dir(&self.user_repo_path)
            .execute()
            .await?;
        write!(out, "{}", output.stdout)?;
        Ok(())
    }

    /// Whether the source working tree has uncommitted changes, plus the
    /// porcelain status output.
    pub async fn is_dirty(&self) -> Result<(bool, String)> {
        let output = GitCommand::new(["status", "--porcelain"])
            .current_dir(&self.user_repo_path)
            .execute()
            .await?;
        let dirty = !output.stdout.trim().is_empty();
        Ok((dirty, output.stdout))
    }
}

enum IntegrateMode {
    Merge,
    Squash,
}

fn config_base_dir() -> Result<PathBuf> {
    if let Ok(custom) = std::env::var(CONFIG_DIR_ENV)
        && !custom.is_empty()
    {
        return Ok(PathBuf::from(custom));
    }
    Ok(get_home_dir()?.join(".config").join("container-use"))
}
