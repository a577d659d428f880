//! Environment engine.
//!
//! An [`Environment`] owns a linear chain of container snapshots:
//! `build_base` produces the first one, and every command, file edit, and
//! config change advances the head. Only the head is exposed; intermediate
//! snapshot ids live in commit notes and can be reloaded through the
//! Container Runtime.
//!
//! Mutating operators run inside the environment's Applying critical
//! section: callers hold [`Environment::lock_applying`] across the operator
//! and the repository commit so that at most one transition is in flight per
//! environment, and every mutation reaches a consistent
//! `(container, worktree-commit, notes-refs)` triple before its response is
//! emitted.

pub mod config;
pub mod id;
pub mod notes;
pub mod service;
pub mod state;

pub use config::{EnvironmentConfig, ServiceConfig};
pub use state::State;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;

use crate::core::ContainerUseError;
use crate::environment::notes::Notes;
use crate::environment::service::{RunningService, ServiceRegistry};
use crate::runtime::{
    Container, ContainerRuntime, ContainerService, EndpointMapping, EndpointMappings, ExecOpts,
};

/// Deadline for a sidecar or background command to come up.
pub const SERVICE_START_TIMEOUT: Duration = Duration::from_secs(120);

/// Default shell for command execution.
pub const DEFAULT_SHELL: &str = "sh";

const TERMINAL_RC_PATH: &str = "/tmp/container-use.rc";

/// One isolated agent workspace: a container snapshot chain paired with a
/// git branch (managed by the repository layer).
pub struct Environment {
    /// Adjective-animal slug, unique within the source repository
    pub id: String,

    state: Mutex<State>,

    /// Append-only event buffer, drained into a git note on every commit
    pub notes: Notes,

    services: ServiceRegistry,
    runtime: Arc<dyn ContainerRuntime>,
    worktree_path: PathBuf,
    apply_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("id", &self.id)
            .field("worktree_path", &self.worktree_path)
            .finish()
    }
}

impl Environment {
    /// Create a brand-new environment. The container head is empty until
    /// [`build_base`](Self::build_base) runs.
    pub fn new(
        id: String,
        title: String,
        config: EnvironmentConfig,
        runtime: Arc<dyn ContainerRuntime>,
        worktree_path: PathBuf,
    ) -> Self {
        Self {
            id,
            state: Mutex::new(State::new(title, config)),
            notes: Notes::new(),
            services: ServiceRegistry::new(),
            runtime,
            worktree_path,
            apply_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Reconstruct an environment from persisted state.
    pub fn from_state(
        id: String,
        state: State,
        runtime: Arc<dyn ContainerRuntime>,
        worktree_path: PathBuf,
    ) -> Self {
        Self {
            id,
            state: Mutex::new(state),
            notes: Notes::new(),
            services: ServiceRegistry::new(),
            runtime,
            worktree_path,
            apply_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Enter the Applying critical section. At most one mutating transition
    /// runs per environment at any time; hold the guard across the operator
    /// and the repository commit.
    pub async fn lock_applying(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.apply_lock.lock().await
    }

    /// Snapshot of the persisted state.
    #[must_use]
    pub fn state(&self) -> State {
        self.state_lock().clone()
    }

    /// The environment's title.
    #[must_use]
    pub fn title(&self) -> String {
        self.state_lock().title.clone()
    }

    /// Replace the title.
    pub fn set_title(&self, title: String) {
        let mut state = self.state_lock();
        state.title = title;
        state.updated_at = chrono::Utc::now();
    }

    /// Current container snapshot id (the head of the chain).
    #[must_use]
    pub fn container_id(&self) -> String {
        self.state_lock().container.clone()
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> EnvironmentConfig {
        self.state_lock().config.clone()
    }

    /// The worktree directory this environment's branch is checked out in.
    #[must_use]
    pub fn worktree_path(&self) -> &Path {
        &self.worktree_path
    }

    /// Names and endpoints of the running sidecars.
    #[must_use]
    pub fn running_services(&self) -> Vec<(String, EndpointMappings)> {
        self.services.list()
    }

    fn state_lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn set_container(&self, snapshot_id: String) {
        let mut state = self.state_lock();
        state.container = snapshot_id;
        state.updated_at = chrono::Utc::now();
    }

    async fn load_head(&self) -> Result<Box<dyn Container>> {
        let head = self.container_id();
        if head.is_empty() {
            return Err(ContainerUseError::RuntimeFailure {
                operation: "load".to_string(),
                reason: format!("environment '{}' has no container yet", self.id),
            }
            .into());
        }
        self.runtime.load_container(&head).await
    }

    /// Build the base container from scratch:
    /// image, workdir, env, secrets, setup commands, services, source
    /// overlay, install commands. Sets the new snapshot head on success.
    pub async fn build_base(&self, source_dir: &Path) -> Result<()> {
        let config = self.config();
        config.validate()?;

        let mut ctr = self.runtime.container_from(&config.base_image).await?;
        ctr = ctr.with_workdir(&config.workdir);
        for (key, value) in &config.env {
            ctr = ctr.with_env(key, value);
        }
        for (name, uri) in &config.secrets {
            ctr = ctr.with_secret(name, uri);
        }

        // Setup commands run before the source tree is mounted so the
        // resulting layers stay cacheable across environments.
        ctr = self
            .run_command_sequence(ctr, &config.setup_commands, |command, exit_code, output| {
                ContainerUseError::SetupCommandFailed {
                    command,
                    exit_code,
                    output,
                }
            })
            .await?;

        for service_config in &config.services {
            if !self.services.contains(&service_config.name) {
                self.start_service(service_config).await?;
            }
        }
        for (name, handle) in self.services.handles() {
            ctr = ctr.with_service_binding(&name, handle);
        }

        ctr = ctr.with_directory(&config.workdir, source_dir);

        ctr = self
            .run_command_sequence(ctr, &config.install_commands, |command, exit_code, output| {
                ContainerUseError::InstallCommandFailed {
                    command,
                    exit_code,
                    output,
                }
            })
            .await?;

        let sync = ctr.sync().await?;
        self.set_container(sync.snapshot_id);
        Ok(())
    }

    async fn run_command_sequence(
        &self,
        mut ctr: Box<dyn Container>,
        commands: &[String],
        classify: impl Fn(String, i32, String) -> ContainerUseError,
    ) -> Result<Box<dyn Container>> {
        for command in commands {
            let argv =
                vec![DEFAULT_SHELL.to_string(), "-c".to_string(), command.clone()];
            let sync = ctr.with_exec(&argv, &ExecOpts::default()).sync().await?;
            self.notes.append_command(command, &sync.outcome);
            if sync.outcome.exit_code() != 0 {
                let mut output = sync.outcome.stdout().to_string();
                output.push_str(sync.outcome.stderr());
                return Err(classify(command.clone(), sync.outcome.exit_code(), output).into());
            }
            ctr = self.runtime.load_container(&sync.snapshot_id).await?;
        }
        Ok(ctr)
    }

    /// Execute a command in the environment.
    ///
    /// A non-zero exit is not an error: the new snapshot is kept, preserving
    /// side effects such as partially written files, and the exit code is
    /// embedded in the returned text and the notes.
    pub async fn run(&self, command: &str, shell: &str, use_entrypoint: bool) -> Result<String> {
        let ctr = self.load_head().await?;
        let argv = vec![shell.to_string(), "-c".to_string(), command.to_string()];
        let opts = ExecOpts {
            use_entrypoint,
        };
        let sync = ctr.with_exec(&argv, &opts).sync().await?;

        self.notes.append_command(command, &sync.outcome);
        self.set_container(sync.snapshot_id);

        let mut response = sync.outcome.stdout().to_string();
        if !sync.outcome.stderr().is_empty() {
            if !response.is_empty() && !response.ends_with('\n') {
                response.push('\n');
            }
            response.push_str(&format!("stderr: {}", sync.outcome.stderr()));
        }
        if sync.outcome.exit_code() != 0 {
            if !response.is_empty() && !response.ends_with('\n') {
                response.push('\n');
            }
            response.push_str(&format!("exit code: {}", sync.outcome.exit_code()));
        }
        Ok(response)
    }

    /// Start a command as a long-running service and tunnel its ports to the
    /// host. Returns the endpoint mappings.
    pub async fn run_background(
        &self,
        command: &str,
        shell: &str,
        use_entrypoint: bool,
        ports: &[u16],
    ) -> Result<EndpointMappings> {
        let ctr = self.load_head().await?;
        let argv = vec![shell.to_string(), "-c".to_string(), command.to_string()];
        let handle = ctr.as_service(Some(argv), use_entrypoint).await?;

        match timeout(SERVICE_START_TIMEOUT, handle.start()).await {
            Ok(started) => started?,
            Err(_) => {
                self.notes.append_service_timeout(command);
                return Err(ContainerUseError::ServiceStartTimeout {
                    name: command.to_string(),
                    timeout_secs: SERVICE_START_TIMEOUT.as_secs(),
                }
                .into());
            }
        }

        let (endpoints, tunnel) = self.expose_ports(Arc::clone(&handle), ports, command).await?;
        self.services.register(RunningService {
            name: command.to_string(),
            handle,
            endpoints: endpoints.clone(),
            tunnel,
        });
        self.notes.append_background_command(command);
        self.state_lock().updated_at = chrono::Utc::now();
        Ok(endpoints)
    }

    /// Replace or create a file. Always produces a new snapshot.
    pub async fn file_write(&self, path: &str, contents: &str) -> Result<()> {
        let ctr = self.load_head().await?;
        let target = self.resolve_path(path);
        let sync = ctr.with_new_file(&target, contents).sync().await?;
        self.set_container(sync.snapshot_id);
        self.notes.append_write(path);
        Ok(())
    }

    /// Remove a file. Always produces a new snapshot.
    pub async fn file_delete(&self, path: &str) -> Result<()> {
        let ctr = self.load_head().await?;
        let target = self.resolve_path(path);
        let sync = ctr.without_file(&target).sync().await?;
        self.set_container(sync.snapshot_id);
        self.notes.append_delete(path);
        Ok(())
    }

    /// Read a file, optionally restricted to a 1-indexed inclusive line
    /// range. Pure: does not advance the snapshot chain.
    pub async fn file_read(
        &self,
        path: &str,
        entire: bool,
        start_line: Option<usize>,
        end_line: Option<usize>,
    ) -> Result<String> {
        let ctr = self.load_head().await?;
        let contents = ctr.file_contents(&self.resolve_path(path)).await?;
        if entire {
            return Ok(contents);
        }

        let lines: Vec<&str> = contents.lines().collect();
        // Clamp to valid bounds; a range entirely past the end is empty.
        let start = start_line.unwrap_or(1).max(1);
        let end = end_line.unwrap_or(lines.len()).min(lines.len());
        if start > end {
            return Ok(String::new());
        }
        let mut selected = lines[start - 1..end].join("\n");
        if !selected.is_empty() {
            selected.push('\n');
        }
        Ok(selected)
    }

    /// List a directory, newline-separated. Pure.
    pub async fn file_list(&self, dir: &str) -> Result<String> {
        let ctr = self.load_head().await?;
        let entries = ctr.directory_entries(&self.resolve_path(dir)).await?;
        Ok(entries.join("\n"))
    }

    /// Start a sidecar and bind it into the environment's network.
    ///
    /// Atomic from the caller's perspective: the service is started, the
    /// config gains the entry, the container is rebound, and the note is
    /// appended only when everything succeeded.
    pub async fn add_service(&self, service_config: ServiceConfig) -> Result<EndpointMappings> {
        config::validate_service(&service_config)?;
        if self.services.contains(&service_config.name)
            || self.config().services.iter().any(|s| s.name == service_config.name)
        {
            return Err(ContainerUseError::ServiceExists {
                name: service_config.name,
            }
            .into());
        }

        let (handle, endpoints) = self.start_service(&service_config).await?;

        let ctr = self.load_head().await?;
        let sync = ctr.with_service_binding(&service_config.name, handle).sync().await?;
        self.set_container(sync.snapshot_id);

        {
            let mut state = self.state_lock();
            state.config.services.push(service_config.clone());
        }
        self.notes.append_add_service(&service_config.name);
        Ok(endpoints)
    }

    /// Replace the configuration and rebuild the base container from the
    /// worktree. All prior run state in the snapshot chain is discarded.
    pub async fn update_config(&self, new_config: EnvironmentConfig) -> Result<()> {
        new_config.validate()?;
        {
            let mut state = self.state_lock();
            state.config = new_config;
        }
        let worktree = self.worktree_path.clone();
        self.build_base(&worktree).await
    }

    /// Publish the current snapshot to an external registry; returns the
    /// pushed reference.
    pub async fn checkpoint(&self, destination: &str) -> Result<String> {
        let ctr = self.load_head().await?;
        ctr.publish(destination).await
    }

    /// Attach an interactive terminal to the current snapshot. Prefers bash
    /// with a prepared rcfile; falls back to `sh` with `ENV` pointing at the
    /// same rcfile.
    pub async fn terminal(&self) -> Result<()> {
        let rc = format!("PS1='{} $ '\n", self.id);
        let probe_argv = vec![
            DEFAULT_SHELL.to_string(),
            "-c".to_string(),
            "command -v bash".to_string(),
        ];
        let probe =
            self.load_head().await?.with_exec(&probe_argv, &ExecOpts::default()).sync().await?;
        let has_bash = probe.outcome.exit_code() == 0;

        let ctr = self.load_head().await?.with_new_file(TERMINAL_RC_PATH, &rc);
        if has_bash {
            let argv = vec![
                "bash".to_string(),
                "--rcfile".to_string(),
                TERMINAL_RC_PATH.to_string(),
                "-i".to_string(),
            ];
            ctr.terminal(&argv).await
        } else {
            let argv = vec!["sh".to_string(), "-i".to_string()];
            ctr.with_env("ENV", TERMINAL_RC_PATH).terminal(&argv).await
        }
    }

    /// Export the container workdir into the environment's worktree,
    /// replacing its contents. Called by the repository layer before every
    /// commit.
    pub async fn export_workdir(&self) -> Result<()> {
        let config = self.config();
        let ctr = self.load_head().await?;
        ctr.export_directory(&config.workdir, &self.worktree_path, true).await.map_err(|e| {
            anyhow::Error::new(ContainerUseError::WorktreeExportFailed {
                id: self.id.clone(),
                reason: format!("{e:#}"),
            })
        })
    }

    async fn start_service(
        &self,
        service_config: &ServiceConfig,
    ) -> Result<(Arc<dyn ContainerService>, EndpointMappings)> {
        let mut ctr = self.runtime.container_from(&service_config.image).await?;
        for (key, value) in &service_config.env {
            ctr = ctr.with_env(key, value);
        }
        for (name, uri) in &service_config.secrets {
            ctr = ctr.with_secret(name, uri);
        }

        let argv = service_config.command.as_ref().map(|command| {
            vec![DEFAULT_SHELL.to_string(), "-c".to_string(), command.clone()]
        });
        let handle = ctr.as_service(argv, false).await?;

        match timeout(SERVICE_START_TIMEOUT, handle.start()).await {
            Ok(started) => started?,
            Err(_) => {
                let described = service_config
                    .command
                    .clone()
                    .unwrap_or_else(|| service_config.image.clone());
                self.notes.append_service_timeout(&described);
                return Err(ContainerUseError::ServiceStartTimeout {
                    name: service_config.name.clone(),
                    timeout_secs: SERVICE_START_TIMEOUT.as_secs(),
                }
                .into());
            }
        }

        let (endpoints, tunnel) = self
            .expose_ports(Arc::clone(&handle), &service_config.ports, &service_config.name)
            .await?;
        self.services.register(RunningService {
            name: service_config.name.clone(),
            handle: Arc::clone(&handle),
            endpoints: endpoints.clone(),
            tunnel,
        });
        Ok((handle, endpoints))
    }

    async fn expose_ports(
        &self,
        handle: Arc<dyn ContainerService>,
        ports: &[u16],
        name: &str,
    ) -> Result<(EndpointMappings, Option<Box<dyn crate::runtime::Tunnel>>)> {
        let mut endpoints = EndpointMappings::new();
        if ports.is_empty() {
            return Ok((endpoints, None));
        }

        let tunnel = self
            .runtime
            .tunnel(Arc::clone(&handle), ports)
            .await
            .with_context(|| format!("failed to tunnel ports for '{name}'"))?;
        for &port in ports {
            let internal = handle.endpoint(port).await?;
            let external = tunnel.endpoint(port).ok_or_else(|| {
                ContainerUseError::RuntimeFailure {
                    operation: "tunnel".to_string(),
                    reason: format!("no tunnel endpoint for port {port}"),
                }
            })?;
            endpoints.insert(
                port,
                EndpointMapping {
                    internal,
                    external,
                },
            );
        }
        Ok((endpoints, Some(tunnel)))
    }

    fn resolve_path(&self, path: &str) -> String {
        if path.starts_with('/') {
            return path.to_string();
        }
        let workdir = self.config().workdir;
        let rel = path.strip_prefix("./").unwrap_or(path);
        if rel.is_empty() || rel == "." {
            workdir
        } else {
            format!("{}/{}", workdir.trim_end_matches('/'), rel)
        }
    }
}
