//! Hermetic in-memory container runtime.
//!
//! Models containers as value snapshots: a filesystem map, environment,
//! workdir, and service bindings. Commands run through the small shell
//! interpreter in [`super::shell`]; snapshot ids are sha256 digests over the
//! full snapshot state plus a generation counter, so every applied
//! operation yields a fresh id while identical ids still imply identical
//! state. No containers, daemons, or network involved; tests drive the
//! whole orchestration core against it with real git underneath.

use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};

use crate::core::{ContainerUseError, Result};
use crate::runtime::{
    Container, ContainerRuntime, ContainerService, ExecOpts, ExecOutcome, SyncResult, Tunnel,
};
use crate::test_utils::shell::{ShellContext, run_script};

/// In-memory [`ContainerRuntime`] implementation.
pub struct InMemoryRuntime {
    core: Arc<Core>,
}

struct Core {
    snapshots: DashMap<String, SnapshotState>,
    next_port: AtomicU16,
    next_service: AtomicU64,
}

#[derive(Clone)]
struct SnapshotState {
    image: String,
    workdir: String,
    env: BTreeMap<String, String>,
    bindings: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    generation: u64,
}

impl SnapshotState {
    fn from_image(image: &str) -> Self {
        let mut dirs = BTreeSet::new();
        dirs.insert("/".to_string());
        dirs.insert("/tmp".to_string());
        Self {
            image: image.to_string(),
            workdir: "/".to_string(),
            env: BTreeMap::new(),
            bindings: BTreeSet::new(),
            files: BTreeMap::new(),
            dirs,
            generation: 0,
        }
    }

    fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.image.as_bytes());
        hasher.update([0]);
        hasher.update(self.workdir.as_bytes());
        for (key, value) in &self.env {
            hasher.update([0]);
            hasher.update(key.as_bytes());
            hasher.update([b'=']);
            hasher.update(value.as_bytes());
        }
        for binding in &self.bindings {
            hasher.update([0]);
            hasher.update(binding.as_bytes());
        }
        for dir in &self.dirs {
            hasher.update([0]);
            hasher.update(dir.as_bytes());
        }
        for (path, contents) in &self.files {
            hasher.update([0]);
            hasher.update(path.as_bytes());
            hasher.update((contents.len() as u64).to_le_bytes());
            hasher.update(contents);
        }
        hasher.update(self.generation.to_le_bytes());
        format!("sha256:{}", hex::encode(hasher.finalize()))
    }

    fn has_bash(&self) -> bool {
        !self.image.contains("alpine") && !self.image.contains("busybox")
    }
}

#[derive(Clone)]
enum PendingOp {
    SetWorkdir(String),
    SetEnv(String, String),
    SetSecret(String, String),
    Exec(Vec<String>),
    NewFile(String, Vec<u8>),
    RemoveFile(String),
    Overlay(String, BTreeMap<String, Vec<u8>>, BTreeSet<String>),
    Binding(String),
}

impl InMemoryRuntime {
    /// Create an empty runtime.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            core: Arc::new(Core {
                snapshots: DashMap::new(),
                next_port: AtomicU16::new(32768),
                next_service: AtomicU64::new(1),
            }),
        })
    }

    /// Number of stored snapshots. Handy for asserting that reads do not
    /// advance the chain.
    #[must_use]
    pub fn snapshot_count(&self) -> usize {
        self.core.snapshots.len()
    }
}

#[async_trait]
impl ContainerRuntime for InMemoryRuntime {
    async fn container_from(&self, image: &str) -> Result<Box<dyn Container>> {
        Ok(Box::new(InMemoryContainer {
            core: Arc::clone(&self.core),
            base: SnapshotState::from_image(image),
            pending: Vec::new(),
        }))
    }

    async fn load_container(&self, snapshot_id: &str) -> Result<Box<dyn Container>> {
        let base = self
            .core
            .snapshots
            .get(snapshot_id)
            .map(|s| s.clone())
            .ok_or_else(|| ContainerUseError::RuntimeFailure {
                operation: "load".to_string(),
                reason: format!("unknown snapshot id {snapshot_id}"),
            })?;
        Ok(Box::new(InMemoryContainer {
            core: Arc::clone(&self.core),
            base,
            pending: Vec::new(),
        }))
    }

    async fn tunnel(
        &self,
        service: Arc<dyn ContainerService>,
        ports: &[u16],
    ) -> Result<Box<dyn Tunnel>> {
        let mut map = BTreeMap::new();
        for &port in ports {
            // Probe the service first so dead services fail loudly.
            service.endpoint(port).await?;
            let host_port = self.core.next_port.fetch_add(1, Ordering::SeqCst);
            map.insert(port, format!("127.0.0.1:{host_port}"));
        }
        Ok(Box::new(InMemoryTunnel {
            map,
        }))
    }
}

#[derive(Clone)]
struct InMemoryContainer {
    core: Arc<Core>,
    base: SnapshotState,
    pending: Vec<PendingOp>,
}

impl InMemoryContainer {
    fn push(&self, op: PendingOp) -> Box<dyn Container> {
        let mut next = self.clone();
        next.pending.push(op);
        Box::new(next)
    }

    /// Apply the pending operations to a copy of the base state. Returns the
    /// evaluated state and the outcome of the last exec in the chain.
    fn evaluate(&self) -> Result<(SnapshotState, ExecOutcome)> {
        let mut state = self.base.clone();
        let mut outcome = ExecOutcome::Success {
            stdout: String::new(),
            stderr: String::new(),
        };
        for op in &self.pending {
            state.generation += 1;
            match op {
                PendingOp::SetWorkdir(path) => {
                    state.workdir = path.clone();
                    state.dirs.insert(path.clone());
                }
                PendingOp::SetEnv(key, value) => {
                    state.env.insert(key.clone(), value.clone());
                }
                PendingOp::SetSecret(name, uri) => {
                    let value = resolve_secret(uri)?;
                    state.env.insert(name.clone(), value);
                }
                PendingOp::Exec(argv) => {
                    let script = script_from_argv(argv);
                    let has_bash = state.has_bash();
                    let workdir = state.workdir.clone();
                    let env = state.env.clone();
                    let mut ctx = ShellContext {
                        files: &mut state.files,
                        dirs: &mut state.dirs,
                        env: &env,
                        workdir,
                        has_bash,
                    };
                    let result = run_script(&mut ctx, &script);
                    outcome = if result.exit_code == 0 {
                        ExecOutcome::Success {
                            stdout: result.stdout,
                            stderr: result.stderr,
                        }
                    } else {
                        ExecOutcome::NonZero {
                            exit_code: result.exit_code,
                            stdout: result.stdout,
                            stderr: result.stderr,
                        }
                    };
                }
                PendingOp::NewFile(path, contents) => {
                    state.files.insert(path.clone(), contents.clone());
                }
                PendingOp::RemoveFile(path) => {
                    if state.files.remove(path).is_none() {
                        return Err(ContainerUseError::RuntimeFailure {
                            operation: "file delete".to_string(),
                            reason: format!("{path}: no such file"),
                        }
                        .into());
                    }
                }
                PendingOp::Overlay(path, files, dirs) => {
                    let prefix = path.trim_end_matches('/');
                    state.dirs.insert(prefix.to_string());
                    for (rel, contents) in files {
                        state.files.insert(format!("{prefix}/{rel}"), contents.clone());
                    }
                    for rel in dirs {
                        state.dirs.insert(format!("{prefix}/{rel}"));
                    }
                }
                PendingOp::Binding(name) => {
                    state.bindings.insert(name.clone());
                }
            }
        }
        Ok((state, outcome))
    }
}

fn script_from_argv(argv: &[String]) -> String {
    // The engine always passes [shell, "-c", script]; anything else is run
    // as a plain command line.
    if argv.len() >= 3 && argv[1] == "-c" {
        argv[2].clone()
    } else {
        argv.join(" ")
    }
}

fn resolve_secret(uri: &str) -> Result<String> {
    if let Some(name) = uri.strip_prefix("env://") {
        return std::env::var(name).map_err(|_| {
            ContainerUseError::RuntimeFailure {
                operation: "secret".to_string(),
                reason: format!("host environment variable '{name}' is not set"),
            }
            .into()
        });
    }
    if let Some(path) = uri.strip_prefix("file://") {
        let expanded = shellexpand::tilde(path).into_owned();
        return std::fs::read_to_string(&expanded).map_err(|e| {
            ContainerUseError::RuntimeFailure {
                operation: "secret".to_string(),
                reason: format!("{expanded}: {e}"),
            }
            .into()
        });
    }
    Err(ContainerUseError::RuntimeFailure {
        operation: "secret".to_string(),
        reason: format!("cannot resolve '{uri}' in the in-memory runtime"),
    }
    .into())
}

#[async_trait]
impl Container for InMemoryContainer {
    fn with_workdir(&self, path: &str) -> Box<dyn Container> {
        self.push(PendingOp::SetWorkdir(path.to_string()))
    }

    fn with_env(&self, key: &str, value: &str) -> Box<dyn Container> {
        self.push(PendingOp::SetEnv(key.to_string(), value.to_string()))
    }

    fn with_secret(&self, key: &str, uri: &str) -> Box<dyn Container> {
        self.push(PendingOp::SetSecret(key.to_string(), uri.to_string()))
    }

    fn with_exec(&self, argv: &[String], _opts: &ExecOpts) -> Box<dyn Container> {
        self.push(PendingOp::Exec(argv.to_vec()))
    }

    fn with_new_file(&self, path: &str, contents: &str) -> Box<dyn Container> {
        self.push(PendingOp::NewFile(path.to_string(), contents.as_bytes().to_vec()))
    }

    fn without_file(&self, path: &str) -> Box<dyn Container> {
        self.push(PendingOp::RemoveFile(path.to_string()))
    }

    fn with_directory(&self, path: &str, host_dir: &Path) -> Box<dyn Container> {
        // Capture the host directory eagerly; the builder API is lazy but
        // the host filesystem is not a value.
        let mut files = BTreeMap::new();
        let mut dirs = BTreeSet::new();
        for entry in walkdir::WalkDir::new(host_dir).into_iter().filter_map(|e| e.ok()) {
            let Ok(rel) = entry.path().strip_prefix(host_dir) else {
                continue;
            };
            if rel.as_os_str().is_empty() {
                continue;
            }
            let rel = rel.to_string_lossy().replace('\\', "/");
            if entry.file_type().is_dir() {
                dirs.insert(rel);
            } else if entry.file_type().is_file()
                && let Ok(contents) = std::fs::read(entry.path())
            {
                files.insert(rel, contents);
            }
        }
        self.push(PendingOp::Overlay(path.to_string(), files, dirs))
    }

    fn with_service_binding(
        &self,
        name: &str,
        _service: Arc<dyn ContainerService>,
    ) -> Box<dyn Container> {
        self.push(PendingOp::Binding(name.to_string()))
    }

    async fn sync(&self) -> Result<SyncResult> {
        let (state, outcome) = self.evaluate()?;
        let snapshot_id = state.digest();
        self.core.snapshots.insert(snapshot_id.clone(), state);
        Ok(SyncResult {
            snapshot_id,
            outcome,
        })
    }

    async fn file_contents(&self, path: &str) -> Result<String> {
        let (state, _) = self.evaluate()?;
        state.files.get(path).map(|c| String::from_utf8_lossy(c).into_owned()).ok_or_else(
            || {
                ContainerUseError::RuntimeFailure {
                    operation: "file read".to_string(),
                    reason: format!("{path}: no such file"),
                }
                .into()
            },
        )
    }

    async fn directory_entries(&self, path: &str) -> Result<Vec<String>> {
        let (state, _) = self.evaluate()?;
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let mut entries = BTreeSet::new();
        for file_path in state.files.keys() {
            if let Some(rest) = file_path.strip_prefix(&prefix) {
                let first = rest.split('/').next().unwrap_or(rest);
                if !first.is_empty() {
                    entries.insert(first.to_string());
                }
            }
        }
        for dir_path in &state.dirs {
            if let Some(rest) = dir_path.strip_prefix(&prefix) {
                let first = rest.split('/').next().unwrap_or(rest);
                if !first.is_empty() {
                    entries.insert(first.to_string());
                }
            }
        }
        if entries.is_empty()
            && !state.dirs.contains(path.trim_end_matches('/'))
            && path.trim_end_matches('/') != state.workdir.trim_end_matches('/')
        {
            return Err(ContainerUseError::RuntimeFailure {
                operation: "directory list".to_string(),
                reason: format!("{path}: no such directory"),
            }
            .into());
        }
        Ok(entries.into_iter().collect())
    }

    async fn export_directory(&self, path: &str, host_path: &Path, wipe: bool) -> Result<()> {
        let (state, _) = self.evaluate()?;
        let prefix = format!("{}/", path.trim_end_matches('/'));

        if wipe && host_path.exists() {
            std::fs::remove_dir_all(host_path).map_err(|e| {
                ContainerUseError::RuntimeFailure {
                    operation: "export".to_string(),
                    reason: format!("{}: {e}", host_path.display()),
                }
            })?;
        }
        std::fs::create_dir_all(host_path)?;

        for dir_path in &state.dirs {
            if let Some(rel) = dir_path.strip_prefix(&prefix) {
                std::fs::create_dir_all(host_path.join(rel))?;
            }
        }
        for (file_path, contents) in &state.files {
            if let Some(rel) = file_path.strip_prefix(&prefix) {
                let target = host_path.join(rel);
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(target, contents)?;
            }
        }
        Ok(())
    }

    async fn as_service(
        &self,
        argv: Option<Vec<String>>,
        _use_entrypoint: bool,
    ) -> Result<Arc<dyn ContainerService>> {
        let (state, _) = self.evaluate()?;
        let id = self.core.next_service.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(InMemoryService {
            id,
            command: argv.map(|a| script_from_argv(&a)),
            image: state.image,
        }))
    }

    async fn terminal(&self, _argv: &[String]) -> Result<()> {
        Err(ContainerUseError::RuntimeFailure {
            operation: "terminal".to_string(),
            reason: "the in-memory runtime cannot attach a terminal".to_string(),
        }
        .into())
    }

    async fn publish(&self, reference: &str) -> Result<String> {
        let (state, _) = self.evaluate()?;
        let digest = state.digest();
        Ok(format!("{reference}@{digest}"))
    }
}

struct InMemoryService {
    id: u64,
    #[allow(dead_code)]
    command: Option<String>,
    #[allow(dead_code)]
    image: String,
}

#[async_trait]
impl ContainerService for InMemoryService {
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    async fn endpoint(&self, port: u16) -> Result<String> {
        Ok(format!("svc-{}:{port}", self.id))
    }
}

struct InMemoryTunnel {
    map: BTreeMap<u16, String>,
}

#[async_trait]
impl Tunnel for InMemoryTunnel {
    fn endpoint(&self, port: u16) -> Option<String> {
        self.map.get(&port).cloned()
    }

    async fn close(&self) {}
}
