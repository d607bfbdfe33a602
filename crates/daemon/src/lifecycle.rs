// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup and shutdown of `wpd`
//!
//! One daemon serves one project. Its files live under
//! `$XDG_STATE_HOME/waypoint/projects/<key>/` where `<key>` is derived from
//! the canonical project path; the socket lives under a short directory of
//! its own.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use fs2::FileExt;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use wp_adapters::{ChannelJobQueue, JobMessage, JobQueue, TracedJobQueue};
use wp_core::workflows::approval::{self, ApprovalEvent, ApprovalState};
use wp_core::{DefinitionError, SystemClock, UuidIdGen};
use wp_engine::{
    Broadcaster, EnqueueJob, EventIntake, Orchestrator, OrchestratorDeps, ServiceError,
    StepRegistry, WorkflowService,
};
use wp_storage::{StoreError, WalStore};

use crate::config::{ConfigError, Settings};
use crate::server::ServerContext;
use crate::worker;

/// Service with the daemon's concrete store, workflow and clock
pub type DaemonService =
    WorkflowService<WalStore, ApprovalState, ApprovalEvent, SystemClock, UuidIdGen>;

/// Jobs buffered between the send-to-queue step and the worker
const JOB_QUEUE_CAPACITY: usize = 1024;

/// Where one project's daemon keeps its files
#[derive(Debug, Clone)]
pub struct Config {
    /// Canonical project directory, holding `waypoint.toml`
    pub project_root: PathBuf,
    pub socket_path: PathBuf,
    /// Holds the running daemon's pid under an exclusive lock
    pub lock_path: PathBuf,
    /// Version of the binary that owns the socket
    pub version_path: PathBuf,
    pub log_path: PathBuf,
    /// Instance and step journal
    pub wal_path: PathBuf,
    pub settings: Settings,
}

impl Config {
    pub fn for_project(project_root: &Path) -> Result<Self, LifecycleError> {
        let project_root = project_root
            .canonicalize()
            .map_err(|e| LifecycleError::ProjectNotFound(project_root.to_path_buf(), e))?;
        let key = project_key(&project_root);
        let files = state_root()?.join("projects").join(&key);
        let settings = Settings::load(&project_root)?;

        Ok(Self {
            socket_path: socket_root().join(format!("{key}.sock")),
            lock_path: files.join("daemon.pid"),
            version_path: files.join("daemon.version"),
            log_path: files.join("daemon.log"),
            wal_path: files.join("wal").join("instances.wal"),
            project_root,
            settings,
        })
    }

    /// Files owned by a running daemon, removed when it stops
    fn runtime_files(&self) -> [&Path; 3] {
        [&self.socket_path, &self.lock_path, &self.version_path]
    }
}

/// A started daemon
pub struct DaemonState {
    pub config: Config,
    // Dropping the file releases the lock
    #[allow(dead_code)]
    lock_file: File,
    pub listener: UnixListener,
    /// Shared with every connection task
    pub context: Arc<ServerContext>,
    worker: JoinHandle<()>,
}

impl DaemonState {
    /// Stop the worker and remove the runtime files
    ///
    /// Runs in flight stop where they are; their snapshots let the next
    /// daemon resume them.
    pub async fn shutdown(&mut self) -> Result<(), LifecycleError> {
        info!("stopping daemon");
        self.worker.abort();
        remove_runtime_files(&self.config);
        info!("daemon stopped cleanly");
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("no project at {0}: {1}")]
    ProjectNotFound(PathBuf, std::io::Error),

    #[error("neither XDG_STATE_HOME nor HOME is set")]
    NoStateDir,

    #[error("another daemon holds the lock for this project")]
    LockFailed(#[source] std::io::Error),

    #[error("cannot bind {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("service: {0}")]
    Service(#[from] ServiceError),

    #[error("workflow definition: {0}")]
    Definition(#[from] DefinitionError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Step handlers of the approval workflow
pub fn approval_steps<Q: JobQueue>(queue: Q) -> StepRegistry {
    StepRegistry::new().register(approval::SEND_TO_QUEUE, EnqueueJob::new(queue))
}

/// Build the workflow service over the WAL at `wal_path`
///
/// Returns the receiving end of the job queue, to be drained by the worker.
pub fn build_service(
    settings: &Settings,
    wal_path: &Path,
) -> Result<(Arc<DaemonService>, mpsc::Receiver<JobMessage>), LifecycleError> {
    let store = Arc::new(WalStore::open(
        wal_path,
        settings.store_config(),
        SystemClock,
    )?);
    let intake = Arc::new(EventIntake::new());
    let broadcaster = Arc::new(Broadcaster::default());
    let (queue, jobs) = ChannelJobQueue::new(JOB_QUEUE_CAPACITY);

    let orchestrator = Orchestrator::new(
        approval::machine()?,
        OrchestratorDeps {
            store: Arc::clone(&store),
            intake: Arc::clone(&intake),
            broadcaster: Arc::clone(&broadcaster),
            steps: approval_steps(TracedJobQueue::new(queue)),
        },
        SystemClock,
    )
    .with_run_config(settings.run_config())
    .with_step_options(settings.step.clone());

    let service = WorkflowService::new(
        orchestrator,
        store,
        intake,
        broadcaster,
        UuidIdGen,
        SystemClock,
    );
    Ok((Arc::new(service), jobs))
}

/// Lock the project, replay the WAL, resume unfinished runs, then bind
///
/// On failure every file this call created is removed again, except when
/// the lock is taken: those files belong to the daemon holding it.
pub async fn startup(config: &Config) -> Result<DaemonState, LifecycleError> {
    let result = start(config).await;
    if let Err(e) = &result {
        if !matches!(e, LifecycleError::LockFailed(_)) {
            remove_runtime_files(config);
        }
    }
    result
}

async fn start(config: &Config) -> Result<DaemonState, LifecycleError> {
    for dir in [&config.lock_path, &config.socket_path, &config.wal_path]
        .into_iter()
        .filter_map(|path| path.parent())
    {
        std::fs::create_dir_all(dir)?;
    }

    // Lock before touching the WAL; truncating only once the lock is ours
    let mut lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    std::fs::write(&config.version_path, env!("CARGO_PKG_VERSION"))?;

    let (service, jobs) = build_service(&config.settings, &config.wal_path)?;
    info!(instances = service.list()?.len(), "state replayed");

    let worker = tokio::spawn(worker::run(
        jobs,
        Arc::clone(&service),
        config.settings.worker.delay,
    ));
    let resumed = service.resume_unfinished()?;
    if !resumed.is_empty() {
        info!(count = resumed.len(), "resumed unfinished instances");
    }

    // A socket left by a crashed daemon would make bind fail
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)
        .map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    info!(project = %config.project_root.display(), "daemon started");
    Ok(DaemonState {
        config: config.clone(),
        lock_file,
        listener,
        context: Arc::new(ServerContext {
            service,
            start_time: Instant::now(),
            shutdown: Arc::new(Notify::new()),
        }),
        worker,
    })
}

fn remove_runtime_files(config: &Config) {
    for path in config.runtime_files() {
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "could not remove file"),
        }
    }
}

/// `$XDG_STATE_HOME/waypoint`, falling back to `~/.local/state/waypoint`
fn state_root() -> Result<PathBuf, LifecycleError> {
    match std::env::var_os("XDG_STATE_HOME") {
        Some(dir) => Ok(PathBuf::from(dir).join("waypoint")),
        None => std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".local/state/waypoint"))
            .ok_or(LifecycleError::NoStateDir),
    }
}

/// Socket directory; short so socket paths fit in `sun_path`
///
/// `WP_SOCKET_DIR` overrides the default `/tmp/waypoint`.
fn socket_root() -> PathBuf {
    std::env::var_os("WP_SOCKET_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp/waypoint"))
}

/// 16 hex characters of the SHA-256 of the project path
fn project_key(path: &Path) -> String {
    Sha256::digest(path.as_os_str().as_encoded_bytes())
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
