// SPDX-License-Identifier: MIT

//! Daemon lifecycle (C5): process-wide lock/pid/version files, WAL+snapshot
//! recovery on start, and the graceful-drain shutdown protocol.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fs2::FileExt;
use spindle_adapters::{DefaultOrganizer, DesktopNotifierAdapter, NoopStageHandler, OrganizerStageHandler, StageHandler};
use spindle_cache::{RipCacheManager, StagingManager};
use spindle_core::{Clock, Settings, SystemClock};
use spindle_engine::WorkflowManager;
use spindle_storage::QueueStore;
use thiserror::Error;
use tracing::{info, warn};

use crate::env;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine state directory")]
    NoStateDir,
    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Storage(#[from] spindle_storage::StorageError),
    #[error(transparent)]
    Config(#[from] spindle_core::ConfigError),
}

/// Process-wide paths for one daemon instance, all rooted at `state_dir`
/// per §6's persisted on-disk layout.
#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    pub socket_path: PathBuf,
    pub lock_path: PathBuf,
    pub pid_path: PathBuf,
    pub log_path: PathBuf,
    pub queue_db_path: PathBuf,
    pub staging_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub library_dir: PathBuf,
    pub review_dir: PathBuf,
    pub settings_path: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self, LifecycleError> {
        let state_dir = env::state_dir()?;
        Ok(Self {
            socket_path: state_dir.join("spindle.sock"),
            lock_path: state_dir.join("spindle.lock"),
            pid_path: state_dir.join("spindle.pid"),
            log_path: state_dir.join("spindle.log"),
            queue_db_path: state_dir.join("queue.db"),
            staging_dir: state_dir.join("staging"),
            cache_dir: state_dir.join("cache"),
            library_dir: state_dir.join("library"),
            review_dir: state_dir.join("review"),
            settings_path: state_dir.join("spindle.toml"),
            state_dir,
        })
    }
}

/// Binds every real stage handler, replacing the no-op placeholders as
/// each stage's external collaborator is implemented. `review_dir` is the
/// daemon-wide fallback; an item's own `review_dir_override` still wins
/// per [`DefaultOrganizer::target_for`].
fn default_handlers(config: &Config, settings: &Settings) -> HashMap<&'static str, Arc<dyn StageHandler>> {
    let review_dir = settings.review_dir.as_ref().map(PathBuf::from).unwrap_or_else(|| config.review_dir.clone());
    let organizer = DefaultOrganizer::new(config.library_dir.clone(), review_dir);
    let notifier = Arc::new(DesktopNotifierAdapter::new());

    let mut map: HashMap<&'static str, Arc<dyn StageHandler>> = HashMap::new();
    map.insert("identifier", Arc::new(NoopStageHandler::identifier()));
    map.insert("ripper", Arc::new(NoopStageHandler::ripper()));
    map.insert("encoder", Arc::new(NoopStageHandler::encoder()));
    map.insert("subtitler", Arc::new(NoopStageHandler::subtitler()));
    map.insert("organizer", Arc::new(OrganizerStageHandler::new(organizer, notifier)));
    map
}

/// Live daemon state: the durable store, the workflow manager driving both
/// lanes, and the file handles whose lifetime pins the lock/pid files.
pub struct DaemonState {
    pub config: Config,
    #[allow(dead_code)]
    lock_file: File,
    pub store: Arc<QueueStore<SystemClock>>,
    pub staging: Arc<StagingManager>,
    pub rip_cache: Arc<RipCacheManager>,
    pub settings: Arc<Settings>,
    pub workflow: Arc<WorkflowManager<SystemClock>>,
    pub start_time: Instant,
    pub log_hub: Arc<spindle_wire::LogEventHub>,
}

/// Acquire the daemon's exclusive lock, replay the WAL, and bring up the
/// workflow manager. Mirrors the teacher's lock-before-truncate ordering:
/// the lock file is opened without truncation, `try_lock_exclusive`d, and
/// only truncated and stamped with our PID once the lock is held -- so a
/// second instance racing us never wipes a running daemon's PID file.
pub async fn startup(config: Config) -> Result<DaemonState, LifecycleError> {
    match startup_inner(&config).await {
        Ok(state) => Ok(state),
        Err(e) => {
            if !matches!(e, LifecycleError::LockFailed(_)) {
                cleanup_on_failure(&config);
            }
            Err(e)
        }
    }
}

async fn startup_inner(config: &Config) -> Result<DaemonState, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;

    let lock_file =
        std::fs::OpenOptions::new().write(true).create(true).truncate(false).open(&config.lock_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;

    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    std::fs::write(&config.pid_path, std::process::id().to_string())?;

    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }

    let settings = Arc::new(Settings::load(&config.settings_path)?);
    let store = Arc::new(QueueStore::open(&config.queue_db_path, SystemClock)?);
    let staging = Arc::new(StagingManager::new(&config.staging_dir));
    let rip_cache = Arc::new(RipCacheManager::new(&config.cache_dir, settings.cache_max_gib));
    let workflow = Arc::new(WorkflowManager::new(
        store.clone(),
        staging.clone(),
        rip_cache.clone(),
        settings.clone(),
        default_handlers(config, &settings),
        SystemClock,
    ));

    let reset = workflow.recover_on_start()?;
    if !reset.is_empty() {
        info!(count = reset.len(), "reset stuck items on recovery");
    }

    match rip_cache.enforce_lru_bound() {
        Ok(evicted) if !evicted.is_empty() => info!(count = evicted.len(), "evicted over-budget rip cache entries on startup"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "rip cache LRU enforcement failed on startup"),
    }

    let log_hub = spindle_wire::LogEventHub::new(4096);

    info!(state_dir = %config.state_dir.display(), "daemon started");

    Ok(DaemonState {
        config: config.clone(),
        lock_file,
        store,
        staging,
        rip_cache,
        settings,
        workflow,
        start_time: Instant::now(),
        log_hub,
    })
}

impl DaemonState {
    /// Shutdown protocol (§4.5): cancel the workflow context, let the lane
    /// loops drain, checkpoint the store, then remove the socket/pid/lock
    /// trio so a readiness probe sees a clean exit rather than a stale
    /// `kill(pid, 0)`-reachable lock.
    pub async fn shutdown(&self) {
        info!("daemon shutting down");
        self.workflow.shutdown();
        tokio::time::sleep(Duration::from_millis(50).min(env::drain_timeout())).await;

        if let Err(e) = self.store.checkpoint_now() {
            warn!(error = %e, "final checkpoint failed on shutdown");
        }

        if self.config.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.socket_path) {
                warn!(error = %e, "failed to remove socket file");
            }
        }
        if self.config.pid_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.pid_path) {
                warn!(error = %e, "failed to remove pid file");
            }
        }
        if self.config.lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.lock_path) {
                warn!(error = %e, "failed to remove lock file");
            }
        }
        info!("daemon shutdown complete");
    }
}

fn cleanup_on_failure(config: &Config) {
    if config.socket_path.exists() {
        let _ = std::fs::remove_file(&config.socket_path);
    }
    if config.pid_path.exists() {
        let _ = std::fs::remove_file(&config.pid_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &std::path::Path) -> Config {
        Config {
            socket_path: dir.join("spindle.sock"),
            lock_path: dir.join("spindle.lock"),
            pid_path: dir.join("spindle.pid"),
            log_path: dir.join("spindle.log"),
            queue_db_path: dir.join("queue.db"),
            staging_dir: dir.join("staging"),
            cache_dir: dir.join("cache"),
            library_dir: dir.join("library"),
            review_dir: dir.join("review"),
            settings_path: dir.join("spindle.toml"),
            state_dir: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn startup_acquires_lock_and_recovers_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let state = startup(config).await.unwrap();
        assert!(state.config.lock_path.exists());
        assert_eq!(state.store.list().len(), 0);
        state.shutdown().await;
        assert!(!state.config.lock_path.exists());
    }

    #[tokio::test]
    async fn second_startup_against_the_same_lock_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let first = startup(config.clone()).await.unwrap();

        let err = startup(config).await.unwrap_err();
        assert!(matches!(err, LifecycleError::LockFailed(_)));

        first.shutdown().await;
    }
}
