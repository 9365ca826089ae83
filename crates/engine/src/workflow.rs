// SPDX-License-Identifier: MIT

//! Workflow manager (C4): two independent lane dispatch loops, pause/
//! resume, startup recovery, and the operator-facing retry/stop commands.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use spindle_adapters::{HealthStatus, StageContext, StageHandler};
use spindle_cache::{RipCacheManager, StagingManager};
use spindle_core::{Clock, Fingerprint, ItemId, ItemStatus, Lane, QueueItem, RipSpecEnvelope, Settings};
use spindle_storage::{QueueStats, QueueStore};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::executor::StageExecutor;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum RetryEpisodeOutcome {
    Retried,
    NotFound,
    NotFailed,
    EpisodeNotFound,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RetryEpisodeResult {
    pub outcome: RetryEpisodeOutcome,
    pub new_status: Option<ItemStatus>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StatusSummary {
    pub running: bool,
    pub disc_paused: bool,
    pub queue_stats: QueueStats,
    pub last_error: Option<String>,
    pub last_item: Option<ItemId>,
    pub stage_health: HashMap<String, HealthStatus>,
}

/// Schedules queue items through [`StageHandler`]s across the two §4.4
/// lanes. One dispatch loop per lane; each loop claims at most one item
/// at a time and hands it to a [`StageExecutor`].
pub struct WorkflowManager<C: Clock> {
    store: Arc<QueueStore<C>>,
    executor: Arc<StageExecutor<C>>,
    staging: Arc<StagingManager>,
    rip_cache: Arc<RipCacheManager>,
    settings: Arc<Settings>,
    handlers: HashMap<&'static str, Arc<dyn StageHandler>>,
    clock: C,
    foreground_paused: AtomicBool,
    wake: Notify,
    root_cancel: CancellationToken,
    last_error: Mutex<Option<String>>,
    last_item: Mutex<Option<ItemId>>,
}

impl<C: Clock + 'static> WorkflowManager<C> {
    pub fn new(
        store: Arc<QueueStore<C>>,
        staging: Arc<StagingManager>,
        rip_cache: Arc<RipCacheManager>,
        settings: Arc<Settings>,
        handlers: HashMap<&'static str, Arc<dyn StageHandler>>,
        clock: C,
    ) -> Self {
        let executor =
            Arc::new(StageExecutor::new(store.clone(), staging.clone(), settings.clone(), handlers.clone(), clock.clone()));
        Self {
            store,
            executor,
            staging,
            rip_cache,
            settings,
            handlers,
            clock,
            foreground_paused: AtomicBool::new(false),
            wake: Notify::new(),
            root_cancel: CancellationToken::new(),
            last_error: Mutex::new(None),
            last_item: Mutex::new(None),
        }
    }

    /// §4.2 resume-from-cache: insert a new item for `fingerprint`, then if
    /// the rip cache already holds a valid metadata envelope for it, skip
    /// straight past identification and ripping instead of leaving the item
    /// at `pending`. A cache entry whose envelope itself demands review
    /// lands the item on `failed`+`needs_review` rather than faking success.
    #[instrument(skip(self, title, source_path))]
    pub fn insert_disc(
        &self,
        title: impl Into<String>,
        source_path: Option<String>,
        fingerprint: Fingerprint,
        allow_duplicate: bool,
        priority: i32,
    ) -> Result<QueueItem, spindle_storage::StorageError> {
        let item = self.store.new_disc(title, source_path, fingerprint.clone(), allow_duplicate, priority)?;

        let cache_dir = self.rip_cache.path(fingerprint.as_str());
        let cached = match self.rip_cache.load_metadata(&cache_dir) {
            Ok((Some(meta), true)) => Some(meta),
            _ => None,
        };

        let Some(meta) = cached else {
            self.wake.notify_waiters();
            return Ok(item);
        };

        self.store.persist_rip_spec(item.id, meta.rip_spec_data.clone())?;
        let mut patch = serde_json::Map::new();
        patch.insert("metadata_json".to_string(), serde_json::json!(meta.metadata_json));
        if meta.needs_review {
            patch.insert("needs_review".to_string(), serde_json::json!(true));
            patch.insert("review_reason".to_string(), serde_json::json!(meta.review_reason));
        }
        self.store.update_fields(item.id, patch)?;

        if meta.needs_review {
            let reason = meta.review_reason.clone().unwrap_or_else(|| "cached rip flagged for review".to_string());
            self.store.update_status(item.id, ItemStatus::Failed, Some(reason))?;
        } else {
            self.store.update_status(item.id, ItemStatus::Ripped, None)?;
        }

        info!(item = %item.id, fingerprint = %fingerprint.as_str(), "resumed item from rip cache");
        self.wake.notify_waiters();
        self.store.get_by_id(item.id)
    }

    /// I-5 crash recovery: revert stuck items before either lane's loop
    /// starts claiming work.
    #[instrument(skip(self))]
    pub fn recover_on_start(&self) -> Result<Vec<ItemId>, spindle_storage::StorageError> {
        let reset = self.store.reset_stuck()?;
        if !reset.is_empty() {
            self.wake.notify_waiters();
        }
        Ok(reset)
    }

    pub fn pause_disc_processing(&self) {
        self.foreground_paused.store(true, Ordering::SeqCst);
    }

    pub fn resume_disc_processing(&self) {
        self.foreground_paused.store(false, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    pub fn is_disc_paused(&self) -> bool {
        self.foreground_paused.load(Ordering::SeqCst)
    }

    pub fn notify_store_changed(&self) {
        self.wake.notify_waiters();
    }

    /// Cancel both lanes' loops and any in-flight stage call. Lane loops
    /// observe this via `tokio::select!` against `root_cancel`.
    pub fn shutdown(&self) {
        self.root_cancel.cancel();
        self.wake.notify_waiters();
    }

    /// Spawn both lane loops on the current tokio runtime. Returns their
    /// join handles so the daemon can await a clean drain on shutdown.
    pub fn spawn_lanes(self: &Arc<Self>) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
        let fg = self.clone();
        let bg = self.clone();
        (
            tokio::spawn(async move { fg.run_lane(Lane::Foreground).await }),
            tokio::spawn(async move { bg.run_lane(Lane::Background).await }),
        )
    }

    async fn run_lane(&self, lane: Lane) {
        loop {
            if self.root_cancel.is_cancelled() {
                info!(?lane, "lane loop exiting on shutdown");
                return;
            }
            if lane == Lane::Foreground && self.is_disc_paused() {
                tokio::select! {
                    _ = self.wake.notified() => continue,
                    _ = self.root_cancel.cancelled() => return,
                }
            }

            match self.claim_next(lane) {
                Some(item) => {
                    *self.last_item.lock() = Some(item.id);
                    let cancel = self.root_cancel.child_token();
                    match self.executor.execute(item.id, cancel).await {
                        Ok(_) => {}
                        Err(err) => {
                            warn!(?lane, item = %item.id, error = %err, "stage execution failed");
                            *self.last_error.lock() = Some(err.to_string());
                        }
                    }
                    self.wake.notify_waiters();
                }
                None => {
                    tokio::select! {
                        _ = self.wake.notified() => {}
                        _ = tokio::time::sleep(std::time::Duration::from_secs(2)) => {}
                        _ = self.root_cancel.cancelled() => return,
                    }
                }
            }
        }
    }

    /// Claim the oldest eligible item for `lane` (§5 ordering: `created_at`
    /// asc, ties by `id` asc), transitioning it into its stage's
    /// processing status before returning it.
    fn claim_next(&self, lane: Lane) -> Option<QueueItem> {
        let mut candidates: Vec<QueueItem> = self
            .store
            .list()
            .into_iter()
            .filter(|it| it.lane() == Some(lane) && it.status.enter_processing().is_some())
            .collect();
        candidates.sort_by_key(|it| (it.created_at, it.id));
        let item = candidates.into_iter().next()?;
        let next = item.status.enter_processing()?;
        self.store.update_status(item.id, next, None).ok()?;
        self.store.get_by_id(item.id).ok()
    }

    /// §4.4 single-episode retry: locate the highest completed asset kind
    /// for `episode_key`, clear any failed assets at later kinds, and
    /// resume the item at the appropriate point.
    pub fn retry_episode(&self, id: ItemId, episode_key: &str) -> Result<RetryEpisodeResult, spindle_storage::StorageError> {
        let item = match self.store.get_by_id(id) {
            Ok(item) => item,
            Err(_) => return Ok(RetryEpisodeResult { outcome: RetryEpisodeOutcome::NotFound, new_status: None }),
        };
        if item.status != ItemStatus::Failed {
            return Ok(RetryEpisodeResult { outcome: RetryEpisodeOutcome::NotFailed, new_status: None });
        }
        let Some(raw) = item.rip_spec_data.as_ref() else {
            return Ok(RetryEpisodeResult { outcome: RetryEpisodeOutcome::EpisodeNotFound, new_status: None });
        };
        let Ok(mut envelope) = serde_json::from_slice::<RipSpecEnvelope>(raw) else {
            return Ok(RetryEpisodeResult { outcome: RetryEpisodeOutcome::EpisodeNotFound, new_status: None });
        };
        if envelope.episode(episode_key).is_none() {
            return Ok(RetryEpisodeResult { outcome: RetryEpisodeOutcome::EpisodeNotFound, new_status: None });
        }

        use spindle_core::AssetKind;
        let key_lower = episode_key.to_ascii_lowercase();
        let has_failed = |env: &RipSpecEnvelope, kind: AssetKind| {
            env.assets_of(kind).iter().any(|a| {
                a.episode_key.to_ascii_lowercase() == key_lower && a.status == spindle_core::AssetStatus::Failed
            })
        };
        let clear_failed = |env: &mut RipSpecEnvelope, kind: AssetKind| {
            env.assets_of_mut(kind).retain(|a| !(a.episode_key.to_ascii_lowercase() == key_lower && a.status == spindle_core::AssetStatus::Failed));
        };

        let new_status = if has_failed(&envelope, AssetKind::Subtitled) || has_failed(&envelope, AssetKind::Final) {
            clear_failed(&mut envelope, AssetKind::Subtitled);
            clear_failed(&mut envelope, AssetKind::Final);
            ItemStatus::Encoded
        } else if has_failed(&envelope, AssetKind::Encoded) {
            clear_failed(&mut envelope, AssetKind::Encoded);
            if envelope.episodes.is_empty() { ItemStatus::Ripped } else { ItemStatus::EpisodeIdentified }
        } else {
            ItemStatus::Ripped
        };

        let encoded_envelope = serde_json::to_vec(&envelope).unwrap_or_else(|_| raw.clone());
        self.store.persist_rip_spec(id, encoded_envelope)?;

        let mut patch = serde_json::Map::new();
        patch.insert("needs_review".to_string(), serde_json::json!(false));
        patch.insert("active_episode_key".to_string(), serde_json::json!(episode_key));
        self.store.update_fields(id, patch)?;
        self.store.update_status(id, new_status, None)?;

        Ok(RetryEpisodeResult { outcome: RetryEpisodeOutcome::Retried, new_status: Some(new_status) })
    }

    #[instrument(skip(self))]
    pub async fn status_summary(&self) -> StatusSummary {
        let ctx = StageContext::new(self.settings.clone(), self.staging.item_dir(&spindle_core::Fingerprint::new("health")), self.root_cancel.child_token());
        let mut stage_health = HashMap::new();
        for (key, handler) in &self.handlers {
            stage_health.insert((*key).to_string(), handler.health_check(&ctx).await);
        }
        StatusSummary {
            running: !self.root_cancel.is_cancelled(),
            disc_paused: self.is_disc_paused(),
            queue_stats: self.store.stats(),
            last_error: self.last_error.lock().clone(),
            last_item: *self.last_item.lock(),
            stage_health,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spindle_adapters::NoopStageHandler;
    use spindle_core::{FakeClock, Fingerprint};

    fn handlers() -> HashMap<&'static str, Arc<dyn StageHandler>> {
        let mut map: HashMap<&'static str, Arc<dyn StageHandler>> = HashMap::new();
        map.insert("identifier", Arc::new(NoopStageHandler::identifier()));
        map.insert("ripper", Arc::new(NoopStageHandler::ripper()));
        map.insert("encoder", Arc::new(NoopStageHandler::encoder()));
        map.insert("subtitler", Arc::new(NoopStageHandler::subtitler()));
        map.insert("organizer", Arc::new(NoopStageHandler::organizer()));
        map
    }

    fn manager() -> (Arc<WorkflowManager<FakeClock>>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(QueueStore::open(dir.path().join("store"), FakeClock::new()).unwrap());
        let staging = Arc::new(StagingManager::new(dir.path().join("staging")));
        let rip_cache = Arc::new(RipCacheManager::new(dir.path().join("cache"), 10.0));
        let settings = Arc::new(Settings::default());
        let mgr = Arc::new(WorkflowManager::new(store, staging, rip_cache, settings, handlers(), FakeClock::new()));
        (mgr, dir)
    }

    #[test]
    fn claim_next_advances_pending_item_into_identifying() {
        let (mgr, _dir) = manager();
        let item = mgr.store.new_disc("Disc A", None, Fingerprint::new("abc"), false, 0).unwrap();
        let claimed = mgr.claim_next(Lane::Foreground).unwrap();
        assert_eq!(claimed.id, item.id);
        assert_eq!(claimed.status, ItemStatus::Identifying);
    }

    #[test]
    fn pause_blocks_only_foreground() {
        let (mgr, _dir) = manager();
        assert!(!mgr.is_disc_paused());
        mgr.pause_disc_processing();
        assert!(mgr.is_disc_paused());
        mgr.resume_disc_processing();
        assert!(!mgr.is_disc_paused());
    }

    #[test]
    fn retry_episode_s4_clears_failed_encoded_asset() {
        let (mgr, _dir) = manager();
        let item = mgr.store.new_disc("Show", None, Fingerprint::new("fp1"), false, 0).unwrap();

        let mut envelope = RipSpecEnvelope::new();
        envelope.episodes.push(spindle_core::Episode {
            key: "s01e01".into(),
            season: 1,
            episode: 1,
            title_id: "0".into(),
            episode_title: "Pilot".into(),
            runtime_seconds: 1200,
            output_basename: "Show - s01e01".into(),
        });
        let mut asset = spindle_core::Asset::new("s01e01", "0", "/cache/fp1/encoded/s01e01.mkv");
        asset.mark_failed("ffmpeg crashed");
        envelope.assets_of_mut(spindle_core::AssetKind::Encoded).push(asset);

        mgr.store.persist_rip_spec(item.id, serde_json::to_vec(&envelope).unwrap()).unwrap();
        mgr.store.update_status(item.id, ItemStatus::Failed, Some("encode failed".into())).unwrap();
        let mut review_patch = serde_json::Map::new();
        review_patch.insert("needs_review".to_string(), serde_json::json!(true));
        mgr.store.update_fields(item.id, review_patch).unwrap();

        let result = mgr.retry_episode(item.id, "S01E01").unwrap();
        assert_eq!(result.outcome, RetryEpisodeOutcome::Retried);
        assert_eq!(result.new_status, Some(ItemStatus::EpisodeIdentified));

        let reloaded = mgr.store.get_by_id(item.id).unwrap();
        assert_eq!(reloaded.status, ItemStatus::EpisodeIdentified);
        assert!(!reloaded.needs_review);
        let reloaded_envelope: RipSpecEnvelope =
            serde_json::from_slice(reloaded.rip_spec_data.as_ref().unwrap()).unwrap();
        assert!(reloaded_envelope.assets_of(spindle_core::AssetKind::Encoded).is_empty());
    }

    #[test]
    fn retry_episode_not_failed_item_is_rejected() {
        let (mgr, _dir) = manager();
        let item = mgr.store.new_disc("Disc A", None, Fingerprint::new("abc"), false, 0).unwrap();
        let result = mgr.retry_episode(item.id, "s01e01").unwrap();
        assert_eq!(result.outcome, RetryEpisodeOutcome::NotFailed);
    }

    #[test]
    fn insert_disc_with_no_cache_entry_lands_on_pending() {
        let (mgr, _dir) = manager();
        let item = mgr.insert_disc("Disc A", None, Fingerprint::new("fp1"), false, 0).unwrap();
        assert_eq!(item.status, ItemStatus::Pending);
    }

    #[test]
    fn insert_disc_resumes_from_a_valid_cache_entry() {
        let (mgr, _dir) = manager();
        let meta = spindle_cache::CacheMetadata {
            disc_title: "Disc A".into(),
            disc_fingerprint: "FP1".into(),
            rip_spec_data: serde_json::to_vec(&RipSpecEnvelope::new()).unwrap(),
            metadata_json: Some("{\"title\":\"Disc A\"}".into()),
            needs_review: false,
            review_reason: None,
            cached_at: chrono::Utc::now(),
        };
        mgr.rip_cache.save_metadata("FP1", &meta).unwrap();

        let item = mgr.insert_disc("Disc A", None, Fingerprint::new("fp1"), false, 0).unwrap();
        assert_eq!(item.status, ItemStatus::Ripped);
        assert!(item.rip_spec_data.is_some());
        assert_eq!(item.metadata_json.as_deref(), Some("{\"title\":\"Disc A\"}"));
    }

    #[test]
    fn insert_disc_routes_a_review_flagged_cache_entry_to_failed() {
        let (mgr, _dir) = manager();
        let meta = spindle_cache::CacheMetadata {
            disc_title: "Disc A".into(),
            disc_fingerprint: "FP1".into(),
            rip_spec_data: serde_json::to_vec(&RipSpecEnvelope::new()).unwrap(),
            metadata_json: None,
            needs_review: true,
            review_reason: Some("low confidence".into()),
            cached_at: chrono::Utc::now(),
        };
        mgr.rip_cache.save_metadata("FP1", &meta).unwrap();

        let item = mgr.insert_disc("Disc A", None, Fingerprint::new("fp1"), false, 0).unwrap();
        assert_eq!(item.status, ItemStatus::Failed);
        assert!(item.needs_review);
        assert_eq!(item.review_reason.as_deref(), Some("low confidence"));
    }
}
