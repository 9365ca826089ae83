// SPDX-License-Identifier: MIT

//! Durable queue store: the single point of truth for queue item
//! mutation, backing every write with a WAL append before updating the
//! in-memory [`MaterializedState`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use spindle_core::{Clock, Event, Fingerprint, ItemId, ItemStatus, ProgressRecord, QueueItem};
use tracing::{info, instrument, warn};

use crate::checkpoint::{load_snapshot, Checkpointer};
use crate::error::{DatabaseHealth, StorageError, QUEUE_ITEM_COLUMNS};
use crate::snapshot::Snapshot;
use crate::state::MaterializedState;
use crate::wal::Wal;

/// Snapshot a checkpoint every N WAL entries, matching the teacher's
/// size-triggered checkpoint cadence rather than a wall-clock timer.
const CHECKPOINT_EVERY_N_ENTRIES: u64 = 500;

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub needs_review: usize,
    pub completed: usize,
    pub failed: usize,
}

struct Inner {
    state: MaterializedState,
    wal: Wal,
    wal_path: PathBuf,
    snapshot_path: PathBuf,
    checkpointer: Checkpointer,
    last_snapshot_seq: u64,
    last_snapshot_at: Option<DateTime<Utc>>,
    entries_since_snapshot: u64,
}

/// The C1 durable queue store. `C` is injected so tests can drive item
/// timestamps with a [`spindle_core::FakeClock`].
pub struct QueueStore<C: Clock> {
    inner: Mutex<Inner>,
    clock: C,
}

impl<C: Clock> QueueStore<C> {
    /// Open (or create) the store rooted at `dir`, replaying `wal.log`
    /// against `snapshot.bin` if present.
    pub fn open(dir: impl AsRef<Path>, clock: C) -> Result<Self, StorageError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| StorageError::Wal(crate::wal::WalError::Io {
            path: dir.to_path_buf(),
            source: e,
        }))?;
        let snapshot_path = dir.join("snapshot.bin");
        let wal_path = dir.join("wal.log");

        let (state, next_seq) = load_snapshot(&snapshot_path, &wal_path)?;
        let wal = Wal::open(&wal_path, next_seq)?;
        let checkpointer = Checkpointer::new(snapshot_path.clone());

        info!(items = state.items.len(), next_seq, "queue store loaded");

        Ok(Self {
            inner: Mutex::new(Inner {
                state,
                wal,
                wal_path,
                snapshot_path,
                checkpointer,
                last_snapshot_seq: next_seq,
                last_snapshot_at: None,
                entries_since_snapshot: 0,
            }),
            clock,
        })
    }

    fn now_ms(&self) -> i64 {
        self.clock.epoch_ms() as i64
    }

    fn append(&self, inner: &mut Inner, event: Event) -> Result<(), StorageError> {
        let seq = inner.wal.append(&event)?;
        inner.state.apply_event(&event);
        inner.entries_since_snapshot += 1;
        if inner.entries_since_snapshot >= CHECKPOINT_EVERY_N_ENTRIES {
            if let Err(e) = inner.checkpointer.checkpoint(seq + 1, &inner.state) {
                warn!(error = %e, "checkpoint failed; wal remains authoritative");
            } else {
                inner.last_snapshot_seq = seq + 1;
                inner.last_snapshot_at = Some(Utc::now());
                inner.entries_since_snapshot = 0;
            }
        }
        Ok(())
    }

    #[instrument(skip(self, source_path))]
    pub fn new_disc(
        &self,
        disc_title: impl Into<String>,
        source_path: Option<String>,
        fingerprint: Fingerprint,
        allow_duplicate: bool,
        priority: i32,
    ) -> Result<QueueItem, StorageError> {
        let mut inner = self.inner.lock();
        if !allow_duplicate && inner.state.has_active_fingerprint(&fingerprint) {
            return Err(StorageError::DuplicateFingerprint(fingerprint.to_string()));
        }
        let id = ItemId::new(inner.state.next_id);
        let now = self.now_ms();
        let item = QueueItem {
            id,
            disc_title: disc_title.into(),
            source_path,
            disc_fingerprint: fingerprint,
            status: ItemStatus::Pending,
            progress: ProgressRecord::new("queued", "waiting for drive"),
            rip_spec_data: None,
            metadata_json: None,
            needs_review: false,
            review_reason: None,
            review_dir_override: None,
            ripped_file: None,
            encoded_file: None,
            final_file: None,
            encoding_details_json: None,
            error_message: None,
            background_log_path: None,
            created_at: now,
            updated_at: now,
            active_episode_key: None,
            allow_duplicate,
            priority,
        };
        self.append(&mut inner, Event::ItemInserted { item: Box::new(item.clone()) })?;
        Ok(item)
    }

    pub fn get_by_id(&self, id: ItemId) -> Result<QueueItem, StorageError> {
        self.inner.lock().state.get(id).cloned().ok_or(StorageError::NotFound(id))
    }

    pub fn find_by_fingerprint(&self, fp: &Fingerprint) -> Vec<QueueItem> {
        self.inner.lock().state.find_by_fingerprint(fp).into_iter().cloned().collect()
    }

    pub fn list(&self) -> Vec<QueueItem> {
        self.inner.lock().state.list().into_iter().cloned().collect()
    }

    pub fn active_fingerprints(&self) -> Vec<Fingerprint> {
        self.inner.lock().state.active_fingerprints()
    }

    pub fn update_status(
        &self,
        id: ItemId,
        status: ItemStatus,
        error_message: Option<String>,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        if inner.state.get(id).is_none() {
            return Err(StorageError::NotFound(id));
        }
        let now = self.now_ms();
        self.append(&mut inner, Event::StatusChanged { id, status, error_message, timestamp_ms: now })
    }

    pub fn update_progress(&self, id: ItemId, progress: ProgressRecord) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        if inner.state.get(id).is_none() {
            return Err(StorageError::NotFound(id));
        }
        let now = self.now_ms();
        self.append(&mut inner, Event::ProgressUpdated { id, progress, timestamp_ms: now })
    }

    pub fn persist_rip_spec(&self, id: ItemId, rip_spec_data: Vec<u8>) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        if inner.state.get(id).is_none() {
            return Err(StorageError::NotFound(id));
        }
        let now = self.now_ms();
        self.append(&mut inner, Event::RipSpecPersisted { id, rip_spec_data, timestamp_ms: now })
    }

    pub fn update_fields(
        &self,
        id: ItemId,
        patch: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        if inner.state.get(id).is_none() {
            return Err(StorageError::NotFound(id));
        }
        let now = self.now_ms();
        self.append(&mut inner, Event::FieldsUpdated { id, patch, timestamp_ms: now })
    }

    pub fn remove(&self, id: ItemId) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        if inner.state.get(id).is_none() {
            return Err(StorageError::NotFound(id));
        }
        let now = self.now_ms();
        self.append(&mut inner, Event::ItemRemoved { id, timestamp_ms: now })
    }

    pub fn clear_all(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        let now = self.now_ms();
        self.append(&mut inner, Event::ItemsCleared { status: None, timestamp_ms: now })
    }

    pub fn clear_completed(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        let now = self.now_ms();
        self.append(&mut inner, Event::ItemsCleared { status: Some(ItemStatus::Completed), timestamp_ms: now })
    }

    pub fn clear_failed(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        let now = self.now_ms();
        self.append(&mut inner, Event::ItemsCleared { status: Some(ItemStatus::Failed), timestamp_ms: now })
    }

    /// I-5 crash recovery: revert every item still in a processing status
    /// (one a stage handler was mid-execute on when the daemon died) to
    /// its durable resume point, so the dispatch loops can re-claim it.
    #[instrument(skip(self))]
    pub fn reset_stuck(&self) -> Result<Vec<ItemId>, StorageError> {
        let mut inner = self.inner.lock();
        let stuck: Vec<ItemId> =
            inner.state.items.values().filter(|it| it.status.is_processing()).map(|it| it.id).collect();
        if stuck.is_empty() {
            return Ok(stuck);
        }
        let now = self.now_ms();
        self.append(&mut inner, Event::StuckItemsReset { ids: stuck.clone(), timestamp_ms: now })?;
        info!(count = stuck.len(), "reset stuck items on recovery");
        Ok(stuck)
    }

    /// Re-arm a single terminal (`failed`) item for another attempt,
    /// transitioning it back to its resumable status.
    pub fn retry_failed(&self, id: ItemId) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        let item = inner.state.get(id).ok_or(StorageError::NotFound(id))?;
        if item.status != ItemStatus::Failed {
            return Err(StorageError::NotFound(id));
        }
        let resume = item.inferred_resume_status();
        let now = self.now_ms();
        self.append(&mut inner, Event::StatusChanged { id, status: resume, error_message: None, timestamp_ms: now })
    }

    /// Operator-requested cancellation: marks items `failed` with
    /// `review_reason="user_stop"`, regardless of current status.
    pub fn stop_items(&self, ids: &[ItemId]) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        let now = self.now_ms();
        for &id in ids {
            if inner.state.get(id).is_none() {
                continue;
            }
            self.append(
                &mut inner,
                Event::StatusChanged { id, status: ItemStatus::Failed, error_message: None, timestamp_ms: now },
            )?;
            let mut patch = serde_json::Map::new();
            patch.insert("review_reason".to_string(), serde_json::json!("user_stop"));
            self.append(&mut inner, Event::FieldsUpdated { id, patch, timestamp_ms: now })?;
        }
        Ok(())
    }

    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock();
        let mut stats = QueueStats::default();
        for item in inner.state.items.values() {
            stats.total += 1;
            if item.needs_review {
                stats.needs_review += 1;
            }
            match item.status {
                ItemStatus::Pending => stats.pending += 1,
                ItemStatus::Completed => stats.completed += 1,
                ItemStatus::Failed => stats.failed += 1,
                s if s.is_processing() => stats.processing += 1,
                _ => {}
            }
        }
        stats
    }

    /// Re-walks the WAL end to end (catching truncation/corrupt lines) and
    /// confirms the snapshot file, if any, still decodes, then diffs the
    /// fixed [`QUEUE_ITEM_COLUMNS`] list against one decoded item to report
    /// any columns an older snapshot left backfilled-missing.
    pub fn database_health(&self) -> DatabaseHealth {
        let inner = self.inner.lock();

        let wal_check = Wal::read_after(&inner.wal_path, None);
        let snapshot_check = if inner.snapshot_path.exists() {
            Snapshot::load(&inner.snapshot_path).map(|_| ())
        } else {
            Ok(())
        };

        let (columns_present, missing_columns) = match inner.state.list().first() {
            Some(item) => {
                let value = serde_json::to_value(item).unwrap_or_default();
                let present_keys: std::collections::HashSet<&str> = value
                    .as_object()
                    .map(|obj| obj.keys().map(String::as_str).collect())
                    .unwrap_or_default();
                let present = QUEUE_ITEM_COLUMNS.iter().filter(|c| present_keys.contains(*c)).map(|c| c.to_string()).collect();
                let missing = QUEUE_ITEM_COLUMNS.iter().filter(|c| !present_keys.contains(*c)).map(|c| c.to_string()).collect();
                (present, missing)
            }
            None => (QUEUE_ITEM_COLUMNS.iter().map(|c| c.to_string()).collect(), Vec::new()),
        };

        let (ok, detail) = match (&wal_check, &snapshot_check) {
            (Err(e), _) => (false, Some(format!("wal replay failed: {e}"))),
            (_, Err(e)) => (false, Some(format!("snapshot unreadable: {e}"))),
            (Ok(_), Ok(())) if !missing_columns.is_empty() => {
                (false, Some(format!("missing columns: {}", missing_columns.join(", "))))
            }
            (Ok(_), Ok(())) => (true, None),
        };

        DatabaseHealth {
            wal_entries_since_snapshot: inner.entries_since_snapshot,
            last_snapshot_seq: inner.last_snapshot_seq,
            last_snapshot_at: inner.last_snapshot_at,
            item_count: inner.state.items.len(),
            columns_present,
            missing_columns,
            ok,
            detail,
        }
    }

    /// Force an out-of-cadence snapshot, e.g. before a clean shutdown.
    pub fn checkpoint_now(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        let seq = inner.wal.next_seq();
        inner.checkpointer.checkpoint(seq, &inner.state)?;
        inner.last_snapshot_seq = seq;
        inner.last_snapshot_at = Some(Utc::now());
        inner.entries_since_snapshot = 0;
        Ok(())
    }
}

pub fn default_store_dir(state_dir: &Path) -> PathBuf {
    state_dir.join("queue")
}
