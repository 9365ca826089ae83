// SPDX-License-Identifier: MIT

use spindle_core::ItemId;
use thiserror::Error;

use crate::checkpoint::LoadError;
use crate::snapshot::SnapshotError;
use crate::wal::WalError;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("queue item {0} not found")]
    NotFound(ItemId),
    #[error("fingerprint {0:?} already has an active item; pass allow_duplicate to override")]
    DuplicateFingerprint(String),
    #[error(transparent)]
    Wal(#[from] WalError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// The fixed column set a fully up-to-date [`spindle_core::QueueItem`]
/// decodes to; diffed against a live item's keys to flag columns an older
/// snapshot left backfilled-missing.
pub const QUEUE_ITEM_COLUMNS: &[&str] = &[
    "id",
    "disc_title",
    "source_path",
    "disc_fingerprint",
    "status",
    "progress",
    "rip_spec_data",
    "metadata_json",
    "needs_review",
    "review_reason",
    "review_dir_override",
    "ripped_file",
    "encoded_file",
    "final_file",
    "encoding_details_json",
    "error_message",
    "background_log_path",
    "created_at",
    "updated_at",
    "active_episode_key",
    "allow_duplicate",
    "priority",
];

/// Health report for `db-health`, surfaced verbatim over IPC.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DatabaseHealth {
    pub wal_entries_since_snapshot: u64,
    pub last_snapshot_seq: u64,
    pub last_snapshot_at: Option<chrono::DateTime<chrono::Utc>>,
    pub item_count: usize,
    pub columns_present: Vec<String>,
    pub missing_columns: Vec<String>,
    pub ok: bool,
    pub detail: Option<String>,
}
