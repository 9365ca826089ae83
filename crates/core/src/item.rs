// SPDX-License-Identifier: MIT

//! The queue item: the unit of work tracked by the durable store.

use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;
use crate::progress::ProgressRecord;
use crate::status::{ItemStatus, Lane};

/// Auto-assigned 64-bit identity for a queue item: a plain incrementing
/// integer assigned by the store on insert (spec: "Immutable identity is
/// a 64-bit auto-assigned identifier").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl ItemId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ItemId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// The full mutable record tracked for one disc/rip job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: ItemId,
    pub disc_title: String,
    pub source_path: Option<String>,
    pub disc_fingerprint: Fingerprint,
    pub status: ItemStatus,
    pub progress: ProgressRecord,

    /// Opaque serialized [`crate::ripspec::RipSpecEnvelope`]; stored as raw
    /// bytes at this layer so the store never needs to know the envelope
    /// schema to persist an item.
    pub rip_spec_data: Option<Vec<u8>>,
    pub metadata_json: Option<String>,

    pub needs_review: bool,
    pub review_reason: Option<String>,
    /// Directory operator review artifacts (if any) are written under,
    /// overriding the daemon-wide default review directory for this item.
    pub review_dir_override: Option<String>,

    pub ripped_file: Option<String>,
    pub encoded_file: Option<String>,
    pub final_file: Option<String>,

    pub encoding_details_json: Option<String>,
    pub error_message: Option<String>,
    pub background_log_path: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,

    /// For multi-episode items, the episode key currently being advanced
    /// through the pipeline.
    pub active_episode_key: Option<String>,

    /// Operator asserted this item may share a fingerprint with an
    /// existing non-terminal item at insert time (I-1 override).
    pub allow_duplicate: bool,
    /// Scheduler hint threaded through the store but not currently
    /// consulted by either lane's dispatch loop (both lanes are FIFO);
    /// kept so an ordering policy can be added without a schema change.
    pub priority: i32,
}

impl QueueItem {
    pub fn lane(&self) -> Option<Lane> {
        self.status.lane()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// I-4 progress honesty: on a successful stage completion the executor
    /// should call this rather than hand-setting `progress` fields.
    pub fn mark_stage_complete(&mut self, terminal_label: &str, now_ms: i64) {
        self.progress.percent = 100.0;
        self.progress.stage_label = terminal_label.to_string();
        self.updated_at = now_ms;
    }

    pub fn mark_needs_review(&mut self, reason: impl Into<String>, now_ms: i64) {
        self.needs_review = true;
        self.review_reason = Some(reason.into());
        self.progress.stage_label = "Manual review".to_string();
        self.progress.percent = 100.0;
        self.updated_at = now_ms;
    }

    /// The resumable status a `failed` item should return to on retry.
    ///
    /// A `failed` item no longer carries the `*ing` status it crashed out
    /// of, so rather than reconstructing that from history this infers
    /// the last *successfully completed* stage from which durable
    /// artifacts (`ripped_file`/`encoded_file`) and envelope data
    /// (`rip_spec_data`) are already present, and resumes one stage past
    /// it.
    pub fn inferred_resume_status(&self) -> ItemStatus {
        if self.encoded_file.is_some() {
            ItemStatus::Encoded
        } else if self.ripped_file.is_some() {
            ItemStatus::Ripped
        } else if self.rip_spec_data.is_some() {
            if self.active_episode_key.is_some() {
                ItemStatus::EpisodeIdentified
            } else {
                ItemStatus::Identified
            }
        } else {
            ItemStatus::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(now_ms: i64) -> QueueItem {
        QueueItem {
            id: ItemId::new(1),
            disc_title: "Example Disc".to_string(),
            source_path: None,
            disc_fingerprint: Fingerprint::new("abc123"),
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
            created_at: now_ms,
            updated_at: now_ms,
            active_episode_key: None,
            allow_duplicate: false,
            priority: 0,
        }
    }

    #[test]
    fn mark_stage_complete_sets_honest_progress() {
        let mut it = item(1_000);
        it.status = ItemStatus::Ripped;
        it.mark_stage_complete("Ripped", 2_000);
        assert_eq!(it.progress.percent, 100.0);
        assert_eq!(it.progress.stage_label, "Ripped");
        assert_eq!(it.updated_at, 2_000);
    }

    #[test]
    fn mark_needs_review_preserves_manual_review_label() {
        let mut it = item(1_000);
        it.mark_needs_review("no content-id match", 2_000);
        assert!(it.needs_review);
        assert_eq!(it.progress.stage_label, "Manual review");
        assert_eq!(it.progress.percent, 100.0);
    }

    #[test]
    fn fingerprint_stays_canonical_on_construction() {
        let it = item(0);
        assert_eq!(it.disc_fingerprint.as_str(), "ABC123");
    }
}
