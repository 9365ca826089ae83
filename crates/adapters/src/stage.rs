// SPDX-License-Identifier: MIT

//! The stage handler contract: the "opaque capabilities" boundary between
//! the engine's dispatch loops and whatever actually drives a physical
//! drive, encoder, or subtitle service.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use spindle_core::{QueueItem, Settings, StageError};
use tokio_util::sync::CancellationToken;

/// Per-call context handed to a stage handler: shared settings, the
/// item's exclusive staging directory for this stage, and a cancellation
/// token scoped to this single `execute` call.
#[derive(Clone)]
pub struct StageContext {
    pub settings: Arc<Settings>,
    pub staging_dir: PathBuf,
    pub cancel: CancellationToken,
}

impl StageContext {
    pub fn new(settings: Arc<Settings>, staging_dir: PathBuf, cancel: CancellationToken) -> Self {
        Self { settings, staging_dir, cancel }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded { detail: String },
    Unavailable { detail: String },
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// A pluggable handler for one pipeline stage. Implementors own all
/// interaction with the external world (disc drive, ffmpeg, subtitle
/// services, filesystem layout) for their stage; the executor only knows
/// `prepare`/`execute`/`health_check`.
#[async_trait]
pub trait StageHandler: Send + Sync {
    fn stage_key(&self) -> &'static str;

    /// Validate preconditions and allocate any resources `execute` will
    /// need (e.g. staging subdirectories). Called once per attempt before
    /// `execute`.
    async fn prepare(&self, ctx: &StageContext, item: &mut QueueItem) -> Result<(), StageError>;

    /// Do the work. On success the handler has updated `item`'s relevant
    /// fields (assets, `*_file` paths) but has NOT set `status` — the
    /// executor owns status transitions so every transition goes through
    /// one instrumented, durable code path.
    async fn execute(&self, ctx: &StageContext, item: &mut QueueItem) -> Result<(), StageError>;

    async fn health_check(&self, ctx: &StageContext) -> HealthStatus;
}

/// No-op implementation of every stage, used both by the engine's own
/// tests and by a deployment with no real disc hardware so the full
/// pipeline remains exercisable end to end.
pub struct NoopStageHandler {
    stage_key: &'static str,
}

impl NoopStageHandler {
    pub fn new(stage_key: &'static str) -> Self {
        Self { stage_key }
    }

    pub fn identifier() -> Self {
        Self::new("identifier")
    }

    pub fn ripper() -> Self {
        Self::new("ripper")
    }

    pub fn encoder() -> Self {
        Self::new("encoder")
    }

    pub fn subtitler() -> Self {
        Self::new("subtitler")
    }

    pub fn organizer() -> Self {
        Self::new("organizer")
    }
}

#[async_trait]
impl StageHandler for NoopStageHandler {
    fn stage_key(&self) -> &'static str {
        self.stage_key
    }

    async fn prepare(&self, _ctx: &StageContext, _item: &mut QueueItem) -> Result<(), StageError> {
        Ok(())
    }

    async fn execute(&self, ctx: &StageContext, item: &mut QueueItem) -> Result<(), StageError> {
        let synthetic = ctx.staging_dir.join(format!("{}.synthetic", self.stage_key));
        let _ = std::fs::write(&synthetic, b"noop");
        match self.stage_key {
            "ripper" => item.ripped_file = Some(synthetic.display().to_string()),
            "encoder" => item.encoded_file = Some(synthetic.display().to_string()),
            "organizer" => item.final_file = Some(synthetic.display().to_string()),
            _ => {}
        }
        Ok(())
    }

    async fn health_check(&self, _ctx: &StageContext) -> HealthStatus {
        HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spindle_core::{Fingerprint, ItemId, ItemStatus, ProgressRecord};

    fn item() -> QueueItem {
        QueueItem {
            id: ItemId::new(1),
            disc_title: "Disc".into(),
            source_path: None,
            disc_fingerprint: Fingerprint::new("abc"),
            status: ItemStatus::Ripping,
            progress: ProgressRecord::new("ripping", "x"),
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
            created_at: 0,
            updated_at: 0,
            active_episode_key: None,
            allow_duplicate: false,
            priority: 0,
        }
    }

    #[tokio::test]
    async fn noop_ripper_sets_ripped_file() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = StageContext::new(Arc::new(Settings::default()), dir.path().to_path_buf(), CancellationToken::new());
        let handler = NoopStageHandler::ripper();
        let mut it = item();
        handler.prepare(&ctx, &mut it).await.unwrap();
        handler.execute(&ctx, &mut it).await.unwrap();
        assert!(it.ripped_file.is_some());
    }

    #[tokio::test]
    async fn noop_health_check_is_always_healthy() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = StageContext::new(Arc::new(Settings::default()), dir.path().to_path_buf(), CancellationToken::new());
        assert!(NoopStageHandler::identifier().health_check(&ctx).await.is_healthy());
    }
}
