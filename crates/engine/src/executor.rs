// SPDX-License-Identifier: MIT

//! Stage executor (C3): dispatches one queue item to the stage handler
//! for its current status, classifies any error, and persists the
//! outcome through the queue store.

use std::collections::HashMap;
use std::io::Write as _;
use std::sync::Arc;

use spindle_cache::StagingManager;
use spindle_core::{Clock, ErrorKind, ItemId, QueueItem, Settings, StageError};
use spindle_storage::QueueStore;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use spindle_adapters::{StageContext, StageHandler};

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("item {0} not found")]
    ItemNotFound(ItemId),
    #[error("no stage handler registered for {0:?}")]
    NoHandler(&'static str),
    #[error(transparent)]
    Storage(#[from] spindle_storage::StorageError),
    #[error(transparent)]
    Staging(#[from] spindle_cache::StagingError),
    #[error(transparent)]
    Stage(#[from] StageError),
}

/// Executes a single stage-handler call for one item, owning status
/// transitions so every advance through the §4.4 DAG goes through one
/// instrumented, durable code path.
pub struct StageExecutor<C: Clock> {
    store: Arc<QueueStore<C>>,
    staging: Arc<StagingManager>,
    settings: Arc<Settings>,
    handlers: HashMap<&'static str, Arc<dyn StageHandler>>,
    clock: C,
}

impl<C: Clock> StageExecutor<C> {
    pub fn new(
        store: Arc<QueueStore<C>>,
        staging: Arc<StagingManager>,
        settings: Arc<Settings>,
        handlers: HashMap<&'static str, Arc<dyn StageHandler>>,
        clock: C,
    ) -> Self {
        Self { store, staging, settings, handlers, clock }
    }

    fn now_ms(&self) -> i64 {
        self.clock.epoch_ms() as i64
    }

    /// Run the handler for `item_id`'s current status to completion (or
    /// failure), updating the store with the result. Returns the item's
    /// new status.
    #[instrument(skip(self, cancel), fields(item_id = %item_id))]
    pub async fn execute(
        &self,
        item_id: ItemId,
        cancel: CancellationToken,
    ) -> Result<spindle_core::ItemStatus, ExecuteError> {
        let mut item = self.store.get_by_id(item_id)?;
        let stage_key = item.status.stage_key().ok_or(ExecuteError::NoHandler("none"))?;
        let handler = self.handlers.get(stage_key).ok_or(ExecuteError::NoHandler(stage_key))?.clone();

        let area_dir = self.staging.area_dir(
            &item.disc_fingerprint,
            match stage_key {
                "ripper" => spindle_cache::StageArea::Ripped,
                "encoder" => spindle_cache::StageArea::Encoded,
                "subtitler" => spindle_cache::StageArea::Subtitled,
                _ => spindle_cache::StageArea::Ripped,
            },
        )?;
        let ctx = StageContext::new(self.settings.clone(), area_dir, cancel);

        let start = std::time::Instant::now();
        let result = self.run_handler(handler.as_ref(), &ctx, &mut item).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                let next = item.status.next_on_success().unwrap_or(item.status);
                item.mark_stage_complete(next.terminal_label(), self.now_ms());
                self.store.update_fields(item_id, item_patch(&item))?;
                self.store.update_status(item_id, next, None)?;
                info!(stage = stage_key, elapsed_ms, next = %next, "stage completed");
                Ok(next)
            }
            Err(stage_err) => {
                error!(stage = stage_key, elapsed_ms, error = %stage_err, "stage failed");
                self.persist_failure(&item, &stage_err)?;
                Ok(spindle_core::ItemStatus::Failed)
            }
        }
    }

    async fn run_handler(
        &self,
        handler: &dyn StageHandler,
        ctx: &StageContext,
        item: &mut QueueItem,
    ) -> Result<(), StageError> {
        handler.prepare(ctx, item).await?;
        let timeout = self.settings.stage_timeout();
        tokio::select! {
            result = handler.execute(ctx, item) => result,
            _ = tokio::time::sleep(timeout) => Err(StageError::new(
                ErrorKind::Timeout,
                handler.stage_key(),
                "execute",
                format!("stage exceeded {timeout:?}"),
            )),
            _ = ctx.cancel.cancelled() => Err(StageError::new(
                ErrorKind::Transient,
                handler.stage_key(),
                "execute",
                "cancelled",
            )),
        }
    }

    /// §4.3 step 5: besides recording `error_message`, append the failure
    /// to a per-item log under the item's staging directory and persist
    /// its path as `background_log_path` so an operator can pull the full
    /// context behind a terse status line.
    fn persist_failure(&self, item: &QueueItem, stage_err: &StageError) -> Result<(), ExecuteError> {
        self.store.update_status(item.id, spindle_core::ItemStatus::Failed, Some(stage_err.message.clone()))?;

        let log_path = self.staging.item_dir(&item.disc_fingerprint).join("background.log");
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(mut f) = std::fs::OpenOptions::new().create(true).append(true).open(&log_path) {
            let _ = writeln!(
                f,
                "[{}] stage={} op={} kind={} {}",
                self.now_ms(),
                stage_err.stage,
                stage_err.operation,
                stage_err.kind,
                stage_err.message
            );
        }

        let mut patch = serde_json::Map::new();
        patch.insert("background_log_path".to_string(), serde_json::json!(log_path.display().to_string()));
        if stage_err.needs_review() {
            patch.insert("needs_review".to_string(), serde_json::json!(true));
            patch.insert("review_reason".to_string(), serde_json::json!(stage_err.message.clone()));
        }
        self.store.update_fields(item.id, patch)?;
        Ok(())
    }
}

fn item_patch(item: &QueueItem) -> serde_json::Map<String, serde_json::Value> {
    match serde_json::to_value(item) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    }
}
