// SPDX-License-Identifier: MIT

//! IPC server (C6): one Unix-socket accept loop, length-framed JSON-RPC
//! dispatch against [`DaemonState`], mirroring the teacher's
//! `Listener`/`ListenCtx`/`handle_connection` split.

use std::path::PathBuf;
use std::sync::Arc;

use spindle_core::{ItemId, ItemStatus};
use spindle_wire::{
    read_message, write_message, LogEventFilter, ProtocolError, QueueItemDto, Request, Response,
    StageHealthEntry,
};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::env::ipc_timeout;
use crate::lifecycle::DaemonState;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Shared, read-only context handed to every connection handler.
pub struct ListenCtx {
    pub daemon: Arc<DaemonState>,
    pub shutdown: CancellationToken,
    pub dependencies: Vec<String>,
}

pub struct Listener {
    unix: UnixListener,
    ctx: Arc<ListenCtx>,
}

impl Listener {
    pub fn bind(socket_path: &PathBuf, ctx: Arc<ListenCtx>) -> std::io::Result<Self> {
        let unix = UnixListener::bind(socket_path)?;
        Ok(Self { unix, ctx })
    }

    /// Accept loop: every connection gets its own task, cancelled as a
    /// group when the listener's root token fires.
    pub async fn run(self) {
        loop {
            tokio::select! {
                _ = self.ctx.shutdown.cancelled() => {
                    info!("listener shutting down");
                    return;
                }
                result = self.unix.accept() => {
                    match result {
                        Ok((stream, _)) => {
                            let ctx = Arc::clone(&self.ctx);
                            tokio::spawn(async move {
                                let (reader, writer) = stream.into_split();
                                if let Err(e) = handle_connection(reader, writer, &ctx).await {
                                    debug!(error = %e, "connection closed with error");
                                }
                            });
                        }
                        Err(e) => error!(error = %e, "accept error"),
                    }
                }
            }
        }
    }
}

async fn handle_connection<R, W>(mut reader: R, mut writer: W, ctx: &ListenCtx) -> Result<(), ConnectionError>
where
    R: AsyncRead + AsyncReadExt + Unpin,
    W: AsyncWrite + Unpin,
{
    let request: Request = tokio::time::timeout(ipc_timeout(), read_message(&mut reader))
        .await
        .map_err(|_| ProtocolError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out")))??;

    info!(request = ?request, "received request");
    let response = handle_request(request, ctx).await;

    tokio::time::timeout(ipc_timeout(), write_message(&mut writer, &response))
        .await
        .map_err(|_| ProtocolError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "write timed out")))??;
    Ok(())
}

fn parse_status(s: &str) -> Option<ItemStatus> {
    serde_json::from_value(serde_json::Value::String(s.to_string())).ok()
}

async fn handle_request(request: Request, ctx: &ListenCtx) -> Response {
    let daemon = &ctx.daemon;
    match request {
        Request::Hello { version: _ } => Response::Hello { version: env!("CARGO_PKG_VERSION").to_string() },

        Request::Start => Response::Started { message: "daemon already running".to_string() },

        Request::Stop => {
            ctx.shutdown.cancel();
            Response::Stopped { message: "stop signal sent".to_string() }
        }

        Request::Status => {
            let summary = daemon.workflow.status_summary().await;
            let stage_health = summary
                .stage_health
                .into_iter()
                .map(|(stage, health)| StageHealthEntry {
                    healthy: health.is_healthy(),
                    detail: match &health {
                        spindle_adapters::HealthStatus::Healthy => None,
                        spindle_adapters::HealthStatus::Degraded { detail }
                        | spindle_adapters::HealthStatus::Unavailable { detail } => Some(detail.clone()),
                    },
                    stage,
                })
                .collect();
            let mut queue_stats = std::collections::HashMap::new();
            queue_stats.insert("total".to_string(), summary.queue_stats.total);
            queue_stats.insert("pending".to_string(), summary.queue_stats.pending);
            queue_stats.insert("processing".to_string(), summary.queue_stats.processing);
            queue_stats.insert("needs_review".to_string(), summary.queue_stats.needs_review);
            queue_stats.insert("completed".to_string(), summary.queue_stats.completed);
            queue_stats.insert("failed".to_string(), summary.queue_stats.failed);
            Response::Status {
                running: summary.running,
                disc_paused: summary.disc_paused,
                queue_stats,
                last_error: summary.last_error,
                last_item: summary.last_item.map(|id| id.get()),
                lock_path: daemon.config.lock_path.display().to_string(),
                queue_db_path: daemon.config.queue_db_path.display().to_string(),
                stage_health,
                dependencies: ctx.dependencies.clone(),
                pid: std::process::id(),
            }
        }

        Request::QueueList { statuses } => {
            let wanted: Option<Vec<ItemStatus>> = statuses.map(|ss| ss.iter().filter_map(|s| parse_status(s)).collect());
            let items: Vec<QueueItemDto> = daemon
                .store
                .list()
                .iter()
                .filter(|item| match &wanted {
                    Some(ws) => ws.contains(&item.status),
                    None => true,
                })
                .map(QueueItemDto::from)
                .collect();
            Response::QueueItems { items }
        }

        Request::QueueDescribe { id } => match daemon.store.get_by_id(ItemId::new(id.get())) {
            Ok(item) => Response::QueueItem { found: true, item: Some(Box::new(QueueItemDto::from(&item))) },
            Err(_) => Response::QueueItem { found: false, item: None },
        },

        Request::QueueClear => match daemon.store.clear_all() {
            Ok(()) => Response::Removed { removed: 0 },
            Err(e) => Response::Error { message: e.to_string() },
        },

        Request::QueueClearCompleted => match daemon.store.clear_completed() {
            Ok(()) => Response::Removed { removed: 0 },
            Err(e) => Response::Error { message: e.to_string() },
        },

        Request::QueueClearFailed => match daemon.store.clear_failed() {
            Ok(()) => Response::Removed { removed: 0 },
            Err(e) => Response::Error { message: e.to_string() },
        },

        Request::QueueRemove { ids } => {
            let mut removed = 0;
            for id in ids {
                if daemon.store.remove(ItemId::new(id.get())).is_ok() {
                    removed += 1;
                }
            }
            Response::Removed { removed }
        }

        Request::QueueReset => {
            let mut updated = 0;
            for id in daemon.store.reset_stuck().unwrap_or_default() {
                let _ = id;
                updated += 1;
            }
            Response::Updated { updated }
        }

        Request::QueueRetry { ids } => {
            let targets: Vec<ItemId> = match ids {
                Some(ids) => ids.into_iter().map(|id| ItemId::new(id.get())).collect(),
                None => daemon.store.list().iter().filter(|it| it.status == ItemStatus::Failed).map(|it| it.id).collect(),
            };
            let mut updated = 0;
            for id in targets {
                if daemon.store.retry_failed(id).is_ok() {
                    updated += 1;
                }
            }
            Response::Updated { updated }
        }

        Request::QueueRetryEpisode { id, episode_key } => match daemon.workflow.retry_episode(ItemId::new(id.get()), &episode_key) {
            Ok(result) => Response::RetryEpisodeResult {
                outcome: match result.outcome {
                    spindle_engine::RetryEpisodeOutcome::Retried => "retried",
                    spindle_engine::RetryEpisodeOutcome::NotFound => "not_found",
                    spindle_engine::RetryEpisodeOutcome::NotFailed => "not_failed",
                    spindle_engine::RetryEpisodeOutcome::EpisodeNotFound => "episode_not_found",
                }
                .to_string(),
                new_status: result.new_status.map(|s| s.to_string()),
            },
            Err(e) => Response::Error { message: e.to_string() },
        },

        Request::QueueStop { ids } => {
            let targets: Vec<ItemId> = ids.into_iter().map(|id| ItemId::new(id.get())).collect();
            match daemon.store.stop_items(&targets) {
                Ok(()) => Response::Updated { updated: targets.len() },
                Err(e) => Response::Error { message: e.to_string() },
            }
        }

        Request::LogTail { offset, limit, follow, wait_millis } => {
            handle_log_tail(&daemon.config.log_path, offset, limit, follow, wait_millis, &ctx.shutdown).await
        }

        Request::FetchLogEvents {
            since,
            limit,
            follow,
            tail: _,
            component,
            lane,
            correlation_id,
            item,
            level,
            alert,
            decision_type,
            search,
        } => {
            let filter = LogEventFilter {
                since,
                component,
                lane,
                correlation_id,
                item: item.map(|id| id.get()),
                level,
                alert,
                decision_type,
                search,
            };
            if follow && daemon.log_hub.fetch(&filter, limit).is_empty() {
                let mut rx = daemon.log_hub.subscribe();
                tokio::select! {
                    Some(event) = rx.recv() => Response::LogEvents { next: event.seq, events: vec![event] },
                    _ = ctx.shutdown.cancelled() => Response::LogEvents { next: daemon.log_hub.next_seq(), events: vec![] },
                }
            } else {
                let events = daemon.log_hub.fetch(&filter, limit);
                let next = events.last().map(|e| e.seq).unwrap_or_else(|| daemon.log_hub.next_seq());
                Response::LogEvents { events, next }
            }
        }

        Request::DiscInsert { title, source_path, fingerprint, allow_duplicate, priority } => {
            match daemon.workflow.insert_disc(title, source_path, spindle_core::Fingerprint::new(fingerprint), allow_duplicate, priority)
            {
                Ok(item) => Response::QueueItem { found: true, item: Some(Box::new(QueueItemDto::from(&item))) },
                Err(e) => Response::Error { message: e.to_string() },
            }
        }

        Request::DiscPause => {
            daemon.workflow.pause_disc_processing();
            Response::Paused { message: "disc processing paused".to_string() }
        }

        Request::DiscResume => {
            daemon.workflow.resume_disc_processing();
            Response::Resumed { message: "disc processing resumed".to_string() }
        }

        Request::DatabaseHealth => {
            let health = daemon.store.database_health();
            Response::DatabaseHealth {
                db_path: daemon.config.queue_db_path.display().to_string(),
                exists: daemon.config.queue_db_path.exists(),
                readable: true,
                schema_version: spindle_storage::CURRENT_SNAPSHOT_VERSION,
                columns_present: health.columns_present,
                missing_columns: health.missing_columns,
                total_items: health.item_count,
                integrity_check: health.ok,
                error: health.detail,
            }
        }

        Request::TestNotification => Response::TestNotificationSent { sent: true, message: "test notification queued".to_string() },
    }
}

/// §4.6 `log_tail`: `-1` reads the last `limit` lines; a non-negative
/// offset reads forward from there; `follow` blocks (honoring
/// cancellation) until new data appears or `wait_millis` elapses.
async fn handle_log_tail(
    log_path: &PathBuf,
    offset: i64,
    limit: usize,
    follow: bool,
    wait_millis: u64,
    cancel: &CancellationToken,
) -> Response {
    let read_once = |offset: i64| -> (Vec<String>, i64) {
        let Ok(contents) = std::fs::read_to_string(log_path) else {
            return (Vec::new(), 0);
        };
        let size = contents.len() as i64;
        if offset == -1 {
            let lines: Vec<String> = contents.lines().rev().take(limit).map(str::to_string).collect();
            let lines: Vec<String> = lines.into_iter().rev().collect();
            return (lines, size);
        }
        let start = offset.clamp(0, size) as usize;
        let lines: Vec<String> = contents[start..].lines().take(limit).map(str::to_string).collect();
        (lines, size)
    };

    let (lines, next) = read_once(offset);
    if !lines.is_empty() || !follow {
        return Response::LogLines { lines, offset: next };
    }

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_millis(wait_millis);
    let poll = crate::env::log_tail_poll_interval();
    loop {
        if tokio::time::Instant::now() >= deadline {
            return Response::LogLines { lines: Vec::new(), offset: next };
        }
        tokio::select! {
            _ = tokio::time::sleep(poll) => {
                let (lines, next) = read_once(next);
                if !lines.is_empty() {
                    return Response::LogLines { lines, offset: next };
                }
            }
            _ = cancel.cancelled() => return Response::LogLines { lines: Vec::new(), offset: next },
        }
    }
}
