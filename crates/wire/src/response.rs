// SPDX-License-Identifier: MIT

//! Responses the daemon sends back. One variant per §6 method, matching
//! [`crate::request::Request`] one-to-one (plus a generic `Error`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::dto::QueueItemDto;
use crate::log_events::LogEvent;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageHealthEntry {
    pub stage: String,
    pub healthy: bool,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Hello { version: String },
    Started { message: String },
    Stopped { message: String },
    Status {
        running: bool,
        disc_paused: bool,
        queue_stats: HashMap<String, usize>,
        last_error: Option<String>,
        last_item: Option<u64>,
        lock_path: String,
        queue_db_path: String,
        stage_health: Vec<StageHealthEntry>,
        dependencies: Vec<String>,
        pid: u32,
    },
    QueueItems { items: Vec<QueueItemDto> },
    QueueItem { found: bool, item: Option<Box<QueueItemDto>> },
    Removed { removed: usize },
    Updated { updated: usize },
    RetryEpisodeResult { outcome: String, new_status: Option<String> },
    LogLines { lines: Vec<String>, offset: i64 },
    LogEvents { events: Vec<LogEvent>, next: u64 },
    Paused { message: String },
    Resumed { message: String },
    DatabaseHealth {
        db_path: String,
        exists: bool,
        readable: bool,
        schema_version: u32,
        columns_present: Vec<String>,
        missing_columns: Vec<String>,
        total_items: usize,
        integrity_check: bool,
        error: Option<String>,
    },
    TestNotificationSent { sent: bool, message: String },
    Error { message: String },
}
