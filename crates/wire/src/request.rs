// SPDX-License-Identifier: MIT

//! Requests a CLI client sends to the daemon. One variant per §6 method.

use serde::{Deserialize, Serialize};
use spindle_core::ItemId;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    Hello { version: String },
    Start,
    Stop,
    Status,
    QueueList { statuses: Option<Vec<String>> },
    QueueDescribe { id: ItemId },
    QueueClear,
    QueueClearCompleted,
    QueueClearFailed,
    QueueRemove { ids: Vec<ItemId> },
    QueueReset,
    QueueRetry { ids: Option<Vec<ItemId>> },
    QueueRetryEpisode { id: ItemId, episode_key: String },
    QueueStop { ids: Vec<ItemId> },
    LogTail { offset: i64, limit: usize, follow: bool, wait_millis: u64 },
    FetchLogEvents {
        since: Option<u64>,
        limit: usize,
        follow: bool,
        tail: bool,
        component: Option<String>,
        lane: Option<String>,
        correlation_id: Option<String>,
        item: Option<ItemId>,
        level: Option<String>,
        alert: Option<bool>,
        decision_type: Option<String>,
        search: Option<String>,
    },
    /// Insert a newly detected disc into the queue. Mirrors C1's
    /// `new_disc` operation, plus §4.2's resume-from-cache check.
    DiscInsert {
        title: String,
        source_path: Option<String>,
        fingerprint: String,
        #[serde(default)]
        allow_duplicate: bool,
        #[serde(default)]
        priority: i32,
    },
    DiscPause,
    DiscResume,
    DatabaseHealth,
    TestNotification,
}
