// SPDX-License-Identifier: MIT

//! Write-ahead-log event log: the durable record of every mutation applied
//! to the queue store's in-memory `MaterializedState`.
//!
//! Every operation the store exposes appends exactly one `Event` before
//! mutating in-memory state, and replaying the full log (snapshot +
//! trailing events) in order reproduces that state exactly.

use serde::{Deserialize, Serialize};

use crate::item::{ItemId, QueueItem};
use crate::progress::ProgressRecord;
use crate::status::ItemStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    ItemInserted {
        item: Box<QueueItem>,
    },
    StatusChanged {
        id: ItemId,
        status: ItemStatus,
        error_message: Option<String>,
        timestamp_ms: i64,
    },
    ProgressUpdated {
        id: ItemId,
        progress: ProgressRecord,
        timestamp_ms: i64,
    },
    RipSpecPersisted {
        id: ItemId,
        rip_spec_data: Vec<u8>,
        timestamp_ms: i64,
    },
    FieldsUpdated {
        id: ItemId,
        /// Sparse field patch, keyed by field name. Using a JSON object
        /// here (rather than one event variant per settable field) keeps
        /// the log schema stable as `QueueItem` gains fields.
        patch: serde_json::Map<String, serde_json::Value>,
        timestamp_ms: i64,
    },
    ItemRemoved {
        id: ItemId,
        timestamp_ms: i64,
    },
    ItemsCleared {
        /// `None` clears everything; `Some(status)` clears only items
        /// currently in that terminal status.
        status: Option<ItemStatus>,
        timestamp_ms: i64,
    },
    StuckItemsReset {
        ids: Vec<ItemId>,
        timestamp_ms: i64,
    },
}

impl Event {
    pub fn timestamp_ms(&self) -> i64 {
        match self {
            Event::ItemInserted { item } => item.created_at,
            Event::StatusChanged { timestamp_ms, .. }
            | Event::ProgressUpdated { timestamp_ms, .. }
            | Event::RipSpecPersisted { timestamp_ms, .. }
            | Event::FieldsUpdated { timestamp_ms, .. }
            | Event::ItemRemoved { timestamp_ms, .. }
            | Event::ItemsCleared { timestamp_ms, .. }
            | Event::StuckItemsReset { timestamp_ms, .. } => *timestamp_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_round_trip_through_json() {
        let ev = Event::ItemRemoved { id: ItemId::new(7), timestamp_ms: 42 };
        let json = serde_json::to_string(&ev).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.timestamp_ms(), 42);
    }

    #[test]
    fn tagged_enum_carries_type_field() {
        let ev = Event::StuckItemsReset { ids: vec![ItemId::new(1)], timestamp_ms: 5 };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "StuckItemsReset");
    }
}
