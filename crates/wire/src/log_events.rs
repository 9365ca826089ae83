// SPDX-License-Identifier: MIT

//! Structured log event stream: a bounded in-memory pub/sub hub backing
//! `fetch_log_events`. Each subscriber gets its own bounded channel; a
//! slow subscriber is dropped from delivery rather than allowed to stall
//! the publisher (§5 concurrency model).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Per-subscriber channel capacity. Matches the §5 "bounded per-subscriber
/// channel" requirement; a subscriber who falls 256 events behind is
/// assumed stalled and is dropped on next overflow.
const SUBSCRIBER_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEvent {
    pub seq: u64,
    pub timestamp_ms: i64,
    pub level: String,
    pub component: String,
    pub lane: Option<String>,
    pub correlation_id: Option<String>,
    pub item: Option<u64>,
    /// Set when this event surfaces something an operator should act on
    /// (e.g. an item landing in `needs_review`), mirroring the teacher's
    /// escalation-to-human events.
    pub alert: bool,
    /// Names the automated decision this event records, if any (e.g.
    /// `"resume_from_cache"`, `"needs_review"`, `"duplicate_skip"`).
    pub decision_type: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct LogEventFilter {
    pub since: Option<u64>,
    pub component: Option<String>,
    pub lane: Option<String>,
    pub correlation_id: Option<String>,
    pub item: Option<u64>,
    pub level: Option<String>,
    pub alert: Option<bool>,
    pub decision_type: Option<String>,
    pub search: Option<String>,
}

impl LogEventFilter {
    fn matches(&self, event: &LogEvent) -> bool {
        if let Some(since) = self.since {
            if event.seq <= since {
                return false;
            }
        }
        if let Some(component) = &self.component {
            if &event.component != component {
                return false;
            }
        }
        if let Some(lane) = &self.lane {
            if event.lane.as_deref() != Some(lane.as_str()) {
                return false;
            }
        }
        if let Some(correlation_id) = &self.correlation_id {
            if event.correlation_id.as_deref() != Some(correlation_id.as_str()) {
                return false;
            }
        }
        if let Some(item) = self.item {
            if event.item != Some(item) {
                return false;
            }
        }
        if let Some(level) = &self.level {
            if &event.level != level {
                return false;
            }
        }
        if let Some(alert) = self.alert {
            if event.alert != alert {
                return false;
            }
        }
        if let Some(decision_type) = &self.decision_type {
            if event.decision_type.as_deref() != Some(decision_type.as_str()) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            if !event.message.contains(search.as_str()) {
                return false;
            }
        }
        true
    }
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<LogEvent>,
}

/// Publish/subscribe hub for structured log events, plus a ring buffer of
/// the most recent events so `fetch_log_events` can serve a `tail` read
/// without a live subscriber.
pub struct LogEventHub {
    next_seq: AtomicU64,
    next_subscriber_id: AtomicU64,
    ring: Mutex<Vec<LogEvent>>,
    ring_capacity: usize,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl LogEventHub {
    pub fn new(ring_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            next_seq: AtomicU64::new(1),
            next_subscriber_id: AtomicU64::new(1),
            ring: Mutex::new(Vec::new()),
            ring_capacity,
            subscribers: Mutex::new(Vec::new()),
        })
    }

    /// Publish one event, assigning it the next monotonic sequence number.
    pub fn publish(&self, mut event: LogEvent) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        event.seq = seq;

        {
            let mut ring = self.ring.lock();
            ring.push(event.clone());
            if ring.len() > self.ring_capacity {
                let excess = ring.len() - self.ring_capacity;
                ring.drain(0..excess);
            }
        }

        let mut subs = self.subscribers.lock();
        subs.retain(|sub| match sub.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => false,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        seq
    }

    /// Register a new subscriber; returns its receiver. Dropped
    /// automatically once its sender is pruned for being full or closed.
    pub fn subscribe(&self) -> mpsc::Receiver<LogEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.lock().push(Subscriber { id, tx });
        rx
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq.load(Ordering::SeqCst)
    }

    /// Non-blocking filtered read over the ring buffer, for `tail` reads
    /// and the non-follow path of `fetch_log_events`.
    pub fn fetch(&self, filter: &LogEventFilter, limit: usize) -> Vec<LogEvent> {
        self.ring.lock().iter().filter(|e| filter.matches(e)).take(limit).cloned().collect()
    }
}
