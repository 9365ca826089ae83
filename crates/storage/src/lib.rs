// SPDX-License-Identifier: MIT

//! Durable queue store (C1): write-ahead log + periodic snapshot +
//! materialized state, mirroring the teacher's event-sourced storage
//! layer.

mod checkpoint;
mod error;
mod snapshot;
mod state;
mod store;
mod wal;

pub use checkpoint::{load_snapshot, Checkpointer, LoadError};
pub use error::{DatabaseHealth, StorageError, QUEUE_ITEM_COLUMNS};
pub use snapshot::{Snapshot, SnapshotError, CURRENT_SNAPSHOT_VERSION};
pub use state::MaterializedState;
pub use store::{default_store_dir, QueueStats, QueueStore};
pub use wal::{Wal, WalEntry, WalError};
