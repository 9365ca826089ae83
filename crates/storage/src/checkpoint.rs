// SPDX-License-Identifier: MIT

//! Periodic snapshot writer and startup snapshot+WAL loading.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::info;

use crate::snapshot::{Snapshot, SnapshotError};
use crate::state::MaterializedState;
use crate::wal::{Wal, WalError};

/// Writes a fresh snapshot of the current state to disk on demand.
pub struct Checkpointer {
    path: PathBuf,
}

impl Checkpointer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn checkpoint(&self, seq: u64, state: &MaterializedState) -> Result<(), SnapshotError> {
        let snapshot = Snapshot::new(seq, state.clone(), Utc::now());
        snapshot.save(&self.path)?;
        info!(seq, path = %self.path.display(), "wrote snapshot");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Wal(#[from] WalError),
}

/// Load the durable state for startup: the latest snapshot (if any),
/// replayed forward with every WAL entry after the snapshot's sequence.
///
/// Returns the reconstructed state and the sequence number replay left off
/// at, which the caller passes as `starting_seq` to [`Wal::open`].
pub fn load_snapshot(
    snapshot_path: &Path,
    wal_path: &Path,
) -> Result<(MaterializedState, u64), LoadError> {
    let (mut state, mut next_seq) = match Snapshot::load(snapshot_path)? {
        Some(snap) => (snap.state, snap.seq),
        None => (MaterializedState::default(), 0),
    };

    // `snap.seq` is the next sequence number not yet reflected in the
    // snapshot, so replay everything with seq >= next_seq.
    let after = if next_seq == 0 { None } else { Some(next_seq - 1) };
    for entry in Wal::read_after(wal_path, after)? {
        state.apply_event(&entry.event);
        next_seq = next_seq.max(entry.seq + 1);
    }

    Ok((state, next_seq))
}

#[cfg(test)]
mod tests {
    use super::*;
    use spindle_core::{Event, ItemId};

    fn tmp_dir() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("spindle-checkpoint-test-{}", nanoid::nanoid!(8)));
        std::fs::create_dir_all(&p).unwrap();
        p
    }

    #[test]
    fn load_with_no_snapshot_or_wal_is_empty() {
        let dir = tmp_dir();
        let (state, seq) = load_snapshot(&dir.join("snap.bin"), &dir.join("wal.log")).unwrap();
        assert!(state.items.is_empty());
        assert_eq!(seq, 0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn load_replays_wal_after_snapshot_seq() {
        let dir = tmp_dir();
        let snap_path = dir.join("snap.bin");
        let wal_path = dir.join("wal.log");

        let mut wal = Wal::open(&wal_path, 0).unwrap();
        wal.append(&Event::ItemRemoved { id: ItemId::new(1), timestamp_ms: 1 }).unwrap();

        let checkpointer = Checkpointer::new(&snap_path);
        checkpointer.checkpoint(1, &MaterializedState::default()).unwrap();

        wal.append(&Event::ItemRemoved { id: ItemId::new(2), timestamp_ms: 2 }).unwrap();

        let (_state, seq) = load_snapshot(&snap_path, &wal_path).unwrap();
        assert_eq!(seq, 2);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
