// SPDX-License-Identifier: MIT

//! Write-ahead log: one JSON line per [`spindle_core::Event`], fsync'd
//! before the append call returns so a crash never loses an acknowledged
//! mutation.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use spindle_core::Event;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalError {
    #[error("io error on wal {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("corrupt wal entry at line {line}: {source}")]
    Corrupt { line: usize, #[source] source: serde_json::Error },
}

/// One durable record: the monotonically increasing sequence number the
/// entry was assigned, paired with the event itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    pub seq: u64,
    pub event: Event,
}

/// Append-only log backing the queue store. `seq` always continues from
/// whatever the caller passed as `starting_seq` on [`Wal::open`] (normally
/// one past the sequence number embedded in the last loaded snapshot).
pub struct Wal {
    file: File,
    path: PathBuf,
    next_seq: u64,
}

impl Wal {
    pub fn open(path: impl AsRef<Path>, starting_seq: u64) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| WalError::Io { path: path.clone(), source })?;
        Ok(Self { file, path, next_seq: starting_seq })
    }

    /// Append `event`, fsync, and return the sequence number it was
    /// assigned.
    pub fn append(&mut self, event: &Event) -> Result<u64, WalError> {
        let seq = self.next_seq;
        let entry = WalEntry { seq, event: event.clone() };
        let mut line = serde_json::to_vec(&entry).expect("WalEntry serialization is infallible");
        line.push(b'\n');
        self.file
            .write_all(&line)
            .map_err(|source| WalError::Io { path: self.path.clone(), source })?;
        self.file.sync_data().map_err(|source| WalError::Io { path: self.path.clone(), source })?;
        self.next_seq += 1;
        Ok(seq)
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Read every entry with `seq` strictly greater than `after_seq` (or
    /// every entry, if `after_seq` is `None`), in order, for recovery
    /// replay.
    pub fn read_after(path: impl AsRef<Path>, after_seq: Option<u64>) -> Result<Vec<WalEntry>, WalError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(path).map_err(|source| WalError::Io { path: path.to_path_buf(), source })?;
        let reader = BufReader::new(file);
        let mut out = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| WalError::Io { path: path.to_path_buf(), source })?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: WalEntry = serde_json::from_str(&line)
                .map_err(|source| WalError::Corrupt { line: idx + 1, source })?;
            let keep = match after_seq {
                Some(after) => entry.seq > after,
                None => true,
            };
            if keep {
                out.push(entry);
            }
        }
        Ok(out)
    }
}
