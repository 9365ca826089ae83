// SPDX-License-Identifier: MIT

//! Per-fingerprint staging directories: exclusive scratch space for one
//! item's lifetime, `{staging_root}/{fingerprint}/{ripped,encoded,subtitled}`.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use spindle_core::Fingerprint;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("io error on {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageArea {
    Ripped,
    Encoded,
    Subtitled,
}

impl StageArea {
    fn dirname(self) -> &'static str {
        match self {
            StageArea::Ripped => "ripped",
            StageArea::Encoded => "encoded",
            StageArea::Subtitled => "subtitled",
        }
    }
}

pub struct StagingManager {
    root: PathBuf,
}

impl StagingManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn item_dir(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root.join(fingerprint.as_str())
    }

    pub fn area_dir(&self, fingerprint: &Fingerprint, area: StageArea) -> Result<PathBuf, StagingError> {
        let dir = self.item_dir(fingerprint).join(area.dirname());
        std::fs::create_dir_all(&dir).map_err(|source| StagingError::Io { path: dir.clone(), source })?;
        Ok(dir)
    }

    /// Remove a terminal item's staging directory entirely.
    pub fn remove_item(&self, fingerprint: &Fingerprint) -> Result<(), StagingError> {
        let dir = self.item_dir(fingerprint);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|source| StagingError::Io { path: dir, source })?;
        }
        Ok(())
    }

    /// Remove every direct child directory older than `threshold`,
    /// ignoring file entries. Returns the removed paths.
    pub fn clean_all_staging(&self, threshold: Duration) -> Result<Vec<PathBuf>, StagingError> {
        let mut removed = Vec::new();
        if !self.root.exists() {
            return Ok(removed);
        }
        let now = SystemTime::now();
        let entries = std::fs::read_dir(&self.root).map_err(|source| StagingError::Io { path: self.root.clone(), source })?;
        for entry in entries {
            let entry = entry.map_err(|source| StagingError::Io { path: self.root.clone(), source })?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let meta = entry.metadata().map_err(|source| StagingError::Io { path: path.clone(), source })?;
            let age = meta.modified().ok().and_then(|m| now.duration_since(m).ok()).unwrap_or_default();
            if age >= threshold {
                std::fs::remove_dir_all(&path).map_err(|source| StagingError::Io { path: path.clone(), source })?;
                info!(path = %path.display(), "removed stale staging directory");
                removed.push(path);
            }
        }
        Ok(removed)
    }

    /// Remove every direct child directory whose uppercased name is not a
    /// currently-active fingerprint. Directories named `queue-*` are
    /// exempt (reserved for the ingestion surface's own scratch space).
    pub fn clean_orphaned_staging(&self, active: &[Fingerprint]) -> Result<Vec<PathBuf>, StagingError> {
        let mut removed = Vec::new();
        if !self.root.exists() {
            return Ok(removed);
        }
        let entries = std::fs::read_dir(&self.root).map_err(|source| StagingError::Io { path: self.root.clone(), source })?;
        for entry in entries {
            let entry = entry.map_err(|source| StagingError::Io { path: self.root.clone(), source })?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n,
                None => continue,
            };
            if name.starts_with("queue-") {
                continue;
            }
            let upper = name.to_ascii_uppercase();
            if active.iter().any(|fp| fp.as_str() == upper) {
                continue;
            }
            match std::fs::remove_dir_all(&path) {
                Ok(()) => {
                    info!(path = %path.display(), "removed orphaned staging directory");
                    removed.push(path);
                }
                Err(source) => warn!(path = %path.display(), error = %source, "failed to remove orphaned staging directory"),
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_dir_creates_expected_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = StagingManager::new(dir.path());
        let fp = Fingerprint::new("abc123");
        let ripped = mgr.area_dir(&fp, StageArea::Ripped).unwrap();
        assert!(ripped.ends_with("ABC123/ripped"));
        assert!(ripped.exists());
    }

    #[test]
    fn clean_orphaned_staging_keeps_active_and_queue_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = StagingManager::new(dir.path());
        let active_fp = Fingerprint::new("AAAA");
        mgr.area_dir(&active_fp, StageArea::Ripped).unwrap();
        mgr.area_dir(&Fingerprint::new("BBBB"), StageArea::Ripped).unwrap();
        std::fs::create_dir_all(dir.path().join("queue-ingest")).unwrap();

        let removed = mgr.clean_orphaned_staging(&[active_fp]).unwrap();
        assert_eq!(removed.len(), 1);
        assert!(dir.path().join("AAAA").exists());
        assert!(dir.path().join("queue-ingest").exists());
        assert!(!dir.path().join("BBBB").exists());
    }

    #[test]
    fn clean_all_staging_removes_only_stale_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = StagingManager::new(dir.path());
        mgr.area_dir(&Fingerprint::new("fresh"), StageArea::Ripped).unwrap();
        let removed = mgr.clean_all_staging(Duration::from_secs(3600)).unwrap();
        assert!(removed.is_empty());
    }
}
