// SPDX-License-Identifier: MIT

//! Rip cache: an optional, LRU-bounded `{cache_root}/{fingerprint}/`
//! archive of ripped artifacts plus a `metadata.json` envelope, letting a
//! disc's rip be reused across queue items without returning to the drive.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("io error on {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("invalid metadata at {path}: {source}")]
    Metadata { path: PathBuf, #[source] source: serde_json::Error },
    #[error("target {0:?} did not match any cache entry")]
    TargetNotFound(String),
}

/// Stable on-disk envelope for one cache entry, matching the subset of
/// `QueueItem` needed to resume identification-free.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub disc_title: String,
    pub disc_fingerprint: String,
    /// Base64-encoded serialized rip-spec envelope.
    #[serde(with = "base64_bytes")]
    pub rip_spec_data: Vec<u8>,
    pub metadata_json: Option<String>,
    pub needs_review: bool,
    pub review_reason: Option<String>,
    #[serde(default = "Utc::now")]
    pub cached_at: DateTime<Utc>,
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheEntrySummary {
    pub number: usize,
    pub fingerprint: String,
    pub disc_title: String,
    pub size_bytes: u64,
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub entries: Vec<CacheEntrySummary>,
    pub total_size_bytes: u64,
}

pub struct RipCacheManager {
    root: PathBuf,
    max_gib: f64,
}

impl RipCacheManager {
    pub fn new(root: impl Into<PathBuf>, max_gib: f64) -> Self {
        Self { root: root.into(), max_gib }
    }

    pub fn path(&self, fingerprint: &str) -> PathBuf {
        self.root.join(fingerprint)
    }

    /// Load `metadata.json` from `dir`, if present and well-formed.
    /// Returns `(None, false)` rather than erroring when the file is
    /// simply absent — a cold cache is not a fault.
    pub fn load_metadata(&self, dir: &Path) -> Result<(Option<CacheMetadata>, bool), CacheError> {
        let meta_path = dir.join(METADATA_FILE);
        if !meta_path.exists() {
            return Ok((None, false));
        }
        let raw = std::fs::read_to_string(&meta_path).map_err(|source| CacheError::Io { path: meta_path.clone(), source })?;
        let meta: CacheMetadata =
            serde_json::from_str(&raw).map_err(|source| CacheError::Metadata { path: meta_path, source })?;
        Ok((Some(meta), true))
    }

    pub fn save_metadata(&self, fingerprint: &str, meta: &CacheMetadata) -> Result<(), CacheError> {
        let dir = self.path(fingerprint);
        std::fs::create_dir_all(&dir).map_err(|source| CacheError::Io { path: dir.clone(), source })?;
        let meta_path = dir.join(METADATA_FILE);
        let json = serde_json::to_string_pretty(meta)
            .map_err(|source| CacheError::Metadata { path: meta_path.clone(), source })?;
        std::fs::write(&meta_path, json).map_err(|source| CacheError::Io { path: meta_path, source })
    }

    fn dir_size(path: &Path) -> u64 {
        let mut total = 0u64;
        let Ok(entries) = std::fs::read_dir(path) else { return 0 };
        for entry in entries.flatten() {
            let p = entry.path();
            if p.is_dir() {
                total += Self::dir_size(&p);
            } else if let Ok(meta) = entry.metadata() {
                total += meta.len();
            }
        }
        total
    }

    pub fn stats(&self) -> CacheStats {
        let mut entries = Vec::new();
        let mut total = 0u64;
        if let Ok(dir_entries) = std::fs::read_dir(&self.root) {
            let mut dirs: Vec<PathBuf> = dir_entries.flatten().map(|e| e.path()).filter(|p| p.is_dir()).collect();
            dirs.sort();
            for dir in dirs {
                let fingerprint = dir.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();
                let size = Self::dir_size(&dir);
                total += size;
                let (meta, _) = self.load_metadata(&dir).unwrap_or((None, false));
                entries.push(CacheEntrySummary {
                    number: entries.len() + 1,
                    fingerprint: fingerprint.clone(),
                    disc_title: meta.as_ref().map(|m| m.disc_title.clone()).unwrap_or(fingerprint),
                    size_bytes: size,
                    cached_at: meta.map(|m| m.cached_at).unwrap_or_else(Utc::now),
                });
            }
        }
        CacheStats { entries, total_size_bytes: total }
    }

    /// Resolve a CLI-facing target argument: either a 1-based number
    /// (index into [`Self::stats`]'s ordering) or a path/fingerprint.
    pub fn resolve_target(&self, arg: &str) -> Result<PathBuf, CacheError> {
        if let Ok(n) = arg.parse::<usize>() {
            let stats = self.stats();
            if n >= 1 {
                if let Some(entry) = stats.entries.get(n - 1) {
                    return Ok(self.path(&entry.fingerprint));
                }
            }
            return Err(CacheError::TargetNotFound(arg.to_string()));
        }
        let direct = self.path(&arg.to_ascii_uppercase());
        if direct.exists() {
            return Ok(direct);
        }
        let as_path = PathBuf::from(arg);
        if as_path.exists() {
            return Ok(as_path);
        }
        Err(CacheError::TargetNotFound(arg.to_string()))
    }

    /// Evict oldest entries (by `cached_at`) until total size is at or
    /// under `max_gib`.
    pub fn enforce_lru_bound(&self) -> Result<Vec<PathBuf>, CacheError> {
        let max_bytes = (self.max_gib * 1024.0 * 1024.0 * 1024.0) as u64;
        let mut evicted = Vec::new();
        let mut stats = self.stats();
        if stats.total_size_bytes <= max_bytes {
            return Ok(evicted);
        }
        stats.entries.sort_by_key(|e| e.cached_at);
        let mut remaining = stats.total_size_bytes;
        for entry in stats.entries {
            if remaining <= max_bytes {
                break;
            }
            let dir = self.path(&entry.fingerprint);
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => {
                    info!(fingerprint = %entry.fingerprint, "evicted rip cache entry over size bound");
                    remaining = remaining.saturating_sub(entry.size_bytes);
                    evicted.push(dir);
                }
                Err(source) => warn!(path = %dir.display(), error = %source, "failed to evict cache entry"),
            }
        }
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(title: &str) -> CacheMetadata {
        CacheMetadata {
            disc_title: title.to_string(),
            disc_fingerprint: "ABC123".to_string(),
            rip_spec_data: b"{}".to_vec(),
            metadata_json: None,
            needs_review: false,
            review_reason: None,
            cached_at: Utc::now(),
        }
    }

    #[test]
    fn save_and_load_metadata_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = RipCacheManager::new(dir.path(), 10.0);
        mgr.save_metadata("ABC123", &meta("Example Disc")).unwrap();
        let (loaded, found) = mgr.load_metadata(&mgr.path("ABC123")).unwrap();
        assert!(found);
        assert_eq!(loaded.unwrap().disc_title, "Example Disc");
    }

    #[test]
    fn load_metadata_missing_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = RipCacheManager::new(dir.path(), 10.0);
        let (loaded, found) = mgr.load_metadata(&mgr.path("NOPE")).unwrap();
        assert!(loaded.is_none());
        assert!(!found);
    }

    #[test]
    fn resolve_target_accepts_numbered_index() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = RipCacheManager::new(dir.path(), 10.0);
        mgr.save_metadata("ABC123", &meta("Example Disc")).unwrap();
        let resolved = mgr.resolve_target("1").unwrap();
        assert_eq!(resolved, mgr.path("ABC123"));
    }

    #[test]
    fn resolve_target_accepts_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = RipCacheManager::new(dir.path(), 10.0);
        mgr.save_metadata("ABC123", &meta("Example Disc")).unwrap();
        let resolved = mgr.resolve_target("abc123").unwrap();
        assert_eq!(resolved, mgr.path("ABC123"));
    }

    #[test]
    fn rip_spec_data_round_trips_through_base64() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = RipCacheManager::new(dir.path(), 10.0);
        let mut m = meta("X");
        m.rip_spec_data = vec![0, 1, 2, 255];
        mgr.save_metadata("ABC123", &m).unwrap();
        let (loaded, _) = mgr.load_metadata(&mgr.path("ABC123")).unwrap();
        assert_eq!(loaded.unwrap().rip_spec_data, vec![0, 1, 2, 255]);
    }
}
