// SPDX-License-Identifier: MIT

//! Rip-cache & staging layer (C2): per-item staging directories and the
//! optional LRU-bounded rip cache that lets a disc's rip survive across
//! queue items.

mod rip_cache;
mod staging;

pub use rip_cache::{CacheEntrySummary, CacheError, CacheMetadata, CacheStats, RipCacheManager};
pub use staging::{StageArea, StagingError, StagingManager};
