// SPDX-License-Identifier: MIT

//! Third-party metadata lookup adapter: content-id matching against an
//! external catalog. No-op by default so the pipeline runs without
//! network access or an API key configured.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("lookup failed: {0}")]
    LookupFailed(String),
    #[error("transient error, retry once: {0}")]
    Transient(String),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MetadataMatch {
    pub title: String,
    pub content_id: String,
    pub year: Option<u32>,
    pub is_series: bool,
}

/// Third-party metadata lookup. The default `lookup_by_fingerprint`
/// returns `Ok(None)` (no match), matching the policy fallback chain in
/// the error handling design: no external collaborator configured is not
/// itself an error, it's a review-worthy "no match."
#[async_trait]
pub trait MetadataClient: Send + Sync + 'static {
    async fn lookup_by_fingerprint(&self, _fingerprint: &str) -> Result<Option<MetadataMatch>, MetadataError> {
        Ok(None)
    }

    async fn lookup_by_title(&self, _title: &str) -> Result<Option<MetadataMatch>, MetadataError> {
        Ok(None)
    }
}

/// No-op client: every lookup reports no match, routing items to manual
/// review per the error handling table (`Validation`/`NotFound` outcomes).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetadataClient;

#[async_trait]
impl MetadataClient for NoopMetadataClient {}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    pub struct FakeMetadataClient {
        matches: Arc<Mutex<HashMap<String, MetadataMatch>>>,
    }

    impl FakeMetadataClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn seed(&self, fingerprint: impl Into<String>, m: MetadataMatch) {
            self.matches.lock().insert(fingerprint.into(), m);
        }
    }

    #[async_trait]
    impl MetadataClient for FakeMetadataClient {
        async fn lookup_by_fingerprint(&self, fingerprint: &str) -> Result<Option<MetadataMatch>, MetadataError> {
            Ok(self.matches.lock().get(fingerprint).cloned())
        }
    }
}
