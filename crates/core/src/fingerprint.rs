// SPDX-License-Identifier: MIT

//! Disc fingerprint canonicalization.
//!
//! A fingerprint identifies a physical disc by the content hash of its key
//! structures. Spindle never computes the hash itself (that's the scanner's
//! job, out of scope); it only enforces the canonical on-disk/on-wire form:
//! uppercase, trimmed, compared case-insensitively.

use serde::{Deserialize, Serialize};

/// Canonical uppercase disc fingerprint.
///
/// Construction always normalizes: trims whitespace and uppercases. Two
/// fingerprints that differ only in case or surrounding whitespace compare
/// equal after construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Fingerprint {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl std::borrow::Borrow<str> for Fingerprint {
    fn borrow(&self) -> &str {
        &self.0
    }
}
