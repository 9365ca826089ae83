// SPDX-License-Identifier: MIT

//! In-progress stage reporting.

use serde::{Deserialize, Serialize};

/// Point-in-time progress reported by an active stage handler.
///
/// `percent` is a best-effort estimate in `[0.0, 100.0]`; stages that can't
/// estimate (e.g. waiting on external metadata) report `0.0` and rely on
/// `message` to communicate state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub stage_label: String,
    pub percent: f32,
    pub message: String,
    pub bytes_copied: Option<u64>,
    pub total_bytes: Option<u64>,
}

impl ProgressRecord {
    pub fn new(stage_label: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage_label: stage_label.into(),
            percent: 0.0,
            message: message.into(),
            bytes_copied: None,
            total_bytes: None,
        }
    }

    crate::setters! {
        set { percent: f32 }
        option {
            bytes_copied: u64,
            total_bytes: u64,
        }
    }

    /// `bytes_copied / total_bytes` as a percentage, clamped to `[0.0, 100.0]`.
    /// Falls back to the stored `percent` when byte totals aren't available.
    pub fn effective_percent(&self) -> f32 {
        match (self.bytes_copied, self.total_bytes) {
            (Some(copied), Some(total)) if total > 0 => {
                ((copied as f64 / total as f64) * 100.0).clamp(0.0, 100.0) as f32
            }
            _ => self.percent.clamp(0.0, 100.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_percent_prefers_byte_counters() {
        let p = ProgressRecord::new("ripping", "copying title 1")
            .bytes_copied(50)
            .total_bytes(200);
        assert_eq!(p.effective_percent(), 25.0);
    }

    #[test]
    fn effective_percent_falls_back_to_percent_field() {
        let p = ProgressRecord::new("encoding", "pass 1").percent(42.5);
        assert_eq!(p.effective_percent(), 42.5);
    }

    #[test]
    fn effective_percent_clamps() {
        let p = ProgressRecord::new("ripping", "x").bytes_copied(300).total_bytes(200);
        assert_eq!(p.effective_percent(), 100.0);
    }
}
