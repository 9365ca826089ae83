// SPDX-License-Identifier: MIT

//! Stage error taxonomy.
//!
//! [`ErrorKind`] maps directly to item outcome per the error handling
//! design: `ExternalTool` always lands on `failed`, `Validation` /
//! `Configuration` / `NotFound` additionally set `needs_review`, and
//! `Timeout` / `Transient` are candidates for an auto-retry policy.

use std::path::PathBuf;

/// Type-erased lower-level cause, boxed so `StageError` stays `Send + Sync
/// + 'static` regardless of what a stage handler's own error type looks
/// like.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ExternalTool,
    Validation,
    Configuration,
    NotFound,
    Timeout,
    Transient,
}

crate::simple_display! {
    ErrorKind {
        ExternalTool => "external_tool",
        Validation => "validation",
        Configuration => "configuration",
        NotFound => "not_found",
        Timeout => "timeout",
        Transient => "transient",
    }
}

impl ErrorKind {
    /// Whether an item failed with this error kind should be flagged for
    /// manual review rather than left as a plain auto-retriable failure.
    pub fn needs_review(self) -> bool {
        matches!(self, ErrorKind::Validation | ErrorKind::Configuration | ErrorKind::NotFound)
    }

    /// Whether this error kind is a reasonable candidate for an
    /// auto-retry policy upstream of manual `queue_retry`.
    pub fn is_retriable(self) -> bool {
        matches!(self, ErrorKind::Timeout | ErrorKind::Transient)
    }
}

/// A classified error raised by a stage handler, carrying enough context
/// for the executor to persist `error_message`/`review_reason` on the
/// item without re-deriving it from a raw `Display` string.
#[derive(Debug, thiserror::Error)]
#[error("{stage}: {operation} failed: {message}")]
pub struct StageError {
    pub kind: ErrorKind,
    pub stage: &'static str,
    pub operation: String,
    pub message: String,
    pub code: Option<String>,
    pub hint: Option<String>,
    pub detail_path: Option<PathBuf>,
    #[source]
    pub cause: Option<BoxError>,
}

impl StageError {
    pub fn new(kind: ErrorKind, stage: &'static str, operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            stage,
            operation: operation.into(),
            message: message.into(),
            code: None,
            hint: None,
            detail_path: None,
            cause: None,
        }
    }

    crate::setters! {
        option {
            code: String,
            hint: String,
            detail_path: PathBuf,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn needs_review(&self) -> bool {
        self.kind.needs_review()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_need_review() {
        let e = StageError::new(ErrorKind::Validation, "identifier", "lookup_disc", "no match");
        assert!(e.needs_review());
    }

    #[test]
    fn external_tool_errors_do_not_need_review() {
        let e = StageError::new(ErrorKind::ExternalTool, "ripper", "spawn_makemkv", "exit 1");
        assert!(!e.needs_review());
    }

    #[test]
    fn transient_is_retriable() {
        assert!(ErrorKind::Transient.is_retriable());
        assert!(!ErrorKind::ExternalTool.is_retriable());
    }

    #[test]
    fn display_includes_stage_and_operation() {
        let e = StageError::new(ErrorKind::Timeout, "encoder", "run_ffmpeg", "deadline exceeded");
        assert_eq!(e.to_string(), "encoder: run_ffmpeg failed: deadline exceeded");
    }
}
