// SPDX-License-Identifier: MIT

//! The organizer: the one stage handler with real (non no-op) default
//! behavior, since filename conventions and review routing are part of
//! what makes Spindle's output usable without a media-server plugin.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use spindle_core::{ErrorKind, QueueItem, StageError};

use crate::metadata::MetadataMatch;
use crate::notify::NotifierAdapter;
use crate::stage::{HealthStatus, StageContext, StageHandler};

/// Build the final library filename for a successfully identified item:
/// `"{title} ({year}).mkv"`.
pub fn final_filename(title: &str, year: Option<u32>) -> String {
    match year {
        Some(y) => format!("{title} ({y}).mkv"),
        None => format!("{title}.mkv"),
    }
}

/// Slugify a review reason into a filename-safe token:
/// `"low confidence"` -> `"low-confidence"`.
fn slugify(reason: &str) -> String {
    reason
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Build the review-dir filename for an item routed to manual review:
/// `"{reason-slug}-{fingerprint-lower}-{item-id}.mkv"`.
pub fn review_filename(review_reason: &str, fingerprint: &str, item_id: u64) -> String {
    format!("{}-{}-{}.mkv", slugify(review_reason), fingerprint.to_ascii_lowercase(), item_id)
}

#[derive(Debug, thiserror::Error)]
pub enum OrganizeError {
    #[error("io error moving {from} to {to}: {source}")]
    Move { from: PathBuf, to: PathBuf, #[source] source: std::io::Error },
    #[error("item has no encoded_file to organize")]
    NoEncodedFile,
}

/// Routes an item's encoded file to its final resting place: the library
/// path when identification succeeded cleanly, or `{review_dir}/...` when
/// `needs_review` is set.
pub struct DefaultOrganizer {
    pub library_root: PathBuf,
    pub review_dir: PathBuf,
}

impl DefaultOrganizer {
    pub fn new(library_root: impl Into<PathBuf>, review_dir: impl Into<PathBuf>) -> Self {
        Self { library_root: library_root.into(), review_dir: review_dir.into() }
    }

    /// Compute (without moving anything) where `item`'s encoded file
    /// should end up.
    pub fn target_for(&self, item: &QueueItem, title: &str, year: Option<u32>) -> PathBuf {
        if item.needs_review {
            let reason = item.review_reason.as_deref().unwrap_or("unreviewed");
            let dir = item.review_dir_override.as_ref().map(PathBuf::from).unwrap_or_else(|| self.review_dir.clone());
            dir.join(review_filename(reason, item.disc_fingerprint.as_str(), item.id.get()))
        } else {
            self.library_root.join(final_filename(title, year))
        }
    }

    /// Move `item`'s `encoded_file` to its computed target, returning the
    /// target path. Creates parent directories as needed.
    pub fn organize(&self, item: &QueueItem, title: &str, year: Option<u32>) -> Result<PathBuf, OrganizeError> {
        let source = item.encoded_file.as_deref().ok_or(OrganizeError::NoEncodedFile)?;
        let source = Path::new(source);
        let target = self.target_for(item, title, year);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|source_err| OrganizeError::Move { from: source.to_path_buf(), to: target.clone(), source: source_err })?;
        }
        std::fs::rename(source, &target)
            .map_err(|source_err| OrganizeError::Move { from: source.to_path_buf(), to: target.clone(), source: source_err })?;
        Ok(target)
    }
}

/// Wires [`DefaultOrganizer`] and a [`NotifierAdapter`] up as the real
/// `"organizer"` [`StageHandler`], replacing the no-op placeholder so S1/S2
/// are reachable from the live dispatch loop rather than only from this
/// module's own unit tests.
pub struct OrganizerStageHandler {
    organizer: DefaultOrganizer,
    notifier: Arc<dyn NotifierAdapter>,
}

impl OrganizerStageHandler {
    pub fn new(organizer: DefaultOrganizer, notifier: Arc<dyn NotifierAdapter>) -> Self {
        Self { organizer, notifier }
    }

    /// Title/year come from the identifier's metadata match when present
    /// (§4.7's pass-through metadata field); fall back to the disc's own
    /// title with no year so an unidentified disc still organizes somewhere
    /// sensible under the review directory.
    fn title_and_year(item: &QueueItem) -> (String, Option<u32>) {
        match item.metadata_json.as_deref().and_then(|raw| serde_json::from_str::<MetadataMatch>(raw).ok()) {
            Some(m) => (m.title, m.year),
            None => (item.disc_title.clone(), None),
        }
    }
}

#[async_trait]
impl StageHandler for OrganizerStageHandler {
    fn stage_key(&self) -> &'static str {
        "organizer"
    }

    async fn prepare(&self, _ctx: &StageContext, _item: &mut QueueItem) -> Result<(), StageError> {
        Ok(())
    }

    async fn execute(&self, _ctx: &StageContext, item: &mut QueueItem) -> Result<(), StageError> {
        let (title, year) = Self::title_and_year(item);
        let target = self.organizer.organize(item, &title, year).map_err(|e| {
            StageError::new(ErrorKind::ExternalTool, "organizer", "organize", e.to_string()).with_cause(e)
        })?;
        let target_display = target.display().to_string();
        item.final_file = Some(target_display.clone());

        if item.needs_review {
            let _ = self.notifier.event_unidentified_media(&item.disc_title).await;
        } else {
            let _ = self.notifier.event_organization_completed(&title, &target_display).await;
        }
        Ok(())
    }

    async fn health_check(&self, _ctx: &StageContext) -> HealthStatus {
        HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spindle_core::{Fingerprint, ItemId, ItemStatus, ProgressRecord};

    fn item(fingerprint: &str) -> QueueItem {
        QueueItem {
            id: ItemId::new(1),
            disc_title: "The Matrix".into(),
            source_path: None,
            disc_fingerprint: Fingerprint::new(fingerprint),
            status: ItemStatus::Organizing,
            progress: ProgressRecord::new("organizing", "x"),
            rip_spec_data: None,
            metadata_json: None,
            needs_review: false,
            review_reason: None,
            review_dir_override: None,
            ripped_file: None,
            encoded_file: None,
            final_file: None,
            encoding_details_json: None,
            error_message: None,
            background_log_path: None,
            created_at: 0,
            updated_at: 0,
            active_episode_key: None,
            allow_duplicate: false,
            priority: 0,
        }
    }

    #[test]
    fn s1_happy_path_filename() {
        assert_eq!(final_filename("The Matrix", Some(1999)), "The Matrix (1999).mkv");
    }

    #[test]
    fn s2_review_filename_matches_scenario() {
        assert_eq!(review_filename("low confidence", "FP1", 1), "low-confidence-fp1-1.mkv");
    }

    #[test]
    fn organize_moves_encoded_file_into_library() {
        let dir = tempfile::tempdir().unwrap();
        let encoded = dir.path().join("scratch.mkv");
        std::fs::write(&encoded, b"data").unwrap();

        let mut it = item("FP1");
        it.encoded_file = Some(encoded.display().to_string());

        let organizer = DefaultOrganizer::new(dir.path().join("library"), dir.path().join("review"));
        let target = organizer.organize(&it, "The Matrix", Some(1999)).unwrap();
        assert_eq!(target.file_name().unwrap(), "The Matrix (1999).mkv");
        assert!(target.exists());
        assert!(!encoded.exists());
    }

    #[test]
    fn organize_routes_needs_review_items_to_review_dir() {
        let dir = tempfile::tempdir().unwrap();
        let encoded = dir.path().join("scratch.mkv");
        std::fs::write(&encoded, b"data").unwrap();

        let mut it = item("FP1");
        it.encoded_file = Some(encoded.display().to_string());
        it.needs_review = true;
        it.review_reason = Some("low confidence".to_string());

        let organizer = DefaultOrganizer::new(dir.path().join("library"), dir.path().join("review"));
        let target = organizer.organize(&it, "The Matrix", Some(1999)).unwrap();
        assert_eq!(target.file_name().unwrap(), "low-confidence-fp1-1.mkv");
        assert!(target.starts_with(dir.path().join("review")));
    }

    #[tokio::test]
    async fn stage_handler_s1_organizes_and_notifies_completion() {
        use crate::notify::{FakeNotifierAdapter, NotifierAdapter};
        use spindle_core::Settings;
        use tokio_util::sync::CancellationToken;

        let dir = tempfile::tempdir().unwrap();
        let encoded = dir.path().join("scratch.mkv");
        std::fs::write(&encoded, b"data").unwrap();

        let mut it = item("FP1");
        it.encoded_file = Some(encoded.display().to_string());
        it.metadata_json = Some(serde_json::to_string(&MetadataMatch {
            title: "The Matrix".into(),
            content_id: "cid-1".into(),
            year: Some(1999),
            is_series: false,
        }).unwrap());

        let notifier = Arc::new(FakeNotifierAdapter::new());
        let organizer = DefaultOrganizer::new(dir.path().join("library"), dir.path().join("review"));
        let handler = OrganizerStageHandler::new(organizer, notifier.clone());

        let ctx = StageContext::new(Arc::new(Settings::default()), dir.path().to_path_buf(), CancellationToken::new());
        handler.execute(&ctx, &mut it).await.unwrap();

        assert!(it.final_file.as_deref().unwrap().ends_with("The Matrix (1999).mkv"));
        let calls = notifier.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].message.contains("The Matrix"));
    }

    #[tokio::test]
    async fn stage_handler_s2_organizes_to_review_and_notifies_unidentified() {
        use crate::notify::{FakeNotifierAdapter, NotifierAdapter};
        use spindle_core::Settings;
        use tokio_util::sync::CancellationToken;

        let dir = tempfile::tempdir().unwrap();
        let encoded = dir.path().join("scratch.mkv");
        std::fs::write(&encoded, b"data").unwrap();

        let mut it = item("FP1");
        it.encoded_file = Some(encoded.display().to_string());
        it.needs_review = true;
        it.review_reason = Some("low confidence".to_string());

        let notifier = Arc::new(FakeNotifierAdapter::new());
        let organizer = DefaultOrganizer::new(dir.path().join("library"), dir.path().join("review"));
        let handler = OrganizerStageHandler::new(organizer, notifier.clone());

        let ctx = StageContext::new(Arc::new(Settings::default()), dir.path().to_path_buf(), CancellationToken::new());
        handler.execute(&ctx, &mut it).await.unwrap();

        assert!(it.final_file.as_deref().unwrap().contains("low-confidence-fp1-1.mkv"));
        let calls = notifier.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].title.contains("needs review"));
    }
}
