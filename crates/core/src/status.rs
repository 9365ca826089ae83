// SPDX-License-Identifier: MIT

//! Pipeline status state machine, lane assignment, and stage-key mapping.

use serde::{Deserialize, Serialize};

/// Status of a queue item within the pipeline.
///
/// Terminal statuses are [`ItemStatus::Completed`] and [`ItemStatus::Failed`].
/// `*ing` statuses are "processing" statuses: a stage handler is (or was,
/// before a crash) actively working the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Identifying,
    Identified,
    EpisodeIdentifying,
    EpisodeIdentified,
    Ripping,
    Ripped,
    Encoding,
    Encoded,
    Subtitling,
    Subtitled,
    Organizing,
    Completed,
    Failed,
}

crate::simple_display! {
    ItemStatus {
        Pending => "pending",
        Identifying => "identifying",
        Identified => "identified",
        EpisodeIdentifying => "episode_identifying",
        EpisodeIdentified => "episode_identified",
        Ripping => "ripping",
        Ripped => "ripped",
        Encoding => "encoding",
        Encoded => "encoded",
        Subtitling => "subtitling",
        Subtitled => "subtitled",
        Organizing => "organizing",
        Completed => "completed",
        Failed => "failed",
    }
}

/// Coarse concurrency class: which scheduler lane claims this status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    /// Disc-bound stages that require the optical drive: identification
    /// through `ripped`.
    Foreground,
    /// Post-rip stages: encoding through organization.
    Background,
}

crate::simple_display! {
    Lane {
        Foreground => "foreground",
        Background => "background",
    }
}

impl ItemStatus {
    /// True for `completed`/`failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Failed)
    }

    /// True for any `*ing` status — a stage handler is actively (or was,
    /// before a crash) working this item.
    pub fn is_processing(self) -> bool {
        matches!(
            self,
            ItemStatus::Identifying
                | ItemStatus::EpisodeIdentifying
                | ItemStatus::Ripping
                | ItemStatus::Encoding
                | ItemStatus::Subtitling
                | ItemStatus::Organizing
        )
    }

    /// Lane that owns this status, if any (terminal statuses have no lane).
    pub fn lane(self) -> Option<Lane> {
        match self {
            ItemStatus::Pending
            | ItemStatus::Identifying
            | ItemStatus::Identified
            | ItemStatus::EpisodeIdentifying
            | ItemStatus::EpisodeIdentified
            | ItemStatus::Ripping
            | ItemStatus::Ripped => Some(Lane::Foreground),
            ItemStatus::Encoding
            | ItemStatus::Encoded
            | ItemStatus::Subtitling
            | ItemStatus::Subtitled
            | ItemStatus::Organizing => Some(Lane::Background),
            ItemStatus::Completed | ItemStatus::Failed => None,
        }
    }

    /// Stable UI-facing stage identifier for a processing status.
    ///
    /// Returns `None` for statuses that aren't actively dispatched to a
    /// stage handler (the "done" statuses and the terminals).
    pub fn stage_key(self) -> Option<&'static str> {
        match self {
            ItemStatus::Identifying | ItemStatus::EpisodeIdentifying => Some("identifier"),
            ItemStatus::Ripping => Some("ripper"),
            ItemStatus::Encoding => Some("encoder"),
            ItemStatus::Subtitling => Some("subtitler"),
            ItemStatus::Organizing => Some("organizer"),
            _ => None,
        }
    }

    /// The next status once the handler for this processing status
    /// completes successfully (I-2 monotone stage progression). `None` for
    /// a non-processing status, which never advances on its own.
    pub fn next_on_success(self) -> Option<ItemStatus> {
        match self {
            ItemStatus::Identifying => Some(ItemStatus::Identified),
            ItemStatus::EpisodeIdentifying => Some(ItemStatus::EpisodeIdentified),
            ItemStatus::Ripping => Some(ItemStatus::Ripped),
            ItemStatus::Encoding => Some(ItemStatus::Encoded),
            ItemStatus::Subtitling => Some(ItemStatus::Subtitled),
            ItemStatus::Organizing => Some(ItemStatus::Completed),
            _ => None,
        }
    }

    /// UI-facing label for the terminal stage label once `next_on_success`
    /// is reached (I-4 progress honesty).
    pub fn terminal_label(self) -> &'static str {
        match self {
            ItemStatus::Pending => "Queued",
            ItemStatus::Identifying | ItemStatus::Identified => "Identified",
            ItemStatus::EpisodeIdentifying | ItemStatus::EpisodeIdentified => "Episode identified",
            ItemStatus::Ripping | ItemStatus::Ripped => "Ripped",
            ItemStatus::Encoding | ItemStatus::Encoded => "Encoded",
            ItemStatus::Subtitling | ItemStatus::Subtitled => "Subtitled",
            ItemStatus::Organizing => "Organizing",
            ItemStatus::Completed => "Completed",
            ItemStatus::Failed => "Failed",
        }
    }

    /// The processing status a claimed, not-yet-dispatched item enters
    /// next. The inverse of [`ItemStatus::next_on_success`]: `None` for a
    /// status that is itself already processing or terminal, since those
    /// are never claimed by the dispatch loop.
    pub fn enter_processing(self) -> Option<ItemStatus> {
        match self {
            ItemStatus::Pending => Some(ItemStatus::Identifying),
            ItemStatus::Identified => Some(ItemStatus::EpisodeIdentifying),
            ItemStatus::EpisodeIdentified => Some(ItemStatus::Ripping),
            ItemStatus::Ripped => Some(ItemStatus::Encoding),
            ItemStatus::Encoded => Some(ItemStatus::Subtitling),
            ItemStatus::Subtitled => Some(ItemStatus::Organizing),
            _ => None,
        }
    }

    /// The durable resume point a crashed-while-`*ing` item reverts to on
    /// daemon restart (I-5 crash safety). `has_rip_spec` disambiguates the
    /// two-way branch for `identifying`.
    pub fn resume_point(self, has_rip_spec: bool, has_episodes: bool) -> ItemStatus {
        match self {
            ItemStatus::Identifying => {
                if has_rip_spec {
                    if has_episodes {
                        ItemStatus::EpisodeIdentified
                    } else {
                        ItemStatus::Identified
                    }
                } else {
                    ItemStatus::Pending
                }
            }
            ItemStatus::EpisodeIdentifying => ItemStatus::EpisodeIdentified,
            ItemStatus::Ripping => ItemStatus::Identified,
            ItemStatus::Encoding => ItemStatus::Ripped,
            ItemStatus::Subtitling => ItemStatus::Encoded,
            ItemStatus::Organizing => ItemStatus::Encoded,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lane_crosses_at_ripped_to_encoding() {
        assert_eq!(ItemStatus::Ripped.lane(), Some(Lane::Foreground));
        assert_eq!(ItemStatus::Encoding.lane(), Some(Lane::Background));
    }

    #[test]
    fn terminals_have_no_lane() {
        assert_eq!(ItemStatus::Completed.lane(), None);
        assert_eq!(ItemStatus::Failed.lane(), None);
    }

    #[test]
    fn resume_points_match_recovery_table() {
        assert_eq!(ItemStatus::Ripping.resume_point(false, false), ItemStatus::Identified);
        assert_eq!(ItemStatus::Encoding.resume_point(false, false), ItemStatus::Ripped);
        assert_eq!(ItemStatus::Subtitling.resume_point(false, false), ItemStatus::Encoded);
        assert_eq!(ItemStatus::Organizing.resume_point(false, false), ItemStatus::Encoded);
        assert_eq!(ItemStatus::Identifying.resume_point(false, false), ItemStatus::Pending);
        assert_eq!(ItemStatus::Identifying.resume_point(true, false), ItemStatus::Identified);
        assert_eq!(ItemStatus::Identifying.resume_point(true, true), ItemStatus::EpisodeIdentified);
        assert_eq!(
            ItemStatus::EpisodeIdentifying.resume_point(true, true),
            ItemStatus::EpisodeIdentified
        );
    }

    #[test]
    fn next_on_success_advances_the_dag() {
        assert_eq!(ItemStatus::Ripping.next_on_success(), Some(ItemStatus::Ripped));
        assert_eq!(ItemStatus::Organizing.next_on_success(), Some(ItemStatus::Completed));
        assert_eq!(ItemStatus::Completed.next_on_success(), None);
    }

    #[test]
    fn enter_processing_is_the_inverse_of_next_on_success() {
        assert_eq!(ItemStatus::Pending.enter_processing(), Some(ItemStatus::Identifying));
        assert_eq!(ItemStatus::Ripped.enter_processing(), Some(ItemStatus::Encoding));
        assert_eq!(ItemStatus::Subtitled.enter_processing(), Some(ItemStatus::Organizing));
        assert_eq!(ItemStatus::Ripping.enter_processing(), None);
        assert_eq!(ItemStatus::Completed.enter_processing(), None);
    }

    #[test]
    fn stage_keys_match_spec_mapping() {
        assert_eq!(ItemStatus::Identifying.stage_key(), Some("identifier"));
        assert_eq!(ItemStatus::EpisodeIdentifying.stage_key(), Some("identifier"));
        assert_eq!(ItemStatus::Ripping.stage_key(), Some("ripper"));
        assert_eq!(ItemStatus::Encoding.stage_key(), Some("encoder"));
        assert_eq!(ItemStatus::Subtitling.stage_key(), Some("subtitler"));
        assert_eq!(ItemStatus::Organizing.stage_key(), Some("organizer"));
        assert_eq!(ItemStatus::Pending.stage_key(), None);
    }
}
