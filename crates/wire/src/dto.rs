// SPDX-License-Identifier: MIT

//! DTO conversion layer (C7): durable [`QueueItem`]s to transport-shaped
//! records. Stamps timestamps as RFC3339, derives per-episode status from
//! the rip-spec envelope, and normalizes the progress label so a UI never
//! has to special-case `needs_review`/`completed`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use spindle_core::{AssetKind, ItemId, ItemStatus, QueueItem, RipSpecEnvelope};

fn to_rfc3339_ms(epoch_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(epoch_ms)
        .unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).unwrap_or_default())
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressDto {
    pub stage_label: String,
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EpisodeStatusDto {
    pub key: String,
    pub season: u32,
    pub episode: u32,
    pub episode_title: String,
    /// Effective stage, resolved `final -> subtitled -> encoded -> ripped -> queue's stage_key -> "planned"`.
    pub stage: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EpisodeTotalsDto {
    pub planned: usize,
    pub ripped: usize,
    pub encoded: usize,
    pub final_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueItemDto {
    pub id: ItemId,
    pub disc_title: String,
    pub disc_fingerprint: String,
    pub status: ItemStatus,
    pub progress: ProgressDto,
    pub needs_review: bool,
    pub review_reason: Option<String>,
    pub ripped_file: Option<String>,
    pub encoded_file: Option<String>,
    pub final_file: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub active_episode_key: Option<String>,
    /// Opaque pass-through of the rip-spec envelope; never re-encoded.
    pub rip_spec_data: Option<String>,
    /// Opaque pass-through of the metadata lookup result.
    pub metadata_json: Option<String>,
    pub episodes: Vec<EpisodeStatusDto>,
    pub episode_totals: EpisodeTotalsDto,
    pub episodes_synchronized: bool,
}

fn normalize_progress(item: &QueueItem) -> ProgressDto {
    if item.status == ItemStatus::Completed && !item.needs_review {
        return ProgressDto { stage_label: "Completed".to_string(), percent: 100.0 };
    }
    if item.needs_review {
        return ProgressDto { stage_label: "Manual review".to_string(), percent: item.progress.effective_percent() as f64 };
    }
    let label = if item.progress.stage_label.is_empty() { item.status.to_string() } else { item.progress.stage_label.clone() };
    ProgressDto { stage_label: label, percent: item.progress.effective_percent() as f64 }
}

fn effective_stage(envelope: &RipSpecEnvelope, episode_key: &str, queue_stage_key: Option<&str>) -> String {
    for kind in [AssetKind::Final, AssetKind::Subtitled, AssetKind::Encoded, AssetKind::Ripped] {
        let label = match kind {
            AssetKind::Final => "final",
            AssetKind::Subtitled => "subtitled",
            AssetKind::Encoded => "encoded",
            AssetKind::Ripped => "ripped",
        };
        if envelope.assets_of(kind).iter().any(|a| {
            a.episode_key.eq_ignore_ascii_case(episode_key) && a.status == spindle_core::AssetStatus::Completed
        }) {
            return label.to_string();
        }
    }
    queue_stage_key.unwrap_or("planned").to_string()
}

fn episodes_synchronized(envelope: &RipSpecEnvelope) -> bool {
    if let Some(value) = envelope.attributes.get("episodes_synchronized") {
        if let Some(b) = value.as_bool() {
            return b;
        }
    }
    if !envelope.episodes.is_empty() && envelope.episodes.iter().all(|e| e.season != 0 && e.episode != 0) {
        return true;
    }
    envelope.attributes.contains_key("episode_numbers")
}

/// Convert a durable queue item into its transport representation.
impl From<&QueueItem> for QueueItemDto {
    fn from(item: &QueueItem) -> Self {
        let envelope: Option<RipSpecEnvelope> =
            item.rip_spec_data.as_deref().and_then(|raw| serde_json::from_slice(raw).ok());

        let (episodes, totals, synchronized) = match &envelope {
            Some(env) => {
                let queue_stage = item.status.stage_key();
                let mut dtos: Vec<EpisodeStatusDto> = env
                    .episodes
                    .iter()
                    .map(|ep| EpisodeStatusDto {
                        key: ep.key.clone(),
                        season: ep.season,
                        episode: ep.episode,
                        episode_title: ep.episode_title.clone(),
                        stage: effective_stage(env, &ep.key, queue_stage),
                    })
                    .collect();
                dtos.sort_by_key(|e| (e.season, e.episode, e.key.clone()));

                let mut totals = EpisodeTotalsDto { planned: dtos.len(), ..Default::default() };
                for ep in &env.episodes {
                    if env.assets_of(AssetKind::Ripped).iter().any(|a| a.episode_key.eq_ignore_ascii_case(&ep.key) && a.status == spindle_core::AssetStatus::Completed) {
                        totals.ripped += 1;
                    }
                    if env.assets_of(AssetKind::Encoded).iter().any(|a| a.episode_key.eq_ignore_ascii_case(&ep.key) && a.status == spindle_core::AssetStatus::Completed) {
                        totals.encoded += 1;
                    }
                    if env.assets_of(AssetKind::Final).iter().any(|a| a.episode_key.eq_ignore_ascii_case(&ep.key) && a.status == spindle_core::AssetStatus::Completed) {
                        totals.final_count += 1;
                    }
                }
                (dtos, totals, episodes_synchronized(env))
            }
            None => (Vec::new(), EpisodeTotalsDto::default(), false),
        };

        QueueItemDto {
            id: item.id,
            disc_title: item.disc_title.clone(),
            disc_fingerprint: item.disc_fingerprint.to_string(),
            status: item.status,
            progress: normalize_progress(item),
            needs_review: item.needs_review,
            review_reason: item.review_reason.clone(),
            ripped_file: item.ripped_file.clone(),
            encoded_file: item.encoded_file.clone(),
            final_file: item.final_file.clone(),
            error_message: item.error_message.clone(),
            created_at: to_rfc3339_ms(item.created_at),
            updated_at: to_rfc3339_ms(item.updated_at),
            active_episode_key: item.active_episode_key.clone(),
            rip_spec_data: item.rip_spec_data.as_deref().map(|raw| String::from_utf8_lossy(raw).into_owned()),
            metadata_json: item.metadata_json.clone(),
            episodes,
            episode_totals: totals,
            episodes_synchronized: synchronized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spindle_core::{Fingerprint, ProgressRecord};

    fn base_item() -> QueueItem {
        QueueItem {
            id: ItemId::new(1),
            disc_title: "The Matrix".into(),
            source_path: None,
            disc_fingerprint: Fingerprint::new("abc"),
            status: ItemStatus::Completed,
            progress: ProgressRecord::new("organizing", "x"),
            rip_spec_data: None,
            metadata_json: None,
            needs_review: false,
            review_reason: None,
            review_dir_override: None,
            ripped_file: None,
            encoded_file: None,
            final_file: Some("/library/The Matrix (1999).mkv".into()),
            encoding_details_json: None,
            error_message: None,
            background_log_path: None,
            created_at: 1_700_000_000_000,
            updated_at: 1_700_000_100_000,
            active_episode_key: None,
            allow_duplicate: false,
            priority: 0,
        }
    }

    #[test]
    fn completed_non_review_items_force_honest_progress() {
        let dto = QueueItemDto::from(&base_item());
        assert_eq!(dto.progress.stage_label, "Completed");
        assert_eq!(dto.progress.percent, 100.0);
    }

    #[test]
    fn needs_review_preserves_manual_review_label() {
        let mut item = base_item();
        item.status = ItemStatus::Failed;
        item.needs_review = true;
        let dto = QueueItemDto::from(&item);
        assert_eq!(dto.progress.stage_label, "Manual review");
    }

    #[test]
    fn timestamps_are_rfc3339_with_millis() {
        let dto = QueueItemDto::from(&base_item());
        assert!(dto.created_at.contains('T'));
        assert!(dto.created_at.ends_with('Z') || dto.created_at.contains('+'));
    }

    #[test]
    fn episode_totals_count_only_completed_assets() {
        let mut item = base_item();
        item.status = ItemStatus::Encoded;
        let mut envelope = RipSpecEnvelope::new();
        envelope.episodes.push(spindle_core::Episode {
            key: "s01e01".into(),
            season: 1,
            episode: 1,
            title_id: "0".into(),
            episode_title: "Pilot".into(),
            runtime_seconds: 1200,
            output_basename: "x".into(),
        });
        let mut asset = spindle_core::Asset::new("s01e01", "0", "/cache/encoded/s01e01.mkv");
        asset.mark_completed();
        envelope.assets_of_mut(AssetKind::Encoded).push(asset);
        item.rip_spec_data = Some(serde_json::to_vec(&envelope).unwrap());

        let dto = QueueItemDto::from(&item);
        assert_eq!(dto.episode_totals.planned, 1);
        assert_eq!(dto.episode_totals.encoded, 1);
        assert_eq!(dto.episode_totals.ripped, 0);
        assert_eq!(dto.episodes[0].stage, "encoded");
    }
}
