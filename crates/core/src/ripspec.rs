// SPDX-License-Identifier: MIT

//! The rip-spec envelope: titles, episodes, and per-stage assets embedded
//! inside a queue item's `rip_spec_data`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One disc title as reported by the identifier stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Title {
    pub id: String,
    pub name: String,
    pub duration_seconds: u64,
}

/// One episode (or, for a movie, the sole entry) keyed `sSSeEE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub key: String,
    pub season: u32,
    pub episode: u32,
    pub title_id: String,
    pub episode_title: String,
    pub runtime_seconds: u64,
    pub output_basename: String,
}

/// Which pipeline stage produced an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Ripped,
    Encoded,
    Subtitled,
    Final,
}

crate::simple_display! {
    AssetKind {
        Ripped => "ripped",
        Encoded => "encoded",
        Subtitled => "subtitled",
        Final => "final",
    }
}

/// Per-asset completion status. Deliberately a closed three-way rather
/// than a richer enum — `status` round-trips through `rip_spec_data` as
/// plain JSON and must match what every stage handler writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    #[serde(rename = "")]
    Pending,
    Completed,
    Failed,
}

impl Default for AssetStatus {
    fn default() -> Self {
        AssetStatus::Pending
    }
}

/// A single produced (or attempted) file for one episode at one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub episode_key: String,
    pub title_id: String,
    pub path: String,
    #[serde(default)]
    pub status: AssetStatus,
    #[serde(default)]
    pub error_msg: Option<String>,
    #[serde(default)]
    pub subtitles_muxed: bool,
}

impl Asset {
    pub fn new(episode_key: impl Into<String>, title_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            episode_key: episode_key.into(),
            title_id: title_id.into(),
            path: path.into(),
            status: AssetStatus::Pending,
            error_msg: None,
            subtitles_muxed: false,
        }
    }

    pub fn mark_completed(&mut self) {
        self.status = AssetStatus::Completed;
        self.error_msg = None;
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = AssetStatus::Failed;
        self.error_msg = Some(message.into());
    }
}

/// The full structured value embedded in a queue item's `rip_spec_data`.
///
/// Grouped by [`AssetKind`] per spec: `assets[kind]` is the list of assets
/// produced by that stage, one (ideally) per episode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RipSpecEnvelope {
    #[serde(default)]
    pub titles: Vec<Title>,
    #[serde(default)]
    pub episodes: Vec<Episode>,
    #[serde(default)]
    pub assets: BTreeMap<AssetKind, Vec<Asset>>,
    /// Open map for collaborator-specific data (content-id match results,
    /// subtitle generation summaries, ...). Intentionally untyped: new
    /// producers add keys without requiring an envelope schema change.
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl RipSpecEnvelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assets_of(&self, kind: AssetKind) -> &[Asset] {
        self.assets.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn assets_of_mut(&mut self, kind: AssetKind) -> &mut Vec<Asset> {
        self.assets.entry(kind).or_default()
    }

    /// Episode key lookup is case-insensitive (I-4 rip-spec round-trip).
    pub fn episode(&self, key: &str) -> Option<&Episode> {
        self.episodes.iter().find(|e| e.key.eq_ignore_ascii_case(key))
    }

    /// True once every episode has a completed asset of `kind`.
    pub fn all_episodes_have_completed(&self, kind: AssetKind) -> bool {
        if self.episodes.is_empty() {
            return false;
        }
        self.episodes.iter().all(|ep| {
            self.assets_of(kind)
                .iter()
                .any(|a| a.episode_key == ep.key && a.status == AssetStatus::Completed)
        })
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: Value) {
        self.attributes.insert(key.into(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode(key: &str) -> Episode {
        Episode {
            key: key.to_string(),
            season: 1,
            episode: 1,
            title_id: "0".to_string(),
            episode_title: "Pilot".to_string(),
            runtime_seconds: 1200,
            output_basename: "Show - s01e01".to_string(),
        }
    }

    #[test]
    fn assets_of_kind_defaults_to_empty() {
        let env = RipSpecEnvelope::new();
        assert!(env.assets_of(AssetKind::Ripped).is_empty());
    }

    #[test]
    fn all_episodes_have_completed_requires_every_episode() {
        let mut env = RipSpecEnvelope::new();
        env.episodes.push(episode("s01e01"));
        env.episodes.push(episode("s01e02"));
        assert!(!env.all_episodes_have_completed(AssetKind::Ripped));

        let mut a1 = Asset::new("s01e01", "0", "/tmp/a.mkv");
        a1.mark_completed();
        env.assets_of_mut(AssetKind::Ripped).push(a1);
        assert!(!env.all_episodes_have_completed(AssetKind::Ripped));

        let mut a2 = Asset::new("s01e02", "0", "/tmp/b.mkv");
        a2.mark_completed();
        env.assets_of_mut(AssetKind::Ripped).push(a2);
        assert!(env.all_episodes_have_completed(AssetKind::Ripped));
    }

    #[test]
    fn asset_status_empty_string_round_trips_as_pending() {
        let asset = Asset::new("s01e01", "0", "/tmp/a.mkv");
        let json = serde_json::to_string(&asset).unwrap();
        assert!(json.contains("\"status\":\"\""));
        let back: Asset = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, AssetStatus::Pending);
    }
}
