// SPDX-License-Identifier: MIT

//! `spindle.toml` settings: the tunables shared across daemon, engine, and
//! cache layers, parsed once at startup and handed down as an `Arc`.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_cache_max_gib() -> f64 {
    200.0
}

fn default_stage_timeout_secs() -> u64 {
    6 * 60 * 60
}

fn default_identify_timeout_secs() -> u64 {
    2 * 60
}

/// External tool invocation paths. Each defaults to the bare command name,
/// resolved against `$PATH` at call time, and may be overridden to an
/// absolute path for non-standard installs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPaths {
    #[serde(default = "ToolPaths::default_makemkv")]
    pub makemkv: String,
    #[serde(default = "ToolPaths::default_ffmpeg")]
    pub ffmpeg: String,
    #[serde(default = "ToolPaths::default_handbrake")]
    pub handbrake: String,
}

impl ToolPaths {
    fn default_makemkv() -> String {
        "makemkvcon".to_string()
    }
    fn default_ffmpeg() -> String {
        "ffmpeg".to_string()
    }
    fn default_handbrake() -> String {
        "HandBrakeCLI".to_string()
    }
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            makemkv: Self::default_makemkv(),
            ffmpeg: Self::default_ffmpeg(),
            handbrake: Self::default_handbrake(),
        }
    }
}

/// Parsed, validated contents of `spindle.toml`.
///
/// Round-trips unknown tables through `extra` so a stage-handler-specific
/// settings block can be added without a `Settings` schema change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_cache_max_gib")]
    pub cache_max_gib: f64,

    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,

    #[serde(default = "default_identify_timeout_secs")]
    pub identify_timeout_secs: u64,

    #[serde(default)]
    pub tools: ToolPaths,

    #[serde(default)]
    pub review_dir: Option<String>,

    #[serde(default)]
    pub log_level: Option<String>,

    #[serde(flatten)]
    pub extra: HashMap<String, toml::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_max_gib: default_cache_max_gib(),
            stage_timeout_secs: default_stage_timeout_secs(),
            identify_timeout_secs: default_identify_timeout_secs(),
            tools: ToolPaths::default(),
            review_dir: None,
            log_level: None,
            extra: HashMap::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, #[source] source: std::io::Error },
    #[error("failed to parse {path} as toml: {source}")]
    Parse { path: String, #[source] source: Box<toml::de::Error> },
}

impl Settings {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
        Self::from_toml_str(&raw)
            .map_err(|source| ConfigError::Parse { path: path.display().to_string(), source: Box::new(source) })
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn identify_timeout(&self) -> Duration {
        Duration::from_secs(self.identify_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let s = Settings::default();
        assert_eq!(s.cache_max_gib, 200.0);
        assert_eq!(s.tools.ffmpeg, "ffmpeg");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let s = Settings::load(std::path::Path::new("/nonexistent/spindle.toml")).unwrap();
        assert_eq!(s.cache_max_gib, default_cache_max_gib());
    }

    #[test]
    fn partial_toml_fills_remaining_defaults() {
        let s = Settings::from_toml_str("cache_max_gib = 50.0\n").unwrap();
        assert_eq!(s.cache_max_gib, 50.0);
        assert_eq!(s.stage_timeout_secs, default_stage_timeout_secs());
    }

    #[test]
    fn unknown_tables_round_trip_through_extra() {
        let s = Settings::from_toml_str("[encoder]\npreset = \"slow\"\n").unwrap();
        assert!(s.extra.contains_key("encoder"));
    }
}
