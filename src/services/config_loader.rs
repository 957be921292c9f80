use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::services::cluster_layout::LabelMetrics;

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Ranking server root, e.g. `http://localhost:8890/`.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Directory holding the same payloads as JSON files; wins over `base_url`.
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default = "default_refresh_seconds")]
    pub refresh_seconds: u64,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            data_dir: None,
            refresh_seconds: default_refresh_seconds(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverviewConfig {
    #[serde(default = "default_height")]
    pub height: f64,
    #[serde(default = "default_pad_top")]
    pub pad_top: f64,
    #[serde(default = "default_pad_bottom")]
    pub pad_bottom: f64,
    #[serde(default = "default_label_height")]
    pub label_height: f64,
    #[serde(default = "default_marker_padding")]
    pub marker_padding: f64,
    #[serde(default = "default_transition_seconds")]
    pub transition_seconds: f64,
}

impl Default for OverviewConfig {
    fn default() -> Self {
        Self {
            height: default_height(),
            pad_top: default_pad_top(),
            pad_bottom: default_pad_bottom(),
            label_height: default_label_height(),
            marker_padding: default_marker_padding(),
            transition_seconds: default_transition_seconds(),
        }
    }
}

impl OverviewConfig {
    pub fn label_metrics(&self) -> LabelMetrics {
        LabelMetrics {
            height: self.label_height,
            padding: self.marker_padding,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StandingsConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub overview: OverviewConfig,
}

fn default_refresh_seconds() -> u64 {
    30
}

fn default_request_timeout_seconds() -> u64 {
    10
}

fn default_height() -> f64 {
    480.0
}

fn default_pad_top() -> f64 {
    20.0
}

fn default_pad_bottom() -> f64 {
    10.0
}

fn default_label_height() -> f64 {
    20.0
}

fn default_marker_padding() -> f64 {
    2.0
}

fn default_transition_seconds() -> f64 {
    1.0
}

pub fn load_standings_config(path: &Path) -> Result<StandingsConfig> {
    if !path.exists() {
        info!("{} not found, using defaults", path.display());
        return Ok(StandingsConfig::default());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config at {}", path.display()))?;

    toml::from_str::<StandingsConfig>(&raw)
        .with_context(|| format!("Failed to parse config at {}", path.display()))
}
