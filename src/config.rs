//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.fixmetrics.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::aggregate::AggregateOptions;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Object storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Trend and retention window settings.
    #[serde(default)]
    pub windows: WindowsConfig,
}

/// Object storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Bucket holding raw events and the metrics document.
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Key prefix the event partitions live under.
    #[serde(default = "default_events_prefix")]
    pub events_prefix: String,

    /// Key the metrics document is published at.
    #[serde(default = "default_output_key")]
    pub output_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            events_prefix: default_events_prefix(),
            output_key: default_output_key(),
        }
    }
}

fn default_bucket() -> String {
    "bazel-metrics-data".to_string()
}

fn default_events_prefix() -> String {
    "ai-fix-events/".to_string()
}

fn default_output_key() -> String {
    "ai-fix-metrics.json".to_string()
}

/// Trend and retention window settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowsConfig {
    /// Raw events older than this many days are swept after aggregation.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Length of the daily trend window, in days.
    #[serde(default = "default_trend_days")]
    pub trend_days: u32,

    /// Length of the weekly trend window, in ISO weeks.
    #[serde(default = "default_trend_weeks")]
    pub trend_weeks: u32,
}

impl Default for WindowsConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            trend_days: default_trend_days(),
            trend_weeks: default_trend_weeks(),
        }
    }
}

fn default_retention_days() -> u32 {
    7
}

fn default_trend_days() -> u32 {
    30
}

fn default_trend_weeks() -> u32 {
    26
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(".fixmetrics.toml");

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings; only values
    /// the user actually provided are applied.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref bucket) = args.bucket {
            self.storage.bucket = bucket.clone();
        }
        if let Some(ref prefix) = args.events_prefix {
            self.storage.events_prefix = prefix.clone();
        }
        if let Some(ref key) = args.output_key {
            self.storage.output_key = key.clone();
        }
        if let Some(days) = args.retention_days {
            self.windows.retention_days = days;
        }
        if let Some(days) = args.trend_days {
            self.windows.trend_days = days;
        }
        if let Some(weeks) = args.trend_weeks {
            self.windows.trend_weeks = weeks;
        }
    }

    /// Window settings in the shape the aggregator takes.
    pub fn aggregate_options(&self) -> AggregateOptions {
        AggregateOptions {
            trend_days: self.windows.trend_days,
            trend_weeks: self.windows.trend_weeks,
            retention_days: self.windows.retention_days,
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
