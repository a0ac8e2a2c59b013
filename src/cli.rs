//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values. Every storage and window
//! setting is optional here: unset values fall back to the config file,
//! then to the built-in defaults.

use clap::Parser;
use std::path::PathBuf;

/// FixMetrics - aggregate automated test-fix events into dashboard metrics
///
/// Reads raw fix/apply event JSONs from a GCS bucket, folds them into the
/// published metrics document, and cleans up events older than the
/// retention window.
///
/// Examples:
///   fixmetrics
///   fixmetrics --bucket my-metrics-bucket --retention-days 14
///   fixmetrics --dry-run
///   fixmetrics --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// GCS bucket holding the raw events and the metrics document
    #[arg(short, long, value_name = "NAME", env = "FIXMETRICS_BUCKET")]
    pub bucket: Option<String>,

    /// Key prefix the event partitions live under
    ///
    /// Events are read from <prefix>/post-merge/, <prefix>/pre-merge/ and
    /// <prefix>/user-applied/.
    #[arg(long, value_name = "PREFIX", env = "FIXMETRICS_EVENTS_PREFIX")]
    pub events_prefix: Option<String>,

    /// Key the aggregated metrics document is published at
    #[arg(short, long, value_name = "KEY", env = "FIXMETRICS_OUTPUT_KEY")]
    pub output_key: Option<String>,

    /// Raw events older than this many days are deleted after aggregation
    #[arg(long, value_name = "DAYS")]
    pub retention_days: Option<u32>,

    /// Length of the daily trend window, in days
    #[arg(long, value_name = "DAYS")]
    pub trend_days: Option<u32>,

    /// Length of the weekly trend window, in ISO weeks
    #[arg(long, value_name = "WEEKS")]
    pub trend_weeks: Option<u32>,

    /// Print the public document instead of publishing
    ///
    /// Aggregates as usual, prints the dashboard-visible fields as pretty
    /// JSON, and skips both the upload and the retention sweep.
    #[arg(long)]
    pub dry_run: bool,

    /// Path to configuration file
    ///
    /// If not specified, looks for .fixmetrics.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Generate a default .fixmetrics.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(ref bucket) = self.bucket {
            if bucket.is_empty() {
                return Err("Bucket name must not be empty".to_string());
            }
        }

        if let Some(ref prefix) = self.events_prefix {
            if prefix.trim_matches('/').is_empty() {
                return Err("Events prefix must not be empty".to_string());
            }
        }

        if let Some(ref key) = self.output_key {
            if key.is_empty() {
                return Err("Output key must not be empty".to_string());
            }
        }

        if self.retention_days == Some(0) {
            return Err("Retention must be at least 1 day".to_string());
        }

        if self.trend_days == Some(0) {
            return Err("Daily trend window must be at least 1 day".to_string());
        }

        if self.trend_weeks == Some(0) {
            return Err("Weekly trend window must be at least 1 week".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
