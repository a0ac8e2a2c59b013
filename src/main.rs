//! FixMetrics - Test-Fix Event Metrics Aggregator
//!
//! A CLI batch job that reads raw fix/apply event JSONs from a GCS bucket,
//! folds them into a single dashboard-ready metrics document, publishes it,
//! and sweeps raw events older than the retention window.
//!
//! Exit codes:
//!   0 - Success (aggregation published, or dry run completed)
//!   1 - Runtime error (storage unreachable, config failure, etc.)

mod aggregate;
mod cli;
mod config;
mod loader;
mod models;
mod publisher;
mod storage;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::Args;
use config::Config;
use models::MetricsDocument;
use storage::gcs::GcsStore;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("FixMetrics v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    // Run the aggregation
    match run_aggregation(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Aggregation failed: {}", e);
            eprintln!("\n❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .fixmetrics.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(".fixmetrics.toml");

    if path.exists() {
        eprintln!("⚠️  .fixmetrics.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write .fixmetrics.toml")?;

    println!("✅ Created .fixmetrics.toml with default settings.");
    println!("   Edit it to customize bucket, key names, and window lengths.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the complete aggregation pipeline: load, aggregate, publish, sweep.
async fn run_aggregation(args: Args) -> Result<()> {
    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let bucket = config.storage.bucket.clone();
    let events_prefix = config.storage.events_prefix.clone();
    let output_key = config.storage.output_key.clone();

    println!("📥 Connecting to gs://{}...", bucket);
    let store = GcsStore::connect(&bucket)
        .await
        .context("Failed to connect to GCS")?;

    println!("   Loading existing metrics from gs://{}/{}...", bucket, output_key);
    let previous = loader::load_previous(&store, &output_key).await?;
    if previous.is_none() {
        info!("No usable previous document, starting from zero state");
    }

    println!("   Loading raw events from gs://{}/{}...", bucket, events_prefix);
    let events = loader::load_events(&store, &events_prefix).await?;
    println!("   Found {} raw events", events.len());

    println!("\n🧮 Aggregating...");
    let now = Utc::now();
    let document = aggregate::aggregate(previous, &events, now, &config.aggregate_options());

    print_summary(&document);

    if args.dry_run {
        let public = serde_json::to_string_pretty(&document.public_value())
            .context("Failed to render public document")?;
        println!("\n{}", public);
        println!("\n✅ Dry run complete. Nothing was uploaded or deleted.");
        return Ok(());
    }

    println!("\n📤 Uploading to gs://{}/{}...", bucket, output_key);
    publisher::publish(&store, &output_key, &document).await?;

    // Only sweep after the new document is safely published: a crash before
    // this point leaves events unprocessed-but-undeleted, which the next
    // run absorbs idempotently.
    println!("🧹 Sweeping events older than {} days...", config.windows.retention_days);
    let deleted =
        publisher::sweep_expired(&store, &events_prefix, config.windows.retention_days, now)
            .await?;
    println!("   Deleted {} expired events", deleted);

    println!("\n✅ Done!");
    Ok(())
}

/// Print the console summary of the published document.
fn print_summary(document: &MetricsDocument) {
    let s = &document.summary;
    println!("\n📊 Aggregation Summary:");
    println!("   Total invocations: {}", s.total_invocations);
    println!("   Successful: {}", s.successful_fixes);
    println!("   Failed: {}", s.failed_fixes);
    println!("   Disabled: {}", s.tests_disabled);
    println!("   Auto-applied: {}", s.auto_applied_fixes);
    println!("   User-applied: {}", s.user_applied_fixes);
    println!("   Disabled tests tracked: {}", document.disabled_tests.len());
    println!("   Recent runs: {}", document.recent_runs.len());
    println!("   Daily trend entries: {}", document.daily_trend.len());
    println!("   Weekly trend entries: {}", document.weekly_trend.len());
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from .fixmetrics.toml");
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
