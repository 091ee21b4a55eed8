//! Harborwatch - Ferry Trip Lifecycle Tracker
//!
//! Reconciles periodic vessel telemetry into durable trip state with
//! model-driven departure/arrival estimates.
//!
//! # Usage
//!
//! ```bash
//! # Replay a recorded telemetry file (one JSON array of samples per line)
//! cargo run --release -- --replay telemetry.jsonl
//!
//! # Replay paced at the configured tick interval
//! cargo run --release -- --replay telemetry.jsonl --paced
//!
//! # Live mode: re-read a snapshot file every tick until Ctrl+C
//! cargo run --release -- --watch /var/run/fleet.json
//! ```
//!
//! # Environment Variables
//!
//! - `HARBORWATCH_CONFIG`: Path to a TOML config file
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use harborwatch::config;
use harborwatch::pipeline::{
    JsonlReplay, SnapshotPoll, TelemetrySource, TickBatch, TickStats, TripCoordinator,
};
use harborwatch::storage::{SledModelStore, SledScheduleStore, SledTripStore};
use harborwatch::TrackerConfig;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "harborwatch")]
#[command(about = "Ferry trip lifecycle tracking and estimate grading")]
#[command(version)]
struct CliArgs {
    /// Path to a TOML config file (overrides HARBORWATCH_CONFIG)
    #[arg(long)]
    config: Option<String>,

    /// Replay telemetry from a JSONL file (one tick batch per line)
    #[arg(long, value_name = "PATH", conflicts_with = "watch")]
    replay: Option<String>,

    /// Live mode: re-read a snapshot file (one JSON array) every tick
    #[arg(long, value_name = "PATH", required_unless_present = "replay")]
    watch: Option<String>,

    /// Override the sled database path from the config
    #[arg(long)]
    store: Option<String>,

    /// Pace the replay at the configured tick interval instead of running
    /// flat out
    #[arg(long)]
    paced: bool,

    /// Print the most recent N prediction-history records after the replay
    #[arg(long, value_name = "N")]
    show_predictions: Option<usize>,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let mut tracker_config = match &args.config {
        Some(path) => TrackerConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {path}"))?,
        None => TrackerConfig::load(),
    };
    if let Some(store_path) = &args.store {
        tracker_config.store.path = store_path.clone();
    }

    info!("Harborwatch - Ferry Trip Lifecycle Tracker");
    info!(
        tick_secs = tracker_config.engine.tick_interval_secs,
        store = %tracker_config.store.path,
        "Configuration loaded"
    );

    let tick_interval = std::time::Duration::from_secs(tracker_config.engine.tick_interval_secs);
    let io_timeout = std::time::Duration::from_millis(tracker_config.engine.collaborator_timeout_ms);
    let minimum_gap = tracker_config.estimates.minimum_gap_minutes;
    let store_path = tracker_config.store.path.clone();
    let retention = tracker_config.store.prediction_retention;
    config::init(tracker_config);

    // One database file; each store owns its own trees.
    let db = sled::open(&store_path)
        .with_context(|| format!("Failed to open trip database at {store_path}"))?;
    let trips = Arc::new(SledTripStore::from_db(&db)?);
    let models = Arc::new(SledModelStore::from_db(&db)?);
    let schedules = Arc::new(SledScheduleStore::from_db(&db)?);

    let pruned = trips.prune_predictions(retention)?;
    if pruned > 0 {
        info!(pruned, retention, "Pruned old prediction-history records");
    }

    let coordinator = TripCoordinator::new(
        trips.clone(),
        models,
        schedules,
        minimum_gap,
        io_timeout,
    );

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, finishing current tick...");
        shutdown_token.cancel();
    });

    // Watch mode is always paced; replay paces only when asked to.
    let (mut source, pace): (Box<dyn TelemetrySource>, Option<std::time::Duration>) =
        match (&args.replay, &args.watch) {
            (Some(path), _) => (
                Box::new(
                    JsonlReplay::open(path)
                        .with_context(|| format!("Failed to open replay file {path}"))?,
                ),
                args.paced.then_some(tick_interval),
            ),
            (None, Some(path)) => (Box::new(SnapshotPoll::new(path)), Some(tick_interval)),
            (None, None) => anyhow::bail!("one of --replay or --watch is required"),
        };

    let totals = run_replay(&coordinator, source.as_mut(), pace, cancel_token).await?;

    info!(
        samples = totals.samples_seen,
        upserts = totals.upserts,
        noops = totals.noops,
        boundaries = totals.boundaries,
        estimates = totals.estimates_computed,
        graded = totals.predictions_recorded,
        "Run complete"
    );

    if let Some(limit) = args.show_predictions {
        use harborwatch::storage::TripStore;
        for record in trips.recent_predictions(limit).await? {
            info!(
                trip = %record.trip_key,
                slot = %record.slot,
                delta_total = record.delta_total,
                delta_range = record.delta_range,
                "Prediction"
            );
        }
    }

    trips.flush()?;
    info!("Harborwatch shutdown complete");
    Ok(())
}

/// Drive the coordinator from a telemetry source until it is exhausted or
/// shutdown is requested.
async fn run_replay(
    coordinator: &TripCoordinator,
    source: &mut dyn TelemetrySource,
    pace: Option<std::time::Duration>,
    cancel_token: CancellationToken,
) -> Result<TickStats> {
    let mut totals = TickStats::default();
    let mut ticks = 0u64;

    loop {
        if cancel_token.is_cancelled() {
            info!(ticks, "Stopping on shutdown signal");
            break;
        }

        let batch = match source.next_batch().await {
            Ok(TickBatch::Batch(samples)) => samples,
            Ok(TickBatch::Eof) => {
                info!(ticks, "Telemetry source exhausted");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Telemetry source failed");
                return Err(e);
            }
        };

        ticks += 1;
        match coordinator.run_tick(&batch).await {
            Ok(stats) => totals.absorb(stats),
            Err(e) => {
                // A tick-level failure (store unavailable) is logged and the
                // next tick retried from persisted state.
                warn!(tick = ticks, error = %e, "Tick failed");
            }
        }

        if let Some(interval) = pace {
            tokio::select! {
                _ = cancel_token.cancelled() => {}
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    Ok(totals)
}
