//! Built-in defaults and fixed engine constants.
//!
//! Tunables here mirror the TOML config fields; the RBF constants are part
//! of the trained feature contract and are deliberately not configurable —
//! changing them without retraining every model would silently skew all
//! predictions.

/// Seconds between orchestration passes.
pub const TICK_INTERVAL_SECS: u64 = 30;

/// Per-call timeout for collaborator I/O (schedule lookups, model loads).
/// A timed-out call is a miss, never a blocking condition.
pub const COLLABORATOR_TIMEOUT_MS: u64 = 1_500;

/// Minimum minutes between the reference time and any predicted time.
/// Protects against physically impossible predictions in the past.
pub const MINIMUM_GAP_MINUTES: f64 = 1.0;

/// Default sled database path.
pub const STORE_PATH: &str = "./data/harborwatch_db";

/// Prediction-history records kept across restarts; the oldest beyond this
/// are pruned at startup.
pub const PREDICTION_RETENTION: usize = 10_000;

/// Number of Gaussian radial-basis centers encoding time-of-day.
pub const RBF_CENTER_COUNT: usize = 8;

/// Spacing between RBF centers, in hours (centers at 0, 3, ..., 21).
pub const RBF_CENTER_SPACING_HOURS: f64 = 3.0;

/// Adaptive RBF width: half the center spacing.
pub const RBF_SIGMA_HOURS: f64 = RBF_CENTER_SPACING_HOURS / 2.0;
