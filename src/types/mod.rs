//! Core domain types for the trip reconciliation engine.
//!
//! Split by concern:
//! - `telemetry`: the per-tick feed sample (ephemeral, untrusted)
//! - `trip`: the authoritative trip record, estimate slots, composite keys
//! - `schedule`: schedule snapshot attached to trips by enrichment
//! - `model`: estimate model payloads and the closed model-type enumeration
//! - `events`: lifecycle event flags produced by the event detector

mod events;
mod model;
mod schedule;
mod telemetry;
mod trip;

pub use events::LifecycleEvents;
pub use model::{EstimateModel, ModelKey, ModelType, TrainingMetrics};
pub use schedule::ScheduleSnapshot;
pub use telemetry::{sample_quality, SampleQuality, TelemetrySample};
pub use trip::{
    composite_key, minutes_between, round_minutes, Estimate, EstimateSlot, EstimateSlots,
    PredictionRecord, Trip,
};

/// Milliseconds per minute, the conversion factor between model output
/// (minutes) and absolute epoch-millisecond timestamps.
pub const MS_PER_MINUTE: f64 = 60_000.0;
