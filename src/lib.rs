//! Harborwatch: Ferry Trip Lifecycle Tracking
//!
//! Reconciles a periodic vessel telemetry feed into durable per-trip state:
//! trip boundaries, departure/arrival detection, schedule enrichment,
//! model-driven time estimates, and estimate grading against observed
//! outcomes.
//!
//! ## Architecture
//!
//! - **Event Detector**: classifies each sample into lifecycle events
//! - **Trip Builder**: pure construction of the complete next trip state
//! - **Estimate Engine**: linear models over RBF time-of-day features
//! - **Actualizer**: grades estimates once outcomes are observed
//! - **Coordinator**: per-tick orchestration with batched storage writes

pub mod config;
pub mod enrichment;
pub mod estimate;
pub mod pipeline;
pub mod storage;
pub mod types;

// Re-export tracker configuration
pub use config::TrackerConfig;

// Re-export core domain types
pub use types::{
    composite_key, Estimate, EstimateModel, EstimateSlot, EstimateSlots, LifecycleEvents,
    ModelKey, ModelType, PredictionRecord, ScheduleSnapshot, TelemetrySample, Trip,
};

// Re-export the pipeline surface
pub use pipeline::{JsonlReplay, TelemetrySource, TickBatch, TickStats, TripCoordinator};

// Re-export estimate components
pub use estimate::{EstimateEngine, EstimateOutcome, GradeClass, SkipReason};

// Re-export storage
pub use storage::{
    InMemoryModelStore, InMemoryScheduleStore, ModelStore, ScheduleStore, SledModelStore,
    SledScheduleStore, SledTripStore, StoreError, TripStore,
};
