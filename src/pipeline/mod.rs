//! Reconciliation pipeline: event detection, pure state construction,
//! change detection, and the per-tick orchestrator that wires them to the
//! stores.

pub mod builder;
pub mod coordinator;
pub mod diff;
pub mod events;
pub mod source;

pub use builder::{build_next, finalize, BuildContext};
pub use coordinator::{TickStats, TripCoordinator};
pub use diff::needs_write;
pub use events::detect;
pub use source::{JsonlReplay, SnapshotPoll, TelemetrySource, TickBatch};
