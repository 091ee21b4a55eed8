//! Lifecycle event flags produced by the event detector.

use serde::{Deserialize, Serialize};

/// Which lifecycle events one telemetry sample triggered against the
/// existing trip state. Multiple flags may be set on the same tick (a
/// boundary tick usually also sets `arrived_at_dock`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvents {
    /// No existing trip for this vessel
    pub first_trip: bool,
    /// Departing terminal changed: the existing trip is complete and a new
    /// leg begins this tick
    pub boundary: bool,
    /// The at-dock flag flipped false -> true
    pub arrived_at_dock: bool,
    /// Departure became known this tick, either reported explicitly or
    /// inferred from the at-dock flag flipping true -> false
    pub left_dock: bool,
    /// The freshly computed composite key differs from the stored one
    pub key_changed: bool,
}

impl LifecycleEvents {
    /// Whether any event fired at all.
    pub fn any(&self) -> bool {
        self.first_trip || self.boundary || self.arrived_at_dock || self.left_dock || self.key_changed
    }

    /// Whether the trip identity is being reset this tick, which clears
    /// all estimate slots (stale estimates must not survive an identity
    /// change).
    pub fn identity_reset(&self) -> bool {
        self.boundary || self.key_changed
    }

    /// Whether this tick qualifies for a schedule-enrichment lookup.
    /// Enrichment is never run unconditionally: the feed ticks far more
    /// often than lifecycle events occur.
    pub fn qualifies_for_enrichment(&self) -> bool {
        self.arrived_at_dock || self.key_changed
    }
}
