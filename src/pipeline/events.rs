//! Event Detector
//!
//! Classifies one telemetry sample against the previously persisted trip
//! state into lifecycle event flags. Pure and side-effect free; everything
//! downstream (builder, enrichment, estimates) keys off these flags.

use crate::types::{composite_key, LifecycleEvents, TelemetrySample, Trip};

/// Classify a sample against the existing trip (if any).
pub fn detect(existing: Option<&Trip>, sample: &TelemetrySample) -> LifecycleEvents {
    let Some(trip) = existing else {
        return LifecycleEvents {
            first_trip: true,
            // A first observation at the dock still counts as an arrival
            // event for enrichment purposes.
            arrived_at_dock: sample.at_dock,
            ..LifecycleEvents::default()
        };
    };

    let boundary = trip.departing_terminal != sample.departing_terminal;
    let arrived_at_dock = !trip.at_dock && sample.at_dock;

    // Departure becomes known either from an explicit feed timestamp or
    // inferred from the at-dock flag flipping false before the feed reports
    // one. The fill-once guard lives in `trip.left_dock.is_none()`.
    let left_dock = !boundary
        && trip.left_dock.is_none()
        && (sample.left_dock.is_some() || (trip.at_dock && !sample.at_dock));

    let key_changed = !boundary && fresh_key(trip, sample) != trip.key;

    LifecycleEvents {
        first_trip: false,
        boundary,
        arrived_at_dock,
        left_dock,
        key_changed,
    }
}

/// The departure timestamp this tick establishes, when `left_dock` fired:
/// the explicit feed value when present, else the sample's own timestamp
/// (the inference case).
pub fn effective_left_dock(sample: &TelemetrySample) -> u64 {
    sample.left_dock.unwrap_or(sample.timestamp)
}

/// Recompute the composite key for a continuing (non-boundary) update.
///
/// Key inputs follow the same fill-once protection as the fields
/// themselves: an absent sample value falls back to the stored one, so a
/// feed dropout never flips the key back to its unresolved form.
pub fn fresh_key(trip: &Trip, sample: &TelemetrySample) -> String {
    let arriving = sample
        .arriving_terminal
        .as_deref()
        .or(trip.arriving_terminal.as_deref());
    let scheduled = sample.scheduled_departure.or(trip.scheduled_departure);
    composite_key(&sample.vessel_id, &sample.departing_terminal, arriving, scheduled)
}
