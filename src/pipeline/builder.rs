//! Trip State Builder
//!
//! Pure construction of the complete next trip state from one telemetry
//! sample plus context. Always emits a whole `Trip` value — never a partial
//! patch — so the change detector is a plain value comparison and the
//! reconciliation is auditable field by field.
//!
//! Field rules (see each block below):
//! - identity is recomputed from the sample; at a boundary nothing is
//!   carried across from the old trip except the explicit prev-* context
//! - scheduled-departure, eta, and left-dock fill once and are protected
//!   against later absent upstream values
//! - estimate slots are carried unchanged, except an identity reset
//!   (boundary or key change) clears all of them

use crate::types::{
    composite_key, minutes_between, EstimateSlots, LifecycleEvents, ScheduleSnapshot,
    TelemetrySample, Trip,
};

use super::events::effective_left_dock;

/// Everything `build_next` is allowed to see. All I/O (enrichment lookups)
/// happens before construction; the builder itself is pure.
#[derive(Debug)]
pub struct BuildContext<'a> {
    pub sample: &'a TelemetrySample,
    pub existing: Option<&'a Trip>,
    /// The just-completed predecessor leg, present only at a boundary.
    pub completed: Option<&'a Trip>,
    pub events: LifecycleEvents,
    /// Schedule-inferred arriving terminal, supplied by enrichment.
    pub inferred_arrival: Option<&'a str>,
    /// Schedule snapshot from enrichment, when a lookup hit this tick.
    pub snapshot: Option<&'a ScheduleSnapshot>,
}

/// Build the complete next trip state.
///
/// Deterministic: identical inputs yield identical output.
pub fn build_next(ctx: &BuildContext<'_>) -> Trip {
    let sample = ctx.sample;
    let events = ctx.events;
    let fresh_identity = events.first_trip || events.boundary;

    // === Identity: always from the sample ===
    let vessel_id = sample.vessel_id.clone();
    let departing_terminal = sample.departing_terminal.clone();

    // Arriving terminal: at a boundary strictly from the sample (the old
    // trip's arriving terminal equals the new departing terminal and must
    // never leak across). Otherwise sample > schedule-inferred > existing.
    let arriving_terminal = if events.boundary {
        sample.arriving_terminal.clone()
    } else {
        sample
            .arriving_terminal
            .clone()
            .or_else(|| ctx.inferred_arrival.map(str::to_string))
            .or_else(|| ctx.existing.and_then(|t| t.arriving_terminal.clone()))
    };

    // === Timing ===
    let trip_start = if fresh_identity {
        sample.timestamp
    } else {
        // continuing update: carried unchanged
        ctx.existing.map(|t| t.trip_start).unwrap_or(sample.timestamp)
    };

    let scheduled_departure = if fresh_identity {
        sample.scheduled_departure
    } else {
        sample
            .scheduled_departure
            .or_else(|| ctx.existing.and_then(|t| t.scheduled_departure))
    };

    // Left-dock: a boundary starts the new leg still at the dock, so any
    // sample value belongs to the completed predecessor and is dropped.
    let left_dock = if events.boundary {
        None
    } else {
        let this_tick = sample.left_dock.or_else(|| {
            if events.left_dock {
                Some(effective_left_dock(sample))
            } else {
                None
            }
        });
        this_tick.or_else(|| ctx.existing.and_then(|t| t.left_dock))
    };

    let eta = if events.boundary {
        sample.eta
    } else {
        sample.eta.or_else(|| ctx.existing.and_then(|t| t.eta))
    };

    let key = composite_key(
        &vessel_id,
        &departing_terminal,
        arriving_terminal.as_deref(),
        scheduled_departure,
    );

    // === Derived durations (only when both endpoints are known) ===
    let at_dock_minutes = left_dock.map(|left| minutes_between(trip_start, left));
    let delay_minutes = match (scheduled_departure, left_dock) {
        (Some(sched), Some(left)) => Some(minutes_between(sched, left)),
        _ => None,
    };

    // === Previous-leg context ===
    // Boundary: explicitly copied from the just-completed trip.
    // Otherwise carried unchanged.
    let (prev_terminal, prev_scheduled_departure, prev_left_dock) = if events.boundary {
        match ctx.completed {
            Some(done) => (
                Some(done.departing_terminal.clone()),
                done.scheduled_departure,
                done.left_dock,
            ),
            None => (None, None, None),
        }
    } else if events.first_trip {
        (None, None, None)
    } else {
        match ctx.existing {
            Some(t) => (
                t.prev_terminal.clone(),
                t.prev_scheduled_departure,
                t.prev_left_dock,
            ),
            None => (None, None, None),
        }
    };

    // === Estimate slots ===
    // Carried unchanged; an identity reset clears them all so estimates
    // from the old identity cannot survive.
    let estimates = if events.identity_reset() || events.first_trip {
        EstimateSlots::default()
    } else {
        ctx.existing
            .map(|t| t.estimates.clone())
            .unwrap_or_default()
    };

    // === Schedule snapshot ===
    let schedule = if events.identity_reset() || events.first_trip {
        ctx.snapshot.cloned()
    } else {
        ctx.snapshot
            .cloned()
            .or_else(|| ctx.existing.and_then(|t| t.schedule.clone()))
    };

    Trip {
        vessel_id,
        departing_terminal,
        arriving_terminal,
        key,
        trip_start,
        scheduled_departure,
        left_dock,
        eta,
        trip_end: None,
        at_dock: sample.at_dock,
        at_dock_minutes,
        at_sea_minutes: None,
        total_minutes: None,
        delay_minutes,
        prev_terminal,
        prev_scheduled_departure,
        prev_left_dock,
        estimates,
        schedule,
        last_observed: sample.timestamp,
    }
}

/// Complete a trip at a boundary: stamp the end time and compute the
/// durations that need it. The archive layer rejects any trip reaching it
/// without an end timestamp.
pub fn finalize(existing: &Trip, end: u64) -> Trip {
    let mut done = existing.clone();
    done.trip_end = Some(end);
    done.at_sea_minutes = done.left_dock.map(|left| minutes_between(left, end));
    done.total_minutes = Some(minutes_between(done.trip_start, end));
    done.delay_minutes = done.computed_delay().or(done.delay_minutes);
    done.last_observed = end;
    done
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pipeline::events::detect;
    use crate::types::Estimate;

    /// Sample at the dock with a resolved arriving terminal and schedule.
    pub(crate) fn sample_at_dock(vessel: &str, departing: &str, ts: u64) -> TelemetrySample {
        TelemetrySample {
            vessel_id: vessel.to_string(),
            departing_terminal: departing.to_string(),
            arriving_terminal: Some("BBI".to_string()),
            latitude: 47.6,
            longitude: -122.3,
            at_dock: true,
            in_service: true,
            scheduled_departure: Some(ts + 600_000),
            eta: None,
            left_dock: None,
            timestamp: ts,
        }
    }

    /// An existing trip consistent with `sample_at_dock`.
    pub(crate) fn existing_trip(vessel: &str, departing: &str, arriving: &str, start: u64) -> Trip {
        let scheduled = Some(start + 600_000);
        Trip {
            vessel_id: vessel.to_string(),
            departing_terminal: departing.to_string(),
            arriving_terminal: Some(arriving.to_string()),
            key: composite_key(vessel, departing, Some(arriving), scheduled),
            trip_start: start,
            scheduled_departure: scheduled,
            left_dock: None,
            eta: None,
            trip_end: None,
            at_dock: true,
            at_dock_minutes: None,
            at_sea_minutes: None,
            total_minutes: None,
            delay_minutes: None,
            prev_terminal: None,
            prev_scheduled_departure: None,
            prev_left_dock: None,
            estimates: EstimateSlots::default(),
            schedule: None,
            last_observed: start,
        }
    }

    pub(crate) fn dummy_estimate(predicted: u64) -> Estimate {
        Estimate {
            predicted,
            min: predicted.saturating_sub(120_000),
            max: predicted + 120_000,
            mae: 1.5,
            std_dev: 2.0,
            actual: None,
            delta_total: None,
            delta_range: None,
        }
    }

    fn ctx<'a>(
        sample: &'a TelemetrySample,
        existing: Option<&'a Trip>,
        completed: Option<&'a Trip>,
    ) -> BuildContext<'a> {
        BuildContext {
            sample,
            existing,
            completed,
            events: detect(existing, sample),
            inferred_arrival: None,
            snapshot: None,
        }
    }

    #[test]
    fn test_build_next_is_pure() {
        let sample = sample_at_dock("WALLA", "SEA", 1_000_000);
        let existing = existing_trip("WALLA", "SEA", "BBI", 500_000);
        let context = ctx(&sample, Some(&existing), None);
        assert_eq!(build_next(&context), build_next(&context));
    }

    #[test]
    fn test_first_trip_has_no_prior_context_and_no_estimates() {
        let sample = sample_at_dock("WALLA", "SEA", 1_000_000);
        let context = ctx(&sample, None, None);
        let trip = build_next(&context);

        assert_eq!(trip.vessel_id, "WALLA");
        assert_eq!(trip.departing_terminal, "SEA");
        assert_eq!(trip.trip_start, 1_000_000);
        assert!(trip.prev_terminal.is_none());
        assert!(trip.prev_left_dock.is_none());
        assert_eq!(trip.estimates.populated(), 0);
    }

    #[test]
    fn test_fill_once_protects_left_dock() {
        let mut existing = existing_trip("WALLA", "SEA", "BBI", 500_000);
        existing.at_dock = false;
        existing.left_dock = Some(800_000);

        let mut sample = sample_at_dock("WALLA", "SEA", 1_000_000);
        sample.at_dock = false;
        sample.left_dock = None;

        let trip = build_next(&ctx(&sample, Some(&existing), None));
        assert_eq!(trip.left_dock, Some(800_000));
    }

    #[test]
    fn test_fill_once_protects_scheduled_departure_and_eta() {
        let mut existing = existing_trip("WALLA", "SEA", "BBI", 500_000);
        existing.eta = Some(2_000_000);

        let mut sample = sample_at_dock("WALLA", "SEA", 1_000_000);
        sample.scheduled_departure = None;
        sample.eta = None;

        let trip = build_next(&ctx(&sample, Some(&existing), None));
        assert_eq!(trip.scheduled_departure, existing.scheduled_departure);
        assert_eq!(trip.eta, Some(2_000_000));
    }

    #[test]
    fn test_inferred_departure_sets_at_dock_duration() {
        let mut existing = existing_trip("WALLA", "SEA", "BBI", 500_000);
        existing.at_dock = true;
        existing.left_dock = None;

        let mut sample = sample_at_dock("WALLA", "SEA", 1_100_000);
        sample.at_dock = false;
        sample.left_dock = None;

        let trip = build_next(&ctx(&sample, Some(&existing), None));
        // inferred from the boolean flip, using the sample's own timestamp
        assert_eq!(trip.left_dock, Some(1_100_000));
        // 600_000 ms from trip-start = 10.0 minutes at the dock
        assert_eq!(trip.at_dock_minutes, Some(10.0));
    }

    #[test]
    fn test_boundary_hard_resets_identity() {
        let mut old = existing_trip("WALLA", "SEA", "BBI", 500_000);
        old.at_dock = false;
        old.left_dock = Some(700_000);

        let completed = finalize(&old, 2_000_000);

        let mut sample = sample_at_dock("WALLA", "BBI", 2_000_000);
        sample.arriving_terminal = Some("SEA".to_string());
        sample.scheduled_departure = Some(2_900_000);
        // stale feed value from the old leg must not leak into the new trip
        sample.left_dock = Some(700_000);

        let mut context = ctx(&sample, Some(&old), Some(&completed));
        assert!(context.events.boundary);
        context.completed = Some(&completed);

        let trip = build_next(&context);
        assert_eq!(trip.departing_terminal, "BBI");
        // arriving terminal strictly from the sample, never the old trip's
        assert_eq!(trip.arriving_terminal.as_deref(), Some("SEA"));
        assert_eq!(trip.trip_start, 2_000_000);
        assert!(trip.left_dock.is_none());
        // prev-* context explicitly copied from the just-completed trip
        assert_eq!(trip.prev_terminal.as_deref(), Some("SEA"));
        assert_eq!(trip.prev_scheduled_departure, old.scheduled_departure);
        assert_eq!(trip.prev_left_dock, Some(700_000));
    }

    #[test]
    fn test_boundary_clears_estimate_slots() {
        let mut old = existing_trip("WALLA", "SEA", "BBI", 500_000);
        old.estimates
            .set(crate::types::EstimateSlot::LeftDock, dummy_estimate(900_000));
        old.at_dock = false;
        old.left_dock = Some(700_000);
        let completed = finalize(&old, 2_000_000);

        let mut sample = sample_at_dock("WALLA", "BBI", 2_000_000);
        sample.arriving_terminal = Some("SEA".to_string());

        let context = ctx(&sample, Some(&old), Some(&completed));
        let trip = build_next(&context);
        assert_eq!(trip.estimates.populated(), 0);
    }

    #[test]
    fn test_key_change_clears_estimate_slots() {
        let mut existing = existing_trip("WALLA", "SEA", "BBI", 500_000);
        existing.scheduled_departure = None;
        existing.key = composite_key("WALLA", "SEA", Some("BBI"), None);
        existing
            .estimates
            .set(crate::types::EstimateSlot::LeftDock, dummy_estimate(900_000));

        let sample = sample_at_dock("WALLA", "SEA", 1_000_000);
        let context = ctx(&sample, Some(&existing), None);
        assert!(context.events.key_changed);

        let trip = build_next(&context);
        assert_eq!(trip.estimates.populated(), 0);
        assert_ne!(trip.key, existing.key);
    }

    #[test]
    fn test_estimates_carried_on_plain_update() {
        let mut existing = existing_trip("WALLA", "SEA", "BBI", 500_000);
        existing
            .estimates
            .set(crate::types::EstimateSlot::LeftDock, dummy_estimate(900_000));

        let sample = sample_at_dock("WALLA", "SEA", 1_000_000);
        let trip = build_next(&ctx(&sample, Some(&existing), None));
        assert_eq!(trip.estimates, existing.estimates);
    }

    #[test]
    fn test_schedule_inferred_arrival_used_when_sample_silent() {
        let mut existing = existing_trip("WALLA", "SEA", "BBI", 500_000);
        existing.arriving_terminal = None;

        let mut sample = sample_at_dock("WALLA", "SEA", 1_000_000);
        sample.arriving_terminal = None;

        let mut context = ctx(&sample, Some(&existing), None);
        context.inferred_arrival = Some("BBI");

        let trip = build_next(&context);
        assert_eq!(trip.arriving_terminal.as_deref(), Some("BBI"));
    }

    #[test]
    fn test_finalize_computes_sea_and_total() {
        let mut trip = existing_trip("WALLA", "SEA", "BBI", 500_000);
        trip.left_dock = Some(800_000);

        let done = finalize(&trip, 2_000_000);
        assert_eq!(done.trip_end, Some(2_000_000));
        assert_eq!(done.at_sea_minutes, Some(20.0));
        assert_eq!(done.total_minutes, Some(25.0));
    }
}
