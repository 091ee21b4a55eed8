//! Actualizer: grades previously computed estimates against observed
//! outcomes.
//!
//! Grading classes map lifecycle observations to slots:
//! - departure became known  -> the at-dock departure slot
//! - trip ended              -> both arrival slots
//! - the *next* trip's departure became known -> both next-departure slots
//!   on the just-completed (archived) predecessor
//!
//! Idempotent: a slot with an actual already recorded is never regraded.

use crate::types::{
    round_minutes, Estimate, EstimateSlot, PredictionRecord, Trip, MS_PER_MINUTE,
};

/// Which observation class is being graded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeClass {
    /// Observed: this trip's actual departure from the dock
    AtDockDeparture,
    /// Observed: this trip's end (arrival at the far terminal)
    AtSeaArrival,
    /// Observed: the successor trip's departure, graded on the archived
    /// predecessor
    DepartNext,
}

impl GradeClass {
    /// Slots graded by this observation class.
    pub fn slots(&self) -> &'static [EstimateSlot] {
        match self {
            GradeClass::AtDockDeparture => &[EstimateSlot::LeftDock],
            GradeClass::AtSeaArrival => &[
                EstimateSlot::ArrivalFromDock,
                EstimateSlot::ArrivalUnderway,
            ],
            GradeClass::DepartNext => &[
                EstimateSlot::NextDepartureFromDock,
                EstimateSlot::NextDepartureUnderway,
            ],
        }
    }
}

/// Grade every populated, not-yet-actualized slot of the class against the
/// observed time. Mutates the trip's estimates in place and returns one
/// prediction-history record per newly actualized slot.
pub fn grade_slots(trip: &mut Trip, class: GradeClass, observed: u64) -> Vec<PredictionRecord> {
    let mut records = Vec::new();

    for slot in class.slots() {
        let trip_key = trip.key.clone();
        let Some(estimate) = trip.estimates.get_mut(*slot) else {
            continue;
        };
        if estimate.is_actualized() {
            continue;
        }

        actualize(estimate, observed);

        // actualize() always fills these three together
        if let (Some(actual), Some(delta_total), Some(delta_range)) =
            (estimate.actual, estimate.delta_total, estimate.delta_range)
        {
            records.push(PredictionRecord {
                trip_key,
                slot: *slot,
                predicted: estimate.predicted,
                min: estimate.min,
                max: estimate.max,
                mae: estimate.mae,
                std_dev: estimate.std_dev,
                actual,
                delta_total,
                delta_range,
            });
        }
    }

    records
}

/// Fill the actual/delta fields on one estimate.
fn actualize(estimate: &mut Estimate, observed: u64) {
    // observed time floored to the second
    let actual = (observed / 1_000) * 1_000;

    let delta_total = round_minutes((actual as f64 - estimate.predicted as f64) / MS_PER_MINUTE);

    let delta_range = if actual < estimate.min {
        round_minutes((actual as f64 - estimate.min as f64) / MS_PER_MINUTE)
    } else if actual > estimate.max {
        round_minutes((actual as f64 - estimate.max as f64) / MS_PER_MINUTE)
    } else {
        0.0
    };

    estimate.actual = Some(actual);
    estimate.delta_total = Some(delta_total);
    estimate.delta_range = Some(delta_range);
}
