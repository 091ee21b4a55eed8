//! Linear-model estimate computation and the slot trigger policy.
//!
//! The five estimate slots are a closed descriptor table iterated
//! generically: each descriptor names its trigger event, model type, anchor
//! time, and extra context requirements. Triggers are event-based and
//! idempotent — a slot computes at most once per trip identity and is never
//! retried on a timer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::storage::ModelStore;
use crate::types::{
    round_minutes, Estimate, EstimateSlot, LifecycleEvents, ModelKey, Trip, MS_PER_MINUTE,
};

use super::features::extract_features;
use super::SkipReason;

// ============================================================================
// Slot Descriptors
// ============================================================================

/// Which lifecycle event triggers a slot's computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    /// Vessel tied up at the dock this tick
    ArriveAtDock,
    /// Departure became known this tick
    LeaveDock,
}

/// Which absolute time the model's minutes-denominated output is added to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorTime {
    ScheduledDeparture,
    LeftDock,
}

/// Static description of one estimate slot.
#[derive(Debug, Clone, Copy)]
pub struct SlotDescriptor {
    pub slot: EstimateSlot,
    pub trigger: TriggerEvent,
    pub anchor: AnchorTime,
    /// Departure-class slots need a known left-dock for their anchor.
    pub requires_left_dock: bool,
}

/// The closed table of all five slots.
pub const SLOT_TABLE: [SlotDescriptor; 5] = [
    SlotDescriptor {
        slot: EstimateSlot::LeftDock,
        trigger: TriggerEvent::ArriveAtDock,
        anchor: AnchorTime::ScheduledDeparture,
        requires_left_dock: false,
    },
    SlotDescriptor {
        slot: EstimateSlot::ArrivalFromDock,
        trigger: TriggerEvent::ArriveAtDock,
        anchor: AnchorTime::ScheduledDeparture,
        requires_left_dock: false,
    },
    SlotDescriptor {
        slot: EstimateSlot::ArrivalUnderway,
        trigger: TriggerEvent::LeaveDock,
        anchor: AnchorTime::LeftDock,
        requires_left_dock: true,
    },
    SlotDescriptor {
        slot: EstimateSlot::NextDepartureFromDock,
        trigger: TriggerEvent::ArriveAtDock,
        anchor: AnchorTime::ScheduledDeparture,
        requires_left_dock: false,
    },
    SlotDescriptor {
        slot: EstimateSlot::NextDepartureUnderway,
        trigger: TriggerEvent::LeaveDock,
        anchor: AnchorTime::LeftDock,
        requires_left_dock: true,
    },
];

// ============================================================================
// Engine
// ============================================================================

/// Outcome for one slot on one qualifying tick.
#[derive(Debug, Clone, PartialEq)]
pub enum EstimateOutcome {
    Computed(Estimate),
    Skipped(SkipReason),
}

/// Evaluates trained linear models for triggered, still-empty slots.
pub struct EstimateEngine {
    models: Arc<dyn ModelStore>,
    minimum_gap_minutes: f64,
    io_timeout: Duration,
}

impl EstimateEngine {
    pub fn new(models: Arc<dyn ModelStore>, minimum_gap_minutes: f64, io_timeout: Duration) -> Self {
        Self {
            models,
            minimum_gap_minutes,
            io_timeout,
        }
    }

    /// Compute estimates for every slot triggered by this tick's events.
    ///
    /// The empty-slot guard makes the trigger idempotent: a slot that is
    /// already populated is not recomputed, and a slot that skips stays
    /// empty until its next qualifying event. Model loads for all triggered
    /// slots are batched into a single store call.
    pub async fn compute_for_events(
        &self,
        trip: &Trip,
        events: LifecycleEvents,
        reference_time: u64,
    ) -> Vec<(EstimateSlot, EstimateOutcome)> {
        let mut outcomes = Vec::new();
        let mut pending: Vec<&SlotDescriptor> = Vec::new();

        for descriptor in &SLOT_TABLE {
            let fired = match descriptor.trigger {
                TriggerEvent::ArriveAtDock => events.arrived_at_dock,
                TriggerEvent::LeaveDock => events.left_dock,
            };
            if !fired || trip.estimates.get(descriptor.slot).is_some() {
                continue;
            }
            match self.validate_context(trip, descriptor) {
                Ok(()) => pending.push(descriptor),
                Err(reason) => {
                    debug!(
                        vessel = %trip.vessel_id,
                        slot = %descriptor.slot,
                        reason = %reason,
                        "Estimate skipped"
                    );
                    outcomes.push((descriptor.slot, EstimateOutcome::Skipped(reason)));
                }
            }
        }

        if pending.is_empty() {
            return outcomes;
        }

        let models = self.load_models(trip, &pending).await;

        for descriptor in pending {
            let outcome = match models.get(&self.model_key(trip, descriptor)) {
                Some(model) => match evaluate(
                    trip,
                    descriptor,
                    model,
                    reference_time,
                    self.minimum_gap_minutes,
                ) {
                    Ok(estimate) => EstimateOutcome::Computed(estimate),
                    Err(reason) => EstimateOutcome::Skipped(reason),
                },
                None => EstimateOutcome::Skipped(SkipReason::MissingModel),
            };
            if let EstimateOutcome::Skipped(reason) = &outcome {
                debug!(
                    vessel = %trip.vessel_id,
                    slot = %descriptor.slot,
                    reason = %reason,
                    "Estimate skipped"
                );
            }
            outcomes.push((descriptor.slot, outcome));
        }

        outcomes
    }

    /// Pre-model validation of the slot's required context.
    fn validate_context(&self, trip: &Trip, descriptor: &SlotDescriptor) -> Result<(), SkipReason> {
        if trip.arriving_terminal.is_none() {
            return Err(SkipReason::MissingArrivingTerminal);
        }
        if trip.prev_left_dock.is_none() || trip.prev_scheduled_departure.is_none() {
            // A true first trip never has predecessor context; by
            // construction it receives no estimates.
            return Err(SkipReason::MissingPriorLegContext);
        }
        if descriptor.requires_left_dock && trip.left_dock.is_none() {
            return Err(SkipReason::MissingLeftDock);
        }
        Ok(())
    }

    fn model_key(&self, trip: &Trip, descriptor: &SlotDescriptor) -> ModelKey {
        ModelKey {
            departing_terminal: trip.departing_terminal.clone(),
            arriving_terminal: trip
                .arriving_terminal
                .clone()
                .unwrap_or_default(),
            model_type: descriptor.slot.model_type(),
        }
    }

    /// One batched model load per vessel per qualifying tick. A timeout or
    /// store failure is a miss for every requested model, never an error.
    async fn load_models(
        &self,
        trip: &Trip,
        pending: &[&SlotDescriptor],
    ) -> HashMap<ModelKey, crate::types::EstimateModel> {
        let keys: Vec<ModelKey> = pending.iter().map(|d| self.model_key(trip, d)).collect();

        match tokio::time::timeout(self.io_timeout, self.models.load_batch(&keys)).await {
            Ok(Ok(models)) => models,
            Ok(Err(e)) => {
                warn!(vessel = %trip.vessel_id, error = %e, "Model load failed — treating as miss");
                HashMap::new()
            }
            Err(_) => {
                warn!(vessel = %trip.vessel_id, "Model load timed out — treating as miss");
                HashMap::new()
            }
        }
    }
}

/// Evaluate one model for one slot and post-process the prediction.
fn evaluate(
    trip: &Trip,
    descriptor: &SlotDescriptor,
    model: &crate::types::EstimateModel,
    reference_time: u64,
    minimum_gap_minutes: f64,
) -> Result<Estimate, SkipReason> {
    let features = extract_features(trip)?;
    let predicted_minutes = features
        .apply(&model.coefficients, model.intercept)
        .ok_or(SkipReason::FeatureShapeMismatch)?;

    let anchor = match descriptor.anchor {
        AnchorTime::ScheduledDeparture => trip
            .scheduled_departure
            .ok_or(SkipReason::MissingScheduledDeparture)?,
        AnchorTime::LeftDock => trip.left_dock.ok_or(SkipReason::MissingLeftDock)?,
    };

    let raw = anchor as f64 + predicted_minutes * MS_PER_MINUTE;

    // Clamp: never predict earlier than reference + minimum gap.
    let floor = reference_time as f64 + minimum_gap_minutes * MS_PER_MINUTE;
    let clamped = raw.max(floor);

    let predicted = round_to_second(clamped);
    let spread = model.metrics.rmse * MS_PER_MINUTE;
    let min = round_to_second((clamped - spread).max(0.0));
    let max = round_to_second(clamped + spread);

    Ok(Estimate {
        predicted,
        min,
        max,
        mae: round_minutes(model.metrics.mae),
        std_dev: round_minutes(model.metrics.rmse),
        actual: None,
        delta_total: None,
        delta_range: None,
    })
}

/// Round an epoch-ms value to the nearest whole second.
fn round_to_second(epoch_ms: f64) -> u64 {
    ((epoch_ms / 1_000.0).round() * 1_000.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::builder::tests::existing_trip;
    use crate::storage::InMemoryModelStore;
    use crate::types::{EstimateModel, ModelType, TrainingMetrics};

    fn trip_with_context() -> Trip {
        let mut trip = existing_trip("WALLA", "SEA", "BBI", 1_700_000_000_000);
        trip.prev_terminal = Some("BBI".to_string());
        trip.prev_scheduled_departure = Some(trip.trip_start - 2_400_000);
        trip.prev_left_dock = Some(trip.trip_start - 1_800_000);
        trip
    }

    fn flat_model(minutes: f64) -> EstimateModel {
        EstimateModel {
            coefficients: vec![0.0; crate::estimate::FEATURE_COUNT],
            intercept: minutes,
            metrics: TrainingMetrics {
                mae: 1.5,
                rmse: 2.0,
                r2: 0.8,
            },
        }
    }

    fn engine_with_models(entries: Vec<(ModelKey, EstimateModel)>) -> EstimateEngine {
        let store = InMemoryModelStore::default();
        for (key, model) in entries {
            store.insert(key, model);
        }
        EstimateEngine::new(Arc::new(store), 1.0, Duration::from_millis(500))
    }

    fn arrival_events() -> LifecycleEvents {
        LifecycleEvents {
            arrived_at_dock: true,
            ..LifecycleEvents::default()
        }
    }

    #[tokio::test]
    async fn test_arrival_triggers_arrival_class_slots() {
        let trip = trip_with_context();
        let engine = engine_with_models(vec![
            (ModelKey::new("SEA", "BBI", ModelType::AtDockDeparture), flat_model(12.0)),
            (ModelKey::new("SEA", "BBI", ModelType::AtDockArrival), flat_model(45.0)),
            (ModelKey::new("SEA", "BBI", ModelType::AtDockNextDeparture), flat_model(70.0)),
        ]);

        let outcomes = engine
            .compute_for_events(&trip, arrival_events(), trip.trip_start)
            .await;

        let computed: Vec<EstimateSlot> = outcomes
            .iter()
            .filter(|(_, o)| matches!(o, EstimateOutcome::Computed(_)))
            .map(|(s, _)| *s)
            .collect();
        assert_eq!(
            computed,
            vec![
                EstimateSlot::LeftDock,
                EstimateSlot::ArrivalFromDock,
                EstimateSlot::NextDepartureFromDock
            ]
        );
    }

    #[tokio::test]
    async fn test_populated_slot_not_recomputed() {
        let mut trip = trip_with_context();
        let engine = engine_with_models(vec![(
            ModelKey::new("SEA", "BBI", ModelType::AtDockDeparture),
            flat_model(12.0),
        )]);

        let outcomes = engine
            .compute_for_events(&trip, arrival_events(), trip.trip_start)
            .await;
        for (slot, outcome) in &outcomes {
            if let EstimateOutcome::Computed(est) = outcome {
                trip.estimates.set(*slot, est.clone());
            }
        }
        let first = trip.estimates.get(EstimateSlot::LeftDock).cloned().unwrap();

        // second arrival event with the slot already populated: no outcome
        // for that slot at all
        let outcomes = engine
            .compute_for_events(&trip, arrival_events(), trip.trip_start + 60_000)
            .await;
        assert!(outcomes.iter().all(|(s, _)| *s != EstimateSlot::LeftDock));
        assert_eq!(trip.estimates.get(EstimateSlot::LeftDock), Some(&first));
    }

    #[tokio::test]
    async fn test_first_trip_gets_no_arrival_estimates() {
        let mut trip = trip_with_context();
        trip.prev_left_dock = None;
        trip.prev_scheduled_departure = None;

        let engine = engine_with_models(vec![(
            ModelKey::new("SEA", "BBI", ModelType::AtDockDeparture),
            flat_model(12.0),
        )]);

        let outcomes = engine
            .compute_for_events(&trip, arrival_events(), trip.trip_start)
            .await;
        assert!(outcomes.iter().all(|(_, o)| matches!(
            o,
            EstimateOutcome::Skipped(SkipReason::MissingPriorLegContext)
        )));
    }

    #[tokio::test]
    async fn test_missing_model_is_a_skip() {
        let trip = trip_with_context();
        let engine = engine_with_models(vec![]);

        let outcomes = engine
            .compute_for_events(&trip, arrival_events(), trip.trip_start)
            .await;
        assert!(!outcomes.is_empty());
        assert!(outcomes
            .iter()
            .all(|(_, o)| matches!(o, EstimateOutcome::Skipped(SkipReason::MissingModel))));
    }

    #[tokio::test]
    async fn test_departure_slots_need_left_dock_anchor() {
        let mut trip = trip_with_context();
        trip.left_dock = None;
        let engine = engine_with_models(vec![(
            ModelKey::new("SEA", "BBI", ModelType::UnderwayArrival),
            flat_model(30.0),
        )]);

        let events = LifecycleEvents {
            left_dock: true,
            ..LifecycleEvents::default()
        };
        let outcomes = engine
            .compute_for_events(&trip, events, trip.trip_start)
            .await;
        assert!(outcomes
            .iter()
            .all(|(_, o)| matches!(o, EstimateOutcome::Skipped(SkipReason::MissingLeftDock))));
    }

    #[tokio::test]
    async fn test_prediction_anchored_and_bounded() {
        let trip = trip_with_context();
        let scheduled = trip.scheduled_departure.unwrap();
        let engine = engine_with_models(vec![(
            ModelKey::new("SEA", "BBI", ModelType::AtDockDeparture),
            flat_model(12.0),
        )]);

        let outcomes = engine
            .compute_for_events(&trip, arrival_events(), trip.trip_start)
            .await;
        let estimate = outcomes
            .iter()
            .find_map(|(s, o)| match (s, o) {
                (EstimateSlot::LeftDock, EstimateOutcome::Computed(e)) => Some(e.clone()),
                _ => None,
            })
            .unwrap();

        // flat model: predicted = anchor + 12 minutes
        assert_eq!(estimate.predicted, scheduled + 720_000);
        // bounds at one rmse (2 minutes) either side
        assert_eq!(estimate.min, estimate.predicted - 120_000);
        assert_eq!(estimate.max, estimate.predicted + 120_000);
        assert_eq!(estimate.std_dev, 2.0);
    }

    #[tokio::test]
    async fn test_clamp_to_minimum_gap() {
        let trip = trip_with_context();
        let engine = engine_with_models(vec![(
            ModelKey::new("SEA", "BBI", ModelType::AtDockDeparture),
            // model predicts far in the past relative to the anchor
            flat_model(-600.0),
        )]);

        let reference = trip.trip_start;
        let outcomes = engine
            .compute_for_events(&trip, arrival_events(), reference)
            .await;
        let estimate = outcomes
            .iter()
            .find_map(|(s, o)| match (s, o) {
                (EstimateSlot::LeftDock, EstimateOutcome::Computed(e)) => Some(e.clone()),
                _ => None,
            })
            .unwrap();

        // clamped to reference + 1 minute
        assert_eq!(estimate.predicted, reference + 60_000);
    }
}
