//! Tick Orchestrator
//!
//! Drives one reconciliation pass per tick: snapshot active state once,
//! process every vessel's sample concurrently and independently, then apply
//! all writes in batched store calls. A failure in one vessel's pass is
//! logged and counted, never allowed to poison the rest of the tick.
//!
//! Write policy: boundaries and first trips always write; a continuing
//! update writes only when the change detector sees a real difference.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::enrichment::ScheduleEnrichment;
use crate::estimate::{grade_slots, EstimateEngine, EstimateOutcome, GradeClass};
use crate::storage::{ModelStore, ScheduleStore, TripStore};
use crate::types::{
    composite_key, LifecycleEvents, PredictionRecord, TelemetrySample, Trip,
};

use super::builder::{build_next, finalize, BuildContext};
use super::diff::needs_write;
use super::events::{detect, effective_left_dock, fresh_key};

/// Counters for one orchestration pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub samples_seen: usize,
    pub samples_rejected: usize,
    pub vessels_failed: usize,
    pub first_trips: usize,
    pub boundaries: usize,
    pub upserts: usize,
    pub noops: usize,
    pub estimates_computed: usize,
    pub estimates_skipped: usize,
    pub predictions_recorded: usize,
}

impl TickStats {
    /// Fold another tick's counters into a running total.
    pub fn absorb(&mut self, other: TickStats) {
        self.samples_seen += other.samples_seen;
        self.samples_rejected += other.samples_rejected;
        self.vessels_failed += other.vessels_failed;
        self.first_trips += other.first_trips;
        self.boundaries += other.boundaries;
        self.upserts += other.upserts;
        self.noops += other.noops;
        self.estimates_computed += other.estimates_computed;
        self.estimates_skipped += other.estimates_skipped;
        self.predictions_recorded += other.predictions_recorded;
    }
}

/// Everything one vessel's pass wants written, collected so the tick can
/// batch across vessels.
struct VesselOutcome {
    events: LifecycleEvents,
    upsert: Option<Trip>,
    archive: Option<Trip>,
    /// Archived predecessor with freshly graded next-departure slots.
    patch: Option<Trip>,
    records: Vec<PredictionRecord>,
    estimates_computed: usize,
    estimates_skipped: usize,
}

/// The per-tick reconciliation orchestrator.
pub struct TripCoordinator {
    trips: Arc<dyn TripStore>,
    engine: EstimateEngine,
    enrichment: ScheduleEnrichment,
}

impl TripCoordinator {
    pub fn new(
        trips: Arc<dyn TripStore>,
        models: Arc<dyn ModelStore>,
        schedules: Arc<dyn ScheduleStore>,
        minimum_gap_minutes: f64,
        io_timeout: Duration,
    ) -> Self {
        Self {
            trips,
            engine: EstimateEngine::new(models, minimum_gap_minutes, io_timeout),
            enrichment: ScheduleEnrichment::new(schedules, io_timeout),
        }
    }

    /// Run one reconciliation pass over this tick's telemetry batch.
    pub async fn run_tick(&self, samples: &[TelemetrySample]) -> Result<TickStats, anyhow::Error> {
        let mut stats = TickStats {
            samples_seen: samples.len(),
            ..TickStats::default()
        };

        // At most one sample per vessel per tick; on duplicates the latest
        // observation wins.
        let mut by_vessel: HashMap<&str, &TelemetrySample> = HashMap::new();
        for sample in samples {
            let quality = crate::types::sample_quality(sample);
            if !quality.usable {
                warn!(
                    vessel = %sample.vessel_id,
                    issues = ?quality.issues,
                    "Rejected telemetry sample"
                );
                stats.samples_rejected += 1;
                continue;
            }
            by_vessel
                .entry(sample.vessel_id.as_str())
                .and_modify(|kept| {
                    if sample.timestamp > kept.timestamp {
                        *kept = sample;
                    }
                })
                .or_insert(sample);
        }

        // One snapshot read per tick, shared by every vessel's pass.
        let active: HashMap<String, Trip> = self
            .trips
            .all_active()
            .await?
            .into_iter()
            .map(|t| (t.vessel_id.clone(), t))
            .collect();

        let passes = by_vessel
            .values()
            .map(|sample| self.process_vessel(sample, active.get(sample.vessel_id.as_str())));
        let outcomes = join_all(passes).await;

        let mut upserts = Vec::new();
        let mut archives = Vec::new();
        let mut patches = Vec::new();
        let mut records = Vec::new();

        for outcome in outcomes {
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e, "Vessel pass failed — skipping this tick");
                    stats.vessels_failed += 1;
                    continue;
                }
            };

            if outcome.events.first_trip {
                stats.first_trips += 1;
            }
            if outcome.events.boundary {
                stats.boundaries += 1;
            }
            stats.estimates_computed += outcome.estimates_computed;
            stats.estimates_skipped += outcome.estimates_skipped;

            match outcome.upsert {
                Some(trip) => {
                    upserts.push(trip);
                    stats.upserts += 1;
                }
                None => stats.noops += 1,
            }
            archives.extend(outcome.archive);
            patches.extend(outcome.patch);
            records.extend(outcome.records);
        }

        stats.predictions_recorded = records.len();

        // Batched writes: one store call per collection per tick.
        self.trips.archive(&archives).await?;
        self.trips.upsert_active(&upserts).await?;
        for patched in &patches {
            self.trips.patch_completed(patched).await?;
        }
        self.trips.append_predictions(&records).await?;

        info!(
            samples = stats.samples_seen,
            rejected = stats.samples_rejected,
            failed = stats.vessels_failed,
            upserts = stats.upserts,
            noops = stats.noops,
            boundaries = stats.boundaries,
            estimates = stats.estimates_computed,
            graded = stats.predictions_recorded,
            "Tick complete"
        );

        Ok(stats)
    }

    /// One vessel's reconciliation pass. Pure state construction plus the
    /// vessel's own collaborator I/O; all writes are returned, not applied.
    async fn process_vessel(
        &self,
        sample: &TelemetrySample,
        existing: Option<&Trip>,
    ) -> Result<VesselOutcome, anyhow::Error> {
        let events = detect(existing, sample);

        // The key the new state will carry, needed for enrichment lookups
        // before the trip itself is built.
        let candidate_key = match existing {
            Some(trip) if !events.boundary => fresh_key(trip, sample),
            _ => composite_key(
                &sample.vessel_id,
                &sample.departing_terminal,
                sample.arriving_terminal.as_deref(),
                sample.scheduled_departure,
            ),
        };
        let scheduled = if events.boundary {
            sample.scheduled_departure
        } else {
            sample
                .scheduled_departure
                .or_else(|| existing.and_then(|t| t.scheduled_departure))
        };

        let enriched = self
            .enrichment
            .lookup(
                events,
                &sample.vessel_id,
                &sample.departing_terminal,
                scheduled,
                &candidate_key,
            )
            .await;

        // Boundary: finalize the old leg and grade its arrival slots
        // against the observed end time before it is archived.
        let mut records = Vec::new();
        let completed = match (events.boundary, existing) {
            (true, Some(old)) => {
                let mut done = finalize(old, sample.timestamp);
                records.extend(grade_slots(&mut done, GradeClass::AtSeaArrival, sample.timestamp));
                debug!(
                    vessel = %sample.vessel_id,
                    key = %done.key,
                    "Trip completed at boundary"
                );
                Some(done)
            }
            _ => None,
        };

        let mut next = build_next(&BuildContext {
            sample,
            existing,
            completed: completed.as_ref(),
            events,
            inferred_arrival: enriched.arriving_terminal.as_deref(),
            snapshot: enriched.snapshot.as_ref(),
        });

        // Compute any newly triggered estimates into the fresh state.
        let mut estimates_computed = 0;
        let mut estimates_skipped = 0;
        for (slot, outcome) in self
            .engine
            .compute_for_events(&next, events, sample.timestamp)
            .await
        {
            match outcome {
                EstimateOutcome::Computed(estimate) => {
                    next.estimates.set(slot, estimate);
                    estimates_computed += 1;
                }
                EstimateOutcome::Skipped(_) => estimates_skipped += 1,
            }
        }

        // Departure became known: grade this trip's departure slot and the
        // archived predecessor's next-departure slots.
        let mut patch = None;
        if events.left_dock {
            let observed = effective_left_dock(sample);
            records.extend(grade_slots(&mut next, GradeClass::AtDockDeparture, observed));

            if let Some(pred_key) = next.predecessor_key() {
                if let Some(mut pred) = self.trips.completed_by_key(&pred_key).await? {
                    let graded = grade_slots(&mut pred, GradeClass::DepartNext, observed);
                    if !graded.is_empty() {
                        records.extend(graded);
                        patch = Some(pred);
                    }
                }
            }
        }

        // Boundaries and first trips write unconditionally; a continuing
        // update writes only on a real difference.
        let upsert = match existing {
            Some(old) if !events.boundary && !needs_write(old, &next) => None,
            _ => Some(next),
        };

        Ok(VesselOutcome {
            events,
            upsert,
            archive: completed,
            patch,
            records,
            estimates_computed,
            estimates_skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::builder::tests::sample_at_dock;
    use crate::storage::{InMemoryModelStore, InMemoryScheduleStore, SledTripStore};
    use crate::types::{EstimateModel, EstimateSlot, ModelKey, ModelType, TrainingMetrics};

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

    fn coordinator_with(
        models: InMemoryModelStore,
    ) -> (TripCoordinator, Arc<SledTripStore>) {
        let trips = Arc::new(SledTripStore::open_temp().unwrap());
        let coordinator = TripCoordinator::new(
            trips.clone(),
            Arc::new(models),
            Arc::new(InMemoryScheduleStore::default()),
            1.0,
            Duration::from_millis(500),
        );
        (coordinator, trips)
    }

    fn seed_all_models(models: &InMemoryModelStore, departing: &str, arriving: &str) {
        for model_type in [
            ModelType::AtDockDeparture,
            ModelType::AtDockArrival,
            ModelType::UnderwayArrival,
            ModelType::AtDockNextDeparture,
            ModelType::UnderwayNextDeparture,
        ] {
            models.insert(ModelKey::new(departing, arriving, model_type), flat_model(15.0));
        }
    }

    #[tokio::test]
    async fn test_first_trip_created_and_persisted() {
        let (coordinator, trips) = coordinator_with(InMemoryModelStore::default());
        let sample = sample_at_dock("WALLA", "SEA", 1_700_000_000_000);

        let stats = coordinator.run_tick(&[sample]).await.unwrap();
        assert_eq!(stats.first_trips, 1);
        assert_eq!(stats.upserts, 1);

        let active = trips.all_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].vessel_id, "WALLA");
    }

    #[tokio::test]
    async fn test_identical_resample_is_a_noop() {
        let (coordinator, trips) = coordinator_with(InMemoryModelStore::default());
        let mut sample = sample_at_dock("WALLA", "SEA", 1_700_000_000_000);
        coordinator.run_tick(std::slice::from_ref(&sample)).await.unwrap();

        // only the observation timestamp moves
        sample.timestamp += 30_000;
        let stats = coordinator.run_tick(&[sample]).await.unwrap();
        assert_eq!(stats.noops, 1);
        assert_eq!(stats.upserts, 0);

        // the persisted row still carries the original observation time
        let active = trips.all_active().await.unwrap();
        assert_eq!(active[0].last_observed, 1_700_000_000_000);
    }

    #[tokio::test]
    async fn test_rejected_sample_counted_not_processed() {
        let (coordinator, trips) = coordinator_with(InMemoryModelStore::default());
        let mut sample = sample_at_dock("WALLA", "SEA", 1_700_000_000_000);
        sample.in_service = false;

        let stats = coordinator.run_tick(&[sample]).await.unwrap();
        assert_eq!(stats.samples_rejected, 1);
        assert!(trips.all_active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_boundary_archives_and_starts_new_trip() {
        let (coordinator, trips) = coordinator_with(InMemoryModelStore::default());
        let start = 1_700_000_000_000u64;

        // at dock, then underway, then at the far dock
        let first = sample_at_dock("WALLA", "SEA", start);
        coordinator.run_tick(&[first]).await.unwrap();

        let mut underway = sample_at_dock("WALLA", "SEA", start + 900_000);
        underway.at_dock = false;
        coordinator.run_tick(&[underway]).await.unwrap();

        let mut arrived = sample_at_dock("WALLA", "BBI", start + 3_000_000);
        arrived.arriving_terminal = Some("SEA".to_string());
        let stats = coordinator.run_tick(&[arrived]).await.unwrap();
        assert_eq!(stats.boundaries, 1);
        assert_eq!(stats.upserts, 1);

        let active = trips.all_active().await.unwrap();
        assert_eq!(active.len(), 1);
        let new_trip = &active[0];
        assert_eq!(new_trip.departing_terminal, "BBI");
        assert_eq!(new_trip.prev_terminal.as_deref(), Some("SEA"));
        // departure was inferred at the underway tick
        assert_eq!(new_trip.prev_left_dock, Some(start + 900_000));

        let predecessor_key = new_trip.predecessor_key().unwrap();
        let completed = trips.completed_by_key(&predecessor_key);
        let completed = completed.await.unwrap().unwrap();
        assert_eq!(completed.trip_end, Some(start + 3_000_000));
        assert_eq!(completed.total_minutes, Some(50.0));
    }

    #[tokio::test]
    async fn test_departure_grades_estimate_into_history() {
        let models = InMemoryModelStore::default();
        seed_all_models(&models, "SEA", "BBI");
        let (coordinator, trips) = coordinator_with(models);
        let start = 1_700_000_000_000u64;

        // Seed an active trip with predecessor context so the dock-arrival
        // estimates compute on the first pass.
        let mut seeded = crate::pipeline::builder::tests::existing_trip("WALLA", "SEA", "BBI", start);
        seeded.at_dock = false;
        seeded.prev_terminal = Some("BBI".to_string());
        seeded.prev_scheduled_departure = Some(start - 2_400_000);
        seeded.prev_left_dock = Some(start - 1_800_000);
        trips.upsert_active(std::slice::from_ref(&seeded)).await.unwrap();

        // arrival at the dock triggers the at-dock estimate class
        let arrival = sample_at_dock("WALLA", "SEA", start + 60_000);
        let stats = coordinator.run_tick(&[arrival]).await.unwrap();
        assert_eq!(stats.estimates_computed, 3);

        // departure grades the left-dock slot
        let mut departure = sample_at_dock("WALLA", "SEA", start + 1_200_000);
        departure.scheduled_departure = Some(start + 660_000);
        departure.at_dock = false;
        let stats = coordinator.run_tick(&[departure]).await.unwrap();
        assert_eq!(stats.predictions_recorded, 1);

        let recent = trips.recent_predictions(10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].slot, EstimateSlot::LeftDock);
        assert_eq!(recent[0].actual, start + 1_200_000);

        let active = trips.all_active().await.unwrap();
        let left_dock = active[0].estimates.get(EstimateSlot::LeftDock).unwrap();
        assert!(left_dock.is_actualized());
    }

    #[tokio::test]
    async fn test_departure_patches_archived_predecessor() {
        let models = InMemoryModelStore::default();
        seed_all_models(&models, "BBI", "SEA");
        let (coordinator, trips) = coordinator_with(models);
        let start = 1_700_000_000_000u64;

        // Archive a predecessor leg BBI -> SEA carrying a next-departure
        // estimate, then an active successor SEA -> BBI pointing back at it.
        let mut pred = crate::pipeline::builder::tests::existing_trip("WALLA", "BBI", "SEA", start);
        pred.trip_end = Some(start + 3_000_000);
        pred.estimates.set(
            EstimateSlot::NextDepartureFromDock,
            crate::pipeline::builder::tests::dummy_estimate(start + 4_000_000),
        );
        trips.archive(std::slice::from_ref(&pred)).await.unwrap();

        let mut successor =
            crate::pipeline::builder::tests::existing_trip("WALLA", "SEA", "BBI", start + 3_000_000);
        successor.prev_terminal = Some("BBI".to_string());
        successor.prev_scheduled_departure = pred.scheduled_departure;
        successor.prev_left_dock = Some(start + 600_000);
        trips
            .upsert_active(std::slice::from_ref(&successor))
            .await
            .unwrap();
        assert_eq!(successor.predecessor_key().as_deref(), Some(pred.key.as_str()));

        // successor leaves the dock: the predecessor's next-departure slot
        // is graded and patched in the archive
        let mut departure = sample_at_dock("WALLA", "SEA", start + 4_060_000);
        departure.scheduled_departure = successor.scheduled_departure;
        departure.at_dock = false;
        let stats = coordinator.run_tick(&[departure]).await.unwrap();
        assert_eq!(stats.predictions_recorded, 1);

        let patched = trips.completed_by_key(&pred.key).await.unwrap().unwrap();
        let slot = patched
            .estimates
            .get(EstimateSlot::NextDepartureFromDock)
            .unwrap();
        assert_eq!(slot.actual, Some(start + 4_060_000));
        assert_eq!(slot.delta_total, Some(1.0));
    }

    #[tokio::test]
    async fn test_duplicate_samples_latest_wins() {
        let (coordinator, trips) = coordinator_with(InMemoryModelStore::default());
        let older = sample_at_dock("WALLA", "SEA", 1_700_000_000_000);
        let newer = sample_at_dock("WALLA", "SEA", 1_700_000_060_000);

        let stats = coordinator
            .run_tick(&[older, newer])
            .await
            .unwrap();
        assert_eq!(stats.upserts, 1);
        let active = trips.all_active().await.unwrap();
        assert_eq!(active[0].trip_start, 1_700_000_060_000);
    }
}
