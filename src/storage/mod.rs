//! Persistent Trip Storage
//!
//! Sled-backed storage with JSON values, one tree per logical collection:
//! - `active_trips`: one row per vessel (keyed by vessel id)
//! - `completed_trips`: append-only archive keyed by composite trip key
//! - `prediction_history`: append-only, one record per actualized slot
//!
//! The `TripStore` trait is the collaborator boundary the orchestrator
//! sees; the sled implementation is the production backend and, opened
//! temporary, the test backend.

mod models;
mod schedules;

pub use models::{InMemoryModelStore, ModelStore, SledModelStore};
pub use schedules::{ArrivalLookup, InMemoryScheduleStore, ScheduleStore, SledScheduleStore};

use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info};

use crate::types::{PredictionRecord, Trip};

/// Storage error types.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Sled database error
    #[error("database error: {0}")]
    Database(#[from] sled::Error),
    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// An upstream logic defect surfaced at the storage boundary; this is
    /// fatal for the offending vessel's pass, never silently absorbed.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

// ============================================================================
// Trait
// ============================================================================

/// The store collaborator: active trips, the completed-trip archive, and
/// prediction history. Per-call atomicity; batched calls apply as one
/// external write.
#[async_trait]
pub trait TripStore: Send + Sync {
    /// Snapshot of every active trip (one per vessel).
    async fn all_active(&self) -> Result<Vec<Trip>, StoreError>;

    /// The active trip for one vessel, if any.
    async fn active_for_vessel(&self, vessel_id: &str) -> Result<Option<Trip>, StoreError>;

    /// Upsert a batch of active trips in one write.
    async fn upsert_active(&self, trips: &[Trip]) -> Result<(), StoreError>;

    /// Archive a batch of completed trips in one write. Rejects any trip
    /// without an end timestamp.
    async fn archive(&self, trips: &[Trip]) -> Result<(), StoreError>;

    /// Fetch an archived trip by composite key.
    async fn completed_by_key(&self, key: &str) -> Result<Option<Trip>, StoreError>;

    /// Patch an archived trip in place (used when next-departure slots on
    /// a predecessor are actualized after archiving).
    async fn patch_completed(&self, trip: &Trip) -> Result<(), StoreError>;

    /// Append prediction-history records in one write.
    async fn append_predictions(&self, records: &[PredictionRecord]) -> Result<(), StoreError>;

    /// Most recent prediction-history records, newest first.
    async fn recent_predictions(&self, limit: usize) -> Result<Vec<PredictionRecord>, StoreError>;

    /// All prediction-history records for one trip, oldest first.
    async fn predictions_for_trip(
        &self,
        trip_key: &str,
    ) -> Result<Vec<PredictionRecord>, StoreError>;
}

// ============================================================================
// Sled Implementation
// ============================================================================

/// Sled-backed trip store.
pub struct SledTripStore {
    db: sled::Db,
    active: sled::Tree,
    completed: sled::Tree,
    predictions: sled::Tree,
}

impl SledTripStore {
    /// Open or create the trip database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path.as_ref())?;
        let store = Self::from_db(&db)?;
        info!(path = %path.as_ref().display(), "Trip store opened");
        Ok(store)
    }

    /// Open an in-memory database (for tests and simulation).
    pub fn open_temp() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(&db)
    }

    /// Open against an existing database handle (shares the file with the
    /// model and schedule stores).
    pub fn from_db(db: &sled::Db) -> Result<Self, StoreError> {
        let active = db.open_tree("active_trips")?;
        let completed = db.open_tree("completed_trips")?;
        let predictions = db.open_tree("prediction_history")?;
        Ok(Self {
            db: db.clone(),
            active,
            completed,
            predictions,
        })
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    /// Drop the oldest prediction-history records beyond `keep`, returning
    /// the number removed. Keys are sequence-prefixed, so iteration order
    /// is insertion order.
    pub fn prune_predictions(&self, keep: usize) -> Result<usize, StoreError> {
        let total = self.predictions.len();
        if total <= keep {
            return Ok(0);
        }
        let mut removed = 0;
        for item in self.predictions.iter().take(total - keep) {
            let (key, _value) = item?;
            self.predictions.remove(key)?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Monotonic suffix so prediction keys never collide even if a slot is
    /// somehow graded twice across identities.
    fn prediction_key(&self, record: &PredictionRecord) -> Result<String, StoreError> {
        let seq = self.db.generate_id()?;
        Ok(format!(
            "{:020}/{}/{}",
            seq,
            record.trip_key,
            record.slot.as_str()
        ))
    }
}

#[async_trait]
impl TripStore for SledTripStore {
    async fn all_active(&self) -> Result<Vec<Trip>, StoreError> {
        let mut trips = Vec::new();
        for item in self.active.iter() {
            let (_key, value) = item?;
            trips.push(serde_json::from_slice::<Trip>(&value)?);
        }
        Ok(trips)
    }

    async fn active_for_vessel(&self, vessel_id: &str) -> Result<Option<Trip>, StoreError> {
        match self.active.get(vessel_id.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    async fn upsert_active(&self, trips: &[Trip]) -> Result<(), StoreError> {
        if trips.is_empty() {
            return Ok(());
        }
        let mut batch = sled::Batch::default();
        for trip in trips {
            batch.insert(trip.vessel_id.as_bytes(), serde_json::to_vec(trip)?);
        }
        self.active.apply_batch(batch)?;
        debug!(count = trips.len(), "Upserted active trips");
        Ok(())
    }

    async fn archive(&self, trips: &[Trip]) -> Result<(), StoreError> {
        if trips.is_empty() {
            return Ok(());
        }
        for trip in trips {
            if trip.trip_end.is_none() {
                return Err(StoreError::InvariantViolation(format!(
                    "refusing to archive trip {} with no end timestamp",
                    trip.key
                )));
            }
        }
        let mut batch = sled::Batch::default();
        for trip in trips {
            batch.insert(trip.key.as_bytes(), serde_json::to_vec(trip)?);
        }
        self.completed.apply_batch(batch)?;
        debug!(count = trips.len(), "Archived completed trips");
        Ok(())
    }

    async fn completed_by_key(&self, key: &str) -> Result<Option<Trip>, StoreError> {
        match self.completed.get(key.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    async fn patch_completed(&self, trip: &Trip) -> Result<(), StoreError> {
        if self.completed.get(trip.key.as_bytes())?.is_none() {
            return Err(StoreError::InvariantViolation(format!(
                "patch of unarchived trip {}",
                trip.key
            )));
        }
        self.completed
            .insert(trip.key.as_bytes(), serde_json::to_vec(trip)?)?;
        Ok(())
    }

    async fn append_predictions(&self, records: &[PredictionRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut batch = sled::Batch::default();
        for record in records {
            let key = self.prediction_key(record)?;
            batch.insert(key.as_bytes(), serde_json::to_vec(record)?);
        }
        self.predictions.apply_batch(batch)?;
        debug!(count = records.len(), "Appended prediction records");
        Ok(())
    }

    async fn recent_predictions(&self, limit: usize) -> Result<Vec<PredictionRecord>, StoreError> {
        let mut records = Vec::new();
        for item in self.predictions.iter().rev() {
            if records.len() >= limit {
                break;
            }
            let (_key, value) = item?;
            records.push(serde_json::from_slice::<PredictionRecord>(&value)?);
        }
        Ok(records)
    }

    async fn predictions_for_trip(
        &self,
        trip_key: &str,
    ) -> Result<Vec<PredictionRecord>, StoreError> {
        let mut records = Vec::new();
        for item in self.predictions.iter() {
            let (_key, value) = item?;
            let record: PredictionRecord = serde_json::from_slice(&value)?;
            if record.trip_key == trip_key {
                records.push(record);
            }
        }
        Ok(records)
    }
}
