//! Schedule store: read-only keyed/heuristic schedule lookups.
//!
//! Both lookups are "miss, not error": an empty result means the trip
//! proceeds without enrichment.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use crate::types::ScheduleSnapshot;

use super::StoreError;

/// A successful arrival-terminal lookup: the terminal plus the schedule
/// snapshot it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrivalLookup {
    pub arriving_terminal: String,
    pub snapshot: ScheduleSnapshot,
}

/// Read-only schedule lookup collaborator.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Heuristic lookup of the arriving terminal for a sailing.
    async fn lookup_arrival_terminal(
        &self,
        vessel_id: &str,
        departing_terminal: &str,
        scheduled_departure: u64,
    ) -> Result<Option<ArrivalLookup>, StoreError>;

    /// Direct lookup by composite trip key.
    async fn lookup_by_key(&self, key: &str) -> Result<Option<ScheduleSnapshot>, StoreError>;
}

// ============================================================================
// Sled Implementation
// ============================================================================

/// Sled-backed schedule store. Rows are seeded by an external schedule
/// importer under two key shapes:
/// - `sailing/{departing}/{scheduled_departure}` -> [`ArrivalLookup`]
/// - `key/{composite trip key}` -> [`ScheduleSnapshot`]
pub struct SledScheduleStore {
    tree: sled::Tree,
}

impl SledScheduleStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path.as_ref())?;
        let tree = db.open_tree("schedules")?;
        Ok(Self { tree })
    }

    /// Open against an existing database handle.
    pub fn from_db(db: &sled::Db) -> Result<Self, StoreError> {
        let tree = db.open_tree("schedules")?;
        Ok(Self { tree })
    }

    /// Seed a sailing row (schedule importer).
    pub fn put_sailing(
        &self,
        departing_terminal: &str,
        scheduled_departure: u64,
        lookup: &ArrivalLookup,
    ) -> Result<(), StoreError> {
        let key = format!("sailing/{departing_terminal}/{scheduled_departure}");
        self.tree
            .insert(key.as_bytes(), serde_json::to_vec(lookup)?)?;
        Ok(())
    }

    /// Seed a trip-key row (schedule importer).
    pub fn put_by_key(&self, trip_key: &str, snapshot: &ScheduleSnapshot) -> Result<(), StoreError> {
        let key = format!("key/{trip_key}");
        self.tree
            .insert(key.as_bytes(), serde_json::to_vec(snapshot)?)?;
        Ok(())
    }
}

#[async_trait]
impl ScheduleStore for SledScheduleStore {
    async fn lookup_arrival_terminal(
        &self,
        _vessel_id: &str,
        departing_terminal: &str,
        scheduled_departure: u64,
    ) -> Result<Option<ArrivalLookup>, StoreError> {
        let key = format!("sailing/{departing_terminal}/{scheduled_departure}");
        match self.tree.get(key.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    async fn lookup_by_key(&self, key: &str) -> Result<Option<ScheduleSnapshot>, StoreError> {
        let storage_key = format!("key/{key}");
        match self.tree.get(storage_key.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }
}

// ============================================================================
// In-Memory Implementation
// ============================================================================

/// HashMap-backed schedule store for tests and simulation.
#[derive(Default)]
pub struct InMemoryScheduleStore {
    sailings: Mutex<HashMap<(String, u64), ArrivalLookup>>,
    by_key: Mutex<HashMap<String, ScheduleSnapshot>>,
}

impl InMemoryScheduleStore {
    pub fn insert_sailing(
        &self,
        departing_terminal: &str,
        scheduled_departure: u64,
        lookup: ArrivalLookup,
    ) {
        if let Ok(mut sailings) = self.sailings.lock() {
            sailings.insert((departing_terminal.to_string(), scheduled_departure), lookup);
        }
    }

    pub fn insert_by_key(&self, trip_key: &str, snapshot: ScheduleSnapshot) {
        if let Ok(mut by_key) = self.by_key.lock() {
            by_key.insert(trip_key.to_string(), snapshot);
        }
    }
}

#[async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    async fn lookup_arrival_terminal(
        &self,
        _vessel_id: &str,
        departing_terminal: &str,
        scheduled_departure: u64,
    ) -> Result<Option<ArrivalLookup>, StoreError> {
        Ok(self.sailings.lock().ok().and_then(|sailings| {
            sailings
                .get(&(departing_terminal.to_string(), scheduled_departure))
                .cloned()
        }))
    }

    async fn lookup_by_key(&self, key: &str) -> Result<Option<ScheduleSnapshot>, StoreError> {
        Ok(self
            .by_key
            .lock()
            .ok()
            .and_then(|by_key| by_key.get(key).cloned()))
    }
}
