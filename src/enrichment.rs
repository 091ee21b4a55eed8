//! Schedule Enrichment
//!
//! Thin adapter over the read-only schedule store. Invoked only on
//! qualifying events (dock arrival, key change) — never unconditionally
//! every tick — so lookup volume is bounded by lifecycle events rather
//! than feed frequency. Every failure mode (miss, store error, timeout)
//! degrades to "no enrichment."

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::storage::ScheduleStore;
use crate::types::{LifecycleEvents, ScheduleSnapshot};

/// What enrichment contributed this tick. Both fields empty on a miss.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentResult {
    /// Schedule-inferred arriving terminal, when the feed did not report one
    pub arriving_terminal: Option<String>,
    /// Snapshot of the matched schedule entry
    pub snapshot: Option<ScheduleSnapshot>,
}

/// The enrichment adapter.
pub struct ScheduleEnrichment {
    store: Arc<dyn ScheduleStore>,
    io_timeout: Duration,
}

impl ScheduleEnrichment {
    pub fn new(store: Arc<dyn ScheduleStore>, io_timeout: Duration) -> Self {
        Self { store, io_timeout }
    }

    /// Run the conditional lookups for one vessel's tick.
    ///
    /// Tries the sailing lookup first (needs a scheduled departure), then
    /// falls back to the trip-key lookup on a key change.
    pub async fn lookup(
        &self,
        events: LifecycleEvents,
        vessel_id: &str,
        departing_terminal: &str,
        scheduled_departure: Option<u64>,
        trip_key: &str,
    ) -> EnrichmentResult {
        if !events.qualifies_for_enrichment() {
            return EnrichmentResult::default();
        }

        if let Some(scheduled) = scheduled_departure {
            let lookup = tokio::time::timeout(
                self.io_timeout,
                self.store
                    .lookup_arrival_terminal(vessel_id, departing_terminal, scheduled),
            )
            .await;

            match lookup {
                Ok(Ok(Some(hit))) => {
                    debug!(
                        vessel = %vessel_id,
                        arriving = %hit.arriving_terminal,
                        "Schedule lookup resolved arriving terminal"
                    );
                    return EnrichmentResult {
                        arriving_terminal: Some(hit.arriving_terminal),
                        snapshot: Some(hit.snapshot),
                    };
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    warn!(vessel = %vessel_id, error = %e, "Schedule lookup failed — treating as miss");
                }
                Err(_) => {
                    warn!(vessel = %vessel_id, "Schedule lookup timed out — treating as miss");
                }
            }
        }

        if events.key_changed {
            let lookup =
                tokio::time::timeout(self.io_timeout, self.store.lookup_by_key(trip_key)).await;
            match lookup {
                Ok(Ok(Some(snapshot))) => {
                    return EnrichmentResult {
                        arriving_terminal: snapshot.arriving_terminal.clone(),
                        snapshot: Some(snapshot),
                    };
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    warn!(vessel = %vessel_id, error = %e, "Key lookup failed — treating as miss");
                }
                Err(_) => {
                    warn!(vessel = %vessel_id, "Key lookup timed out — treating as miss");
                }
            }
        }

        EnrichmentResult::default()
    }
}
