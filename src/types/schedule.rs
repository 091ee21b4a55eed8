//! Schedule snapshot attached to a trip by the enrichment adapter.

use serde::{Deserialize, Serialize};

/// Snapshot of the schedule entry a trip was matched against.
///
/// Produced by the read-only schedule store; a miss simply leaves the trip's
/// `schedule` field empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    /// Arriving terminal code the schedule names for this sailing
    #[serde(default)]
    pub arriving_terminal: Option<String>,
    /// Route identifier
    #[serde(default)]
    pub route_id: Option<String>,
    /// Route abbreviation (e.g. "sea-bi")
    #[serde(default)]
    pub route_abbrev: Option<String>,
    /// Sailing day the entry belongs to (YYYY-MM-DD)
    #[serde(default)]
    pub sailing_day: Option<String>,
    /// Next scheduled departure after this one (epoch ms)
    #[serde(default)]
    pub next_departure: Option<u64>,
}
