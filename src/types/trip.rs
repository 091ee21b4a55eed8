//! Trip record types: the authoritative per-vessel leg state.
//!
//! A `Trip` is one vessel-leg. Exactly one active trip exists per vessel at
//! any time; completed legs are archived immutably under their composite key.
//! The builder always emits a complete `Trip` value (never a partial patch),
//! so change detection is a plain value comparison.

use serde::{Deserialize, Serialize};

use super::{ModelType, ScheduleSnapshot, MS_PER_MINUTE};

// ============================================================================
// Composite Key & Duration Helpers
// ============================================================================

/// Build the composite trip key: `vessel-departing-arriving-hash`.
///
/// The hash component is the first 8 hex characters of the MD5 of the
/// scheduled departure, so the key is stable for a given sailing and changes
/// when the schedule identity changes. Unknown components render as `?` so a
/// later-resolved arriving terminal or schedule produces a detectable key
/// change rather than a silent collision.
pub fn composite_key(
    vessel_id: &str,
    departing_terminal: &str,
    arriving_terminal: Option<&str>,
    scheduled_departure: Option<u64>,
) -> String {
    let digest = md5::compute(
        scheduled_departure
            .map(|ms| ms.to_string())
            .unwrap_or_else(|| "?".to_string()),
    );
    let hash = format!("{:x}", digest);
    format!(
        "{}-{}-{}-{}",
        vessel_id,
        departing_terminal,
        arriving_terminal.unwrap_or("?"),
        &hash[..8]
    )
}

/// Round a minute quantity to one decimal place.
pub fn round_minutes(minutes: f64) -> f64 {
    (minutes * 10.0).round() / 10.0
}

/// Minutes between two epoch-ms timestamps, one-decimal rounding.
///
/// Signed: negative when `end` precedes `start` (e.g. an early departure
/// against its schedule).
pub fn minutes_between(start: u64, end: u64) -> f64 {
    round_minutes((end as f64 - start as f64) / MS_PER_MINUTE)
}

// ============================================================================
// Estimates
// ============================================================================

/// One computed time estimate, created once by the estimate engine and
/// actualized at most once when the outcome is observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    /// Predicted absolute time (epoch ms, rounded to the second)
    pub predicted: u64,
    /// Lower bound (predicted minus one std-dev)
    pub min: u64,
    /// Upper bound (predicted plus one std-dev)
    pub max: u64,
    /// Trained mean absolute error of the model (minutes)
    pub mae: f64,
    /// Std-dev used for the bounds (minutes)
    pub std_dev: f64,
    /// Observed outcome, floored to the second (epoch ms)
    #[serde(default)]
    pub actual: Option<u64>,
    /// `(actual - predicted)` in minutes, one decimal
    #[serde(default)]
    pub delta_total: Option<f64>,
    /// 0 when actual falls within `[min, max]`, else signed minutes to the
    /// nearer violated bound
    #[serde(default)]
    pub delta_range: Option<f64>,
}

impl Estimate {
    /// Whether this estimate has already been graded against an outcome.
    pub fn is_actualized(&self) -> bool {
        self.actual.is_some()
    }
}

/// The five named estimate slots carried by every trip.
///
/// Closed set: slot semantics (trigger event, model type, anchor) live in
/// the estimate engine's descriptor table, keyed by this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EstimateSlot {
    /// When this trip will leave the dock (made while at dock)
    LeftDock,
    /// When this trip will reach its arriving terminal (made while at dock)
    ArrivalFromDock,
    /// When this trip will reach its arriving terminal (made once underway)
    ArrivalUnderway,
    /// When the *next* departure from the arriving terminal will occur
    /// (made while at dock)
    NextDepartureFromDock,
    /// Same as above, refreshed once this trip is underway
    NextDepartureUnderway,
}

impl EstimateSlot {
    /// All slots, in descriptor-table order.
    pub const ALL: [EstimateSlot; 5] = [
        EstimateSlot::LeftDock,
        EstimateSlot::ArrivalFromDock,
        EstimateSlot::ArrivalUnderway,
        EstimateSlot::NextDepartureFromDock,
        EstimateSlot::NextDepartureUnderway,
    ];

    /// Stable name used in storage keys and prediction-history records.
    pub fn as_str(&self) -> &'static str {
        match self {
            EstimateSlot::LeftDock => "left_dock",
            EstimateSlot::ArrivalFromDock => "arrival_from_dock",
            EstimateSlot::ArrivalUnderway => "arrival_underway",
            EstimateSlot::NextDepartureFromDock => "next_departure_from_dock",
            EstimateSlot::NextDepartureUnderway => "next_departure_underway",
        }
    }

    /// The model type trained for this slot.
    pub fn model_type(&self) -> ModelType {
        match self {
            EstimateSlot::LeftDock => ModelType::AtDockDeparture,
            EstimateSlot::ArrivalFromDock => ModelType::AtDockArrival,
            EstimateSlot::ArrivalUnderway => ModelType::UnderwayArrival,
            EstimateSlot::NextDepartureFromDock => ModelType::AtDockNextDeparture,
            EstimateSlot::NextDepartureUnderway => ModelType::UnderwayNextDeparture,
        }
    }
}

impl std::fmt::Display for EstimateSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Container for the five slots, so the engine and actualizer can address
/// them generically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EstimateSlots {
    #[serde(default)]
    pub left_dock: Option<Estimate>,
    #[serde(default)]
    pub arrival_from_dock: Option<Estimate>,
    #[serde(default)]
    pub arrival_underway: Option<Estimate>,
    #[serde(default)]
    pub next_departure_from_dock: Option<Estimate>,
    #[serde(default)]
    pub next_departure_underway: Option<Estimate>,
}

impl EstimateSlots {
    pub fn get(&self, slot: EstimateSlot) -> Option<&Estimate> {
        match slot {
            EstimateSlot::LeftDock => self.left_dock.as_ref(),
            EstimateSlot::ArrivalFromDock => self.arrival_from_dock.as_ref(),
            EstimateSlot::ArrivalUnderway => self.arrival_underway.as_ref(),
            EstimateSlot::NextDepartureFromDock => self.next_departure_from_dock.as_ref(),
            EstimateSlot::NextDepartureUnderway => self.next_departure_underway.as_ref(),
        }
    }

    pub fn get_mut(&mut self, slot: EstimateSlot) -> Option<&mut Estimate> {
        match slot {
            EstimateSlot::LeftDock => self.left_dock.as_mut(),
            EstimateSlot::ArrivalFromDock => self.arrival_from_dock.as_mut(),
            EstimateSlot::ArrivalUnderway => self.arrival_underway.as_mut(),
            EstimateSlot::NextDepartureFromDock => self.next_departure_from_dock.as_mut(),
            EstimateSlot::NextDepartureUnderway => self.next_departure_underway.as_mut(),
        }
    }

    /// Fill a slot. The engine's empty-slot guard means this only ever
    /// happens once per slot per trip identity.
    pub fn set(&mut self, slot: EstimateSlot, estimate: Estimate) {
        match slot {
            EstimateSlot::LeftDock => self.left_dock = Some(estimate),
            EstimateSlot::ArrivalFromDock => self.arrival_from_dock = Some(estimate),
            EstimateSlot::ArrivalUnderway => self.arrival_underway = Some(estimate),
            EstimateSlot::NextDepartureFromDock => self.next_departure_from_dock = Some(estimate),
            EstimateSlot::NextDepartureUnderway => self.next_departure_underway = Some(estimate),
        }
    }

    /// Number of populated slots.
    pub fn populated(&self) -> usize {
        EstimateSlot::ALL
            .iter()
            .filter(|s| self.get(**s).is_some())
            .count()
    }
}

// ============================================================================
// Trip
// ============================================================================

/// One vessel-leg: the authoritative state reconciled from telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    // === Identity ===
    /// Vessel identifier
    pub vessel_id: String,
    /// Terminal the leg departs from
    pub departing_terminal: String,
    /// Terminal the leg arrives at (may resolve later via schedule lookup)
    #[serde(default)]
    pub arriving_terminal: Option<String>,
    /// Composite key: vessel + terminals + scheduled-departure hash
    pub key: String,

    // === Timing ===
    /// When this leg began (first observation / boundary tick, epoch ms)
    pub trip_start: u64,
    /// Scheduled departure (epoch ms). Fill-once: never erased by an
    /// absent upstream value.
    #[serde(default)]
    pub scheduled_departure: Option<u64>,
    /// Actual departure from dock (epoch ms). Fill-once; may be inferred
    /// from the at-dock flag flipping false.
    #[serde(default)]
    pub left_dock: Option<u64>,
    /// Feed ETA (epoch ms). Fill-once.
    #[serde(default)]
    pub eta: Option<u64>,
    /// When this leg ended (set only at the boundary that completes it)
    #[serde(default)]
    pub trip_end: Option<u64>,
    /// Whether the vessel is currently at a dock
    pub at_dock: bool,

    // === Derived durations (minutes, one decimal) ===
    /// trip-start to left-dock
    #[serde(default)]
    pub at_dock_minutes: Option<f64>,
    /// left-dock to trip-end
    #[serde(default)]
    pub at_sea_minutes: Option<f64>,
    /// trip-start to trip-end
    #[serde(default)]
    pub total_minutes: Option<f64>,
    /// left-dock minus scheduled-departure (negative = early)
    #[serde(default)]
    pub delay_minutes: Option<f64>,

    // === Previous-leg context (set at the boundary, then carried) ===
    #[serde(default)]
    pub prev_terminal: Option<String>,
    #[serde(default)]
    pub prev_scheduled_departure: Option<u64>,
    #[serde(default)]
    pub prev_left_dock: Option<u64>,

    // === Estimates & schedule ===
    /// The five estimate slots
    #[serde(default)]
    pub estimates: EstimateSlots,
    /// Schedule snapshot from enrichment, when a lookup hit
    #[serde(default)]
    pub schedule: Option<ScheduleSnapshot>,

    /// Timestamp of the last telemetry sample applied to this record.
    /// Changes every tick; excluded from change detection.
    pub last_observed: u64,
}

impl Trip {
    /// Delay of this leg against its schedule, when both endpoints are known.
    pub fn computed_delay(&self) -> Option<f64> {
        match (self.scheduled_departure, self.left_dock) {
            (Some(sched), Some(left)) => Some(minutes_between(sched, left)),
            _ => None,
        }
    }

    /// Key of the predecessor leg, reconstructable from the carried
    /// prev-* context. The predecessor's arriving terminal is this leg's
    /// departing terminal by construction.
    pub fn predecessor_key(&self) -> Option<String> {
        self.prev_terminal.as_deref().map(|prev| {
            composite_key(
                &self.vessel_id,
                prev,
                Some(&self.departing_terminal),
                self.prev_scheduled_departure,
            )
        })
    }
}

// ============================================================================
// Prediction History
// ============================================================================

/// Append-only output record, one per actualized estimate slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub trip_key: String,
    pub slot: EstimateSlot,
    pub predicted: u64,
    pub min: u64,
    pub max: u64,
    pub mae: f64,
    pub std_dev: f64,
    pub actual: u64,
    pub delta_total: f64,
    pub delta_range: f64,
}
