//! Telemetry sample types
//!
//! One sample per vessel per tick, straight from the upstream position feed.
//! Samples are ephemeral: they drive reconciliation but are never persisted
//! as trip history. Every optional field may be absent even if a previous
//! tick reported it, so nothing here is trusted beyond the current tick.

use serde::{Deserialize, Serialize};

/// A single vessel position report from the upstream feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Vessel identifier (stable across ticks)
    pub vessel_id: String,
    /// Terminal code the vessel is currently serving / departing from
    pub departing_terminal: String,
    /// Terminal code the vessel is heading to, when the feed knows it
    #[serde(default)]
    pub arriving_terminal: Option<String>,
    /// Latitude (degrees)
    #[serde(default)]
    pub latitude: f64,
    /// Longitude (degrees)
    #[serde(default)]
    pub longitude: f64,
    /// Whether the vessel is currently tied up at a dock
    pub at_dock: bool,
    /// Whether the vessel is in revenue service
    #[serde(default = "default_true")]
    pub in_service: bool,
    /// Scheduled departure for the current leg (epoch ms)
    #[serde(default)]
    pub scheduled_departure: Option<u64>,
    /// Feed-reported ETA at the arriving terminal (epoch ms)
    #[serde(default)]
    pub eta: Option<u64>,
    /// Feed-reported actual departure from the dock (epoch ms)
    #[serde(default)]
    pub left_dock: Option<u64>,
    /// When this sample was taken (epoch ms)
    pub timestamp: u64,
}

fn default_true() -> bool {
    true
}

/// Result of the ingestion sanity check on one sample.
#[derive(Debug, Clone, Default)]
pub struct SampleQuality {
    /// Whether the sample may enter the pipeline at all
    pub usable: bool,
    /// Human-readable reasons for rejection
    pub issues: Vec<String>,
}

/// Sanity-check a sample before it reaches the reconciliation pipeline.
///
/// Out-of-service vessels and samples with no identity or no timestamp are
/// rejected outright; partial optional fields are fine and handled downstream.
pub fn sample_quality(sample: &TelemetrySample) -> SampleQuality {
    let mut issues = Vec::new();

    if sample.vessel_id.trim().is_empty() {
        issues.push("empty vessel id".to_string());
    }
    if sample.departing_terminal.trim().is_empty() {
        issues.push("empty departing terminal".to_string());
    }
    if sample.timestamp == 0 {
        issues.push("zero sample timestamp".to_string());
    }
    if !sample.in_service {
        issues.push("vessel out of service".to_string());
    }

    SampleQuality {
        usable: issues.is_empty(),
        issues,
    }
}
