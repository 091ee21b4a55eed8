//! Feature extraction for the linear estimate models.
//!
//! Produces a fixed-length named vector; the ordering here is the training
//! contract and must never be reordered without retraining every model.
//!
//! Layout:
//! - `[0..8)`  Gaussian radial-basis encoding of scheduled-departure
//!   time-of-day, centers every 3 hours, width = half the spacing
//! - `[8]`     weekend indicator (1.0 on Sat/Sun)
//! - `[9]`     previous-leg delay (minutes)
//! - `[10]`    previous-leg at-sea duration (minutes)
//! - `[11]`    minutes between arrival-at-dock and scheduled departure

use chrono::{Datelike, TimeZone, Timelike, Utc, Weekday};

use crate::config::defaults::{RBF_CENTER_COUNT, RBF_CENTER_SPACING_HOURS, RBF_SIGMA_HOURS};
use crate::types::{minutes_between, Trip};

use super::SkipReason;

/// Total feature count. Model coefficient vectors must match this length.
pub const FEATURE_COUNT: usize = RBF_CENTER_COUNT + 4;

/// Stable feature names, index-aligned with [`FeatureVector::values`].
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "tod_rbf_00",
    "tod_rbf_03",
    "tod_rbf_06",
    "tod_rbf_09",
    "tod_rbf_12",
    "tod_rbf_15",
    "tod_rbf_18",
    "tod_rbf_21",
    "weekend",
    "prev_delay_minutes",
    "prev_duration_minutes",
    "dock_to_scheduled_minutes",
];

/// A fixed-order feature vector.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    /// Dot product against a coefficient slice plus intercept.
    /// Returns `None` on a shape mismatch rather than truncating silently.
    pub fn apply(&self, coefficients: &[f64], intercept: f64) -> Option<f64> {
        if coefficients.len() != FEATURE_COUNT {
            return None;
        }
        let sum: f64 = self
            .values
            .iter()
            .zip(coefficients.iter())
            .map(|(f, c)| f * c)
            .sum();
        Some(intercept + sum)
    }
}

/// Extract the feature vector from a trip's timing context.
///
/// Requires a scheduled departure and full prior-leg context; anything
/// missing is a [`SkipReason`], never a panic or error.
pub fn extract_features(trip: &Trip) -> Result<FeatureVector, SkipReason> {
    let scheduled = trip
        .scheduled_departure
        .ok_or(SkipReason::MissingScheduledDeparture)?;

    let prev_left = trip
        .prev_left_dock
        .ok_or(SkipReason::MissingPriorLegContext)?;
    let prev_scheduled = trip
        .prev_scheduled_departure
        .ok_or(SkipReason::MissingPriorLegContext)?;

    let prev_delay_minutes = minutes_between(prev_scheduled, prev_left);
    // The predecessor's at-sea leg ends exactly where this trip starts.
    let prev_duration_minutes = minutes_between(prev_left, trip.trip_start);
    // trip_start is the dock-arrival observation for this leg.
    let dock_to_scheduled_minutes = minutes_between(trip.trip_start, scheduled);

    let (hour_of_day, weekend) = time_of_day_context(scheduled);

    let mut values = [0.0; FEATURE_COUNT];
    for (i, value) in values.iter_mut().enumerate().take(RBF_CENTER_COUNT) {
        let center = i as f64 * RBF_CENTER_SPACING_HOURS;
        *value = rbf(hour_of_day, center);
    }
    values[RBF_CENTER_COUNT] = if weekend { 1.0 } else { 0.0 };
    values[RBF_CENTER_COUNT + 1] = prev_delay_minutes;
    values[RBF_CENTER_COUNT + 2] = prev_duration_minutes;
    values[RBF_CENTER_COUNT + 3] = dock_to_scheduled_minutes;

    Ok(FeatureVector { values })
}

/// Fractional hour-of-day and weekend flag for an epoch-ms timestamp.
fn time_of_day_context(epoch_ms: u64) -> (f64, bool) {
    match Utc.timestamp_millis_opt(epoch_ms as i64).single() {
        Some(dt) => {
            let hour = dt.hour() as f64 + dt.minute() as f64 / 60.0;
            let weekend = matches!(dt.weekday(), Weekday::Sat | Weekday::Sun);
            (hour, weekend)
        }
        None => (0.0, false),
    }
}

/// Gaussian radial basis on the circular 24-hour clock, so 23:30 activates
/// the midnight center as strongly as 00:30 does.
fn rbf(hour: f64, center: f64) -> f64 {
    let raw = (hour - center).abs();
    let distance = raw.min(24.0 - raw);
    (-(distance * distance) / (2.0 * RBF_SIGMA_HOURS * RBF_SIGMA_HOURS)).exp()
}
