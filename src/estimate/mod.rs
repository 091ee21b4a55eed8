//! Estimate Engine
//!
//! Feature extraction, linear-model evaluation, trigger policy, and
//! actualization for the five per-trip estimate slots.
//!
//! Failure philosophy: the engine never throws. Missing models, missing
//! features, or extraction problems produce a [`SkipReason`] value; the slot
//! stays empty and is retried only on its next qualifying event, never on a
//! timer.

pub mod actualizer;
pub mod engine;
pub mod features;

pub use actualizer::{grade_slots, GradeClass};
pub use engine::{EstimateEngine, EstimateOutcome, SlotDescriptor, TriggerEvent, SLOT_TABLE};
pub use features::{extract_features, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};

use serde::{Deserialize, Serialize};

/// Why an estimate was skipped rather than computed. A skip is expected
/// behavior (a validation outcome), not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// No model trained for this (departing, arriving, model-type) key
    MissingModel,
    /// Model coefficient count does not match the feature vector
    FeatureShapeMismatch,
    /// Trip has no scheduled departure yet
    MissingScheduledDeparture,
    /// Trip has no prior-leg delay/duration context (e.g. a true first trip)
    MissingPriorLegContext,
    /// Trip has no arriving terminal to key the model by
    MissingArrivingTerminal,
    /// Departure-class slot requires a known left-dock anchor
    MissingLeftDock,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingModel => write!(f, "no model for route/type"),
            SkipReason::FeatureShapeMismatch => write!(f, "coefficient/feature shape mismatch"),
            SkipReason::MissingScheduledDeparture => write!(f, "no scheduled departure"),
            SkipReason::MissingPriorLegContext => write!(f, "no prior-leg context"),
            SkipReason::MissingArrivingTerminal => write!(f, "no arriving terminal"),
            SkipReason::MissingLeftDock => write!(f, "no left-dock anchor"),
        }
    }
}
