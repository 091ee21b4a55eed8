//! Estimate model types: the read-only model store contract.
//!
//! Models are trained offline; this crate only evaluates them. The model
//! type is a closed enumeration at the store boundary so a typo'd string
//! can never silently miss.

use serde::{Deserialize, Serialize};

/// The closed set of model types, one per estimate slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelType {
    /// Departure time, predicted while at dock
    AtDockDeparture,
    /// Arrival time, predicted while at dock
    AtDockArrival,
    /// Arrival time, predicted once underway
    UnderwayArrival,
    /// Next departure from the far terminal, predicted while at dock
    AtDockNextDeparture,
    /// Next departure from the far terminal, predicted once underway
    UnderwayNextDeparture,
}

impl ModelType {
    /// Stable name used in model storage keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::AtDockDeparture => "at_dock_departure",
            ModelType::AtDockArrival => "at_dock_arrival",
            ModelType::UnderwayArrival => "underway_arrival",
            ModelType::AtDockNextDeparture => "at_dock_next_departure",
            ModelType::UnderwayNextDeparture => "underway_next_departure",
        }
    }
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lookup key for the model store: one model per directed terminal pair
/// per model type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelKey {
    pub departing_terminal: String,
    pub arriving_terminal: String,
    pub model_type: ModelType,
}

impl ModelKey {
    pub fn new(departing: &str, arriving: &str, model_type: ModelType) -> Self {
        Self {
            departing_terminal: departing.to_string(),
            arriving_terminal: arriving.to_string(),
            model_type,
        }
    }

    /// Flat storage key: `departing/arriving/model_type`.
    pub fn storage_key(&self) -> String {
        format!(
            "{}/{}/{}",
            self.departing_terminal,
            self.arriving_terminal,
            self.model_type.as_str()
        )
    }
}

/// Offline training quality metrics shipped with every model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    /// Mean absolute error (minutes)
    pub mae: f64,
    /// Root mean squared error (minutes) — used as the bound std-dev
    pub rmse: f64,
    /// Coefficient of determination
    pub r2: f64,
}

/// A trained linear model: `predicted = intercept + Σ coefficient_i × feature_i`.
///
/// Coefficient ordering must match the fixed feature ordering in
/// `estimate::features`; a length mismatch is treated as a missing model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateModel {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    pub metrics: TrainingMetrics,
}
