//! TOML-backed tracker configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use super::defaults;

/// Top-level tracker configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub estimates: EstimateSection,
}

/// Orchestration tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Seconds between orchestration passes
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Per-call collaborator I/O timeout (ms)
    #[serde(default = "default_collaborator_timeout_ms")]
    pub collaborator_timeout_ms: u64,
}

/// Persistence tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    /// Sled database path
    #[serde(default = "default_store_path")]
    pub path: String,
    /// Prediction-history records to keep; older records are pruned at
    /// startup
    #[serde(default = "default_prediction_retention")]
    pub prediction_retention: usize,
}

/// Estimate post-processing tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateSection {
    /// Minimum minutes between reference time and any prediction
    #[serde(default = "default_minimum_gap_minutes")]
    pub minimum_gap_minutes: f64,
}

fn default_tick_interval_secs() -> u64 {
    defaults::TICK_INTERVAL_SECS
}
fn default_collaborator_timeout_ms() -> u64 {
    defaults::COLLABORATOR_TIMEOUT_MS
}
fn default_store_path() -> String {
    defaults::STORE_PATH.to_string()
}
fn default_prediction_retention() -> usize {
    defaults::PREDICTION_RETENTION
}
fn default_minimum_gap_minutes() -> f64 {
    defaults::MINIMUM_GAP_MINUTES
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            collaborator_timeout_ms: default_collaborator_timeout_ms(),
        }
    }
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            prediction_retention: default_prediction_retention(),
        }
    }
}

impl Default for EstimateSection {
    fn default() -> Self {
        Self {
            minimum_gap_minutes: default_minimum_gap_minutes(),
        }
    }
}

impl TrackerConfig {
    /// Load configuration using the documented precedence:
    /// `HARBORWATCH_CONFIG` env var > `./harborwatch.toml` > built-in defaults.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("HARBORWATCH_CONFIG") {
            match Self::from_file(&path) {
                Ok(config) => {
                    info!(path = %path, "Loaded tracker config from HARBORWATCH_CONFIG");
                    return config;
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "Failed to load HARBORWATCH_CONFIG — falling back");
                }
            }
        }

        let local = Path::new("harborwatch.toml");
        if local.exists() {
            match Self::from_file(local) {
                Ok(config) => {
                    info!("Loaded tracker config from ./harborwatch.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to parse ./harborwatch.toml — using defaults");
                }
            }
        }

        info!("No tracker config file found — using built-in defaults");
        Self::default()
    }

    /// Load and parse a specific TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&text)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::default();
        assert_eq!(config.engine.tick_interval_secs, 30);
        assert_eq!(config.engine.collaborator_timeout_ms, 1_500);
        assert!((config.estimates.minimum_gap_minutes - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: TrackerConfig = toml::from_str(
            r#"
            [engine]
            tick_interval_secs = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.tick_interval_secs, 10);
        // untouched sections keep defaults
        assert_eq!(config.engine.collaborator_timeout_ms, 1_500);
        assert_eq!(config.store.path, super::defaults::STORE_PATH);
        assert_eq!(config.store.prediction_retention, 10_000);
    }
}
