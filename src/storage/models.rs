//! Model store: read-only keyed lookup of trained estimate models.
//!
//! Keyed by `(departing terminal, arriving terminal, model type)`. The
//! batched load exists so one vessel's qualifying event costs one external
//! call regardless of how many slots it triggers.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use crate::types::{EstimateModel, ModelKey};

use super::StoreError;

/// Read-only model lookup collaborator.
#[async_trait]
pub trait ModelStore: Send + Sync {
    /// Load one model; absence is a miss, not an error.
    async fn load(&self, key: &ModelKey) -> Result<Option<EstimateModel>, StoreError>;

    /// Load several models in one call. Missing keys are simply absent
    /// from the result map.
    async fn load_batch(
        &self,
        keys: &[ModelKey],
    ) -> Result<HashMap<ModelKey, EstimateModel>, StoreError>;
}

// ============================================================================
// Sled Implementation
// ============================================================================

/// Sled-backed model store. Write access (`put`) exists only for seeding
/// from an offline training run; the engine never writes.
pub struct SledModelStore {
    tree: sled::Tree,
}

impl SledModelStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path.as_ref())?;
        let tree = db.open_tree("estimate_models")?;
        Ok(Self { tree })
    }

    /// Open against an existing database handle (shares the file with the
    /// trip store).
    pub fn from_db(db: &sled::Db) -> Result<Self, StoreError> {
        let tree = db.open_tree("estimate_models")?;
        Ok(Self { tree })
    }

    /// Seed a model (offline training import).
    pub fn put(&self, key: &ModelKey, model: &EstimateModel) -> Result<(), StoreError> {
        self.tree
            .insert(key.storage_key().as_bytes(), serde_json::to_vec(model)?)?;
        Ok(())
    }
}

#[async_trait]
impl ModelStore for SledModelStore {
    async fn load(&self, key: &ModelKey) -> Result<Option<EstimateModel>, StoreError> {
        match self.tree.get(key.storage_key().as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    async fn load_batch(
        &self,
        keys: &[ModelKey],
    ) -> Result<HashMap<ModelKey, EstimateModel>, StoreError> {
        let mut models = HashMap::new();
        for key in keys {
            if let Some(value) = self.tree.get(key.storage_key().as_bytes())? {
                models.insert(key.clone(), serde_json::from_slice(&value)?);
            }
        }
        Ok(models)
    }
}

// ============================================================================
// In-Memory Implementation
// ============================================================================

/// HashMap-backed model store for tests and simulation seeding.
#[derive(Default)]
pub struct InMemoryModelStore {
    models: Mutex<HashMap<ModelKey, EstimateModel>>,
}

impl InMemoryModelStore {
    pub fn insert(&self, key: ModelKey, model: EstimateModel) {
        if let Ok(mut models) = self.models.lock() {
            models.insert(key, model);
        }
    }
}

#[async_trait]
impl ModelStore for InMemoryModelStore {
    async fn load(&self, key: &ModelKey) -> Result<Option<EstimateModel>, StoreError> {
        Ok(self
            .models
            .lock()
            .ok()
            .and_then(|models| models.get(key).cloned()))
    }

    async fn load_batch(
        &self,
        keys: &[ModelKey],
    ) -> Result<HashMap<ModelKey, EstimateModel>, StoreError> {
        let mut result = HashMap::new();
        if let Ok(models) = self.models.lock() {
            for key in keys {
                if let Some(model) = models.get(key) {
                    result.insert(key.clone(), model.clone());
                }
            }
        }
        Ok(result)
    }
}
