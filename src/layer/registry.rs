//! Layer Registry: the name index of currently active layers.
//!
//! The registry holds one retaining reference on every layer it indexes.
//! Replacing or removing a layer gives that reference up; requests that
//! acquired the old layer earlier keep it open until they finish.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mbtiles_server::layer::{Fingerprint, LayerRegistry, MbtilesStore};
//!
//! let registry = LayerRegistry::new(MbtilesStore::new());
//! let layer = registry.load("city", path, fingerprint);
//! registry.publish(layer);
//!
//! let guard = registry.acquire("city")?;
//! let tile = guard.lookup(3, 1, 2)?;
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::info;

use crate::error::TileError;

use super::handle::{Fingerprint, Layer, LayerGuard};
use super::store::TileStore;

/// Whether a publish introduced a layer or replaced a working one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// No previous entry, or the previous entry was invalid
    Loaded,
    /// A valid previous entry was replaced
    Updated,
}

/// Concurrent name → layer index.
pub struct LayerRegistry<S: TileStore> {
    store: Arc<S>,
    layers: RwLock<HashMap<String, Arc<Layer<S>>>>,
}

impl<S: TileStore> LayerRegistry<S> {
    /// Create an empty registry loading layers through `store`.
    pub fn new(store: S) -> Self {
        Self::with_shared_store(Arc::new(store))
    }

    /// Create an empty registry sharing an existing store.
    pub fn with_shared_store(store: Arc<S>) -> Self {
        Self {
            store,
            layers: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Layer<S>>>> {
        self.layers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Layer<S>>>> {
        self.layers.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a layer file through this registry's store without publishing it.
    pub fn load(&self, name: &str, path: &Path, fingerprint: Fingerprint) -> Arc<Layer<S>> {
        Arc::new(Layer::load(Arc::clone(&self.store), name, path, fingerprint))
    }

    /// Take a request reference on the layer currently registered as `name`.
    ///
    /// The reference is taken before the read lock is released, so the layer
    /// cannot be retired between lookup and acquire.
    pub fn acquire(&self, name: &str) -> Result<LayerGuard<S>, TileError> {
        let layers = self.read();
        let layer = layers.get(name).ok_or_else(|| TileError::LayerNotFound {
            layer: name.to_string(),
        })?;

        if let Some(err) = layer.load_error() {
            return Err(TileError::InvalidLayer {
                layer: name.to_string(),
                reason: err.to_string(),
            });
        }

        Ok(LayerGuard::acquire(layer))
    }

    /// Register `layer` under its name, replacing any previous entry.
    ///
    /// The registry's reference on the replaced layer is dropped once the
    /// swap is visible.
    pub fn publish(&self, layer: Arc<Layer<S>>) -> PublishOutcome {
        let name = layer.name().to_string();
        let path = layer.path().to_path_buf();

        let previous = self.write().insert(name.clone(), layer);

        let outcome = match &previous {
            Some(old) if old.is_valid() => PublishOutcome::Updated,
            _ => PublishOutcome::Loaded,
        };

        match outcome {
            PublishOutcome::Updated => {
                info!("Updated file \"{}\" as \"{}\"", path.display(), name)
            }
            PublishOutcome::Loaded => {
                info!("Loaded file \"{}\" as \"{}\"", path.display(), name)
            }
        }

        if let Some(old) = previous {
            old.release();
        }

        outcome
    }

    /// Remove the layer registered as `name`.
    ///
    /// Returns `false` if no such layer was registered.
    pub fn retract(&self, name: &str) -> bool {
        let removed = self.write().remove(name);

        match removed {
            Some(layer) => {
                info!("Layer \"{}\" removed", name);
                layer.release();
                true
            }
            None => false,
        }
    }

    /// Remove every layer, returning how many were registered.
    pub fn clear(&self) -> usize {
        let drained: Vec<_> = self.write().drain().collect();
        let count = drained.len();
        for (name, layer) in drained {
            info!("Layer \"{}\" removed", name);
            layer.release();
        }
        count
    }

    /// Names of all registered layers, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of all registered layers, sorted by name.
    pub fn layers(&self) -> Vec<Arc<Layer<S>>> {
        let mut layers: Vec<_> = self.read().values().cloned().collect();
        layers.sort_by(|a, b| a.name().cmp(b.name()));
        layers
    }

    /// Fingerprint recorded for the layer registered as `name`.
    pub fn fingerprint(&self, name: &str) -> Option<Fingerprint> {
        self.read().get(name).map(|layer| layer.fingerprint())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
