// Model Registry for dynamic model serving

use super::ModelHandle;
use crate::error::{GatewayError, Result};
use crate::observability;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Registry key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ModelKey {
    /// Model name
    pub name: String,
    /// Model version (None for unversioned)
    pub version: Option<String>,
}

impl ModelKey {
    /// Creates a key. An empty version is the same as no version.
    pub fn new(name: impl Into<String>, version: Option<&str>) -> Self {
        Self {
            name: name.into(),
            version: version.filter(|v| !v.is_empty()).map(str::to_string),
        }
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}:{}", self.name, version),
            None => f.write_str(&self.name),
        }
    }
}

struct Entry {
    handle: ModelHandle,
    /// Registration order, used to pick the latest version
    seq: u64,
}

/// Registry statistics
#[derive(Default)]
pub struct RegistryStats {
    /// Successful registrations, replacements included
    pub registrations: AtomicU64,
    /// Entries removed
    pub unregistrations: AtomicU64,
    /// Lookups served
    pub lookups: AtomicU64,
    /// Lookups that found nothing
    pub misses: AtomicU64,
}

/// Mapping from `(name, version)` to the registered model.
///
/// Every mutation happens under one write lock, so a concurrent lookup sees the
/// state either before or after it. Lookups clone the handle out of the map;
/// removing an entry never affects callers already holding a handle.
pub struct ModelRegistry {
    models: RwLock<HashMap<ModelKey, Entry>>,
    next_seq: AtomicU64,
    stats: Arc<RegistryStats>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            stats: Arc::new(RegistryStats::default()),
        }
    }

    /// Inserts or replaces the entry for the model's key, returning the replaced model.
    pub fn register(&self, handle: ModelHandle) -> Result<Option<ModelHandle>> {
        if handle.name().trim().is_empty() {
            return Err(GatewayError::InvalidModel(
                "Failed to register model, model.name must be provided.".to_string(),
            ));
        }

        let key = handle.key();
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);

        let (previous, count) = {
            let mut models = self.models.write();
            let previous = models.insert(key.clone(), Entry { handle, seq });
            (previous.map(|e| e.handle), models.len())
        };

        self.stats.registrations.fetch_add(1, Ordering::Relaxed);
        observability::update_registry_metrics(count);
        info!(model = %key, replaced = previous.is_some(), "Registered model");

        Ok(previous)
    }

    /// Removes a model. `None` removes every version of `name`.
    ///
    /// Absent keys are not an error; returns how many entries were removed.
    pub fn unregister(&self, name: &str, version: Option<&str>) -> usize {
        let (removed, count) = {
            let mut models = self.models.write();
            let before = models.len();
            match version.filter(|v| !v.is_empty()) {
                Some(_) => {
                    models.remove(&ModelKey::new(name, version));
                }
                None => models.retain(|key, _| key.name != name),
            }
            (before - models.len(), models.len())
        };

        if removed > 0 {
            self.stats
                .unregistrations
                .fetch_add(removed as u64, Ordering::Relaxed);
            observability::update_registry_metrics(count);
            info!(model = name, version = ?version, removed, "Unregistered model");
        } else {
            debug!(model = name, version = ?version, "Unregister of absent model ignored");
        }

        removed
    }

    /// Looks up a model.
    ///
    /// With no version this is the unversioned entry if there is one, otherwise
    /// the most recently registered version of `name`.
    pub fn get(&self, name: &str, version: Option<&str>) -> Option<ModelHandle> {
        self.stats.lookups.fetch_add(1, Ordering::Relaxed);

        let models = self.models.read();
        let found = match version.filter(|v| !v.is_empty()) {
            Some(_) => models.get(&ModelKey::new(name, version)).map(|e| e.handle.clone()),
            None => models
                .get(&ModelKey::new(name, None))
                .or_else(|| {
                    models
                        .iter()
                        .filter(|(key, _)| key.name == name)
                        .max_by_key(|(_, entry)| entry.seq)
                        .map(|(_, entry)| entry)
                })
                .map(|e| e.handle.clone()),
        };

        if found.is_none() {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Looks up a model, reporting which part of the key was unknown.
    pub fn lookup(&self, name: &str, version: Option<&str>) -> Result<ModelHandle> {
        if let Some(handle) = self.get(name, version) {
            return Ok(handle);
        }

        let version = version.filter(|v| !v.is_empty());
        match version {
            Some(version) if self.contains_name(name) => Err(GatewayError::ModelVersionNotFound {
                name: name.to_string(),
                version: version.to_string(),
            }),
            _ => Err(GatewayError::ModelNotFound {
                name: name.to_string(),
            }),
        }
    }

    fn contains_name(&self, name: &str) -> bool {
        self.models.read().keys().any(|key| key.name == name)
    }

    /// All registered keys, sorted.
    pub fn all(&self) -> Vec<ModelKey> {
        let mut keys: Vec<ModelKey> = self.models.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Every registered model, in key order.
    pub fn handles(&self) -> Vec<ModelHandle> {
        let models = self.models.read();
        let mut entries: Vec<(&ModelKey, &Entry)> = models.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter().map(|(_, e)| e.handle.clone()).collect()
    }

    /// True iff every registered model is ready. An empty registry is ready.
    pub fn readiness_all(&self) -> bool {
        self.models.read().values().all(|e| e.handle.ready())
    }

    /// Number of registered entries
    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gets statistics
    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }
}
