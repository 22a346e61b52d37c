// AssetLens - core/cache.rs
//
// Cache Store: keyed registry of DataSets with an explicit create/reset
// lifecycle. One instance is constructed by the pipeline and shared with
// Discovery and the workers through `Arc`; there is no global cache.
//
// Reset is a pointer swap under a short mutex. It never waits for in-flight
// work: bumping the key's generation slot is what makes outstanding handles
// resolve to "gone".

use crate::core::dataset::{DataSet, GenerationSlot, WeakDataSetRef};
use crate::core::model::{DataKind, DataSetKey, ScopeKey};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct CacheInner {
    datasets: HashMap<DataSetKey, Arc<DataSet>>,
    /// Slots outlive their DataSets so generations keep increasing across
    /// forget/re-create cycles.
    slots: HashMap<DataSetKey, Arc<GenerationSlot>>,
}

impl CacheInner {
    fn slot(&mut self, key: &DataSetKey) -> Arc<GenerationSlot> {
        Arc::clone(
            self.slots
                .entry(key.clone())
                .or_insert_with(|| Arc::new(GenerationSlot::new())),
        )
    }
}

/// Registry mapping (location, task, kind) to the current DataSet.
#[derive(Default)]
pub struct CacheStore {
    inner: Mutex<CacheInner>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current DataSet for `key`, created empty on first access.
    pub fn get_or_create(&self, key: &DataSetKey) -> Arc<DataSet> {
        let mut inner = self.inner.lock();
        if let Some(ds) = inner.datasets.get(key) {
            return Arc::clone(ds);
        }
        let slot = inner.slot(key);
        let ds = Arc::new(DataSet::new(key.clone(), slot));
        inner.datasets.insert(key.clone(), Arc::clone(&ds));
        tracing::debug!(key = %key, generation = ds.generation(), "DataSet created");
        ds
    }

    /// Current DataSet for `key` without creating one.
    pub fn get(&self, key: &DataSetKey) -> Option<Arc<DataSet>> {
        self.inner.lock().datasets.get(key).cloned()
    }

    /// Discard the DataSet for `key` and install an empty replacement with a
    /// new generation. Returns the replacement immediately.
    pub fn reset(&self, key: &DataSetKey) -> Arc<DataSet> {
        let mut inner = self.inner.lock();
        let slot = inner.slot(key);
        let generation = slot.bump();
        let ds = Arc::new(DataSet::new(key.clone(), slot));
        inner.datasets.insert(key.clone(), Arc::clone(&ds));
        tracing::debug!(key = %key, generation, "DataSet reset");
        ds
    }

    /// Reset both kinds of `scope` that currently exist.
    pub fn reset_scope(&self, scope: &ScopeKey) -> usize {
        let mut reset = 0;
        for kind in DataKind::ALL {
            let key = scope.with_kind(kind);
            if self.contains(&key) {
                self.reset(&key);
                reset += 1;
            }
        }
        reset
    }

    /// Evict the DataSet for `key` without creating a replacement.
    /// Returns true if something was evicted.
    pub fn forget(&self, key: &DataSetKey) -> bool {
        let mut inner = self.inner.lock();
        let removed = inner.datasets.remove(key).is_some();
        if removed {
            let generation = inner.slot(key).bump();
            tracing::debug!(key = %key, generation, "DataSet forgotten");
        }
        removed
    }

    /// Evict both kinds of `scope`.
    pub fn forget_scope(&self, scope: &ScopeKey) -> usize {
        DataKind::ALL
            .iter()
            .filter(|&&kind| self.forget(&scope.with_kind(kind)))
            .count()
    }

    /// Weak reference to the current DataSet, for cross-thread signalling.
    pub fn snapshot(&self, key: &DataSetKey) -> Option<WeakDataSetRef> {
        self.get(key).map(|ds| ds.downgrade())
    }

    pub fn contains(&self, key: &DataSetKey) -> bool {
        self.inner.lock().datasets.contains_key(key)
    }

    /// True if the DataSet exists and has been fully loaded.
    pub fn is_loaded(&self, key: &DataSetKey) -> bool {
        self.get(key).is_some_and(|ds| ds.is_loaded())
    }

    /// Flag a DataSet for re-discovery on its next load.
    pub fn mark_refresh_needed(&self, key: &DataSetKey) {
        if let Some(ds) = self.get(key) {
            ds.set_refresh_needed(true);
        }
    }

    /// Number of cached DataSets.
    pub fn len(&self) -> usize {
        self.inner.lock().datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().datasets.is_empty()
    }

    pub fn keys(&self) -> Vec<DataSetKey> {
        self.inner.lock().datasets.keys().cloned().collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
