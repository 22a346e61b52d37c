// AssetLens - app/interrupt.rs
//
// Invalidation Controller: cooperative interrupt flags per (location, task)
// scope, plus the reset sequence that ties the Cache Store and the queues
// together.
//
// Reset order matters:
//   1. raise the scope's flag so Discovery and workers fast-fail,
//   2. swap the scope's DataSets (generation bump),
//   3. drop the scope's queued items,
//   4. lower the flag.
// The flag is only a fast-fail signal for the reset window; stale work that
// slips past it is caught by the generation check.

use crate::app::queue::QueueManager;
use crate::core::cache::CacheStore;
use crate::core::model::{DataSetKey, ScopeKey};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Interrupt flag per scope, created on demand.
#[derive(Default)]
pub struct InterruptRegistry {
    flags: Mutex<HashMap<ScopeKey, Arc<AtomicBool>>>,
}

impl InterruptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared flag for `scope`, checked by Discovery on every entry.
    pub fn flag(&self, scope: &ScopeKey) -> Arc<AtomicBool> {
        Arc::clone(
            self.flags
                .lock()
                .entry(scope.clone())
                .or_insert_with(|| Arc::new(AtomicBool::new(false))),
        )
    }

    pub fn raise(&self, scope: &ScopeKey) {
        self.flag(scope).store(true, Ordering::Release);
    }

    pub fn lower(&self, scope: &ScopeKey) {
        if let Some(flag) = self.flags.lock().get(scope) {
            flag.store(false, Ordering::Release);
        }
    }

    pub fn is_raised(&self, scope: &ScopeKey) -> bool {
        self.flags
            .lock()
            .get(scope)
            .is_some_and(|f| f.load(Ordering::Acquire))
    }

    /// Worker-side check for the scope of `key`.
    pub fn is_raised_for(&self, key: &DataSetKey) -> bool {
        let flags = self.flags.lock();
        if flags.is_empty() {
            return false;
        }
        flags.iter().any(|(scope, flag)| {
            scope.location == key.location
                && scope.task == key.task
                && flag.load(Ordering::Acquire)
        })
    }
}

/// Coordinates interrupts, the Cache Store, and the queues.
pub struct InvalidationController {
    interrupts: Arc<InterruptRegistry>,
    cache: Arc<CacheStore>,
    queues: Arc<QueueManager>,
}

impl InvalidationController {
    pub fn new(
        interrupts: Arc<InterruptRegistry>,
        cache: Arc<CacheStore>,
        queues: Arc<QueueManager>,
    ) -> Self {
        Self {
            interrupts,
            cache,
            queues,
        }
    }

    /// Ask in-flight Discovery and workers of `scope` to stop at their next
    /// check. Stays raised until `reset` or `resume`.
    pub fn request_interrupt(&self, scope: &ScopeKey) {
        tracing::debug!(scope = %scope, "Interrupt requested");
        self.interrupts.raise(scope);
    }

    /// Lower the flag without resetting, letting blocked items run again.
    pub fn resume(&self, scope: &ScopeKey) {
        self.interrupts.lower(scope);
        self.queues.notify_all();
    }

    /// Discard both DataSets of `scope` and every queued item referencing
    /// them. Returns the number of queue items removed.
    pub fn reset(&self, scope: &ScopeKey) -> usize {
        self.interrupts.raise(scope);
        let datasets = self.cache.reset_scope(scope);
        let removed = self.queues.clear_scope(scope);
        self.interrupts.lower(scope);
        self.queues.notify_all();
        tracing::info!(scope = %scope, datasets, removed, "Scope reset");
        removed
    }

    /// Evict both DataSets of `scope` without replacement (view teardown).
    pub fn forget(&self, scope: &ScopeKey) -> usize {
        self.interrupts.raise(scope);
        let datasets = self.cache.forget_scope(scope);
        let removed = self.queues.clear_scope(scope);
        self.interrupts.lower(scope);
        self.queues.notify_all();
        tracing::debug!(scope = %scope, datasets, removed, "Scope forgotten");
        removed
    }
}
