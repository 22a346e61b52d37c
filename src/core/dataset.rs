// AssetLens - core/dataset.rs
//
// DataSet: the ordered Record collection of one (location, task, kind) key,
// plus the generation-tagged handles that reference its Records from queues
// and events.
//
// Staleness model:
//   - Every key owns one `GenerationSlot` for its whole lifetime in the
//     Cache Store. The slot holds the key's current generation.
//   - A DataSet remembers the generation it was created with. Resetting or
//     forgetting the key bumps the slot, so every DataSet and handle of an
//     older generation resolves to "gone" without taking any lock.
//   - Handles additionally hold a `Weak<Record>`; the Record itself is freed
//     once the DataSet is dropped and no worker holds a strong reference.

use crate::core::model::{
    Category, DataSetKey, InfoFields, Record, RecordId, SortKey, SortSettings,
};
use parking_lot::RwLock;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

// =============================================================================
// Generation slot
// =============================================================================

/// Current generation of one Cache Store key.
#[derive(Debug, Default)]
pub struct GenerationSlot(AtomicU64);

impl GenerationSlot {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Advance to the next generation and return it.
    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

// =============================================================================
// DataSet
// =============================================================================

/// Ordered collection of Records for one key and generation.
///
/// Records are appended during Discovery and keep their id (insertion index)
/// for the lifetime of the generation. Sorting only replaces the row order.
pub struct DataSet {
    key: Arc<DataSetKey>,
    generation: u64,
    slot: Arc<GenerationSlot>,
    records: RwLock<Vec<Arc<Record>>>,
    order: RwLock<Vec<RecordId>>,
    loaded: AtomicBool,
    refresh_needed: AtomicBool,
    finalized: AtomicBool,
    truncated: AtomicBool,
}

impl fmt::Debug for DataSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSet")
            .field("key", &self.key)
            .field("generation", &self.generation)
            .field("len", &self.len())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl DataSet {
    /// Create an empty DataSet bound to the slot's current generation.
    pub fn new(key: DataSetKey, slot: Arc<GenerationSlot>) -> Self {
        let generation = slot.current();
        Self {
            key: Arc::new(key),
            generation,
            slot,
            records: RwLock::new(Vec::new()),
            order: RwLock::new(Vec::new()),
            loaded: AtomicBool::new(false),
            refresh_needed: AtomicBool::new(true),
            finalized: AtomicBool::new(false),
            truncated: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &DataSetKey {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True while no reset or forget has happened since this DataSet was made.
    pub fn is_current(&self) -> bool {
        self.slot.current() == self.generation
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Append a Record built from its future id. Returns the id.
    pub fn insert_with(&self, build: impl FnOnce(RecordId) -> Record) -> RecordId {
        let mut records = self.records.write();
        let id = records.len();
        records.push(Arc::new(build(id)));
        self.order.write().push(id);
        id
    }

    /// Record by stable id.
    pub fn record(&self, id: RecordId) -> Option<Arc<Record>> {
        self.records.read().get(id).cloned()
    }

    /// Record shown at `row` in the current order.
    pub fn row(&self, row: usize) -> Option<Arc<Record>> {
        let id = *self.order.read().get(row)?;
        self.record(id)
    }

    /// Record ids in display order.
    pub fn order(&self) -> Vec<RecordId> {
        self.order.read().clone()
    }

    /// Records in display order.
    pub fn rows(&self) -> Vec<Arc<Record>> {
        let records = self.records.read();
        self.order
            .read()
            .iter()
            .filter_map(|&id| records.get(id).cloned())
            .collect()
    }

    pub fn handle(&self, id: RecordId) -> Option<WorkHandle> {
        let record = self.record(id)?;
        Some(WorkHandle {
            key: Arc::clone(&self.key),
            generation: self.generation,
            id,
            record: Arc::downgrade(&record),
            slot: Arc::clone(&self.slot),
        })
    }

    /// Handles of every Record in display order.
    pub fn handles(&self) -> Vec<WorkHandle> {
        self.handles_for_rows(0..usize::MAX)
    }

    /// Handles of the Records displayed at `rows`, clamped to the DataSet.
    pub fn handles_for_rows(&self, rows: Range<usize>) -> Vec<WorkHandle> {
        let records = self.records.read();
        let order = self.order.read();
        let end = rows.end.min(order.len());
        let start = rows.start.min(end);
        order[start..end]
            .iter()
            .filter_map(|&id| {
                let record = records.get(id)?;
                Some(WorkHandle {
                    key: Arc::clone(&self.key),
                    generation: self.generation,
                    id,
                    record: Arc::downgrade(record),
                    slot: Arc::clone(&self.slot),
                })
            })
            .collect()
    }

    /// Weak reference used by end-of-dataset markers.
    pub fn downgrade(self: &Arc<Self>) -> WeakDataSetRef {
        WeakDataSetRef {
            key: Arc::clone(&self.key),
            generation: self.generation,
            dataset: Arc::downgrade(self),
            slot: Arc::clone(&self.slot),
        }
    }

    /// Number of Records whose `category` field is loaded.
    pub fn loaded_count(&self, category: Category) -> usize {
        self.records
            .read()
            .iter()
            .filter(|r| r.is_loaded(category))
            .count()
    }

    // -- Lifecycle flags --

    /// Discovery finished and the end-of-dataset sort has run.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub fn set_loaded(&self, loaded: bool) {
        self.loaded.store(loaded, Ordering::Release);
    }

    /// The source changed since discovery (e.g. reported by a file watcher).
    pub fn refresh_needed(&self) -> bool {
        self.refresh_needed.load(Ordering::Acquire)
    }

    pub fn set_refresh_needed(&self, value: bool) {
        self.refresh_needed.store(value, Ordering::Release);
    }

    /// Discovery stopped at the item limit.
    pub fn is_truncated(&self) -> bool {
        self.truncated.load(Ordering::Acquire)
    }

    pub fn set_truncated(&self, value: bool) {
        self.truncated.store(value, Ordering::Release);
    }

    /// Claim the one-time end-of-dataset sort. Only the first caller per
    /// discovery run gets `true`.
    pub fn claim_finalize(&self) -> bool {
        !self.finalized.swap(true, Ordering::AcqRel)
    }

    /// Re-arm the end-of-dataset sort before a new discovery run.
    pub fn rearm_finalize(&self) {
        self.finalized.store(false, Ordering::Release);
    }

    // -- Sorting --

    /// Replace the display order with a stable sort by `settings`.
    ///
    /// Ties are broken by Record id so equal keys keep discovery order.
    pub fn sort(&self, settings: SortSettings) {
        let records: Vec<Arc<Record>> = self.records.read().clone();

        let mut keyed: Vec<(SortValue, RecordId)> = records
            .iter()
            .map(|r| (SortValue::of(r, settings.key), r.id()))
            .collect();

        keyed.sort_by(|(a, a_id), (b, b_id)| {
            let ord = a.cmp(b);
            let ord = if settings.descending { ord.reverse() } else { ord };
            ord.then_with(|| a_id.cmp(b_id))
        });

        *self.order.write() = keyed.into_iter().map(|(_, id)| id).collect();

        tracing::debug!(
            key = %self.key,
            generation = self.generation,
            sort = %settings.key,
            descending = settings.descending,
            records = records.len(),
            "DataSet sorted"
        );
    }
}

/// Comparable value extracted from a Record for one sort key.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SortValue {
    Text(String),
    Number(i64),
    Pair(String, String),
}

impl SortValue {
    fn of(record: &Record, key: SortKey) -> Self {
        let base = record.base();
        match key {
            SortKey::Name => SortValue::Text(base.sort_name()),
            SortKey::Type => SortValue::Pair(base.extension.clone(), base.sort_name()),
            SortKey::Size => record.with_info(|i: &InfoFields| SortValue::Number(i.size as i64)),
            SortKey::Modified => record.with_info(|i: &InfoFields| {
                SortValue::Number(i.modified.map(|m| m.timestamp_millis()).unwrap_or(0))
            }),
        }
    }
}

// =============================================================================
// Work handles
// =============================================================================

/// Identity of a handle: equal for every clone made from the same Record of
/// the same generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandleId {
    pub key: Arc<DataSetKey>,
    pub generation: u64,
    pub id: RecordId,
}

/// Generation-checked weak reference to a Record.
#[derive(Clone)]
pub struct WorkHandle {
    key: Arc<DataSetKey>,
    generation: u64,
    id: RecordId,
    record: Weak<Record>,
    slot: Arc<GenerationSlot>,
}

impl WorkHandle {
    pub fn key(&self) -> &DataSetKey {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn record_id(&self) -> RecordId {
        self.id
    }

    pub fn identity(&self) -> HandleId {
        HandleId {
            key: Arc::clone(&self.key),
            generation: self.generation,
            id: self.id,
        }
    }

    /// True while the owning DataSet is current and the Record still exists.
    pub fn is_alive(&self) -> bool {
        self.slot.current() == self.generation && self.record.strong_count() > 0
    }

    /// Resolve to the Record, or `None` once the generation is stale.
    pub fn resolve(&self) -> Option<Arc<Record>> {
        if self.slot.current() != self.generation {
            return None;
        }
        self.record.upgrade()
    }
}

impl PartialEq for WorkHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.generation == other.generation && self.key == other.key
    }
}

impl Eq for WorkHandle {}

impl Hash for WorkHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
        self.generation.hash(state);
        self.id.hash(state);
    }
}

impl fmt::Debug for WorkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkHandle")
            .field("key", &self.key)
            .field("generation", &self.generation)
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Weak, generation-checked reference to a whole DataSet.
#[derive(Clone)]
pub struct WeakDataSetRef {
    key: Arc<DataSetKey>,
    generation: u64,
    dataset: Weak<DataSet>,
    slot: Arc<GenerationSlot>,
}

impl WeakDataSetRef {
    pub fn key(&self) -> &DataSetKey {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_alive(&self) -> bool {
        self.slot.current() == self.generation && self.dataset.strong_count() > 0
    }

    pub fn upgrade(&self) -> Option<Arc<DataSet>> {
        if self.slot.current() != self.generation {
            return None;
        }
        self.dataset.upgrade()
    }
}

impl fmt::Debug for WeakDataSetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakDataSetRef")
            .field("key", &self.key)
            .field("generation", &self.generation)
            .field("alive", &self.is_alive())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
