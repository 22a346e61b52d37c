// AssetLens - core/model.rs
//
// Core data model types shared by every layer: categories, DataSet keys,
// item flags, sort settings, per-category configuration values, and the
// Record itself.
//
// Concurrency model of a Record:
//   - Base fields are written once by Discovery before the Record is shared
//     and are immutable afterwards, so they carry no lock.
//   - Info fields and thumbnail fields each sit behind their own RwLock.
//     Exactly one worker category writes each group, so the locks are never
//     contended by two writers; they only publish values to readers.
//   - The per-category "loaded" flags are atomics so the at-most-once
//     transition can be decided without taking any lock.

use crate::core::sequence::SequenceInfo;
use chrono::{DateTime, Local};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

// =============================================================================
// Category
// =============================================================================

/// A class of background work with its own queue and worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// File statistics and sidecar descriptions/flags.
    Info,
    /// Thumbnail image generation.
    Thumbnail,
}

impl Category {
    /// Every category, in worker start-up order.
    pub const ALL: [Category; 2] = [Category::Info, Category::Thumbnail];

    /// Stable lowercase identifier (config section names, thread names).
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Info => "info",
            Category::Thumbnail => "thumbnail",
        }
    }

    /// Dense index for per-category arrays.
    pub fn index(&self) -> usize {
        match self {
            Category::Info => 0,
            Category::Thumbnail => 1,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// DataSet keys
// =============================================================================

/// Which Record layout a DataSet holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    /// One Record per file on disk.
    File,
    /// Numbered frames collapsed into one Record per sequence.
    Sequence,
}

impl DataKind {
    pub const ALL: [DataKind; 2] = [DataKind::File, DataKind::Sequence];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::File => "file",
            DataKind::Sequence => "sequence",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The (location, task) pair shared by both kinds of a view.
///
/// Interrupts and resets are scoped to this pair: switching task or
/// location invalidates the file and the sequence DataSet together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeKey {
    pub location: PathBuf,
    pub task: String,
}

impl ScopeKey {
    pub fn new(location: impl Into<PathBuf>, task: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            task: task.into(),
        }
    }

    /// Build the DataSet key for one kind within this scope.
    pub fn with_kind(&self, kind: DataKind) -> DataSetKey {
        DataSetKey {
            location: self.location.clone(),
            task: self.task.clone(),
            kind,
        }
    }

    /// Directory the DataSet's items are enumerated from.
    pub fn root(&self) -> PathBuf {
        if self.task.is_empty() {
            self.location.clone()
        } else {
            self.location.join(&self.task)
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.location.display(), self.task)
    }
}

/// Cache Store key: (location, task, kind).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataSetKey {
    pub location: PathBuf,
    pub task: String,
    pub kind: DataKind,
}

impl DataSetKey {
    pub fn new(location: impl Into<PathBuf>, task: impl Into<String>, kind: DataKind) -> Self {
        Self {
            location: location.into(),
            task: task.into(),
            kind,
        }
    }

    pub fn scope(&self) -> ScopeKey {
        ScopeKey {
            location: self.location.clone(),
            task: self.task.clone(),
        }
    }

    pub fn root(&self) -> PathBuf {
        self.scope().root()
    }
}

impl fmt::Display for DataSetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.location.display(), self.task, self.kind)
    }
}

// =============================================================================
// Item flags
// =============================================================================

bitflags::bitflags! {
    /// Per-item flag bitset. Discovery seeds the base set; the Info worker
    /// ORs in the flags stored in the sidecar.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ItemFlags: u32 {
        const SELECTABLE = 1 << 0;
        const ENABLED = 1 << 1;
        const EDITABLE = 1 << 2;
        const ARCHIVED = 1 << 9;
        const FAVOURITE = 1 << 10;
        const ACTIVE = 1 << 11;

        /// Flags every discovered item starts with.
        const DEFAULT = Self::SELECTABLE.bits() | Self::ENABLED.bits() | Self::EDITABLE.bits();
    }
}

impl fmt::Display for ItemFlags {
    /// Compact three-letter rendering: `A` archived, `F` favourite, `*` active.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = if self.contains(ItemFlags::ARCHIVED) { 'A' } else { '-' };
        let fav = if self.contains(ItemFlags::FAVOURITE) { 'F' } else { '-' };
        let act = if self.contains(ItemFlags::ACTIVE) { '*' } else { '-' };
        write!(f, "{a}{fav}{act}")
    }
}

// =============================================================================
// Sort settings
// =============================================================================

/// Column a DataSet is ordered by after its end-of-dataset marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Lowercased path relative to the task root.
    #[default]
    Name,
    /// Last modification time (Info field).
    Modified,
    /// Size in bytes (Info field; summed over frames for sequences).
    Size,
    /// Extension, then name.
    Type,
}

impl SortKey {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "name" => Some(SortKey::Name),
            "modified" | "date" => Some(SortKey::Modified),
            "size" => Some(SortKey::Size),
            "type" | "extension" => Some(SortKey::Type),
            _ => None,
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortKey::Name => "name",
            SortKey::Modified => "modified",
            SortKey::Size => "size",
            SortKey::Type => "type",
        })
    }
}

/// Currently configured sort key and direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortSettings {
    pub key: SortKey,
    pub descending: bool,
}

// =============================================================================
// Per-category configuration values
// =============================================================================

/// Which end of the queue a new request is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueuePolicy {
    /// Most recently requested first (interactive categories).
    Lifo,
    /// Oldest request first (bulk categories).
    Fifo,
}

impl QueuePolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "lifo" => Some(QueuePolicy::Lifo),
            "fifo" => Some(QueuePolicy::Fifo),
            _ => None,
        }
    }
}

/// What happens when a full queue receives another handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued handle (never an end-of-dataset marker).
    DropOldest,
    /// Refuse the new handle.
    Reject,
}

impl OverflowPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "drop_oldest" | "drop-oldest" => Some(OverflowPolicy::DropOldest),
            "reject" => Some(OverflowPolicy::Reject),
            _ => None,
        }
    }
}

/// Embedding configuration of one category queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryConfig {
    pub capacity: usize,
    pub policy: QueuePolicy,
    pub overflow: OverflowPolicy,
    /// Front-load every handle of a DataSet when it is loaded.
    pub preload: bool,
}

// =============================================================================
// Record
// =============================================================================

/// Stable integer index of a Record within one DataSet generation.
pub type RecordId = usize;

/// What a Record stands for on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    File,
    Sequence,
}

/// Cheap fields filled in by Discovery.
#[derive(Debug, Clone)]
pub struct BaseFields {
    /// Full path. Collapsed (`shot_<<1-10>>.exr`) for sequence Records.
    pub path: PathBuf,
    /// Path relative to the task root, `/`-separated.
    pub display_name: String,
    /// File name only.
    pub edit_name: String,
    /// Lowercased extension without the dot.
    pub extension: String,
    /// Parent directory names between the task root and the file.
    pub parent_segments: Vec<String>,
    pub item_type: ItemType,
    /// Frame layout for sequence Records.
    pub sequence: Option<SequenceInfo>,
    /// Flags seeded from known predicates (favourite, active).
    pub flags: ItemFlags,
    /// Row height hint in pixels for list views.
    pub row_height: u32,
}

impl BaseFields {
    /// Key used by the name sort: the lowercased relative path.
    pub fn sort_name(&self) -> String {
        self.display_name.to_lowercase()
    }

    /// Key of the item's sidecar row and seeded flags.
    pub fn proxy_path(&self) -> String {
        match &self.sequence {
            Some(seq) => seq.proxy_path(),
            None => self.path.to_string_lossy().into_owned(),
        }
    }
}

/// Fields written by the Info worker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfoFields {
    pub size: u64,
    pub modified: Option<DateTime<Local>>,
    /// `dd/mm/yyyy hh:mm;<size>` or `<n>f;dd/mm/yyyy hh:mm;<size>`.
    pub details: String,
    pub description: String,
    pub notes: u32,
    /// Sidecar flags, OR-ed over the base flags on read.
    pub flags: ItemFlags,
    pub sequence_start_path: Option<PathBuf>,
    pub sequence_end_path: Option<PathBuf>,
    /// Collapsed path of a sequence with its current frame range.
    pub range_path: Option<PathBuf>,
}

/// Result of the Thumbnail worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ThumbnailState {
    /// Nothing generated (never processed, or skipped).
    #[default]
    Empty,
    /// Generated or reused thumbnail file.
    Cached(PathBuf),
    /// Generation failed; render a placeholder icon.
    Fallback,
}

/// One item's mutable field bundle, mutated in place by the workers.
#[derive(Debug)]
pub struct Record {
    id: RecordId,
    base: BaseFields,
    info: RwLock<InfoFields>,
    thumbnail: RwLock<ThumbnailState>,
    loaded: [AtomicBool; 2],
    /// Bumped by every external invalidation, per category.
    invalidations: [AtomicU64; 2],
}

impl Record {
    pub fn new(id: RecordId, base: BaseFields) -> Self {
        Self {
            id,
            base,
            info: RwLock::new(InfoFields::default()),
            thumbnail: RwLock::new(ThumbnailState::Empty),
            loaded: [AtomicBool::new(false), AtomicBool::new(false)],
            invalidations: [AtomicU64::new(0), AtomicU64::new(0)],
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn base(&self) -> &BaseFields {
        &self.base
    }

    pub fn path(&self) -> &Path {
        &self.base.path
    }

    /// Snapshot of the Info fields.
    pub fn info(&self) -> InfoFields {
        self.info.read().clone()
    }

    /// Read Info fields without cloning them.
    pub fn with_info<R>(&self, f: impl FnOnce(&InfoFields) -> R) -> R {
        f(&self.info.read())
    }

    pub fn thumbnail(&self) -> ThumbnailState {
        self.thumbnail.read().clone()
    }

    /// Base flags with the sidecar flags OR-ed in.
    pub fn flags(&self) -> ItemFlags {
        self.base.flags | self.info.read().flags
    }

    /// Text matched by view filters: the relative path and description.
    pub fn filter_text(&self) -> String {
        let info = self.info.read();
        if info.description.is_empty() {
            self.base.display_name.clone()
        } else {
            format!("{}\n{}", self.base.display_name, info.description)
        }
    }

    pub fn is_loaded(&self, category: Category) -> bool {
        self.loaded[category.index()].load(Ordering::Acquire)
    }

    /// Flip the loaded flag false -> true. Returns false if it was already set.
    pub fn mark_loaded(&self, category: Category) -> bool {
        !self.loaded[category.index()].swap(true, Ordering::AcqRel)
    }

    /// Clear the loaded flag so the category recomputes on next dequeue.
    pub fn clear_loaded(&self, category: Category) {
        self.loaded[category.index()].store(false, Ordering::Release);
    }

    /// Number of external invalidations of `category` so far.
    pub fn invalidation(&self, category: Category) -> u64 {
        self.invalidations[category.index()].load(Ordering::Acquire)
    }

    /// Request a recompute of `category`. A computation already running
    /// when this is called will not mark the field loaded.
    pub fn invalidate(&self, category: Category) {
        self.invalidations[category.index()].fetch_add(1, Ordering::AcqRel);
        self.clear_loaded(category);
    }

    pub(crate) fn set_info(&self, fields: InfoFields) {
        *self.info.write() = fields;
    }

    pub(crate) fn set_thumbnail(&self, state: ThumbnailState) {
        *self.thumbnail.write() = state;
    }
}

// =============================================================================
// Tests
// =============================================================================
