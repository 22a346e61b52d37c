// AssetLens - tests/e2e_pipeline.rs
//
// End-to-end tests for the item-loading pipeline.
//
// These tests run real worker threads against real temporary directories
// (walkdir traversal, fs metadata, sequence grouping). Custom processors are
// only used where a test needs to observe or slow down the workers.

use assetlens::app::events::PipelineEvent;
use assetlens::app::pipeline::{Pipeline, PipelineConfig};
use assetlens::app::processors::{Processor, Update};
use assetlens::app::sidecar::{MemorySidecar, SidecarRow};
use assetlens::core::discovery::MemorySource;
use assetlens::core::model::{
    Category, DataKind, DataSetKey, InfoFields, ItemFlags, ItemType, Record,
};
use assetlens::util::error::ProcessError;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};

// =============================================================================
// Helpers
// =============================================================================

const TIMEOUT: Duration = Duration::from_secs(10);

fn config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.idle_poll = Duration::from_millis(5);
    config.thumbnails.cache_dir = std::env::temp_dir().join("assetlens-e2e-thumbs");
    config
}

fn touch(dir: &Path, name: &str, bytes: usize) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, vec![b'x'; bytes]).expect("write file");
}

/// Receive events until `done` returns true for the collected list.
fn collect_until(
    rx: &Receiver<PipelineEvent>,
    done: impl Fn(&[PipelineEvent]) -> bool,
) -> Vec<PipelineEvent> {
    let deadline = Instant::now() + TIMEOUT;
    let mut events = Vec::new();
    while !done(&events) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        assert!(!remaining.is_zero(), "timed out waiting for events: {events:?}");
        if let Ok(event) = rx.recv_timeout(remaining) {
            events.push(event);
        }
    }
    events
}

fn row_updates(events: &[PipelineEvent], category: Category) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::RowUpdated { category: c, .. } if *c == category))
        .count()
}

fn resorted(events: &[PipelineEvent]) -> bool {
    events
        .iter()
        .any(|e| matches!(e, PipelineEvent::DataSetResorted { .. }))
}

/// Info processor that records the order it sees items in.
struct Recording {
    seen: Mutex<Vec<String>>,
    delay: Duration,
    count: AtomicUsize,
}

impl Recording {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
            delay,
            count: AtomicUsize::new(0),
        })
    }
}

impl Processor for Recording {
    fn category(&self) -> Category {
        Category::Info
    }

    fn compute(&self, _key: &DataSetKey, record: &Record) -> Result<Update, ProcessError> {
        std::thread::sleep(self.delay);
        self.seen.lock().push(record.base().display_name.clone());
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(Update::Info(InfoFields {
            details: "done".to_string(),
            ..InfoFields::default()
        }))
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Three files: one RowUpdated per Record, then a sorted, loaded DataSet.
#[test]
fn e2e_three_files_get_info_once_each() {
    let dir = tempfile::tempdir().expect("tempdir");
    touch(dir.path(), "c.png", 30);
    touch(dir.path(), "a.png", 10);
    touch(dir.path(), "b.png", 20);

    let pipeline = Pipeline::new(config()).expect("pipeline");
    let rx = pipeline.subscribe(64);
    let key = DataSetKey::new(dir.path(), "", DataKind::File);

    let report = pipeline.load_directory(&key).expect("load");
    assert_eq!(report.outcome.as_ref().map(|o| o.inserted), Some(3));
    assert_eq!(report.preloaded, 3);

    let events = collect_until(&rx, |ev| {
        row_updates(ev, Category::Info) >= 3 && resorted(ev)
    });
    assert!(pipeline.wait_idle(TIMEOUT), "pipeline drains");

    let mut handles = HashSet::new();
    for event in &events {
        if let PipelineEvent::RowUpdated { handle, .. } = event {
            assert!(handles.insert(handle.identity()), "duplicate update for {handle:?}");
        }
    }
    assert_eq!(handles.len(), 3);

    let ds = pipeline.dataset(&key).expect("dataset");
    assert!(ds.is_loaded());
    assert_eq!(ds.loaded_count(Category::Info), 3);
    let names: Vec<String> = ds.rows().iter().map(|r| r.base().display_name.clone()).collect();
    assert_eq!(names, vec!["a.png", "b.png", "c.png"]);
    let sizes: Vec<u64> = ds.rows().iter().map(|r| r.info().size).collect();
    assert_eq!(sizes, vec![10, 20, 30]);
    assert!(ds.rows()[0].info().details.ends_with(";10 B"));
}

/// Numbered frames collapse into one sequence Record with summed info.
#[test]
fn e2e_sequences_are_grouped_and_summed() {
    let dir = tempfile::tempdir().expect("tempdir");
    for frame in 1..=3 {
        touch(dir.path(), &format!("shot_{frame:04}.exr"), 100);
    }
    touch(dir.path(), "notes.txt", 5);

    let pipeline = Pipeline::new(config()).expect("pipeline");
    let rx = pipeline.subscribe(64);
    let key = DataSetKey::new(dir.path(), "", DataKind::Sequence);
    pipeline.load_directory(&key).expect("load");
    collect_until(&rx, |ev| row_updates(ev, Category::Info) >= 2 && resorted(ev));

    let ds = pipeline.dataset(&key).expect("dataset");
    let rows = ds.rows();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].base().display_name, "notes.txt");
    assert_eq!(rows[1].base().display_name, "shot_<<0001-0003>>.exr");
    assert_eq!(rows[1].base().item_type, ItemType::Sequence);

    let info = rows[1].info();
    assert_eq!(info.size, 300);
    assert!(info.details.starts_with("3f;"), "details: {}", info.details);
    assert!(info.range_path.is_some());
}

// =============================================================================
// Ordering and deduplication
// =============================================================================

/// A LIFO queue serves the most recent request first.
#[test]
fn e2e_lifo_serves_latest_request_first() {
    let recording = Recording::new(Duration::ZERO);
    let mut config = config();
    config.info.preload = false;
    let pipeline = Pipeline::builder(config)
        .with_processor(recording.clone())
        .build()
        .expect("pipeline");

    let key = DataSetKey::new("/virtual", "", DataKind::File);
    let source = MemorySource::new(
        "/virtual",
        vec!["/virtual/A.png".into(), "/virtual/B.png".into(), "/virtual/C.png".into()],
    );
    pipeline.load(&key, &source).expect("load");
    let ds = pipeline.dataset(&key).expect("dataset");

    // Hold the workers off while the whole batch is queued.
    pipeline.request_interrupt(&key.scope());
    let report = pipeline.enqueue(Category::Info, ds.handles_for_rows(0..3));
    assert_eq!(report.added, 3);
    pipeline.resume(&key.scope());

    assert!(pipeline.wait_idle(TIMEOUT));
    assert_eq!(*recording.seen.lock(), vec!["C.png", "B.png", "A.png"]);
}

#[test]
fn e2e_duplicate_requests_are_processed_once() {
    let recording = Recording::new(Duration::ZERO);
    let mut config = config();
    config.info.preload = false;
    let pipeline = Pipeline::builder(config)
        .with_processor(recording.clone())
        .build()
        .expect("pipeline");

    let key = DataSetKey::new("/virtual", "", DataKind::File);
    pipeline
        .load(&key, &MemorySource::synthetic("/virtual", 5, "png"))
        .expect("load");
    let ds = pipeline.dataset(&key).expect("dataset");

    pipeline.request_interrupt(&key.scope());
    let first = pipeline.enqueue(Category::Info, ds.handles());
    let second = pipeline.enqueue(Category::Info, ds.handles());
    assert_eq!(first.added, 5);
    assert_eq!(second.added, 0);
    assert_eq!(second.duplicates, 5);
    pipeline.resume(&key.scope());

    assert!(pipeline.wait_idle(TIMEOUT));
    assert_eq!(recording.count.load(Ordering::SeqCst), 5);

    // Loaded Records are not queued again.
    let third = pipeline.enqueue(Category::Info, ds.handles());
    assert_eq!(third.added, 0);
    assert!(pipeline.wait_idle(TIMEOUT));
    assert_eq!(recording.count.load(Ordering::SeqCst), 5);
}

// =============================================================================
// Invalidation
// =============================================================================

/// After a reset, handles of the old generation no longer resolve and the
/// next load builds a fresh DataSet.
#[test]
fn e2e_reset_invalidates_previous_generation() {
    let dir = tempfile::tempdir().expect("tempdir");
    touch(dir.path(), "a.png", 1);
    touch(dir.path(), "b.png", 1);

    let pipeline = Pipeline::new(config()).expect("pipeline");
    let key = DataSetKey::new(dir.path(), "", DataKind::File);
    pipeline.load_directory(&key).expect("load");
    assert!(pipeline.wait_idle(TIMEOUT));

    let old = pipeline.dataset(&key).expect("dataset");
    let old_handle = old.handle(0).expect("handle");
    assert!(old_handle.resolve().is_some());

    pipeline.reset(&key.scope());
    assert!(old_handle.resolve().is_none(), "old handle is stale after reset");
    let report = pipeline.enqueue(Category::Info, [old_handle]);
    assert_eq!(report.stale, 1);
    assert_eq!(report.added, 0);

    let again = pipeline.load_directory(&key).expect("reload");
    assert!(again.discovered);
    let fresh = pipeline.dataset(&key).expect("dataset");
    assert!(fresh.generation() > old.generation());
    assert!(pipeline.wait_idle(TIMEOUT));
    assert_eq!(fresh.loaded_count(Category::Info), 2);
}

/// An interrupt stops workers from taking new items of the scope; at most
/// the item already in flight completes.
#[test]
fn e2e_interrupt_halts_workers_mid_batch() {
    let recording = Recording::new(Duration::from_millis(2));
    let mut config = config();
    config.info.preload = false;
    let pipeline = Pipeline::builder(config)
        .with_processor(recording.clone())
        .build()
        .expect("pipeline");

    let key = DataSetKey::new("/virtual", "", DataKind::File);
    pipeline
        .load(&key, &MemorySource::synthetic("/virtual", 500, "png"))
        .expect("load");
    let ds = pipeline.dataset(&key).expect("dataset");
    assert_eq!(pipeline.enqueue(Category::Info, ds.handles()).added, 500);

    std::thread::sleep(Duration::from_millis(20));
    pipeline.request_interrupt(&key.scope());
    let at_interrupt = recording.count.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(50));
    let after = recording.count.load(Ordering::SeqCst);

    assert!(after <= at_interrupt + 1, "workers kept going: {at_interrupt} -> {after}");
    assert!(pipeline.backlog()[Category::Info.index()].len > 0);

    pipeline.reset(&key.scope());
    assert_eq!(pipeline.backlog()[Category::Info.index()].len, 0);
    assert!(pipeline.wait_idle(TIMEOUT));
}

/// Invalidating a Record recomputes it with the current sidecar data.
#[test]
fn e2e_invalidate_refreshes_sidecar_fields() {
    let dir = tempfile::tempdir().expect("tempdir");
    touch(dir.path(), "hero.png", 4);

    let sidecar = Arc::new(MemorySidecar::new());
    let pipeline = Pipeline::builder(config())
        .with_sidecar(sidecar.clone())
        .build()
        .expect("pipeline");
    let rx = pipeline.subscribe(64);
    let key = DataSetKey::new(dir.path(), "", DataKind::File);
    pipeline.load_directory(&key).expect("load");
    collect_until(&rx, |ev| row_updates(ev, Category::Info) >= 1 && resorted(ev));

    let ds = pipeline.dataset(&key).expect("dataset");
    let record = ds.row(0).expect("row");
    assert_eq!(record.info().description, "");

    sidecar.insert(
        record.base().proxy_path(),
        SidecarRow {
            description: "#approved hero shot".to_string(),
            flags: ItemFlags::FAVOURITE,
            notes: 2,
        },
    );
    let handle = ds.handle(record.id()).expect("handle");
    assert!(pipeline.invalidate(Category::Info, &handle));
    collect_until(&rx, |ev| row_updates(ev, Category::Info) >= 1);

    let info = record.info();
    assert_eq!(info.description, "hero shot #approved");
    assert_eq!(info.notes, 2);
    assert!(record.flags().contains(ItemFlags::FAVOURITE));
}

/// Info processor whose result depends on a version read when it starts.
struct Versioned {
    version: AtomicUsize,
    started: AtomicUsize,
    delay: Duration,
}

impl Processor for Versioned {
    fn category(&self) -> Category {
        Category::Info
    }

    fn compute(&self, _key: &DataSetKey, _record: &Record) -> Result<Update, ProcessError> {
        let version = self.version.load(Ordering::SeqCst);
        self.started.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        Ok(Update::Info(InfoFields {
            description: format!("v{version}"),
            ..InfoFields::default()
        }))
    }
}

/// An invalidation that lands while the Record is being computed is not
/// swallowed: the stale result is dropped and the Record is recomputed.
#[test]
fn e2e_invalidate_during_compute_recomputes() {
    let processor = Arc::new(Versioned {
        version: AtomicUsize::new(1),
        started: AtomicUsize::new(0),
        delay: Duration::from_millis(200),
    });
    let mut config = config();
    config.info.preload = false;
    let pipeline = Pipeline::builder(config)
        .with_processor(processor.clone())
        .build()
        .expect("pipeline");
    let rx = pipeline.subscribe_default();

    let key = DataSetKey::new("/virtual", "", DataKind::File);
    pipeline
        .load(&key, &MemorySource::synthetic("/virtual", 1, "png"))
        .expect("load");
    let ds = pipeline.dataset(&key).expect("dataset");
    let handle = ds.handle(0).expect("handle");
    assert_eq!(pipeline.enqueue(Category::Info, [handle.clone()]).added, 1);

    let deadline = Instant::now() + TIMEOUT;
    while processor.started.load(Ordering::SeqCst) == 0 {
        assert!(Instant::now() < deadline, "computation never started");
        std::thread::sleep(Duration::from_millis(1));
    }
    processor.version.store(2, Ordering::SeqCst);
    assert!(pipeline.invalidate(Category::Info, &handle));

    assert!(pipeline.wait_idle(TIMEOUT));
    let record = ds.record(0).expect("record");
    assert!(record.is_loaded(Category::Info));
    assert_eq!(record.info().description, "v2");
    assert_eq!(processor.started.load(Ordering::SeqCst), 2);

    let events: Vec<_> = rx.try_iter().collect();
    assert_eq!(row_updates(&events, Category::Info), 1, "only the fresh result is announced");
}
