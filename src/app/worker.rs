// AssetLens - app/worker.rs
//
// One dedicated OS thread per category. Each loop iteration takes at most
// one item from the category queue:
//
//   - nothing runnable: wait on the queue (woken by the next enqueue, or
//     after `idle_poll` to re-check the shutdown flag),
//   - end-of-dataset marker: claim the one-time sort, resort, publish
//     `DataSetResorted`,
//   - handle: resolve it, skip if stale or already loaded, compute, re-check
//     liveness, write the fields, set the loaded flag, publish `RowUpdated`.
//     A Record invalidated during the computation is left unloaded.
//
// Items whose scope is interrupted are left queued, so an interrupt stops
// further dequeues after the item currently in flight.
//
// Nothing crosses the thread boundary: computation errors are logged and
// replaced by the processor's fallback value.

use crate::app::events::{EventBus, PipelineEvent};
use crate::app::interrupt::InterruptRegistry;
use crate::app::processors::{Processor, Update};
use crate::app::queue::{CategoryQueue, NextItem, QueueItem};
use crate::core::dataset::{WeakDataSetRef, WorkHandle};
use crate::core::model::{Category, SortSettings};
use crate::util::error::AssetLensError;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Everything a worker thread shares with the pipeline.
#[derive(Clone)]
pub struct WorkerContext {
    pub queue: Arc<CategoryQueue>,
    pub processor: Arc<dyn Processor>,
    pub events: Arc<EventBus>,
    pub interrupts: Arc<InterruptRegistry>,
    pub sort: Arc<RwLock<SortSettings>>,
    pub idle_poll: Duration,
    pub shutdown: Arc<AtomicBool>,
}

/// What happened to one dequeued item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Fields written and `RowUpdated` published.
    Updated,
    /// Loaded flag set; nothing to publish.
    Unchanged,
    /// Handle no longer resolves; work discarded.
    Stale,
    /// Field was already loaded.
    AlreadyLoaded,
    /// Record was invalidated during the computation; the field stays
    /// unloaded so the re-queued handle recomputes it.
    Superseded,
    /// Marker consumed; DataSet sorted and `DataSetResorted` published.
    Resorted,
    /// Marker already handled by another category, or its DataSet is gone.
    MarkerSkipped,
}

/// Handle to a running worker thread.
pub struct Worker {
    category: Category,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    /// Start the worker thread for `ctx.processor.category()`.
    pub fn spawn(ctx: WorkerContext) -> Result<Self, AssetLensError> {
        let category = ctx.processor.category();
        let thread = std::thread::Builder::new()
            .name(format!("assetlens-{category}"))
            .spawn(move || run(ctx))
            .map_err(|source| AssetLensError::WorkerSpawn { category, source })?;
        tracing::debug!(category = %category, "Worker started");
        Ok(Self {
            category,
            thread: Some(thread),
        })
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Wait for the thread to exit. The queue must be closed first.
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!(category = %self.category, "Worker thread panicked");
            } else {
                tracing::debug!(category = %self.category, "Worker stopped");
            }
        }
    }
}

fn run(ctx: WorkerContext) {
    loop {
        if ctx.shutdown.load(Ordering::Acquire) {
            break;
        }
        let interrupts = &ctx.interrupts;
        match ctx
            .queue
            .next(ctx.idle_poll, |key| interrupts.is_raised_for(key))
        {
            NextItem::Closed => break,
            NextItem::Empty => continue,
            NextItem::Item(item) => {
                process_item(&ctx, item);
                ctx.queue.complete();
            }
        }
    }
}

/// Process one dequeued item. Public for deterministic single-step tests.
pub fn process_item(ctx: &WorkerContext, item: QueueItem) -> ItemOutcome {
    match item {
        QueueItem::Handle(handle) => process_handle(ctx, &handle),
        QueueItem::EndOfDataSet(marker) => finalize(ctx, &marker),
    }
}

fn process_handle(ctx: &WorkerContext, handle: &WorkHandle) -> ItemOutcome {
    let category = ctx.processor.category();

    let Some(record) = handle.resolve() else {
        tracing::trace!(category = %category, handle = ?handle, "Stale handle dropped");
        return ItemOutcome::Stale;
    };
    if record.is_loaded(category) {
        return ItemOutcome::AlreadyLoaded;
    }

    let epoch = record.invalidation(category);
    let update = match ctx.processor.compute(handle.key(), &record) {
        Ok(update) => update,
        Err(e) => {
            tracing::warn!(
                category = %category,
                path = %record.path().display(),
                error = %e,
                "Processing failed, using fallback"
            );
            ctx.processor.fallback(&record)
        }
    };

    // The DataSet may have been reset while we were computing.
    if !handle.is_alive() {
        tracing::trace!(category = %category, handle = ?handle, "Result for stale handle discarded");
        return ItemOutcome::Stale;
    }

    let publish = match update {
        Update::Info(fields) => {
            record.set_info(fields);
            true
        }
        Update::Thumbnail(state) => {
            record.set_thumbnail(state);
            true
        }
        Update::Unchanged => false,
    };

    // A reset can land between the check above and the write.
    if !handle.is_alive() {
        tracing::trace!(category = %category, handle = ?handle, "Write to stale record not published");
        return ItemOutcome::Stale;
    }

    if !record.mark_loaded(category) {
        return ItemOutcome::AlreadyLoaded;
    }
    if record.invalidation(category) != epoch {
        record.clear_loaded(category);
        tracing::debug!(category = %category, path = %record.path().display(), "Record invalidated mid-computation");
        return ItemOutcome::Superseded;
    }

    if publish {
        ctx.events.publish(PipelineEvent::RowUpdated {
            category,
            handle: handle.clone(),
        });
        ItemOutcome::Updated
    } else {
        ItemOutcome::Unchanged
    }
}

fn finalize(ctx: &WorkerContext, marker: &WeakDataSetRef) -> ItemOutcome {
    let Some(dataset) = marker.upgrade() else {
        tracing::trace!(key = %marker.key(), "Marker for stale DataSet dropped");
        return ItemOutcome::MarkerSkipped;
    };
    if !dataset.claim_finalize() {
        return ItemOutcome::MarkerSkipped;
    }

    let settings = *ctx.sort.read();
    dataset.sort(settings);
    dataset.set_loaded(true);
    ctx.events.publish(PipelineEvent::DataSetResorted {
        key: dataset.key().clone(),
    });
    tracing::debug!(
        category = %ctx.processor.category(),
        key = %dataset.key(),
        records = dataset.len(),
        "DataSet finalised"
    );
    ItemOutcome::Resorted
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::CacheStore;
    use crate::core::dataset::DataSet;
    use crate::core::model::{
        BaseFields, CategoryConfig, DataKind, DataSetKey, ItemFlags, ItemType, OverflowPolicy,
        QueuePolicy, Record, ThumbnailState,
    };
    use crate::util::error::ProcessError;
    use std::path::PathBuf;
    use std::sync::mpsc::Receiver;

    /// Succeeds for even ids, fails for odd ids.
    struct EvenOdd;

    impl Processor for EvenOdd {
        fn category(&self) -> Category {
            Category::Thumbnail
        }

        fn compute(&self, _key: &DataSetKey, record: &Record) -> Result<Update, ProcessError> {
            if record.id() % 2 == 0 {
                Ok(Update::Thumbnail(ThumbnailState::Cached(PathBuf::from("t.png"))))
            } else {
                Err(ProcessError::MissingField {
                    category: Category::Thumbnail,
                    field: "test",
                })
            }
        }

        fn fallback(&self, _record: &Record) -> Update {
            Update::Thumbnail(ThumbnailState::Fallback)
        }
    }

    fn key() -> DataSetKey {
        DataSetKey::new("/jobs", "renders", DataKind::File)
    }

    fn setup(n: usize) -> (WorkerContext, Arc<CacheStore>, Arc<DataSet>, Receiver<PipelineEvent>) {
        let cache = Arc::new(CacheStore::new());
        let ds = cache.get_or_create(&key());
        for i in (0..n).rev() {
            ds.insert_with(|id| {
                Record::new(
                    id,
                    BaseFields {
                        path: PathBuf::from(format!("/jobs/renders/{i}.png")),
                        display_name: format!("{i}.png"),
                        edit_name: format!("{i}.png"),
                        extension: "png".to_string(),
                        parent_segments: Vec::new(),
                        item_type: ItemType::File,
                        sequence: None,
                        flags: ItemFlags::DEFAULT,
                        row_height: 64,
                    },
                )
            });
        }
        let events = Arc::new(EventBus::new());
        let rx = events.subscribe(64);
        let ctx = WorkerContext {
            queue: Arc::new(CategoryQueue::new(
                Category::Thumbnail,
                CategoryConfig {
                    capacity: 1000,
                    policy: QueuePolicy::Lifo,
                    overflow: OverflowPolicy::DropOldest,
                    preload: false,
                },
            )),
            processor: Arc::new(EvenOdd),
            events,
            interrupts: Arc::new(InterruptRegistry::new()),
            sort: Arc::new(RwLock::new(SortSettings::default())),
            idle_poll: Duration::from_millis(5),
            shutdown: Arc::new(AtomicBool::new(false)),
        };
        (ctx, cache, ds, rx)
    }

    #[test]
    fn test_loaded_even_when_computation_fails() {
        let (ctx, _cache, ds, rx) = setup(2);
        for handle in ds.handles() {
            let outcome = process_item(&ctx, QueueItem::Handle(handle));
            assert_eq!(outcome, ItemOutcome::Updated);
        }
        let ok = ds.record(0).expect("r0");
        let failed = ds.record(1).expect("r1");
        assert!(ok.is_loaded(Category::Thumbnail));
        assert!(failed.is_loaded(Category::Thumbnail));
        assert_eq!(failed.thumbnail(), ThumbnailState::Fallback);
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn test_second_dequeue_is_noop() {
        let (ctx, _cache, ds, rx) = setup(1);
        let h = ds.handle(0).expect("handle");
        assert_eq!(
            process_item(&ctx, QueueItem::Handle(h.clone())),
            ItemOutcome::Updated
        );
        assert_eq!(
            process_item(&ctx, QueueItem::Handle(h)),
            ItemOutcome::AlreadyLoaded
        );
        assert_eq!(rx.try_iter().count(), 1, "no duplicate event");
    }

    #[test]
    fn test_stale_handle_is_silently_dropped() {
        let (ctx, cache, ds, rx) = setup(1);
        let h = ds.handle(0).expect("handle");
        cache.reset(&key());
        assert_eq!(process_item(&ctx, QueueItem::Handle(h)), ItemOutcome::Stale);
        assert!(!ds.record(0).expect("old record").is_loaded(Category::Thumbnail));
        assert!(rx.try_recv().is_err());
    }

    /// Runs a side effect in the middle of computing the thumbnail.
    struct DuringCompute<F>(F);

    impl<F: Fn(&Record) + Send + Sync> Processor for DuringCompute<F> {
        fn category(&self) -> Category {
            Category::Thumbnail
        }

        fn compute(&self, _key: &DataSetKey, record: &Record) -> Result<Update, ProcessError> {
            (self.0)(record);
            Ok(Update::Thumbnail(ThumbnailState::Cached(PathBuf::from("t.png"))))
        }

        fn fallback(&self, _record: &Record) -> Update {
            Update::Thumbnail(ThumbnailState::Fallback)
        }
    }

    #[test]
    fn test_invalidated_during_compute_stays_unloaded() {
        let (mut ctx, _cache, ds, rx) = setup(1);
        ctx.processor = Arc::new(DuringCompute(|record: &Record| {
            record.invalidate(Category::Thumbnail);
        }));
        let h = ds.handle(0).expect("handle");
        assert_eq!(
            process_item(&ctx, QueueItem::Handle(h)),
            ItemOutcome::Superseded
        );
        assert!(!ds.record(0).expect("record").is_loaded(Category::Thumbnail));
        assert!(rx.try_recv().is_err(), "superseded result is not announced");
    }

    #[test]
    fn test_reset_during_compute_discards_result() {
        let (mut ctx, cache, ds, rx) = setup(1);
        let resetter = Arc::clone(&cache);
        ctx.processor = Arc::new(DuringCompute(move |_record: &Record| {
            resetter.reset(&key());
        }));
        let h = ds.handle(0).expect("handle");
        assert_eq!(process_item(&ctx, QueueItem::Handle(h)), ItemOutcome::Stale);
        assert!(!ds.record(0).expect("old record").is_loaded(Category::Thumbnail));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_marker_sorts_once_and_publishes() {
        let (ctx, _cache, ds, rx) = setup(3);
        assert_eq!(ds.row(0).expect("row").base().display_name, "2.png");
        assert_eq!(
            process_item(&ctx, QueueItem::EndOfDataSet(ds.downgrade())),
            ItemOutcome::Resorted
        );
        assert_eq!(
            process_item(&ctx, QueueItem::EndOfDataSet(ds.downgrade())),
            ItemOutcome::MarkerSkipped
        );
        assert!(ds.is_loaded());
        assert_eq!(ds.row(0).expect("row").base().display_name, "0.png");
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], PipelineEvent::DataSetResorted { .. }));
    }

    #[test]
    fn test_thread_drains_queue_and_stops() {
        let (ctx, _cache, ds, rx) = setup(10);
        let mut worker = Worker::spawn(ctx.clone()).expect("spawn");
        ctx.queue.enqueue(ds.handles());
        assert!(ctx.queue.wait_idle_until(std::time::Instant::now() + Duration::from_secs(10)));
        assert_eq!(ds.loaded_count(Category::Thumbnail), 10);
        assert_eq!(rx.try_iter().count(), 10);

        ctx.shutdown.store(true, Ordering::Release);
        ctx.queue.close();
        worker.join();
        assert_eq!(worker.category(), Category::Thumbnail);
    }
}
