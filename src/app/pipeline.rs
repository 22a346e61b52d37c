// AssetLens - app/pipeline.rs
//
// Pipeline facade: constructs the Cache Store, the category queues, the
// event bus, the interrupt registry and one worker per category, and exposes
// the operations an embedding UI drives.
//
// Threading: every method here runs on the caller's thread. Discovery runs
// synchronously inside `load`; enrichment runs on the worker threads.
// Dropping the pipeline shuts the workers down.

use crate::app::events::{EventBus, PipelineEvent};
use crate::app::interrupt::{InterruptRegistry, InvalidationController};
use crate::app::processors::{InfoProcessor, Processor, ThumbnailProcessor, ThumbnailSettings};
use crate::app::queue::{EnqueueReport, QueueDepth, QueueManager};
use crate::app::sidecar::SidecarStore;
use crate::app::worker::{Worker, WorkerContext};
use crate::core::cache::CacheStore;
use crate::core::dataset::{DataSet, WorkHandle};
use crate::core::discovery::{
    self, DirectorySource, DiscoveryLimits, DiscoveryOutcome, EntrySource, FlagSeeds,
};
use crate::core::model::{
    Category, CategoryConfig, DataSetKey, ScopeKey, SortSettings,
};
use crate::platform::config::AppConfig;
use crate::util::constants;
use crate::util::error::Result;
use parking_lot::RwLock;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Configuration
// =============================================================================

/// Embedding configuration of the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub info: CategoryConfig,
    pub thumbnail: CategoryConfig,
    pub limits: DiscoveryLimits,
    /// How long an idle worker waits before re-checking for shutdown.
    pub idle_poll: Duration,
    pub sort: SortSettings,
    pub thumbnails: ThumbnailSettings,
    pub seeds: FlagSeeds,
}

impl PipelineConfig {
    pub fn category(&self, category: Category) -> CategoryConfig {
        match category {
            Category::Info => self.info,
            Category::Thumbnail => self.thumbnail,
        }
    }

    pub fn category_mut(&mut self, category: Category) -> &mut CategoryConfig {
        match category {
            Category::Info => &mut self.info,
            Category::Thumbnail => &mut self.thumbnail,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(app: &AppConfig) -> Self {
        Self {
            info: app.info,
            thumbnail: app.thumbnail,
            limits: DiscoveryLimits {
                max_items: app.max_items,
                max_depth: app.max_depth,
                recursive: app.recursive,
                include_hidden: app.include_hidden,
                extensions: app.extensions.clone(),
                exclude_patterns: app.exclude_patterns.clone(),
                yield_every: app.yield_every,
            },
            idle_poll: Duration::from_millis(app.idle_poll_ms),
            sort: app.sort,
            thumbnails: ThumbnailSettings {
                size: app.thumbnail_size,
                max_source_bytes: app.max_thumbnail_source_bytes,
                cache_dir: app.thumbnail_cache_dir.clone(),
            },
            seeds: FlagSeeds::default(),
        }
    }
}

/// Result of `Pipeline::load`.
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub key: DataSetKey,
    /// Discovery ran. False when the cached DataSet was still valid.
    pub discovered: bool,
    pub outcome: Option<DiscoveryOutcome>,
    /// Handles front-loaded into preload categories.
    pub preloaded: usize,
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for a pipeline with custom collaborators.
pub struct PipelineBuilder {
    config: PipelineConfig,
    sidecar: Option<Arc<dyn SidecarStore>>,
    processors: Vec<Arc<dyn Processor>>,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            sidecar: None,
            processors: Vec::new(),
        }
    }

    /// Sidecar store consulted by the default Info processor.
    pub fn with_sidecar(mut self, sidecar: Arc<dyn SidecarStore>) -> Self {
        self.sidecar = Some(sidecar);
        self
    }

    /// Replace the default processor of `processor.category()`.
    pub fn with_processor(mut self, processor: Arc<dyn Processor>) -> Self {
        self.processors
            .retain(|p| p.category() != processor.category());
        self.processors.push(processor);
        self
    }

    /// Start the workers and return the running pipeline.
    pub fn build(self) -> Result<Pipeline> {
        let PipelineBuilder {
            config,
            sidecar,
            processors,
        } = self;

        let cache = Arc::new(CacheStore::new());
        let queues = Arc::new(QueueManager::new(|c| config.category(c)));
        let events = Arc::new(EventBus::new());
        let interrupts = Arc::new(InterruptRegistry::new());
        let sort = Arc::new(RwLock::new(config.sort));
        let shutdown = Arc::new(AtomicBool::new(false));
        let invalidation = InvalidationController::new(
            Arc::clone(&interrupts),
            Arc::clone(&cache),
            Arc::clone(&queues),
        );

        let mut pipeline = Pipeline {
            cache,
            queues,
            events,
            interrupts,
            invalidation,
            sort,
            shutdown,
            workers: Vec::with_capacity(Category::ALL.len()),
            config,
        };

        for category in Category::ALL {
            let processor: Arc<dyn Processor> = match processors
                .iter()
                .find(|p| p.category() == category)
            {
                Some(custom) => Arc::clone(custom),
                None => match category {
                    Category::Info => Arc::new(InfoProcessor::new(sidecar.clone())),
                    Category::Thumbnail => Arc::new(ThumbnailProcessor::new(
                        pipeline.config.thumbnails.clone(),
                    )),
                },
            };
            let ctx = WorkerContext {
                queue: Arc::clone(pipeline.queues.queue(category)),
                processor,
                events: Arc::clone(&pipeline.events),
                interrupts: Arc::clone(&pipeline.interrupts),
                sort: Arc::clone(&pipeline.sort),
                idle_poll: pipeline.config.idle_poll,
                shutdown: Arc::clone(&pipeline.shutdown),
            };
            // On error the partially built pipeline is dropped, which stops
            // the workers started so far.
            pipeline.workers.push(Worker::spawn(ctx)?);
        }

        tracing::info!(
            workers = pipeline.workers.len(),
            max_items = pipeline.config.limits.max_items,
            "Pipeline started"
        );
        Ok(pipeline)
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// The running item-loading pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    cache: Arc<CacheStore>,
    queues: Arc<QueueManager>,
    events: Arc<EventBus>,
    interrupts: Arc<InterruptRegistry>,
    invalidation: InvalidationController,
    sort: Arc<RwLock<SortSettings>>,
    shutdown: Arc<AtomicBool>,
    workers: Vec<Worker>,
}

impl Pipeline {
    /// Start a pipeline with the default processors.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        PipelineBuilder::new(config).build()
    }

    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Register an event subscriber with its own bounded channel.
    pub fn subscribe(&self, capacity: usize) -> Receiver<PipelineEvent> {
        self.events.subscribe(capacity)
    }

    /// Register a subscriber with the default channel capacity.
    pub fn subscribe_default(&self) -> Receiver<PipelineEvent> {
        self.subscribe(constants::DEFAULT_SUBSCRIBER_CAPACITY)
    }

    /// Current DataSet of `key`, if one exists.
    pub fn dataset(&self, key: &DataSetKey) -> Option<Arc<DataSet>> {
        self.cache.get(key)
    }

    // -- Loading --

    /// Populate the DataSet of `key` from `source` and front-load preload
    /// categories. A DataSet whose discovery already completed is reused
    /// until it is reset or flagged with `mark_refresh_needed`.
    pub fn load(&self, key: &DataSetKey, source: &dyn EntrySource) -> Result<LoadReport> {
        self.load_with_yield(key, source, &mut |_| {})
    }

    /// `load` with a cooperative-yield callback run every
    /// `limits.yield_every` discovered entries.
    pub fn load_with_yield(
        &self,
        key: &DataSetKey,
        source: &dyn EntrySource,
        on_yield: &mut dyn FnMut(usize),
    ) -> Result<LoadReport> {
        let mut dataset = self.cache.get_or_create(key);
        if !dataset.refresh_needed() {
            tracing::debug!(key = %key, "DataSet already discovered, reusing");
            return Ok(LoadReport {
                key: key.clone(),
                discovered: false,
                outcome: None,
                preloaded: 0,
            });
        }
        if !dataset.is_empty() {
            // Partial or outdated contents: start over with a new generation.
            self.queues.clear_key(key);
            dataset = self.cache.reset(key);
        }
        dataset.rearm_finalize();

        let flag = self.interrupts.flag(&key.scope());
        let outcome = discovery::discover(
            source,
            &dataset,
            &self.config.limits,
            &self.config.seeds,
            &flag,
            on_yield,
        )?;

        let mut report = LoadReport {
            key: key.clone(),
            discovered: true,
            outcome: None,
            preloaded: 0,
        };
        if outcome.interrupted {
            report.outcome = Some(outcome);
            return Ok(report);
        }

        let preload: Vec<Category> = Category::ALL
            .into_iter()
            .filter(|&c| self.config.category(c).preload)
            .collect();

        if preload.is_empty() {
            if dataset.claim_finalize() {
                dataset.sort(*self.sort.read());
                dataset.set_loaded(true);
                self.events.publish(PipelineEvent::DataSetResorted { key: key.clone() });
            }
        } else {
            let marker = dataset.downgrade();
            for category in preload {
                let handles = dataset.handles();
                let r = self.queues.queue(category).preload(handles, marker.clone());
                report.preloaded += r.added;
            }
        }

        tracing::info!(
            key = %key,
            records = dataset.len(),
            truncated = outcome.truncated,
            preloaded = report.preloaded,
            "DataSet loaded"
        );
        report.outcome = Some(outcome);
        Ok(report)
    }

    /// `load` from the filesystem directory of the key's scope.
    pub fn load_directory(&self, key: &DataSetKey) -> Result<LoadReport> {
        let source = DirectorySource::new(key.root());
        self.load(key, &source)
    }

    /// Flag a DataSet for re-discovery on its next `load`.
    pub fn mark_refresh_needed(&self, key: &DataSetKey) {
        self.cache.mark_refresh_needed(key);
    }

    // -- Queueing --

    /// Queue handles for `category`. Handles whose field is already loaded
    /// are skipped.
    pub fn enqueue(
        &self,
        category: Category,
        handles: impl IntoIterator<Item = WorkHandle>,
    ) -> EnqueueReport {
        let pending = handles.into_iter().filter(|h| match h.resolve() {
            Some(record) => !record.is_loaded(category),
            None => true,
        });
        self.queues.enqueue(category, pending)
    }

    /// Queue the Records displayed at `rows` of `key`.
    pub fn enqueue_rows(
        &self,
        category: Category,
        key: &DataSetKey,
        rows: Range<usize>,
    ) -> EnqueueReport {
        match self.cache.get(key) {
            Some(ds) => self.enqueue(category, ds.handles_for_rows(rows)),
            None => EnqueueReport::default(),
        }
    }

    /// Queue the visible rows of `key` plus a small margin on both sides.
    pub fn enqueue_visible(
        &self,
        category: Category,
        key: &DataSetKey,
        visible: Range<usize>,
    ) -> EnqueueReport {
        let margin = constants::DEFAULT_VISIBLE_MARGIN;
        let rows = visible.start.saturating_sub(margin)..visible.end.saturating_add(margin);
        self.enqueue_rows(category, key, rows)
    }

    /// Clear a Record's loaded flag and queue it again, so `category` is
    /// recomputed (e.g. after its sidecar row changed).
    pub fn invalidate(&self, category: Category, handle: &WorkHandle) -> bool {
        let Some(record) = handle.resolve() else {
            return false;
        };
        record.invalidate(category);
        self.queues.enqueue(category, [handle.clone()]).added > 0
    }

    // -- Sorting --

    /// Change the sort and resort every loaded DataSet.
    pub fn set_sort(&self, settings: SortSettings) -> usize {
        *self.sort.write() = settings;
        self.cache
            .keys()
            .iter()
            .filter(|key| self.resort(key))
            .count()
    }

    pub fn sort_settings(&self) -> SortSettings {
        *self.sort.read()
    }

    /// Resort a loaded DataSet with the current settings and publish
    /// `DataSetResorted`. Returns false if the DataSet is not loaded.
    pub fn resort(&self, key: &DataSetKey) -> bool {
        let Some(ds) = self.cache.get(key) else {
            return false;
        };
        if !ds.is_loaded() {
            return false;
        }
        ds.sort(*self.sort.read());
        self.events
            .publish(PipelineEvent::DataSetResorted { key: key.clone() });
        true
    }

    // -- Invalidation --

    pub fn request_interrupt(&self, scope: &ScopeKey) {
        self.invalidation.request_interrupt(scope);
    }

    pub fn resume(&self, scope: &ScopeKey) {
        self.invalidation.resume(scope);
    }

    /// Reset both DataSets of `scope` and drop their queued items.
    pub fn reset(&self, scope: &ScopeKey) -> usize {
        self.invalidation.reset(scope)
    }

    /// Evict both DataSets of `scope` (view teardown).
    pub fn forget(&self, scope: &ScopeKey) -> usize {
        self.invalidation.forget(scope)
    }

    // -- Introspection --

    pub fn backlog(&self) -> Vec<QueueDepth> {
        self.queues.backlog()
    }

    /// Block until every queue is drained with nothing in flight.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.queues.wait_idle(timeout)
    }

    // -- Shutdown --

    /// Clear every queue, stop the workers and join their threads.
    pub fn shutdown(&mut self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.queues.close_all();
        for worker in &mut self.workers {
            worker.join();
        }
        tracing::info!("Pipeline stopped");
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::discovery::MemorySource;
    use crate::core::model::{DataKind, OverflowPolicy, SortKey};
    use std::path::PathBuf;

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.idle_poll = Duration::from_millis(5);
        config
    }

    #[test]
    fn test_default_capacities() {
        let config = PipelineConfig::default();
        assert_eq!(
            config.info.capacity,
            2 * constants::DEFAULT_MAX_ITEMS + constants::QUEUE_MARKER_HEADROOM
        );
        assert!(config.info.preload);
        assert_eq!(config.thumbnail.capacity, 99);
        assert_eq!(config.thumbnail.overflow, OverflowPolicy::DropOldest);
    }

    #[test]
    fn test_load_without_preload_sorts_synchronously() {
        let mut config = config();
        config.info.preload = false;
        let pipeline = Pipeline::new(config).expect("pipeline");
        let rx = pipeline.subscribe(16);
        let key = DataSetKey::new("/virtual", "", DataKind::File);
        let source = MemorySource::new(
            "/virtual",
            vec![PathBuf::from("/virtual/b.png"), PathBuf::from("/virtual/a.png")],
        );

        let report = pipeline.load(&key, &source).expect("load");
        assert!(report.discovered);
        assert_eq!(report.preloaded, 0);

        let ds = pipeline.dataset(&key).expect("dataset");
        assert!(ds.is_loaded());
        assert_eq!(ds.row(0).expect("row").base().display_name, "a.png");
        assert!(matches!(
            rx.try_recv(),
            Ok(PipelineEvent::DataSetResorted { .. })
        ));

        let again = pipeline.load(&key, &source).expect("reload");
        assert!(!again.discovered, "completed DataSets are reused");
    }

    #[test]
    fn test_refresh_needed_rediscovers_with_new_generation() {
        let mut config = config();
        config.info.preload = false;
        let pipeline = Pipeline::new(config).expect("pipeline");
        let key = DataSetKey::new("/virtual", "", DataKind::File);
        let source = MemorySource::synthetic("/virtual", 3, "png");

        pipeline.load(&key, &source).expect("load");
        let first = pipeline.dataset(&key).expect("dataset");
        pipeline.mark_refresh_needed(&key);
        let report = pipeline.load(&key, &source).expect("reload");
        assert!(report.discovered);

        let second = pipeline.dataset(&key).expect("dataset");
        assert!(second.generation() > first.generation());
        assert_eq!(second.len(), 3, "no duplicated records");
    }

    #[test]
    fn test_set_sort_resorts_only_loaded_datasets() {
        let mut config = config();
        config.info.preload = false;
        let pipeline = Pipeline::new(config).expect("pipeline");
        let key = DataSetKey::new("/virtual", "", DataKind::File);
        let source = MemorySource::new(
            "/virtual",
            vec![PathBuf::from("/virtual/a.png"), PathBuf::from("/virtual/b.png")],
        );
        pipeline.load(&key, &source).expect("load");
        let pending = DataSetKey::new("/virtual", "comp", DataKind::File);
        pipeline.cache().get_or_create(&pending);

        let rx = pipeline.subscribe_default();
        let resorted = pipeline.set_sort(SortSettings {
            key: SortKey::Name,
            descending: true,
        });
        assert_eq!(resorted, 1, "DataSets still discovering are left alone");

        let ds = pipeline.dataset(&key).expect("dataset");
        assert_eq!(ds.row(0).expect("row").base().display_name, "b.png");
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], PipelineEvent::DataSetResorted { key: k } if *k == key));
        assert!(pipeline.sort_settings().descending);
    }

    #[test]
    fn test_enqueue_visible_adds_margin_and_clamps() {
        let mut config = config();
        config.info.preload = false;
        let pipeline = Pipeline::new(config).expect("pipeline");
        let key = DataSetKey::new("/virtual", "", DataKind::File);
        pipeline
            .load(&key, &MemorySource::synthetic("/virtual", 30, "png"))
            .expect("load");
        pipeline.request_interrupt(&key.scope());

        let margin = constants::DEFAULT_VISIBLE_MARGIN;
        let report = pipeline.enqueue_visible(Category::Info, &key, 10..12);
        assert_eq!(report.added, 2 + 2 * margin);

        let report = pipeline.enqueue_visible(Category::Thumbnail, &key, 25..28);
        assert_eq!(report.added, 30 - (25 - margin), "clamped to the last row");

        let report = pipeline.enqueue_visible(Category::Thumbnail, &key, 5..7);
        assert_eq!(report.added, 7 + margin, "clamped to the first row");
        pipeline.reset(&key.scope());
    }

    #[test]
    fn test_forget_evicts_dataset_and_queue() {
        let mut config = config();
        config.info.preload = false;
        let pipeline = Pipeline::new(config).expect("pipeline");
        let key = DataSetKey::new("/virtual", "", DataKind::File);
        pipeline
            .load(&key, &MemorySource::synthetic("/virtual", 4, "png"))
            .expect("load");
        let ds = pipeline.dataset(&key).expect("dataset");
        let handle = ds.handle(0).expect("handle");

        pipeline.request_interrupt(&key.scope());
        assert_eq!(pipeline.enqueue(Category::Info, ds.handles()).added, 4);
        assert_eq!(pipeline.forget(&key.scope()), 4);

        assert!(pipeline.dataset(&key).is_none());
        assert!(handle.resolve().is_none(), "handles of a forgotten DataSet are stale");
        assert_eq!(pipeline.backlog()[Category::Info.index()].len, 0);
        assert!(pipeline.wait_idle(Duration::from_secs(5)));
    }

    #[test]
    fn test_enqueue_skips_loaded_and_invalidate_requeues() {
        let mut config = config();
        config.info.preload = false;
        let mut pipeline = Pipeline::new(config).expect("pipeline");
        let key = DataSetKey::new("/virtual", "", DataKind::File);
        pipeline
            .load(&key, &MemorySource::synthetic("/virtual", 2, "png"))
            .expect("load");
        pipeline.request_interrupt(&key.scope());

        let ds = pipeline.dataset(&key).expect("dataset");
        let handle = ds.handle(0).expect("handle");
        ds.record(0).expect("record").mark_loaded(Category::Info);

        let report = pipeline.enqueue(Category::Info, ds.handles());
        assert_eq!(report.added, 1, "loaded handle is skipped");

        assert!(pipeline.invalidate(Category::Info, &handle));
        assert!(!ds.record(0).expect("record").is_loaded(Category::Info));
        assert_eq!(pipeline.backlog()[Category::Info.index()].len, 2);

        pipeline.reset(&key.scope());
        assert_eq!(pipeline.backlog()[Category::Info.index()].len, 0);
        pipeline.shutdown();
        pipeline.shutdown();
    }
}
