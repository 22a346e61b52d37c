// AssetLens - app/queue.rs
//
// Queue Manager: one bounded, dedup-checked queue per worker category.
//
// Layout of a category queue (a VecDeque):
//
//   front  ...  back
//   served last  served next
//
//   - Workers always pop from the back.
//   - LIFO categories push new requests to the back, so the most recently
//     requested (most visible) handle is served first.
//   - FIFO categories push new requests to the front.
//   - Preloading pushes every handle to the front, then the end-of-dataset
//     marker in front of them, so the marker is served after the batch.
//
// Every mutation happens under the queue's mutex; the caller's thread pushes
// and the category worker pops. `clear` can race a worker's pop freely: the
// worker re-validates the handle it received before touching the Record.

use crate::core::dataset::{HandleId, WeakDataSetRef, WorkHandle};
use crate::core::model::{Category, CategoryConfig, DataSetKey, OverflowPolicy, QueuePolicy, ScopeKey};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

// =============================================================================
// Queue items
// =============================================================================

/// One entry of a category queue.
#[derive(Debug, Clone)]
pub enum QueueItem {
    /// Per-record work.
    Handle(WorkHandle),
    /// Sentinel queued after discovery; triggers the one-time sort.
    EndOfDataSet(WeakDataSetRef),
}

impl QueueItem {
    pub fn key(&self) -> &DataSetKey {
        match self {
            QueueItem::Handle(h) => h.key(),
            QueueItem::EndOfDataSet(m) => m.key(),
        }
    }

    fn in_scope(&self, scope: &ScopeKey) -> bool {
        let key = self.key();
        key.location == scope.location && key.task == scope.task
    }

    fn is_marker_for(&self, marker: &WeakDataSetRef) -> bool {
        matches!(self, QueueItem::EndOfDataSet(m)
            if m.generation() == marker.generation() && m.key() == marker.key())
    }
}

/// Counters returned by a batch enqueue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnqueueReport {
    /// Handles added to the queue.
    pub added: usize,
    /// Handles already queued (dedup).
    pub duplicates: usize,
    /// Handles refused because the queue was full.
    pub rejected: usize,
    /// Queued handles evicted to make room.
    pub evicted: usize,
    /// Handles whose DataSet was already reset.
    pub stale: usize,
}

/// Introspection of one category queue, for status indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueDepth {
    pub category: Category,
    pub len: usize,
    pub capacity: usize,
    pub in_flight: usize,
}

/// Result of a worker waiting for its next item.
#[derive(Debug)]
pub enum NextItem {
    Item(QueueItem),
    /// Nothing runnable arrived before the timeout.
    Empty,
    /// The queue was closed for shutdown.
    Closed,
}

// =============================================================================
// Category queue
// =============================================================================

#[derive(Default)]
struct QueueState {
    items: VecDeque<QueueItem>,
    members: HashSet<HandleId>,
    in_flight: usize,
    closed: bool,
}

impl QueueState {
    fn is_idle(&self) -> bool {
        self.items.is_empty() && self.in_flight == 0
    }

    fn handle_count(&self) -> usize {
        self.members.len()
    }

    fn forget(&mut self, item: &QueueItem) {
        if let QueueItem::Handle(h) = item {
            self.members.remove(&h.identity());
        }
    }

    /// Index of the oldest queued handle (never a marker).
    fn oldest_handle(&self, policy: QueuePolicy) -> Option<usize> {
        let is_handle = |item: &QueueItem| matches!(item, QueueItem::Handle(_));
        match policy {
            QueuePolicy::Lifo => self.items.iter().position(is_handle),
            QueuePolicy::Fifo => self.items.iter().rposition(is_handle),
        }
    }
}

/// Bounded, dedup-checked queue of one category.
pub struct CategoryQueue {
    category: Category,
    config: CategoryConfig,
    state: Mutex<QueueState>,
    work: Condvar,
    idle: Condvar,
}

impl CategoryQueue {
    pub fn new(category: Category, config: CategoryConfig) -> Self {
        Self {
            category,
            config,
            state: Mutex::new(QueueState::default()),
            work: Condvar::new(),
            idle: Condvar::new(),
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn config(&self) -> &CategoryConfig {
        &self.config
    }

    /// Queue handles as new requests, honouring policy, capacity and dedup.
    pub fn enqueue(&self, handles: impl IntoIterator<Item = WorkHandle>) -> EnqueueReport {
        let mut report = EnqueueReport::default();
        let mut state = self.state.lock();
        if state.closed {
            return report;
        }
        for handle in handles {
            let front = self.config.policy == QueuePolicy::Fifo;
            self.push_locked(&mut state, handle, front, &mut report);
        }
        drop(state);
        self.after_push(&report);
        report
    }

    /// Front-load a whole DataSet: handles go behind everything already
    /// queued, followed by the DataSet's end-of-dataset marker.
    pub fn preload(
        &self,
        handles: impl IntoIterator<Item = WorkHandle>,
        marker: WeakDataSetRef,
    ) -> EnqueueReport {
        let mut report = EnqueueReport::default();
        let mut state = self.state.lock();
        if state.closed {
            return report;
        }
        for handle in handles {
            self.push_locked(&mut state, handle, true, &mut report);
        }
        push_marker_locked(&mut state, marker);
        drop(state);
        self.after_push(&report);
        self.work.notify_one();
        report
    }

    /// Queue an end-of-dataset marker behind everything already queued.
    /// Markers bypass the capacity limit and are deduplicated per generation.
    pub fn push_marker(&self, marker: WeakDataSetRef) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        push_marker_locked(&mut state, marker);
        drop(state);
        self.work.notify_one();
    }

    fn push_locked(
        &self,
        state: &mut QueueState,
        handle: WorkHandle,
        front: bool,
        report: &mut EnqueueReport,
    ) {
        if !handle.is_alive() {
            report.stale += 1;
            return;
        }
        let id = handle.identity();
        if state.members.contains(&id) {
            report.duplicates += 1;
            return;
        }

        if state.handle_count() >= self.config.capacity {
            match self.config.overflow {
                OverflowPolicy::Reject => {
                    report.rejected += 1;
                    return;
                }
                OverflowPolicy::DropOldest => match state.oldest_handle(self.config.policy) {
                    Some(idx) => {
                        if let Some(evicted) = state.items.remove(idx) {
                            state.forget(&evicted);
                            report.evicted += 1;
                        }
                    }
                    None => {
                        report.rejected += 1;
                        return;
                    }
                },
            }
        }

        state.members.insert(id);
        let item = QueueItem::Handle(handle);
        if front {
            state.items.push_front(item);
        } else {
            state.items.push_back(item);
        }
        report.added += 1;
    }

    fn after_push(&self, report: &EnqueueReport) {
        if report.added > 0 {
            self.work.notify_one();
        }
        if report.evicted > 0 || report.rejected > 0 {
            tracing::debug!(
                category = %self.category,
                evicted = report.evicted,
                rejected = report.rejected,
                capacity = self.config.capacity,
                "Queue overflow"
            );
        }
    }

    /// Pop the next item from the serve end.
    ///
    /// The item counts as in flight until `complete` is called.
    pub fn dequeue(&self) -> Option<QueueItem> {
        let mut state = self.state.lock();
        let item = state.items.pop_back()?;
        state.forget(&item);
        state.in_flight += 1;
        Some(item)
    }

    /// Wait up to `timeout` for the next item whose key is not blocked.
    ///
    /// Blocked items (interrupted scopes) stay queued until a reset clears
    /// them or the interrupt is lifted.
    pub fn next(&self, timeout: Duration, blocked: impl Fn(&DataSetKey) -> bool) -> NextItem {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return NextItem::Closed;
            }
            let runnable = state.items.iter().rposition(|item| !blocked(item.key()));
            if let Some(idx) = runnable {
                if let Some(item) = state.items.remove(idx) {
                    state.forget(&item);
                    state.in_flight += 1;
                    return NextItem::Item(item);
                }
            }
            if self.work.wait_until(&mut state, deadline).timed_out() {
                return NextItem::Empty;
            }
        }
    }

    /// Mark one previously popped item as finished.
    pub fn complete(&self) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.is_idle() {
            self.idle.notify_all();
        }
    }

    /// Drop every queued item. Returns the number removed.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let removed = state.items.len();
        state.items.clear();
        state.members.clear();
        if state.is_idle() {
            self.idle.notify_all();
        }
        removed
    }

    /// Drop every queued item belonging to `scope`. Returns the number removed.
    pub fn clear_scope(&self, scope: &ScopeKey) -> usize {
        self.clear_where(|item| item.in_scope(scope))
    }

    /// Drop every queued item belonging to `key`. Returns the number removed.
    pub fn clear_key(&self, key: &DataSetKey) -> usize {
        self.clear_where(|item| item.key() == key)
    }

    fn clear_where(&self, matches: impl Fn(&QueueItem) -> bool) -> usize {
        let mut state = self.state.lock();
        let before = state.items.len();
        let items = std::mem::take(&mut state.items);
        for item in items {
            if matches(&item) {
                state.forget(&item);
            } else {
                state.items.push_back(item);
            }
        }
        let removed = before - state.items.len();
        if state.is_idle() {
            self.idle.notify_all();
        }
        removed
    }

    /// Wake the worker so it re-evaluates blocked items.
    pub fn notify(&self) {
        self.work.notify_all();
    }

    /// Stop accepting items and release the worker.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.items.clear();
        state.members.clear();
        drop(state);
        self.work.notify_all();
        self.idle.notify_all();
    }

    /// Block until the queue is empty with nothing in flight, or `deadline`.
    pub fn wait_idle_until(&self, deadline: Instant) -> bool {
        let mut state = self.state.lock();
        while !state.is_idle() && !state.closed {
            if self.idle.wait_until(&mut state, deadline).timed_out() {
                return state.is_idle();
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// True if a live handle with the same identity is queued.
    pub fn contains(&self, handle: &WorkHandle) -> bool {
        self.state.lock().members.contains(&handle.identity())
    }

    pub fn depth(&self) -> QueueDepth {
        let state = self.state.lock();
        QueueDepth {
            category: self.category,
            len: state.items.len(),
            capacity: self.config.capacity,
            in_flight: state.in_flight,
        }
    }
}

fn push_marker_locked(state: &mut QueueState, marker: WeakDataSetRef) {
    if state.items.iter().any(|item| item.is_marker_for(&marker)) {
        return;
    }
    state.items.push_front(QueueItem::EndOfDataSet(marker));
}

// =============================================================================
// Queue manager
// =============================================================================

/// One queue per category, indexed by `Category::index`.
pub struct QueueManager {
    queues: Vec<Arc<CategoryQueue>>,
}

impl QueueManager {
    /// Build the queues. `configs` must yield one config per category.
    pub fn new(configs: impl Fn(Category) -> CategoryConfig) -> Self {
        let queues = Category::ALL
            .iter()
            .map(|&c| Arc::new(CategoryQueue::new(c, configs(c))))
            .collect();
        Self { queues }
    }

    pub fn queue(&self, category: Category) -> &Arc<CategoryQueue> {
        &self.queues[category.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CategoryQueue>> {
        self.queues.iter()
    }

    pub fn enqueue(
        &self,
        category: Category,
        handles: impl IntoIterator<Item = WorkHandle>,
    ) -> EnqueueReport {
        self.queue(category).enqueue(handles)
    }

    pub fn dequeue(&self, category: Category) -> Option<QueueItem> {
        self.queue(category).dequeue()
    }

    pub fn clear(&self, category: Category) -> usize {
        self.queue(category).clear()
    }

    /// Remove every item of `scope` from every category queue.
    pub fn clear_scope(&self, scope: &ScopeKey) -> usize {
        self.queues.iter().map(|q| q.clear_scope(scope)).sum()
    }

    pub fn clear_key(&self, key: &DataSetKey) -> usize {
        self.queues.iter().map(|q| q.clear_key(key)).sum()
    }

    pub fn clear_all(&self) -> usize {
        self.queues.iter().map(|q| q.clear()).sum()
    }

    pub fn backlog(&self) -> Vec<QueueDepth> {
        self.queues.iter().map(|q| q.depth()).collect()
    }

    pub fn notify_all(&self) {
        for q in &self.queues {
            q.notify();
        }
    }

    pub fn close_all(&self) {
        for q in &self.queues {
            q.close();
        }
    }

    /// Wait until every queue is idle. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.queues.iter().all(|q| q.wait_idle_until(deadline))
    }
}

// =============================================================================
// Tests
// =============================================================================
