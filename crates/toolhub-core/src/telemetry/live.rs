// crates/toolhub-core/src/telemetry/live.rs
// ============================================================================
// Module: Live Streams
// Description: Per-observer bounded event queues with drop-oldest backpressure.
// Purpose: Decouple slow dashboard connections from event emission.
// Dependencies: tokio
// ============================================================================

//! ## Overview
//! Each [`LiveStream`] owns a queue the bus pushes into while holding its
//! state lock; pushing never blocks. When the queue is full the oldest event
//! is discarded and counted. Dropping the stream detaches it from the bus.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Weak;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use tokio::sync::Notify;

use super::Event;
use super::Shared;
use super::detach_stream;
use super::lock;

// ============================================================================
// SECTION: Queue
// ============================================================================

/// Bounded queue shared by the bus and one stream.
pub(super) struct LiveQueue {
    /// Pending events, oldest first.
    events: Mutex<VecDeque<Arc<Event>>>,
    /// Maximum pending events.
    capacity: usize,
    /// Events discarded because the queue was full.
    dropped: AtomicU64,
    /// Set once the bus is gone.
    closed: AtomicBool,
    /// Wakes a waiting receiver.
    notify: Notify,
}

impl LiveQueue {
    /// Creates an empty queue holding at least one event.
    pub(super) fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Seeds the queue with replayed history.
    pub(super) fn replay(&self, history: impl Iterator<Item = Arc<Event>>) {
        let mut events = lock(&self.events);
        for event in history {
            Self::push_locked(&mut events, event, self.capacity, &self.dropped);
        }
        drop(events);
        self.notify.notify_one();
    }

    /// Enqueues an event, discarding the oldest when full.
    pub(super) fn push(&self, event: Arc<Event>) {
        let mut events = lock(&self.events);
        Self::push_locked(&mut events, event, self.capacity, &self.dropped);
        drop(events);
        self.notify.notify_one();
    }

    /// Marks the queue closed and wakes the receiver.
    pub(super) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    /// Returns the number of discarded events.
    pub(super) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Removes the oldest pending event.
    fn pop(&self) -> Option<Arc<Event>> {
        lock(&self.events).pop_front()
    }

    /// Shared push body.
    fn push_locked(
        events: &mut VecDeque<Arc<Event>>,
        event: Arc<Event>,
        capacity: usize,
        dropped: &AtomicU64,
    ) {
        if events.len() >= capacity {
            events.pop_front();
            dropped.fetch_add(1, Ordering::Relaxed);
        }
        events.push_back(event);
    }
}

// ============================================================================
// SECTION: Stream
// ============================================================================

/// Replay-then-push event stream for one observer.
pub struct LiveStream {
    /// Registry handle id.
    id: u64,
    /// Pending events.
    queue: Arc<LiveQueue>,
    /// Owning bus.
    bus: Weak<Shared>,
}

impl LiveStream {
    /// Wraps a registered queue.
    pub(super) const fn new(id: u64, queue: Arc<LiveQueue>, bus: Weak<Shared>) -> Self {
        Self {
            id,
            queue,
            bus,
        }
    }

    /// Waits for the next event; `None` once the bus is gone and the queue
    /// is drained.
    pub async fn recv(&self) -> Option<Arc<Event>> {
        loop {
            if let Some(event) = self.queue.pop() {
                return Some(event);
            }
            if self.queue.closed.load(Ordering::Acquire) {
                return None;
            }
            self.queue.notify.notified().await;
        }
    }

    /// Returns the next pending event without waiting.
    #[must_use]
    pub fn try_recv(&self) -> Option<Arc<Event>> {
        self.queue.pop()
    }

    /// Returns the number of events this stream lost to backpressure.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }
}

impl Drop for LiveStream {
    fn drop(&mut self) {
        if let Some(shared) = self.bus.upgrade() {
            detach_stream(&shared, self.id);
        }
    }
}
