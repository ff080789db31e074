// crates/toolhub-core/src/telemetry.rs
// ============================================================================
// Module: Telemetry Bus
// Description: Event history, running statistics, sessions, and fan-out.
// Purpose: Aggregate invocation events for the dashboard and diagnostic log.
// Dependencies: serde, serde_json, tokio
// ============================================================================

//! ## Overview
//! [`TelemetryBus`] is the single place invocation and session events land.
//! Each [`TelemetryBus::emit`] updates every aggregate under one lock before
//! anything observes the event, so counters never race. Observers attach in
//! two ways:
//!
//! - Callback subscribers run synchronously after the state update. A panic
//!   in one callback is caught and counted; the remaining callbacks still run.
//! - Live streams own a bounded queue with drop-oldest backpressure. A slow
//!   stream loses its oldest events instead of stalling anyone else.
//!
//! ## Invariants
//! - Event ids are issued by the bus, strictly increasing from 1.
//! - History and timeseries rings never exceed their capacities.
//! - Per-tool `success_count + error_count == total_calls`.
//! - A live stream sees the history snapshot taken at attach time followed by
//!   every later event, with no gap and no duplicate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::Weak;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde::Serialize;
use serde_json::Value;

use crate::catalog::ToolDescriptor;
use crate::time::now_ms;

mod live;

pub use live::LiveStream;

use self::live::LiveQueue;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Default recent-history capacity.
pub const DEFAULT_HISTORY_CAPACITY: usize = 500;
/// Default timeseries capacity.
pub const DEFAULT_TIMESERIES_CAPACITY: usize = 2_000;
/// Default per-stream live queue capacity.
pub const DEFAULT_LIVE_QUEUE_CAPACITY: usize = 256;

/// Ring and queue capacities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryLimits {
    /// Recent-history ring capacity.
    pub history: usize,
    /// Timeseries ring capacity.
    pub timeseries: usize,
    /// Live stream queue capacity for ongoing delivery.
    pub live_queue: usize,
}

impl Default for TelemetryLimits {
    fn default() -> Self {
        Self {
            history: DEFAULT_HISTORY_CAPACITY,
            timeseries: DEFAULT_TIMESERIES_CAPACITY,
            live_queue: DEFAULT_LIVE_QUEUE_CAPACITY,
        }
    }
}

// ============================================================================
// SECTION: Events
// ============================================================================

/// Event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// Tool invocation started.
    Call,
    /// Tool invocation succeeded.
    Result,
    /// Tool invocation failed or was refused by the guard.
    Error,
    /// Protocol session opened.
    SessionConnect,
    /// Protocol session closed.
    SessionDisconnect,
    /// Server began serving.
    ServerStart,
}

impl EventKind {
    /// Returns the wire label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Result => "result",
            Self::Error => "error",
            Self::SessionConnect => "session-connect",
            Self::SessionDisconnect => "session-disconnect",
            Self::ServerStart => "server-start",
        }
    }
}

/// Emitted, immutable telemetry event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    /// Bus-issued identifier.
    pub id: u64,
    /// Event type.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Emission time (unix milliseconds).
    pub timestamp_ms: u64,
    /// Tool name for invocation events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Tool category for invocation events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Raw call input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    /// Handler duration in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    /// Error text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Protocol session id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Client name announced on connect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    /// Id of the call event a result or error belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<u64>,
}

/// Event payload before the bus assigns id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    /// Event type.
    pub kind: EventKind,
    /// Tool name.
    pub tool: Option<String>,
    /// Tool category.
    pub category: Option<String>,
    /// Raw call input.
    pub input: Option<Value>,
    /// Duration in milliseconds.
    pub duration_ms: Option<f64>,
    /// Error text.
    pub error: Option<String>,
    /// Session id.
    pub session_id: Option<String>,
    /// Client name.
    pub client_name: Option<String>,
    /// Originating call event id.
    pub call_id: Option<u64>,
}

impl NewEvent {
    /// Creates an empty payload of the given kind.
    #[must_use]
    pub const fn new(kind: EventKind) -> Self {
        Self {
            kind,
            tool: None,
            category: None,
            input: None,
            duration_ms: None,
            error: None,
            session_id: None,
            client_name: None,
            call_id: None,
        }
    }

    /// Invocation start carrying the raw input.
    #[must_use]
    pub fn call(tool: &ToolDescriptor, input: Value, session_id: Option<String>) -> Self {
        Self {
            input: Some(input),
            session_id,
            ..Self::for_tool(EventKind::Call, tool)
        }
    }

    /// Successful completion of call `call_id`.
    #[must_use]
    pub fn result(
        tool: &ToolDescriptor,
        call_id: u64,
        duration_ms: f64,
        session_id: Option<String>,
    ) -> Self {
        Self {
            duration_ms: Some(duration_ms),
            session_id,
            call_id: Some(call_id),
            ..Self::for_tool(EventKind::Result, tool)
        }
    }

    /// Failed completion of call `call_id`.
    #[must_use]
    pub fn error(
        tool: &ToolDescriptor,
        call_id: u64,
        duration_ms: f64,
        message: impl Into<String>,
        session_id: Option<String>,
    ) -> Self {
        Self {
            duration_ms: Some(duration_ms),
            error: Some(message.into()),
            session_id,
            call_id: Some(call_id),
            ..Self::for_tool(EventKind::Error, tool)
        }
    }

    /// Session opened by a client.
    #[must_use]
    pub fn session_connect(session_id: impl Into<String>, client_name: Option<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            client_name,
            ..Self::new(EventKind::SessionConnect)
        }
    }

    /// Session closed.
    #[must_use]
    pub fn session_disconnect(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::new(EventKind::SessionDisconnect)
        }
    }

    /// Server began serving.
    #[must_use]
    pub const fn server_start() -> Self {
        Self::new(EventKind::ServerStart)
    }

    /// Payload naming a tool.
    fn for_tool(kind: EventKind, tool: &ToolDescriptor) -> Self {
        Self {
            tool: Some(tool.name.clone()),
            category: Some(tool.category.clone()),
            ..Self::new(kind)
        }
    }
}

// ============================================================================
// SECTION: Aggregates
// ============================================================================

/// Running per-tool statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolStats {
    /// Completed invocations.
    pub total_calls: u64,
    /// Successful invocations.
    pub success_count: u64,
    /// Failed invocations.
    pub error_count: u64,
    /// Time of the last completion.
    pub last_invoked_ms: Option<u64>,
    /// Running mean of handler duration.
    pub avg_duration_ms: f64,
}

impl ToolStats {
    /// Folds one completion into the running counters.
    #[allow(clippy::cast_precision_loss, reason = "Call counts stay far below 2^52.")]
    fn record(&mut self, duration_ms: f64, success: bool, at_ms: u64) {
        self.total_calls += 1;
        if success {
            self.success_count += 1;
        } else {
            self.error_count += 1;
        }
        let n = self.total_calls as f64;
        self.avg_duration_ms = self.avg_duration_ms.mul_add(n - 1.0, duration_ms) / n;
        self.last_invoked_ms = Some(at_ms);
    }
}

/// Global invocation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    /// Completed invocations.
    pub invocations: u64,
    /// Successful invocations.
    pub successes: u64,
    /// Failed invocations.
    pub errors: u64,
}

/// Connected protocol session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    /// Session id.
    pub id: String,
    /// Client name, when announced.
    pub client_name: Option<String>,
    /// Connect time (unix milliseconds).
    pub connected_at_ms: u64,
}

/// Sampled completion for time-bucketed charts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeseriesPoint {
    /// Completion time (unix milliseconds).
    pub timestamp_ms: u64,
    /// Tool name.
    pub tool: String,
    /// Handler duration in milliseconds.
    pub duration_ms: f64,
    /// Whether the call succeeded.
    pub success: bool,
}

/// Aggregate over one fixed-width time bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeseriesBucket {
    /// Bucket start (unix milliseconds).
    pub start_ms: u64,
    /// Completions in the bucket.
    pub calls: u64,
    /// Failed completions in the bucket.
    pub errors: u64,
    /// Mean duration in the bucket.
    pub avg_duration_ms: f64,
}

/// Point-in-time copy of the bus aggregates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// Bus creation time (unix milliseconds).
    pub started_at_ms: u64,
    /// Milliseconds since creation.
    pub uptime_ms: u64,
    /// Global counters.
    pub totals: Totals,
    /// Per-tool counters keyed by tool name.
    pub tools: BTreeMap<String, ToolStats>,
    /// Connected sessions.
    pub active_sessions: usize,
    /// Attached live streams.
    pub live_streams: usize,
    /// Events dropped by slow live streams.
    pub dropped_events: u64,
    /// Subscriber callbacks that panicked.
    pub subscriber_failures: u64,
}

/// Groups samples into `bucket_ms`-wide buckets ordered by start time.
#[must_use]
#[allow(clippy::cast_precision_loss, reason = "Bucket counts stay far below 2^52.")]
pub fn bucketize(points: &[TimeseriesPoint], bucket_ms: u64) -> Vec<TimeseriesBucket> {
    let width = bucket_ms.max(1);
    let mut buckets: BTreeMap<u64, (u64, u64, f64)> = BTreeMap::new();
    for point in points {
        let start = point.timestamp_ms - point.timestamp_ms % width;
        let entry = buckets.entry(start).or_insert((0, 0, 0.0));
        entry.0 += 1;
        if !point.success {
            entry.1 += 1;
        }
        entry.2 += point.duration_ms;
    }
    buckets
        .into_iter()
        .map(|(start_ms, (calls, errors, total))| TimeseriesBucket {
            start_ms,
            calls,
            errors,
            avg_duration_ms: total / calls as f64,
        })
        .collect()
}

// ============================================================================
// SECTION: Bus
// ============================================================================

/// Synchronous event observer.
type Callback = Arc<dyn Fn(&Event) + Send + Sync>;

/// Mutable aggregates guarded by one lock.
struct BusState {
    /// Last issued event id.
    last_id: u64,
    /// Recent-history ring.
    history: VecDeque<Arc<Event>>,
    /// Timeseries ring.
    timeseries: VecDeque<TimeseriesPoint>,
    /// Global counters.
    totals: Totals,
    /// Per-tool counters.
    tools: BTreeMap<String, ToolStats>,
    /// Connected sessions keyed by id.
    sessions: BTreeMap<String, Session>,
    /// Attached live stream queues keyed by handle id.
    streams: Vec<(u64, Arc<LiveQueue>)>,
    /// Drops recorded by streams that have since detached.
    detached_drops: u64,
}

impl BusState {
    /// Applies an event to the aggregates.
    fn apply(&mut self, event: &Arc<Event>, limits: &TelemetryLimits) {
        push_bounded(&mut self.history, Arc::clone(event), limits.history);
        match event.kind {
            EventKind::Result | EventKind::Error => {
                let Some(tool) = &event.tool else {
                    return;
                };
                let success = event.kind == EventKind::Result;
                let duration_ms = event.duration_ms.unwrap_or(0.0);
                self.totals.invocations += 1;
                if success {
                    self.totals.successes += 1;
                } else {
                    self.totals.errors += 1;
                }
                self.tools.entry(tool.clone()).or_default().record(
                    duration_ms,
                    success,
                    event.timestamp_ms,
                );
                push_bounded(
                    &mut self.timeseries,
                    TimeseriesPoint {
                        timestamp_ms: event.timestamp_ms,
                        tool: tool.clone(),
                        duration_ms,
                        success,
                    },
                    limits.timeseries,
                );
            }
            EventKind::SessionConnect => {
                if let Some(id) = &event.session_id {
                    self.sessions.insert(
                        id.clone(),
                        Session {
                            id: id.clone(),
                            client_name: event.client_name.clone(),
                            connected_at_ms: event.timestamp_ms,
                        },
                    );
                }
            }
            EventKind::SessionDisconnect => {
                if let Some(id) = &event.session_id {
                    self.sessions.remove(id);
                }
            }
            EventKind::Call | EventKind::ServerStart => {}
        }
    }
}

/// State shared between the bus and its handles.
struct Shared {
    /// Ring and queue capacities.
    limits: TelemetryLimits,
    /// Creation time.
    started_at_ms: u64,
    /// Aggregates and stream registry.
    state: Mutex<BusState>,
    /// Callback subscribers keyed by handle id.
    subscribers: Mutex<Vec<(u64, Callback)>>,
    /// Handle id source for subscribers and streams.
    next_handle: AtomicU64,
    /// Callback panics caught during fan-out.
    subscriber_failures: AtomicU64,
}

impl Drop for Shared {
    fn drop(&mut self) {
        for (_, queue) in &lock(&self.state).streams {
            queue.close();
        }
    }
}

/// Process-wide telemetry hub. Cloning shares the same bus.
#[derive(Clone)]
pub struct TelemetryBus {
    /// Shared state.
    shared: Arc<Shared>,
}

impl Default for TelemetryBus {
    fn default() -> Self {
        Self::new(TelemetryLimits::default())
    }
}

impl TelemetryBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new(limits: TelemetryLimits) -> Self {
        Self {
            shared: Arc::new(Shared {
                limits,
                started_at_ms: now_ms(),
                state: Mutex::new(BusState {
                    last_id: 0,
                    history: VecDeque::new(),
                    timeseries: VecDeque::new(),
                    totals: Totals::default(),
                    tools: BTreeMap::new(),
                    sessions: BTreeMap::new(),
                    streams: Vec::new(),
                    detached_drops: 0,
                }),
                subscribers: Mutex::new(Vec::new()),
                next_handle: AtomicU64::new(1),
                subscriber_failures: AtomicU64::new(0),
            }),
        }
    }

    /// Returns the configured capacities.
    #[must_use]
    pub fn limits(&self) -> TelemetryLimits {
        self.shared.limits
    }

    /// Records an event and delivers it to every observer.
    pub fn emit(&self, new: NewEvent) -> Arc<Event> {
        let event = {
            let mut state = lock(&self.shared.state);
            state.last_id += 1;
            let event = Arc::new(Event {
                id: state.last_id,
                kind: new.kind,
                timestamp_ms: now_ms(),
                tool: new.tool,
                category: new.category,
                input: new.input,
                duration_ms: new.duration_ms,
                error: new.error,
                session_id: new.session_id,
                client_name: new.client_name,
                call_id: new.call_id,
            });
            state.apply(&event, &self.shared.limits);
            for (_, queue) in &state.streams {
                queue.push(Arc::clone(&event));
            }
            event
        };
        let callbacks: Vec<Callback> = lock(&self.shared.subscribers)
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(&event))).is_err() {
                self.shared.subscriber_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        event
    }

    /// Registers a synchronous callback; dropping the handle unsubscribes.
    #[must_use = "dropping the subscription unsubscribes the callback"]
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self.shared.next_handle.fetch_add(1, Ordering::Relaxed);
        lock(&self.shared.subscribers).push((id, Arc::new(callback)));
        Subscription {
            id,
            bus: Arc::downgrade(&self.shared),
        }
    }

    /// Attaches a live stream that replays recent history, then follows.
    ///
    /// The queue holds at least the replayed history so the catch-up burst is
    /// never truncated.
    #[must_use]
    pub fn live_stream(&self) -> LiveStream {
        let id = self.shared.next_handle.fetch_add(1, Ordering::Relaxed);
        let mut state = lock(&self.shared.state);
        let capacity = self.shared.limits.live_queue.max(state.history.len());
        let queue = Arc::new(LiveQueue::new(capacity));
        queue.replay(state.history.iter().cloned());
        state.streams.push((id, Arc::clone(&queue)));
        LiveStream::new(id, queue, Arc::downgrade(&self.shared))
    }

    /// Returns a copy of the aggregates.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        let state = lock(&self.shared.state);
        let live_drops: u64 = state.streams.iter().map(|(_, queue)| queue.dropped()).sum();
        StatsSnapshot {
            started_at_ms: self.shared.started_at_ms,
            uptime_ms: now_ms().saturating_sub(self.shared.started_at_ms),
            totals: state.totals,
            tools: state.tools.clone(),
            active_sessions: state.sessions.len(),
            live_streams: state.streams.len(),
            dropped_events: state.detached_drops + live_drops,
            subscriber_failures: self.shared.subscriber_failures.load(Ordering::Relaxed),
        }
    }

    /// Returns connected sessions ordered by connect time.
    #[must_use]
    pub fn sessions(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> =
            lock(&self.shared.state).sessions.values().cloned().collect();
        sessions.sort_by(|a, b| a.connected_at_ms.cmp(&b.connected_at_ms).then(a.id.cmp(&b.id)));
        sessions
    }

    /// Returns the timeseries samples, oldest first.
    #[must_use]
    pub fn timeseries(&self) -> Vec<TimeseriesPoint> {
        lock(&self.shared.state).timeseries.iter().cloned().collect()
    }

    /// Returns the timeseries grouped into `bucket_ms`-wide buckets.
    #[must_use]
    pub fn timeseries_buckets(&self, bucket_ms: u64) -> Vec<TimeseriesBucket> {
        bucketize(&self.timeseries(), bucket_ms)
    }

    /// Returns recent history, oldest first.
    #[must_use]
    pub fn recent_events(&self) -> Vec<Event> {
        lock(&self.shared.state).history.iter().map(|event| (**event).clone()).collect()
    }

    /// Returns the number of callback subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        lock(&self.shared.subscribers).len()
    }
}

// ============================================================================
// SECTION: Subscription
// ============================================================================

/// Callback registration handle.
pub struct Subscription {
    /// Handle id.
    id: u64,
    /// Owning bus.
    bus: Weak<Shared>,
}

impl Subscription {
    /// Removes the callback from the bus.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.bus.upgrade() {
            lock(&shared.subscribers).retain(|(id, _)| *id != self.id);
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Appends to a ring, evicting from the front at capacity.
fn push_bounded<T>(ring: &mut VecDeque<T>, item: T, capacity: usize) {
    if capacity == 0 {
        return;
    }
    while ring.len() >= capacity {
        ring.pop_front();
    }
    ring.push_back(item);
}

/// Locks a mutex, recovering the data from a poisoned lock.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes a stream from the registry, folding in its drop count.
fn detach_stream(shared: &Shared, id: u64) {
    let mut state = lock(&shared.state);
    if let Some(index) = state.streams.iter().position(|(stream_id, _)| *stream_id == id) {
        let (_, queue) = state.streams.swap_remove(index);
        state.detached_drops += queue.dropped();
    }
}
