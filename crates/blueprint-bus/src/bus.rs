//! # Event Bus
//!
//! Recording side (`emit`, history, counter) and dispatch side (a single
//! background task invoking handlers in emission order).

use crate::error::BusError;
use crate::event::{Event, EventId, MonotonicClock};
use crate::history::EventHistory;
use crate::subscription::{
    EventStream, Handler, HandlerFuture, Subscription, SubscriptionTable, Unsubscribe,
};
use crate::{DEFAULT_HISTORY_CAPACITY, WILDCARD};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, trace, warn};

/// Event bus configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Number of events retained in history.
    pub history_capacity: usize,
    /// Upper bound on a single handler invocation. `None` waits forever.
    pub handler_timeout: Option<Duration>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            handler_timeout: None,
        }
    }
}

impl BusConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `BLUEPRINT_HISTORY_CAPACITY`: retained events (default: 1000)
    /// - `BLUEPRINT_HANDLER_TIMEOUT_MS`: per-handler timeout (default: unset)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            history_capacity: std::env::var("BLUEPRINT_HISTORY_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.history_capacity),
            handler_timeout: std::env::var("BLUEPRINT_HANDLER_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis),
        }
    }

    /// Set the history capacity.
    #[must_use]
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Set the per-handler timeout.
    #[must_use]
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }
}

/// Point-in-time counters of a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusStats {
    /// Events emitted since creation.
    pub emitted: u64,
    /// Events whose handlers have all been invoked.
    pub dispatched: u64,
    /// Handler invocations that failed, panicked or timed out.
    pub handler_failures: u64,
    /// Live registrations, wildcard included.
    pub subscriptions: usize,
}

/// State shared between the bus handle and its dispatcher task.
struct Dispatcher {
    table: Arc<RwLock<SubscriptionTable>>,
    dispatched: watch::Sender<u64>,
    handler_failures: AtomicU64,
    handler_timeout: Option<Duration>,
}

/// State guarded by the emit lock.
struct Recorder {
    history: EventHistory,
    next_id: EventId,
    queue: Option<mpsc::UnboundedSender<Arc<Event>>>,
}

/// In-process publish/subscribe bus.
///
/// Must be created inside a Tokio runtime: construction spawns the dispatcher
/// task. Call [`shutdown`](Self::shutdown) to stop it; handlers that capture
/// the bus keep it alive otherwise.
pub struct EventBus {
    dispatcher: Arc<Dispatcher>,
    recorder: Mutex<Recorder>,
    emitted: watch::Sender<u64>,
    clock: MonotonicClock,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EventBus {
    /// Create a bus and spawn its dispatcher on the current runtime.
    pub fn new(config: BusConfig) -> Result<Self, BusError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| BusError::NoRuntime)?;

        let (queue, receiver) = mpsc::unbounded_channel();
        let (dispatched, _) = watch::channel(0);
        let (emitted, _) = watch::channel(0);

        let dispatcher = Arc::new(Dispatcher {
            table: Arc::new(RwLock::new(SubscriptionTable::default())),
            dispatched,
            handler_failures: AtomicU64::new(0),
            handler_timeout: config.handler_timeout,
        });
        let task = runtime.spawn(run_dispatcher(Arc::clone(&dispatcher), receiver));

        debug!(
            history_capacity = config.history_capacity,
            handler_timeout_ms = config.handler_timeout.map(|t| t.as_millis() as u64),
            "Event bus created"
        );

        Ok(Self {
            dispatcher,
            recorder: Mutex::new(Recorder {
                history: EventHistory::new(config.history_capacity),
                next_id: 0,
                queue: Some(queue),
            }),
            emitted,
            clock: MonotonicClock::new(),
            task: Mutex::new(Some(task)),
        })
    }

    /// Register `handler` for `event_type`, or for every event with `*`.
    pub fn on<F, Fut>(&self, event_type: impl Into<String>, handler: F) -> Unsubscribe
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(event_type.into(), erase(handler), false)
    }

    /// Register `handler` for at most one matching event.
    ///
    /// The registration is removed right before the handler is invoked.
    pub fn once<F, Fut>(&self, event_type: impl Into<String>, handler: F) -> Unsubscribe
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(event_type.into(), erase(handler), true)
    }

    /// Subscribe and receive matching events as a stream.
    pub fn stream(&self, event_type: impl Into<String>) -> EventStream {
        let (sender, receiver) = mpsc::unbounded_channel();
        let subscription = self.on(event_type, move |event| {
            // Receiver gone means the stream is being dropped.
            let _ = sender.send(event);
            async { Ok(()) }
        });
        EventStream::new(UnboundedReceiverStream::new(receiver), subscription)
    }

    fn register(&self, event_type: String, handler: Handler, once: bool) -> Unsubscribe {
        let (id, event_type, active) = self.dispatcher.table.write().insert(&event_type, handler, once);
        debug!(event_type = %event_type, subscription = id, once, "Handler registered");
        Unsubscribe::new(id, event_type, active, Arc::downgrade(&self.dispatcher.table))
    }

    /// Record an event and queue it for dispatch.
    ///
    /// Returns as soon as the event is in history; handlers run later on the
    /// dispatcher task.
    pub fn emit(
        &self,
        event_type: impl Into<String>,
        payload: Value,
        source: impl Into<String>,
    ) -> Result<Arc<Event>, BusError> {
        let event_type = event_type.into();
        if event_type.is_empty() {
            return Err(BusError::EmptyEventType);
        }
        if event_type == WILDCARD {
            return Err(BusError::ReservedEventType);
        }

        let mut recorder = self.recorder.lock();
        if recorder.queue.is_none() {
            return Err(BusError::Closed);
        }

        recorder.next_id += 1;
        let event = Arc::new(Event {
            id: recorder.next_id,
            event_type,
            payload,
            source: source.into(),
            timestamp: self.clock.now_ms(),
        });

        recorder.history.push(Arc::clone(&event));
        self.emitted.send_modify(|count| *count += 1);

        if let Some(queue) = &recorder.queue {
            if queue.send(Arc::clone(&event)).is_err() {
                warn!(event_type = %event.event_type, event_id = event.id, "Dispatcher gone, event not delivered");
            }
        }
        drop(recorder);

        trace!(event_type = %event.event_type, event_id = event.id, source = %event.source, "Event emitted");
        Ok(event)
    }

    /// Copy of the retained history, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<Event> {
        self.recorder.lock().history.snapshot()
    }

    /// Number of retained history entries.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.recorder.lock().history.len()
    }

    /// Drop all retained history. Does not reset the event counter.
    pub fn clear_history(&self) {
        self.recorder.lock().history.clear();
    }

    /// Total events emitted since creation.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        *self.emitted.borrow()
    }

    /// Observe the event counter without polling.
    #[must_use]
    pub fn watch_event_count(&self) -> watch::Receiver<u64> {
        self.emitted.subscribe()
    }

    /// Number of live registrations for `event_type` (`*` for wildcard ones).
    #[must_use]
    pub fn listener_count(&self, event_type: &str) -> usize {
        self.dispatcher.table.read().count(event_type)
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> BusStats {
        BusStats {
            emitted: self.event_count(),
            dispatched: *self.dispatcher.dispatched.borrow(),
            handler_failures: self.dispatcher.handler_failures.load(Ordering::Relaxed),
            subscriptions: self.dispatcher.table.read().len(),
        }
    }

    /// True once [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.recorder.lock().queue.is_none()
    }

    /// Wait until every event emitted before this call has been dispatched.
    ///
    /// Must not be awaited from inside a handler: the dispatcher would wait
    /// on itself.
    pub async fn flush(&self) {
        let target = self.event_count();
        let mut dispatched = self.dispatcher.dispatched.subscribe();
        if dispatched.wait_for(|count| *count >= target).await.is_err() {
            debug!("Dispatcher counter closed while flushing");
        }
    }

    /// Stop accepting events, dispatch what is queued and join the dispatcher.
    ///
    /// All registrations are dropped afterwards. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        let queue = self.recorder.lock().queue.take();
        if queue.is_none() {
            return;
        }
        drop(queue);

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "Dispatcher task ended abnormally");
            }
        }

        self.dispatcher.table.write().clear();
        debug!(emitted = self.event_count(), "Event bus shut down");
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").field("stats", &self.stats()).finish()
    }
}

fn erase<F, Fut>(handler: F) -> Handler
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |event| -> HandlerFuture { handler(event).boxed() })
}

async fn run_dispatcher(dispatcher: Arc<Dispatcher>, mut queue: mpsc::UnboundedReceiver<Arc<Event>>) {
    while let Some(event) = queue.recv().await {
        dispatcher.dispatch(&event).await;
        dispatcher.dispatched.send_modify(|count| *count += 1);
    }
    debug!("Dispatcher stopped");
}

impl Dispatcher {
    async fn dispatch(&self, event: &Arc<Event>) {
        // Snapshot so handlers may (un)subscribe while this event is in flight.
        let targets = self.table.read().matching(&event.event_type);

        for subscription in targets {
            if !subscription.claim() {
                continue;
            }
            if subscription.once {
                self.table
                    .write()
                    .remove(&subscription.event_type, subscription.id);
            }
            self.invoke(&subscription, event).await;
        }
    }

    async fn invoke(&self, subscription: &Subscription, event: &Arc<Event>) {
        let call = std::panic::catch_unwind(AssertUnwindSafe(|| {
            (subscription.handler)(Arc::clone(event))
        }));
        let future = match call {
            Ok(future) => future,
            Err(panic) => {
                self.report_panic(subscription, event, panic.as_ref());
                return;
            }
        };

        let guarded = AssertUnwindSafe(future).catch_unwind();
        let outcome = match self.handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.handler_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        event_type = %event.event_type,
                        event_id = event.id,
                        subscription = subscription.id,
                        timeout_ms = limit.as_millis() as u64,
                        "Event handler timed out"
                    );
                    return;
                }
            },
            None => guarded.await,
        };

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.handler_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    event_type = %event.event_type,
                    event_id = event.id,
                    subscription = subscription.id,
                    error = %e,
                    "Event handler failed"
                );
            }
            Err(panic) => self.report_panic(subscription, event, panic.as_ref()),
        }
    }

    fn report_panic(&self, subscription: &Subscription, event: &Event, panic: &(dyn Any + Send)) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
        error!(
            event_type = %event.event_type,
            event_id = event.id,
            subscription = subscription.id,
            panic = %panic_message(panic),
            "Event handler panicked"
        );
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
