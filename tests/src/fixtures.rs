//! # Test Modules
//!
//! Minimal domain modules that exercise the container contract the way real
//! modules do: they never reference each other and only talk through the bus.

use async_trait::async_trait;
use blueprint_bus::{BusError, Event, Unsubscribe};
use blueprint_runtime::{DynModule, ExecutionContext, LifecyclePhase, Module, ModuleError};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Event type published by [`PublisherModule`].
pub const TASK_CREATED: &str = "TASK_CREATED";

/// Shared, ordered record of lifecycle hook calls across modules.
pub type HookLog = Arc<Mutex<Vec<String>>>;

/// Emits `TASK_CREATED` on demand.
pub struct PublisherModule {
    id: String,
    context: Mutex<Option<ExecutionContext>>,
}

impl PublisherModule {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            context: Mutex::new(None),
        }
    }

    /// Emit `TASK_CREATED` with `{ taskId }`.
    pub fn create_task(&self, task_id: &str) -> Result<Arc<Event>, BusError> {
        let context = self.context.lock().clone().ok_or(BusError::Closed)?;
        context
            .event_bus()
            .emit(TASK_CREATED, json!({ "taskId": task_id }), self.id.as_str())
    }
}

#[async_trait]
impl Module for PublisherModule {
    fn id(&self) -> &str {
        &self.id
    }

    async fn init(&self, context: ExecutionContext) -> Result<(), ModuleError> {
        *self.context.lock() = Some(context);
        Ok(())
    }

    async fn dispose(&self) -> Result<(), ModuleError> {
        self.context.lock().take();
        Ok(())
    }
}

/// Records every `TASK_CREATED` payload it receives.
///
/// Unsubscribes in `dispose`, as every module must.
pub struct SubscriberModule {
    id: String,
    dependencies: Vec<String>,
    received: Arc<Mutex<Vec<Value>>>,
    subscriptions: Mutex<Vec<Unsubscribe>>,
    disposals: AtomicUsize,
}

impl SubscriberModule {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            dependencies: Vec::new(),
            received: Arc::default(),
            subscriptions: Mutex::new(Vec::new()),
            disposals: AtomicUsize::new(0),
        }
    }

    pub fn depending_on(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// Payloads received so far.
    pub fn received(&self) -> Vec<Value> {
        self.received.lock().clone()
    }

    /// How many times `dispose` ran.
    pub fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Module for SubscriberModule {
    fn id(&self) -> &str {
        &self.id
    }

    fn dependencies(&self) -> Vec<String> {
        self.dependencies.clone()
    }

    async fn init(&self, context: ExecutionContext) -> Result<(), ModuleError> {
        let received = Arc::clone(&self.received);
        let subscription = context.event_bus().on(TASK_CREATED, move |event: Arc<Event>| {
            received.lock().push(event.payload.clone());
            async { Ok(()) }
        });
        self.subscriptions.lock().push(subscription);
        Ok(())
    }

    async fn dispose(&self) -> Result<(), ModuleError> {
        for subscription in self.subscriptions.lock().drain(..) {
            subscription.unsubscribe();
        }
        self.disposals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Logs every hook into a shared [`HookLog`] and can be told to fail one.
pub struct RecordingModule {
    id: String,
    dependencies: Vec<String>,
    log: HookLog,
    fail_on: Option<LifecyclePhase>,
}

impl RecordingModule {
    pub fn new(id: impl Into<String>, log: &HookLog) -> Self {
        Self {
            id: id.into(),
            dependencies: Vec::new(),
            log: Arc::clone(log),
            fail_on: None,
        }
    }

    pub fn depending_on(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn failing(mut self, phase: LifecyclePhase) -> Self {
        self.fail_on = Some(phase);
        self
    }

    fn record(&self, phase: LifecyclePhase) -> Result<(), ModuleError> {
        self.log.lock().push(format!("{}:{}", self.id, phase));
        match self.fail_on {
            Some(failing) if failing == phase => Err(anyhow::anyhow!("{} could not {}", self.id, phase).into()),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Module for RecordingModule {
    fn id(&self) -> &str {
        &self.id
    }

    fn dependencies(&self) -> Vec<String> {
        self.dependencies.clone()
    }

    async fn init(&self, _context: ExecutionContext) -> Result<(), ModuleError> {
        self.record(LifecyclePhase::Init)
    }

    async fn start(&self) -> Result<(), ModuleError> {
        self.record(LifecyclePhase::Start)
    }

    async fn ready(&self) -> Result<(), ModuleError> {
        self.record(LifecyclePhase::Ready)
    }

    async fn stop(&self) -> Result<(), ModuleError> {
        self.record(LifecyclePhase::Stop)
    }

    async fn dispose(&self) -> Result<(), ModuleError> {
        self.record(LifecyclePhase::Dispose)
    }
}

/// Hook calls of `phase`, by module id, in call order.
pub fn calls(log: &HookLog, phase: LifecyclePhase) -> Vec<String> {
    let suffix = format!(":{phase}");
    log.lock()
        .iter()
        .filter_map(|entry| entry.strip_suffix(suffix.as_str()).map(str::to_string))
        .collect()
}

/// Erase a shared module handle for `load_module`.
pub fn as_dyn<M: Module + 'static>(module: &Arc<M>) -> DynModule {
    module.clone()
}
