//! The module lifecycle container.

use super::config::{ContainerConfig, CyclePolicy};
use crate::context::{ExecutionContext, RegistryView};
use crate::error::{ContainerError, ModuleFailure};
use crate::events;
use crate::module::{DynModule, LifecyclePhase, ModuleError, ModuleStatus};
use crate::registry::{ModuleHandle, ModuleRecord, ModuleRegistry};
use blueprint_bus::{panic_message, EventBus};
use blueprint_telemetry::module_span;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

/// Hosts domain modules, drives them through their lifecycle in dependency
/// order and owns the event bus they share.
///
/// Lifecycle operations are serialized: a `start` that is in progress
/// finishes before a concurrent `stop` begins.
pub struct BlueprintContainer {
    config: ContainerConfig,
    blueprint_id: Arc<str>,
    registry: Arc<RwLock<ModuleRegistry>>,
    context: RwLock<Option<ExecutionContext>>,
    /// Modules started by this container, in start order.
    started: Mutex<Vec<String>>,
    lifecycle: tokio::sync::Mutex<()>,
    running: AtomicBool,
    disposed: AtomicBool,
}

impl BlueprintContainer {
    /// Create an uninitialized container.
    pub fn new(config: ContainerConfig) -> Self {
        let blueprint_id: Arc<str> = Arc::from(config.blueprint_id.as_str());
        Self {
            config,
            blueprint_id,
            registry: Arc::new(RwLock::new(ModuleRegistry::new())),
            context: RwLock::new(None),
            started: Mutex::new(Vec::new()),
            lifecycle: tokio::sync::Mutex::new(()),
            running: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    /// Container identifier.
    pub fn blueprint_id(&self) -> &str {
        &self.blueprint_id
    }

    /// Create the event bus and the execution context.
    ///
    /// Must be called from within a Tokio runtime. A second call fails with
    /// [`ContainerError::AlreadyInitialized`] and leaves the existing bus and
    /// its subscriptions untouched.
    pub fn initialize(&self) -> Result<(), ContainerError> {
        let mut context = self.context.write();
        if self.disposed.load(Ordering::SeqCst) {
            return Err(ContainerError::Disposed);
        }
        if context.is_some() {
            return Err(ContainerError::AlreadyInitialized);
        }

        let bus = Arc::new(EventBus::new(self.config.bus.clone())?);
        *context = Some(ExecutionContext::new(
            Arc::clone(&self.blueprint_id),
            bus,
            RegistryView::new(Arc::clone(&self.registry)),
        ));

        info!(blueprint_id = %self.blueprint_id, "[Container] Initialized");
        Ok(())
    }

    /// The execution context handed to modules.
    pub fn execution_context(&self) -> Result<ExecutionContext, ContainerError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(ContainerError::Disposed);
        }
        self.context.read().clone().ok_or(ContainerError::NotInitialized)
    }

    /// The shared event bus.
    pub fn event_bus(&self) -> Result<Arc<EventBus>, ContainerError> {
        self.execution_context().map(|ctx| Arc::clone(ctx.event_bus()))
    }

    /// True between a successful `start` and the next `stop`.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// True once `initialize` succeeded and `dispose` has not run.
    pub fn is_initialized(&self) -> bool {
        !self.disposed.load(Ordering::SeqCst) && self.context.read().is_some()
    }

    /// True once `dispose` ran.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Status of a loaded module.
    pub fn module_status(&self, id: &str) -> Option<ModuleStatus> {
        self.registry.read().status(id)
    }

    /// Loaded module ids in registration order.
    pub fn module_ids(&self) -> Vec<String> {
        self.registry.read().ids()
    }

    /// Register a module and run its `init`.
    ///
    /// Dependencies that are not loaded yet are accepted. A dependency cycle
    /// is rejected or logged according to [`CyclePolicy`]. If `init` fails the
    /// module stays registered in `ERROR` so that `dispose` still reaches it.
    pub async fn load_module(&self, module: DynModule) -> Result<(), ContainerError> {
        let _guard = self.lifecycle.lock().await;
        let context = self.execution_context()?;

        let record = ModuleRecord::new(module);
        let id = record.id.clone();
        let handle = {
            let mut registry = self.registry.write();
            let handle = record.handle();
            if !registry.insert(record) {
                return Err(ContainerError::DuplicateModule(id));
            }

            if let Some(cycle) = registry.find_cycle() {
                match self.config.cycle_policy {
                    CyclePolicy::Reject => {
                        registry.remove(&id);
                        error!(module_id = %id, cycle = ?cycle, "[Container] ✗ Dependency cycle, module rejected");
                        return Err(ContainerError::DependencyCycle(cycle));
                    }
                    CyclePolicy::Warn => {
                        warn!(module_id = %id, cycle = ?cycle, "[Container] Dependency cycle detected");
                    }
                }
            }

            let missing = registry.missing_dependencies(&id);
            if !missing.is_empty() {
                debug!(module_id = %id, missing = ?missing, "[Container] Dependencies not loaded yet");
            }
            handle
        };

        info!(module_id = %id, "[Container] Loading module");
        handle.set_status(ModuleStatus::Initializing);
        match run_hook(&handle, LifecyclePhase::Init, handle.instance.init(context.clone())).await {
            Ok(()) => {
                handle.set_status(ModuleStatus::Initialized);
                self.publish(&context, events::MODULE_LOADED, json!({ "moduleId": id }))?;
                info!(module_id = %id, "[Container] ✓ Module loaded");
                Ok(())
            }
            Err(e) => {
                handle.set_status(ModuleStatus::Error);
                error!(module_id = %id, error = %e, "[Container] ✗ Module init failed");
                self.publish(
                    &context,
                    events::MODULE_LOAD_FAILED,
                    json!({ "moduleId": id, "error": e.to_string() }),
                )?;
                Err(ContainerError::Lifecycle {
                    module_id: id,
                    phase: LifecyclePhase::Init,
                    source: e,
                })
            }
        }
    }

    /// Stop (if active), dispose and remove a module.
    ///
    /// The record is removed even if `dispose` fails. Modules that depend on
    /// it are left loaded; a warning is logged.
    pub async fn unload_module(&self, id: &str) -> Result<(), ContainerError> {
        let _guard = self.lifecycle.lock().await;
        if self.disposed.load(Ordering::SeqCst) {
            return Err(ContainerError::Disposed);
        }

        let (handle, dependents) = {
            let registry = self.registry.read();
            let handle = registry
                .handle(id)
                .ok_or_else(|| ContainerError::UnknownModule(id.to_string()))?;
            (handle, registry.dependents_of(id))
        };
        if !dependents.is_empty() {
            warn!(module_id = %id, dependents = ?dependents, "[Container] Unloading a module others depend on");
        }

        info!(module_id = %id, "[Container] Unloading module");
        let mut errors = Vec::new();
        if handle.status().is_active() {
            if let Err(e) = stop_module(&handle).await {
                errors.push((LifecyclePhase::Stop, e));
            }
        }
        if let Err(e) = dispose_module(&handle).await {
            errors.push((LifecyclePhase::Dispose, e));
        }

        self.registry.write().remove(id);
        self.started.lock().retain(|started| started != id);

        if let Some(context) = self.context.read().clone() {
            self.publish(&context, events::MODULE_UNLOADED, json!({ "moduleId": id }))?;
        }

        if errors.len() > 1 {
            return Err(ContainerError::Batch(
                errors
                    .iter()
                    .map(|(phase, e)| ModuleFailure::new(id, *phase, e))
                    .collect(),
            ));
        }
        match errors.pop() {
            Some((phase, source)) => Err(ContainerError::Lifecycle {
                module_id: id.to_string(),
                phase,
                source,
            }),
            None => {
                info!(module_id = %id, "[Container] ✓ Module unloaded");
                Ok(())
            }
        }
    }

    /// Start every loaded module in dependency order.
    ///
    /// Each module runs `start` then `ready`; a module starts only after all
    /// its dependencies are `READY`. Failures are collected and the remaining
    /// modules are still processed. The container is marked running, and
    /// `CONTAINER_STARTED` emitted, only when every module succeeded.
    ///
    /// Calling it while running starts modules loaded since, without
    /// emitting container events again.
    pub async fn start(&self) -> Result<(), ContainerError> {
        let _guard = self.lifecycle.lock().await;
        let context = self.execution_context()?;
        self.start_locked(&context).await
    }

    /// Stop every started module in reverse start order.
    pub async fn stop(&self) -> Result<(), ContainerError> {
        let _guard = self.lifecycle.lock().await;
        let context = self.execution_context()?;
        self.stop_locked(&context).await
    }

    /// Stop if needed, dispose every module in reverse dependency order and
    /// shut the event bus down.
    ///
    /// Safe to call at any point, including before `initialize`. Only the
    /// first call does any work.
    pub async fn dispose(&self) -> Result<(), ContainerError> {
        let _guard = self.lifecycle.lock().await;
        if self.disposed.load(Ordering::SeqCst) {
            debug!(blueprint_id = %self.blueprint_id, "[Container] Already disposed");
            return Ok(());
        }

        let context = self.context.read().clone();
        let mut failures = Vec::new();

        if let Some(context) = &context {
            let has_started = !self.started.lock().is_empty();
            if self.is_running() || has_started {
                if let Err(e) = self.stop_locked(context).await {
                    warn!(error = %e, "[Container] Stop during dispose reported failures");
                    failures.extend(e.failures());
                }
            }
        }

        self.disposed.store(true, Ordering::SeqCst);
        info!(blueprint_id = %self.blueprint_id, "[Container] Disposing");

        let mut order = self.registry.read().start_plan().all();
        order.reverse();

        for id in order {
            let Some(handle) = self.registry.read().handle(&id) else {
                continue;
            };
            if let Err(e) = dispose_module(&handle).await {
                failures.push(ModuleFailure::new(id.as_str(), LifecyclePhase::Dispose, &e));
            }
            self.registry.write().remove(&id);

            if let Some(context) = &context {
                if let Err(e) = self.publish(context, events::MODULE_UNLOADED, json!({ "moduleId": id })) {
                    warn!(module_id = %id, error = %e, "[Container] Could not announce unload");
                }
            }
        }

        self.started.lock().clear();
        self.running.store(false, Ordering::SeqCst);
        self.context.write().take();

        if let Some(context) = context {
            context.event_bus().shutdown().await;
        }

        if failures.is_empty() {
            info!(blueprint_id = %self.blueprint_id, "[Container] ✓ Disposed");
            Ok(())
        } else {
            error!(failed = failures.len(), "[Container] ✗ Disposed with failures");
            Err(ContainerError::Batch(failures))
        }
    }

    /// JSON summary of the container, its modules and the bus counters.
    pub fn status_report(&self) -> Value {
        let bus = self
            .context
            .read()
            .as_ref()
            .and_then(|ctx| serde_json::to_value(ctx.event_bus().stats()).ok())
            .unwrap_or(Value::Null);

        json!({
            "blueprintId": &*self.blueprint_id,
            "initialized": self.is_initialized(),
            "running": self.is_running(),
            "disposed": self.is_disposed(),
            "modules": self.registry.read().infos(),
            "bus": bus,
        })
    }

    async fn start_locked(&self, context: &ExecutionContext) -> Result<(), ContainerError> {
        let already_running = self.is_running();
        let plan = self.registry.read().start_plan();
        let module_count = plan.order.len() + plan.cyclic.len();

        if !already_running {
            info!(blueprint_id = %self.blueprint_id, modules = module_count, "[Container] Starting");
            self.publish(context, events::CONTAINER_STARTING, self.container_payload(module_count))?;
        }

        // Under CyclePolicy::Warn, edges inside a cycle do not gate start.
        let cyclic: HashSet<&str> = plan.cyclic.iter().map(String::as_str).collect();
        let mut failures = Vec::new();
        let mut newly_started = Vec::new();

        for id in plan.all() {
            let Some(handle) = self.registry.read().handle(&id) else {
                continue;
            };

            match handle.status() {
                ModuleStatus::Initialized | ModuleStatus::Stopped => {}
                status if status.is_active() => continue,
                status => {
                    let e = ModuleError::failed(format!("cannot start a module in {status} state"));
                    warn!(module_id = %id, status = %status, "[Container] ✗ Module not startable");
                    failures.push(ModuleFailure::new(id.as_str(), LifecyclePhase::Start, &e));
                    continue;
                }
            }

            // Status is left as is so a later start can pick the module up.
            if let Err(e) = self.check_dependencies(&handle, &cyclic) {
                error!(module_id = %id, error = %e, "[Container] ✗ Dependency not ready");
                failures.push(ModuleFailure::new(id.as_str(), LifecyclePhase::Start, &e));
                continue;
            }

            info!(module_id = %id, "[Container] Starting module");
            match start_module(&handle).await {
                Ok(()) => {
                    info!(module_id = %id, "[Container] ✓ Module ready");
                    newly_started.push(id);
                }
                Err(errors) => {
                    for (phase, e) in errors {
                        error!(module_id = %id, phase = %phase, error = %e, "[Container] ✗ Module failed to start");
                        failures.push(ModuleFailure::new(id.as_str(), phase, &e));
                    }
                }
            }
        }

        {
            let mut started = self.started.lock();
            for id in &newly_started {
                if !started.contains(id) {
                    started.push(id.clone());
                }
            }
        }

        if !failures.is_empty() {
            error!(failed = failures.len(), "[Container] ✗ Start incomplete");
            return Err(ContainerError::Batch(failures));
        }

        if !already_running {
            self.running.store(true, Ordering::SeqCst);
            self.publish(context, events::CONTAINER_STARTED, self.container_payload(module_count))?;
            info!(blueprint_id = %self.blueprint_id, "[Container] ✓ Started");
        }

        let started = self.started.lock().clone();
        let registry = self.registry.read();
        for id in &started {
            if let Some(handle) = registry.handle(id) {
                if handle.status() == ModuleStatus::Ready {
                    handle.set_status(ModuleStatus::Running);
                }
            }
        }

        Ok(())
    }

    async fn stop_locked(&self, context: &ExecutionContext) -> Result<(), ContainerError> {
        let order = std::mem::take(&mut *self.started.lock());
        if !self.is_running() && order.is_empty() {
            debug!(blueprint_id = %self.blueprint_id, "[Container] Nothing to stop");
            return Ok(());
        }

        info!(blueprint_id = %self.blueprint_id, modules = order.len(), "[Container] Stopping");
        self.publish(context, events::CONTAINER_STOPPING, self.container_payload(order.len()))?;

        let mut failures = Vec::new();
        for id in order.iter().rev() {
            let Some(handle) = self.registry.read().handle(id) else {
                continue;
            };
            if !handle.status().is_active() {
                continue;
            }

            info!(module_id = %id, "[Container] Stopping module");
            match stop_module(&handle).await {
                Ok(()) => info!(module_id = %id, "[Container] ✓ Module stopped"),
                Err(e) => {
                    error!(module_id = %id, error = %e, "[Container] ✗ Module failed to stop cleanly");
                    failures.push(ModuleFailure::new(id.as_str(), LifecyclePhase::Stop, &e));
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        self.publish(context, events::CONTAINER_STOPPED, self.container_payload(order.len()))?;

        if failures.is_empty() {
            info!(blueprint_id = %self.blueprint_id, "[Container] ✓ Stopped");
            Ok(())
        } else {
            Err(ContainerError::Batch(failures))
        }
    }

    fn check_dependencies(&self, handle: &ModuleHandle, cyclic: &HashSet<&str>) -> Result<(), ModuleError> {
        let registry = self.registry.read();
        let in_cycle = cyclic.contains(handle.id.as_str());

        for dependency in &handle.dependencies {
            if in_cycle && cyclic.contains(dependency.as_str()) {
                continue;
            }
            match registry.status(dependency) {
                Some(status) if status.is_ready() => {}
                Some(status) => {
                    return Err(ModuleError::DependencyNotReady {
                        dependency: dependency.clone(),
                        state: status.to_string(),
                    })
                }
                None => {
                    return Err(ModuleError::DependencyNotReady {
                        dependency: dependency.clone(),
                        state: "not loaded".to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    fn container_payload(&self, module_count: usize) -> Value {
        json!({ "blueprintId": &*self.blueprint_id, "moduleCount": module_count })
    }

    fn publish(&self, context: &ExecutionContext, event_type: &str, payload: Value) -> Result<(), ContainerError> {
        context
            .event_bus()
            .emit(event_type, payload, format!("container:{}", self.blueprint_id))?;
        Ok(())
    }
}

impl std::fmt::Debug for BlueprintContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlueprintContainer")
            .field("blueprint_id", &self.blueprint_id)
            .field("modules", &self.module_ids())
            .field("running", &self.is_running())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// `start` then `ready`, with status transitions.
///
/// A module whose `ready` fails has already started, so its `stop` hook
/// runs before it lands in ERROR. Every failure is returned, in order.
async fn start_module(handle: &ModuleHandle) -> Result<(), Vec<(LifecyclePhase, ModuleError)>> {
    handle.set_status(ModuleStatus::Starting);
    if let Err(e) = run_hook(handle, LifecyclePhase::Start, handle.instance.start()).await {
        handle.set_status(ModuleStatus::Error);
        return Err(vec![(LifecyclePhase::Start, e)]);
    }
    handle.set_status(ModuleStatus::Started);

    if let Err(e) = run_hook(handle, LifecyclePhase::Ready, handle.instance.ready()).await {
        let mut errors = vec![(LifecyclePhase::Ready, e)];
        handle.set_status(ModuleStatus::Stopping);
        if let Err(stop_err) = run_hook(handle, LifecyclePhase::Stop, handle.instance.stop()).await {
            warn!(module_id = %handle.id, error = %stop_err, "[Container] Stop after failed ready also failed");
            errors.push((LifecyclePhase::Stop, stop_err));
        }
        handle.set_status(ModuleStatus::Error);
        return Err(errors);
    }
    handle.set_status(ModuleStatus::Ready);
    Ok(())
}

async fn stop_module(handle: &ModuleHandle) -> Result<(), ModuleError> {
    handle.set_status(ModuleStatus::Stopping);
    match run_hook(handle, LifecyclePhase::Stop, handle.instance.stop()).await {
        Ok(()) => {
            handle.set_status(ModuleStatus::Stopped);
            Ok(())
        }
        Err(e) => {
            handle.set_status(ModuleStatus::Error);
            Err(e)
        }
    }
}

async fn dispose_module(handle: &ModuleHandle) -> Result<(), ModuleError> {
    match run_hook(handle, LifecyclePhase::Dispose, handle.instance.dispose()).await {
        Ok(()) => {
            handle.set_status(ModuleStatus::Disposed);
            Ok(())
        }
        Err(e) => {
            error!(module_id = %handle.id, error = %e, "[Container] ✗ Module dispose failed");
            handle.set_status(ModuleStatus::Error);
            Err(e)
        }
    }
}

/// Await a lifecycle hook inside a module span, turning a panic into
/// [`ModuleError::Panicked`].
async fn run_hook<F>(handle: &ModuleHandle, phase: LifecyclePhase, hook: F) -> Result<(), ModuleError>
where
    F: Future<Output = Result<(), ModuleError>>,
{
    let span = module_span!("module_lifecycle", module_id = %handle.id, phase = %phase);
    match AssertUnwindSafe(hook).catch_unwind().instrument(span).await {
        Ok(result) => result,
        Err(panic) => Err(ModuleError::Panicked(panic_message(&*panic))),
    }
}
