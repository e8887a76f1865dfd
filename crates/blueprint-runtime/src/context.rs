//! Execution context handed to every module at `init`.

use crate::module::{ModuleInfo, ModuleStatus};
use crate::registry::ModuleRegistry;
use blueprint_bus::EventBus;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;

/// Read-only view of the container's module registry.
#[derive(Clone)]
pub struct RegistryView {
    inner: Arc<RwLock<ModuleRegistry>>,
}

impl RegistryView {
    pub(crate) fn new(inner: Arc<RwLock<ModuleRegistry>>) -> Self {
        Self { inner }
    }

    /// Check whether a module is loaded.
    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().contains(id)
    }

    /// Loaded module ids in registration order.
    pub fn module_ids(&self) -> Vec<String> {
        self.inner.read().ids()
    }

    /// Current status of a module.
    pub fn status(&self, id: &str) -> Option<ModuleStatus> {
        self.inner.read().status(id)
    }

    /// Subscribe to status changes of a module.
    ///
    /// The receiver outlives the module; once it is unloaded no further
    /// changes arrive.
    pub fn watch_status(&self, id: &str) -> Option<watch::Receiver<ModuleStatus>> {
        self.inner.read().status_sender(id).map(|s| s.subscribe())
    }

    /// Metadata of a module.
    pub fn info(&self, id: &str) -> Option<ModuleInfo> {
        self.inner.read().info(id)
    }

    /// Metadata of every loaded module.
    pub fn modules(&self) -> Vec<ModuleInfo> {
        self.inner.read().infos()
    }

    /// Number of loaded modules.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// True if no module is loaded.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl std::fmt::Debug for RegistryView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryView")
            .field("modules", &self.module_ids())
            .finish()
    }
}

/// Capabilities given to a module: the container id, the shared bus and
/// read access to the registry.
///
/// Cheap to clone; every module of a container receives a clone of the same
/// context.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    blueprint_id: Arc<str>,
    event_bus: Arc<EventBus>,
    registry: RegistryView,
}

impl ExecutionContext {
    pub(crate) fn new(blueprint_id: Arc<str>, event_bus: Arc<EventBus>, registry: RegistryView) -> Self {
        Self {
            blueprint_id,
            event_bus,
            registry,
        }
    }

    /// Identifier of the owning container.
    pub fn blueprint_id(&self) -> &str {
        &self.blueprint_id
    }

    /// The container's event bus.
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Loaded modules.
    pub fn registry(&self) -> &RegistryView {
        &self.registry
    }
}
