//! # Module Registry - Records and Dependency Ordering
//!
//! Container-owned map of loaded modules. Each container has its own registry;
//! there is no process-wide state, so several containers can coexist.
//!
//! ## Features
//!
//! - **Registration order**: preserved and used to break ties
//! - **Dependency ordering**: topological start order over loaded modules
//! - **Cycle detection**: reports the offending path
//! - **Status channel**: one `watch` channel per module, written only by the
//!   container

use crate::module::{DynModule, ModuleInfo, ModuleStatus};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

/// Entry for a loaded module.
pub(crate) struct ModuleRecord {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) version: String,
    pub(crate) dependencies: Vec<String>,
    pub(crate) status: Arc<watch::Sender<ModuleStatus>>,
    pub(crate) instance: DynModule,
}

impl ModuleRecord {
    pub(crate) fn new(instance: DynModule) -> Self {
        let (status, _) = watch::channel(ModuleStatus::Uninitialized);
        Self {
            id: instance.id().to_string(),
            name: instance.name().to_string(),
            version: instance.version().to_string(),
            dependencies: instance.dependencies(),
            status: Arc::new(status),
            instance,
        }
    }

    pub(crate) fn handle(&self) -> ModuleHandle {
        ModuleHandle {
            id: self.id.clone(),
            dependencies: self.dependencies.clone(),
            status: Arc::clone(&self.status),
            instance: Arc::clone(&self.instance),
        }
    }

    pub(crate) fn info(&self) -> ModuleInfo {
        ModuleInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
            dependencies: self.dependencies.clone(),
            status: *self.status.borrow(),
        }
    }
}

/// Lock-free handle on a record, used while a lifecycle hook is awaited.
#[derive(Clone)]
pub(crate) struct ModuleHandle {
    pub(crate) id: String,
    pub(crate) dependencies: Vec<String>,
    pub(crate) status: Arc<watch::Sender<ModuleStatus>>,
    pub(crate) instance: DynModule,
}

impl ModuleHandle {
    pub(crate) fn status(&self) -> ModuleStatus {
        *self.status.borrow()
    }

    /// Move to `next`, warning about transitions the state machine does not
    /// allow. The container is the only caller.
    pub(crate) fn set_status(&self, next: ModuleStatus) {
        let previous = self.status.send_replace(next);
        if previous != next && !previous.can_transition_to(next) {
            warn!(
                module_id = %self.id,
                from = %previous,
                to = %next,
                "Unexpected module status transition"
            );
        }
    }
}

/// Start order computed from declared dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartPlan {
    /// Modules in topological order.
    pub order: Vec<String>,
    /// Modules that could not be ordered because of a cycle, in registration order.
    pub cyclic: Vec<String>,
}

impl StartPlan {
    /// Every module, ordered ones first.
    #[must_use]
    pub fn all(&self) -> Vec<String> {
        self.order.iter().chain(self.cyclic.iter()).cloned().collect()
    }
}

/// Loaded modules of one container.
#[derive(Default)]
pub struct ModuleRegistry {
    records: HashMap<String, ModuleRecord>,
    order: Vec<String>,
}

impl ModuleRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record. Returns `false` (and changes nothing) if the id is taken.
    pub(crate) fn insert(&mut self, record: ModuleRecord) -> bool {
        if self.records.contains_key(&record.id) {
            return false;
        }
        self.order.push(record.id.clone());
        self.records.insert(record.id.clone(), record);
        true
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<ModuleRecord> {
        let record = self.records.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(record)
    }

    pub(crate) fn handle(&self, id: &str) -> Option<ModuleHandle> {
        self.records.get(id).map(ModuleRecord::handle)
    }

    pub(crate) fn status_sender(&self, id: &str) -> Option<Arc<watch::Sender<ModuleStatus>>> {
        self.records.get(id).map(|r| Arc::clone(&r.status))
    }

    /// Check whether a module is loaded.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Loaded module ids in registration order.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Number of loaded modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if no module is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Current status of a module.
    #[must_use]
    pub fn status(&self, id: &str) -> Option<ModuleStatus> {
        self.records.get(id).map(|r| *r.status.borrow())
    }

    /// Metadata of a module.
    #[must_use]
    pub fn info(&self, id: &str) -> Option<ModuleInfo> {
        self.records.get(id).map(ModuleRecord::info)
    }

    /// Metadata of every module in registration order.
    #[must_use]
    pub fn infos(&self) -> Vec<ModuleInfo> {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id))
            .map(ModuleRecord::info)
            .collect()
    }

    /// Loaded modules that declare `id` as a dependency.
    #[must_use]
    pub fn dependents_of(&self, id: &str) -> Vec<String> {
        self.order
            .iter()
            .filter(|other| {
                self.records
                    .get(other.as_str())
                    .is_some_and(|r| r.dependencies.iter().any(|d| d == id))
            })
            .cloned()
            .collect()
    }

    /// Declared dependencies that are not loaded.
    #[must_use]
    pub fn missing_dependencies(&self, id: &str) -> Vec<String> {
        self.records
            .get(id)
            .map(|r| {
                r.dependencies
                    .iter()
                    .filter(|d| !self.records.contains_key(d.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Topological start order.
    ///
    /// Each step picks the earliest-registered module whose loaded
    /// dependencies are all placed. Dependencies that are not loaded do not
    /// constrain the order; the container rejects them at start time.
    #[must_use]
    pub fn start_plan(&self) -> StartPlan {
        let mut placed: HashSet<&str> = HashSet::with_capacity(self.order.len());
        let mut order = Vec::with_capacity(self.order.len());

        loop {
            let next = self.order.iter().find(|id| {
                !placed.contains(id.as_str())
                    && self.records.get(id.as_str()).is_some_and(|r| {
                        r.dependencies.iter().all(|d| {
                            placed.contains(d.as_str()) || !self.records.contains_key(d.as_str())
                        })
                    })
            });

            let Some(id) = next else {
                break;
            };
            placed.insert(id.as_str());
            order.push(id.clone());
        }

        let cyclic = self
            .order
            .iter()
            .filter(|id| !placed.contains(id.as_str()))
            .cloned()
            .collect();

        StartPlan { order, cyclic }
    }

    /// Find a dependency cycle among loaded modules.
    ///
    /// Returns the path with the first node repeated at the end, e.g.
    /// `["a", "b", "a"]`.
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            id: &'a str,
            records: &'a HashMap<String, ModuleRecord>,
            marks: &mut HashMap<&'a str, Mark>,
            path: &mut Vec<&'a str>,
        ) -> Option<Vec<String>> {
            match marks.get(id) {
                Some(Mark::Done) => return None,
                Some(Mark::Visiting) => {
                    let start = path.iter().position(|p| *p == id).unwrap_or(0);
                    let mut cycle: Vec<String> = path[start..].iter().map(|p| p.to_string()).collect();
                    cycle.push(id.to_string());
                    return Some(cycle);
                }
                None => {}
            }

            let record = records.get(id)?;
            marks.insert(id, Mark::Visiting);
            path.push(id);

            for dep in &record.dependencies {
                if !records.contains_key(dep.as_str()) {
                    continue;
                }
                if let Some(cycle) = visit(dep.as_str(), records, marks, path) {
                    return Some(cycle);
                }
            }

            path.pop();
            marks.insert(id, Mark::Done);
            None
        }

        let mut marks = HashMap::new();
        for id in &self.order {
            let mut path = Vec::new();
            if let Some(cycle) = visit(id.as_str(), &self.records, &mut marks, &mut path) {
                return Some(cycle);
            }
        }
        None
    }
}
