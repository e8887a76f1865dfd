//! Container error types.

use crate::module::{LifecyclePhase, ModuleError};
use blueprint_bus::BusError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// One module's failure within a batch operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleFailure {
    pub module_id: String,
    pub phase: LifecyclePhase,
    pub error: String,
}

impl ModuleFailure {
    pub(crate) fn new(module_id: impl Into<String>, phase: LifecyclePhase, error: &ModuleError) -> Self {
        Self {
            module_id: module_id.into(),
            phase,
            error: error.to_string(),
        }
    }
}

impl fmt::Display for ModuleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed during {}: {}", self.module_id, self.phase, self.error)
    }
}

/// Errors returned by [`BlueprintContainer`](crate::BlueprintContainer).
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("container is already initialized")]
    AlreadyInitialized,

    #[error("container is not initialized")]
    NotInitialized,

    #[error("container has been disposed")]
    Disposed,

    #[error("module `{0}` is already loaded")]
    DuplicateModule(String),

    #[error("module `{0}` is not loaded")]
    UnknownModule(String),

    /// Path of the cycle, first node repeated at the end.
    #[error("dependency cycle: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    /// A single module hook failed.
    #[error("module `{module_id}` failed during {phase}: {source}")]
    Lifecycle {
        module_id: String,
        phase: LifecyclePhase,
        #[source]
        source: ModuleError,
    },

    /// One or more modules failed in a batch; the rest were still processed.
    #[error("{} module(s) failed: {}", .0.len(), join_failures(.0))]
    Batch(Vec<ModuleFailure>),

    #[error(transparent)]
    Bus(#[from] BusError),
}

impl ContainerError {
    /// Per-module failures carried by this error.
    pub fn failures(&self) -> Vec<ModuleFailure> {
        match self {
            Self::Batch(failures) => failures.clone(),
            Self::Lifecycle {
                module_id,
                phase,
                source,
            } => vec![ModuleFailure::new(module_id.clone(), *phase, source)],
            _ => Vec::new(),
        }
    }
}

fn join_failures(failures: &[ModuleFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
