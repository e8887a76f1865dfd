//! # Module Contract
//!
//! Defines the contract that every domain module implements to be hosted by a
//! [`BlueprintContainer`](crate::BlueprintContainer).
//!
//! ## Design Philosophy
//!
//! - **No compile-time coupling**: modules never reference each other
//! - **Event-only communication**: all collaboration goes through the bus
//!   obtained from the [`ExecutionContext`] handed to `init`
//! - **Container-driven status**: the container performs every status
//!   transition; modules observe them through the context's registry view
//!
//! ## Example Implementation
//!
//! ```rust,ignore
//! use blueprint_runtime::{ExecutionContext, Module, ModuleError};
//! use async_trait::async_trait;
//!
//! pub struct TasksModule { /* ... */ }
//!
//! #[async_trait]
//! impl Module for TasksModule {
//!     fn id(&self) -> &str { "tasks" }
//!     async fn init(&self, ctx: ExecutionContext) -> Result<(), ModuleError> { Ok(()) }
//!     async fn dispose(&self) -> Result<(), ModuleError> { Ok(()) }
//! }
//! ```

use crate::context::ExecutionContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Lifecycle status of a loaded module.
///
/// ```text
/// UNINITIALIZED → INITIALIZING → INITIALIZED → STARTING → STARTED → READY → RUNNING
///                                     ↑                                        │
///                                  STOPPED ← STOPPING ←────────────────────────┘
/// any → ERROR, any → DISPOSED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleStatus {
    Uninitialized,
    Initializing,
    Initialized,
    Starting,
    Started,
    Ready,
    Running,
    Stopping,
    Stopped,
    Disposed,
    /// A lifecycle hook failed. Disposal is still attempted later.
    Error,
}

impl ModuleStatus {
    /// Wire name, e.g. `"READY"`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "UNINITIALIZED",
            Self::Initializing => "INITIALIZING",
            Self::Initialized => "INITIALIZED",
            Self::Starting => "STARTING",
            Self::Started => "STARTED",
            Self::Ready => "READY",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
            Self::Disposed => "DISPOSED",
            Self::Error => "ERROR",
        }
    }

    /// Started and not yet stopped.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Started | Self::Ready | Self::Running)
    }

    /// Dependents may start.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready | Self::Running)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: ModuleStatus) -> bool {
        use ModuleStatus::*;

        match (self, next) {
            (Disposed, _) => false,
            (_, Error) | (_, Disposed) => true,
            (Uninitialized, Initializing)
            | (Initializing, Initialized)
            | (Initialized, Starting)
            | (Stopped, Starting)
            | (Starting, Started)
            | (Started, Ready)
            | (Ready, Running)
            | (Started, Stopping)
            | (Ready, Stopping)
            | (Running, Stopping)
            | (Stopping, Stopped) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle hook being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecyclePhase {
    Init,
    Start,
    Ready,
    Stop,
    Dispose,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Start => write!(f, "start"),
            Self::Ready => write!(f, "ready"),
            Self::Stop => write!(f, "stop"),
            Self::Dispose => write!(f, "dispose"),
        }
    }
}

/// Error returned by a module lifecycle hook.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// The module reported a failure.
    #[error("{0}")]
    Failed(String),

    /// A declared dependency is missing or has not reached `READY`.
    #[error("dependency `{dependency}` is not ready ({state})")]
    DependencyNotReady { dependency: String, state: String },

    /// The hook panicked.
    #[error("lifecycle hook panicked: {0}")]
    Panicked(String),

    /// Any other error raised by module code.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ModuleError {
    /// Shorthand for [`ModuleError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Registry metadata about a loaded module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub dependencies: Vec<String>,
    pub status: ModuleStatus,
}

/// The contract every domain module implements.
///
/// All hooks take `&self`; modules keep their own state (including the
/// [`Unsubscribe`](blueprint_bus::Unsubscribe) handles of their bus
/// registrations) behind interior mutability.
#[async_trait]
pub trait Module: Send + Sync {
    /// Unique identifier within a container.
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str {
        self.id()
    }

    /// Module version string.
    fn version(&self) -> &str {
        "0.1.0"
    }

    /// Ids of modules that must be `READY` before this one starts.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Receive the execution context and subscribe to the bus.
    async fn init(&self, context: ExecutionContext) -> Result<(), ModuleError>;

    /// Begin work.
    async fn start(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Signal that dependents may start.
    async fn ready(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Stop work; the module may be started again afterwards.
    async fn stop(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Release everything, including every bus registration made in `init`.
    ///
    /// The container does not unsubscribe on the module's behalf.
    async fn dispose(&self) -> Result<(), ModuleError>;
}

/// A type-erased module handle for the registry.
pub type DynModule = Arc<dyn Module>;
