//! # Blueprint Runtime
//!
//! Hosts independently developed domain modules. Modules never reference
//! each other; each receives an [`ExecutionContext`] at `init` and talks to
//! the others through the shared [`EventBus`](blueprint_bus::EventBus).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────── BlueprintContainer ───────────────────────────┐
//! │                                                                          │
//! │  ModuleRegistry ── start_plan() ──→ init / start / ready / stop / dispose │
//! │        │                                                                 │
//! │        └── RegistryView ──┐                                              │
//! │                           ▼                                              │
//! │   EventBus ──────→ ExecutionContext ──→ Module A, Module B, ...           │
//! │      ▲                                                                   │
//! │      └── CONTAINER_* / MODULE_* lifecycle events                         │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use blueprint_runtime::{BlueprintContainer, ContainerConfig};
//! use std::sync::Arc;
//!
//! let container = BlueprintContainer::new(ContainerConfig::from_env());
//! container.initialize()?;
//! container.load_module(Arc::new(TasksModule::default())).await?;
//! container.start().await?;
//! // ...
//! container.dispose().await?;
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod container;
pub mod context;
pub mod error;
pub mod events;
pub mod module;
pub mod registry;

pub use container::{BlueprintContainer, ContainerConfig, CyclePolicy};
pub use context::{ExecutionContext, RegistryView};
pub use error::{ContainerError, ModuleFailure};
pub use module::{DynModule, LifecyclePhase, Module, ModuleError, ModuleInfo, ModuleStatus};
pub use registry::{ModuleRegistry, StartPlan};

// Modules only need this crate to talk to the bus.
pub use blueprint_bus::{BusConfig, Event, EventBus, Unsubscribe};
