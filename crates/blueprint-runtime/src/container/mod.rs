//! # Blueprint Container
//!
//! Owns the event bus and the module registry, and drives loaded modules
//! through their lifecycle.
//!
//! ## Lifecycle
//!
//! ```text
//! initialize() ─→ load_module()* ─→ start() ─→ stop() ─→ dispose()
//!                     │                ↑          │
//!                     │                └──────────┘
//!                     └─ unload_module() at any time
//! ```
//!
//! - Modules start in dependency order and stop in reverse start order
//! - Every container transition is announced on the shared bus
//! - A failing module is marked `ERROR`; the rest of the batch still runs and
//!   the failures are returned together

pub mod blueprint;
pub mod config;

pub use blueprint::BlueprintContainer;
pub use config::{ContainerConfig, CyclePolicy};
