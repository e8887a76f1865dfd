//! # Blueprint Bus - In-Process Event Bus
//!
//! The only channel through which domain modules talk to each other. Modules
//! never hold references to one another; they publish and subscribe by event
//! type string.
//!
//! ## Dispatch Model
//!
//! ```text
//! ┌──────────────┐                      ┌──────────────┐
//! │  Module A    │                      │  Module B    │
//! │              │   emit() (sync)      │              │
//! │              │ ──────┐              │              │
//! └──────────────┘       │              └──────────────┘
//!                        ▼                      ↑
//!                 ┌──────────────┐              │
//!                 │  EventBus    │  history +   │
//!                 │  (recorder)  │  counter     │
//!                 └──────┬───────┘              │
//!                        │ mpsc (FIFO)          │
//!                        ▼                      │
//!                 ┌──────────────┐   on()/once()│
//!                 │  dispatcher  │ ─────────────┘
//!                 │    task      │
//!                 └──────────────┘
//! ```
//!
//! - `emit()` records the event (id, timestamp, history, counter) and returns.
//! - A single dispatcher task invokes handlers, one event at a time, in
//!   emission order. Handlers never run on the emitter's stack.
//! - Type-specific handlers run before wildcard (`*`) handlers, each group in
//!   registration order.
//! - A failing or panicking handler is logged and skipped; the remaining
//!   handlers still receive the event.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod bus;
pub mod error;
pub mod event;
pub mod history;
pub mod subscription;

// Re-export main types
pub use bus::{panic_message, BusConfig, BusStats, EventBus};
pub use error::BusError;
pub use event::{Event, EventId};
pub use history::EventHistory;
pub use subscription::{EventStream, HandlerFuture, Unsubscribe};

/// Reserved event type matching every emitted event.
pub const WILDCARD: &str = "*";

/// Number of events retained in the history buffer by default.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;
