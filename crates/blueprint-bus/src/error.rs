//! # Bus Errors
//!
//! Misuse errors reported synchronously by the bus. Handler failures are never
//! surfaced here; they are logged and counted by the dispatcher.

use thiserror::Error;

/// Errors returned by [`EventBus`](crate::EventBus) operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// `*` is reserved for wildcard subscriptions and cannot be emitted.
    #[error("event type `*` is reserved for wildcard subscriptions")]
    ReservedEventType,

    /// Emitted event type was empty.
    #[error("event type must not be empty")]
    EmptyEventType,

    /// The bus has been shut down and no longer dispatches events.
    #[error("event bus is shut down")]
    Closed,

    /// The bus was created outside of a Tokio runtime.
    #[error("event bus requires a running Tokio runtime")]
    NoRuntime,
}
