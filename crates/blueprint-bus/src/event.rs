//! # Events
//!
//! Immutable records of something that happened, as delivered to handlers and
//! retained in history.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;

/// Monotonically assigned event identifier, starting at 1 for each bus.
pub type EventId = u64;

/// A single emitted event.
///
/// Handlers receive events as `Arc<Event>`; history snapshots hand out owned
/// copies. Either way the bus never mutates an event after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Bus-local sequence number.
    pub id: EventId,
    /// Application-defined event type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Arbitrary payload. The bus performs no schema validation.
    pub payload: Value,
    /// Free-form identifier of the emitter.
    pub source: String,
    /// Milliseconds since the bus was created. Non-decreasing in emission order.
    pub timestamp: u64,
}

impl Event {
    /// Check whether this event has the given type.
    #[must_use]
    pub fn is(&self, event_type: &str) -> bool {
        self.event_type == event_type
    }

    /// Deserialize the payload into a concrete type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

/// Millisecond clock anchored at bus creation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub(crate) fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub(crate) fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
