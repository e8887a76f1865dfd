//! # Event History
//!
//! Fixed-capacity FIFO of the most recent events.
//!
//! - At most `capacity` entries are retained
//! - Each insertion into a full buffer evicts exactly one (the oldest) entry
//! - Relative emission order of retained entries is preserved

use crate::event::Event;
use std::collections::VecDeque;
use std::sync::Arc;

/// Bounded ring buffer of emitted events.
#[derive(Debug)]
pub struct EventHistory {
    entries: VecDeque<Arc<Event>>,
    capacity: usize,
}

impl EventHistory {
    /// Create an empty history retaining at most `capacity` events.
    ///
    /// A capacity of zero disables retention.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an event, returning the evicted entry if the buffer was full.
    pub fn push(&mut self, event: Arc<Event>) -> Option<Arc<Event>> {
        if self.capacity == 0 {
            return Some(event);
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(event);
        evicted
    }

    /// Copy the retained events, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Event> {
        self.entries.iter().map(|e| Event::clone(e)).collect()
    }

    /// Number of retained events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of retained events.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every retained event.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
