//! # Subscriptions
//!
//! Handler registrations owned by the bus, the handles returned to callers,
//! and a `Stream` adapter over a subscription.

use crate::event::Event;
use crate::WILDCARD;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

/// Future returned by a type-erased handler.
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Type-erased event handler.
pub(crate) type Handler = Arc<dyn Fn(Arc<Event>) -> HandlerFuture + Send + Sync>;

/// A single handler registration.
pub(crate) struct Subscription {
    pub(crate) id: u64,
    pub(crate) event_type: Arc<str>,
    pub(crate) handler: Handler,
    pub(crate) once: bool,
    active: Arc<AtomicBool>,
}

impl Subscription {
    /// Claim the right to invoke the handler for the current event.
    ///
    /// Removed subscriptions never claim. A `once` subscription claims at most
    /// one time over its whole life.
    pub(crate) fn claim(&self) -> bool {
        if self.once {
            self.active
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        } else {
            self.active.load(Ordering::Acquire)
        }
    }
}

/// All registrations of one bus, keyed by event type.
///
/// Wildcard registrations live in their own list so dispatch never has to
/// scan unrelated types.
#[derive(Default)]
pub(crate) struct SubscriptionTable {
    by_type: HashMap<Arc<str>, Vec<Arc<Subscription>>>,
    wildcard: Vec<Arc<Subscription>>,
    next_id: u64,
}

impl SubscriptionTable {
    pub(crate) fn insert(
        &mut self,
        event_type: &str,
        handler: Handler,
        once: bool,
    ) -> (u64, Arc<str>, Arc<AtomicBool>) {
        self.next_id += 1;
        let id = self.next_id;
        let event_type: Arc<str> = Arc::from(event_type);
        let active = Arc::new(AtomicBool::new(true));

        let subscription = Arc::new(Subscription {
            id,
            event_type: Arc::clone(&event_type),
            handler,
            once,
            active: Arc::clone(&active),
        });

        if &*event_type == WILDCARD {
            self.wildcard.push(subscription);
        } else {
            self.by_type
                .entry(Arc::clone(&event_type))
                .or_default()
                .push(subscription);
        }

        (id, event_type, active)
    }

    pub(crate) fn remove(&mut self, event_type: &str, id: u64) -> bool {
        if event_type == WILDCARD {
            let before = self.wildcard.len();
            self.wildcard.retain(|s| s.id != id);
            return self.wildcard.len() != before;
        }

        let Some(list) = self.by_type.get_mut(event_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|s| s.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.by_type.remove(event_type);
        }
        removed
    }

    /// Snapshot of the handlers an event of `event_type` is dispatched to:
    /// type-specific registrations first, then wildcard ones.
    pub(crate) fn matching(&self, event_type: &str) -> Vec<Arc<Subscription>> {
        let specific = self.by_type.get(event_type).map_or(&[][..], Vec::as_slice);
        specific
            .iter()
            .chain(self.wildcard.iter())
            .cloned()
            .collect()
    }

    pub(crate) fn count(&self, event_type: &str) -> usize {
        if event_type == WILDCARD {
            return self.wildcard.len();
        }
        self.by_type.get(event_type).map_or(0, Vec::len)
    }

    pub(crate) fn len(&self) -> usize {
        self.wildcard.len() + self.by_type.values().map(Vec::len).sum::<usize>()
    }

    pub(crate) fn clear(&mut self) {
        for subscription in self.wildcard.drain(..) {
            subscription.active.store(false, Ordering::Release);
        }
        for (_, list) in self.by_type.drain() {
            for subscription in list {
                subscription.active.store(false, Ordering::Release);
            }
        }
    }
}

/// Handle returned by [`EventBus::on`](crate::EventBus::on) and
/// [`EventBus::once`](crate::EventBus::once).
///
/// Calling [`unsubscribe`](Self::unsubscribe) removes exactly the registration
/// that produced this handle. Further calls are no-ops. Dropping the handle
/// does **not** unsubscribe.
#[derive(Clone)]
pub struct Unsubscribe {
    id: u64,
    event_type: Arc<str>,
    active: Arc<AtomicBool>,
    table: Weak<RwLock<SubscriptionTable>>,
}

impl Unsubscribe {
    pub(crate) fn new(
        id: u64,
        event_type: Arc<str>,
        active: Arc<AtomicBool>,
        table: Weak<RwLock<SubscriptionTable>>,
    ) -> Self {
        Self {
            id,
            event_type,
            active,
            table,
        }
    }

    /// Remove the registration.
    ///
    /// Returns `true` only for the call that actually deactivated it.
    pub fn unsubscribe(&self) -> bool {
        let was_active = self.active.swap(false, Ordering::AcqRel);
        if let Some(table) = self.table.upgrade() {
            table.write().remove(&self.event_type, self.id);
        }
        if was_active {
            debug!(event_type = %self.event_type, subscription = self.id, "Unsubscribed");
        }
        was_active
    }

    /// True while the handler may still be invoked.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Event type this registration listens to.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("id", &self.id)
            .field("event_type", &self.event_type)
            .field("active", &self.is_active())
            .finish()
    }
}

/// A stream of events of one type (or `*`).
///
/// Created by [`EventBus::stream`](crate::EventBus::stream). Dropping the
/// stream removes the underlying subscription.
pub struct EventStream {
    inner: UnboundedReceiverStream<Arc<Event>>,
    subscription: Unsubscribe,
}

impl EventStream {
    pub(crate) fn new(inner: UnboundedReceiverStream<Arc<Event>>, subscription: Unsubscribe) -> Self {
        Self {
            inner,
            subscription,
        }
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the subscription is gone and buffered events are
    /// exhausted.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.inner.next().await
    }

    /// Event type this stream listens to.
    #[must_use]
    pub fn event_type(&self) -> &str {
        self.subscription.event_type()
    }
}

impl Stream for EventStream {
    type Item = Arc<Event>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}
