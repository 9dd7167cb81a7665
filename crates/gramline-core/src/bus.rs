//! Subscription broker for emitted events.
//!
//! Every subscription hands back a [`Subscription`] capability token. The
//! token is the only way to remove the listener: [`Subscription::unsubscribe`]
//! is idempotent, and dropping the token unsubscribes as well, so short-lived
//! subscribers (collectors) cannot leak listeners.
//!
//! ```rust,ignore
//! let bus = EventBus::new();
//! let token = bus.on("message", |event| println!("{event:?}"));
//! bus.emit("message", &event);
//! token.unsubscribe();
//! ```
//!
//! # Dispatch
//!
//! [`EventBus::emit`] is synchronous: listeners run in registration order
//! before `emit` returns. The listener list is snapshotted first, so a
//! listener may subscribe or unsubscribe (itself included) while running.
//!
//! Async listeners registered with [`EventBus::on_async`] are spawned onto
//! the tokio runtime and left running: the emitter does not wait for them,
//! and their progress is not ordered relative to later events.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::trace;

use crate::event::BotEvent;

/// A synchronous event listener.
pub type Listener = Arc<dyn Fn(&BotEvent) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    listeners: RwLock<HashMap<String, Vec<(u64, Listener)>>>,
    next_id: AtomicU64,
}

impl BusInner {
    fn remove(&self, name: &str, id: u64) -> bool {
        let mut listeners = self.listeners.write();
        let Some(list) = listeners.get_mut(name) else {
            return false;
        };
        let before = list.len();
        list.retain(|(listener_id, _)| *listener_id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            listeners.remove(name);
        }
        removed
    }
}

/// A cloneable handle to a shared listener registry.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a synchronous listener for `name`.
    pub fn on<F>(&self, name: impl Into<String>, listener: F) -> Subscription
    where
        F: Fn(&BotEvent) + Send + Sync + 'static,
    {
        let name = name.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .write()
            .entry(name.clone())
            .or_default()
            .push((id, Arc::new(listener)));
        trace!(event = %name, id, "Listener subscribed");

        Subscription {
            id,
            name,
            bus: Arc::downgrade(&self.inner),
            released: AtomicBool::new(false),
        }
    }

    /// Registers an async listener for `name`.
    ///
    /// Each emission spawns the returned future on the current tokio runtime
    /// and does not wait for it.
    pub fn on_async<F, Fut>(&self, name: impl Into<String>, listener: F) -> Subscription
    where
        F: Fn(BotEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on(name, move |event| {
            tokio::spawn(listener(event.clone()));
        })
    }

    /// Invokes every listener for `name`, in registration order.
    ///
    /// Returns the number of listeners invoked.
    pub fn emit(&self, name: &str, event: &BotEvent) -> usize {
        let snapshot: Vec<Listener> = match self.inner.listeners.read().get(name) {
            Some(list) => list.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return 0,
        };
        trace!(event = %name, listeners = snapshot.len(), "Emitting");
        for listener in &snapshot {
            listener(event);
        }
        snapshot.len()
    }

    /// Returns the number of listeners registered for `name`.
    pub fn listener_count(&self, name: &str) -> usize {
        self.inner.listeners.read().get(name).map_or(0, Vec::len)
    }

    /// Returns the number of listeners across all events.
    pub fn total_listeners(&self) -> usize {
        self.inner.listeners.read().values().map(Vec::len).sum()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("total_listeners", &self.total_listeners())
            .finish()
    }
}

/// Capability token for one registered listener.
///
/// Dropping the token unsubscribes the listener. Call [`detach`](Self::detach)
/// to keep it registered for the lifetime of the bus.
#[must_use = "dropping a Subscription unsubscribes its listener"]
pub struct Subscription {
    id: u64,
    name: String,
    bus: Weak<BusInner>,
    released: AtomicBool,
}

impl Subscription {
    /// The event this subscription listens to.
    pub fn event_name(&self) -> &str {
        &self.name
    }

    /// Returns `true` until the listener has been released.
    pub fn is_active(&self) -> bool {
        !self.released.load(Ordering::SeqCst)
    }

    /// Removes the listener.
    ///
    /// Returns `true` only for the call that actually removed it; later calls
    /// are no-ops.
    pub fn unsubscribe(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        let removed = self
            .bus
            .upgrade()
            .is_some_and(|bus| bus.remove(&self.name, self.id));
        trace!(event = %self.name, id = self.id, removed, "Listener unsubscribed");
        removed
    }

    /// Keeps the listener registered without holding the token.
    pub fn detach(self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.name)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
