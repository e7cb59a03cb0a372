//! Named event subscriptions.
//!
//! [`EventBus`] maps event names to sets of [`Subscriber`]s. Inbound `event`
//! commands are dispatched here; outbound publishing lives on the client
//! because it depends on the connection state.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

/// Callback registered for a named event.
///
/// Identity is the allocation: clones of one `Subscriber` are the same
/// subscriber, two `Subscriber::new` calls with equal closures are not.
#[derive(Clone)]
pub struct Subscriber(Arc<dyn Fn(&Value) + Send + Sync>);

impl Subscriber {
    /// Wraps a callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    /// Invokes the callback with the event payload.
    pub fn call(&self, data: &Value) {
        (self.0)(data);
    }

    /// Returns `true` if both handles wrap the same callback.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Subscriber")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// Event name → subscriber set.
#[derive(Debug, Default)]
pub struct EventBus {
    subscriptions: Mutex<HashMap<String, Vec<Subscriber>>>,
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `subscriber` to `event`. Adding the same subscriber twice has
    /// no effect.
    pub fn subscribe(&self, event: &str, subscriber: &Subscriber) {
        let mut subs = self.subscriptions.lock();
        let set = subs.entry(event.to_string()).or_default();
        if !set.iter().any(|s| s.same(subscriber)) {
            set.push(subscriber.clone());
        }
    }

    /// Removes `subscriber` from `event`, if present.
    pub fn unsubscribe(&self, event: &str, subscriber: &Subscriber) {
        let mut subs = self.subscriptions.lock();
        if let Some(set) = subs.get_mut(event) {
            set.retain(|s| !s.same(subscriber));
        }
    }

    /// Returns the number of subscribers of `event`.
    #[must_use]
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.subscriptions.lock().get(event).map_or(0, Vec::len)
    }

    /// Returns `true` if `subscriber` is registered for `event`.
    #[must_use]
    pub fn is_subscribed(&self, event: &str, subscriber: &Subscriber) -> bool {
        self.subscriptions
            .lock()
            .get(event)
            .is_some_and(|set| set.iter().any(|s| s.same(subscriber)))
    }

    /// Invokes every subscriber of `event` with `data`.
    ///
    /// Subscribers run after the bus lock is released, so they may
    /// subscribe or unsubscribe. Returns the number of subscribers called.
    pub fn dispatch(&self, event: &str, data: &Value) -> usize {
        let targets: Vec<Subscriber> = self
            .subscriptions
            .lock()
            .get(event)
            .cloned()
            .unwrap_or_default();
        for subscriber in &targets {
            subscriber.call(data);
        }
        targets.len()
    }
}
