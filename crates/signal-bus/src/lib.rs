//! Typed subscription registry.
//!
//! Handlers are keyed by a kind enum rather than by name, and every kind holds an
//! ordered list of handlers. Removal goes through the [`Subscription`] returned by
//! [`SignalBus::on`], so two subscribers of the same kind can leave independently.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

type HandlerFn<P> = dyn Fn(&P) + Send + Sync;

/// A registered handler. Cloning keeps the same identity.
pub struct Subscription<P> {
    handler: Arc<HandlerFn<P>>,
}

impl<P> Subscription<P> {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
        }
    }

    pub fn same_as(&self, other: &Subscription<P>) -> bool {
        Arc::ptr_eq(&self.handler, &other.handler)
    }

    fn call(&self, payload: &P) {
        (self.handler)(payload)
    }
}

impl<P> Clone for Subscription<P> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
        }
    }
}

impl<P> fmt::Debug for Subscription<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("handler", &Arc::as_ptr(&self.handler))
            .finish()
    }
}

pub struct SignalBus<K, P> {
    handlers: RwLock<HashMap<K, Vec<Subscription<P>>>>,
}

impl<K, P> Default for SignalBus<K, P> {
    fn default() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, P> SignalBus<K, P>
where
    K: Copy + Eq + Hash + fmt::Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `handler` to the list for `kind` and returns its subscription.
    pub fn on<F>(&self, kind: K, handler: F) -> Subscription<P>
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        let subscription = Subscription::new(handler);
        self.subscribe(kind, subscription.clone());
        subscription
    }

    /// Registers an existing subscription. The same subscription may be attached
    /// to several kinds.
    pub fn subscribe(&self, kind: K, subscription: Subscription<P>) {
        self.handlers
            .write()
            .entry(kind)
            .or_default()
            .push(subscription);
    }

    /// Removes the registration of `subscription` under `kind`, matched by identity.
    pub fn off(&self, kind: K, subscription: &Subscription<P>) -> bool {
        let mut guard = self.handlers.write();
        let Some(list) = guard.get_mut(&kind) else {
            return false;
        };
        match list.iter().position(|entry| entry.same_as(subscription)) {
            Some(index) => {
                list.remove(index);
                if list.is_empty() {
                    guard.remove(&kind);
                }
                true
            }
            None => false,
        }
    }

    /// Calls every handler registered for `kind`, in registration order.
    ///
    /// The handler list is copied before dispatch, so handlers may call `on`/`off`.
    pub fn emit(&self, kind: K, payload: &P) -> usize {
        let snapshot: Vec<Subscription<P>> = match self.handlers.read().get(&kind) {
            Some(list) => list.clone(),
            None => Vec::new(),
        };
        trace!(target: "signal_bus", ?kind, handlers = snapshot.len(), "emit");
        for subscription in &snapshot {
            subscription.call(payload);
        }
        snapshot.len()
    }

    pub fn handler_count(&self, kind: K) -> usize {
        self.handlers.read().get(&kind).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().values().all(Vec::is_empty)
    }

    /// Drops every registration.
    pub fn clear(&self) {
        self.handlers.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Kind {
        Ping,
        Pong,
    }

    #[test]
    fn emits_in_registration_order() {
        let bus: SignalBus<Kind, u32> = SignalBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let seen = seen.clone();
            bus.on(Kind::Ping, move |value: &u32| {
                seen.lock().unwrap().push(format!("{tag}:{value}"));
            });
        }

        assert_eq!(bus.emit(Kind::Ping, &7), 2);
        assert_eq!(bus.emit(Kind::Pong, &8), 0);
        assert_eq!(seen.lock().unwrap().as_slice(), ["first:7", "second:7"]);
    }

    #[test]
    fn off_removes_only_the_matching_handler() {
        let bus: SignalBus<Kind, ()> = SignalBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let a = {
            let hits = hits.clone();
            bus.on(Kind::Ping, move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        let _b = {
            let hits = hits.clone();
            bus.on(Kind::Ping, move |_| {
                hits.fetch_add(10, Ordering::SeqCst);
            })
        };

        assert!(!bus.off(Kind::Pong, &a));
        assert!(bus.off(Kind::Ping, &a));
        assert!(!bus.off(Kind::Ping, &a));
        bus.emit(Kind::Ping, &());

        assert_eq!(hits.load(Ordering::SeqCst), 10);
        assert_eq!(bus.handler_count(Kind::Ping), 1);
    }

    #[test]
    fn handlers_can_unsubscribe_during_emit() {
        let bus: Arc<SignalBus<Kind, ()>> = Arc::new(SignalBus::new());
        let slot: Arc<Mutex<Option<Subscription<()>>>> = Arc::new(Mutex::new(None));
        let subscription = {
            let inner = bus.clone();
            let slot = slot.clone();
            bus.on(Kind::Ping, move |_| {
                if let Some(me) = slot.lock().unwrap().take() {
                    inner.off(Kind::Ping, &me);
                }
            })
        };
        *slot.lock().unwrap() = Some(subscription);

        assert_eq!(bus.emit(Kind::Ping, &()), 1);
        assert_eq!(bus.emit(Kind::Ping, &()), 0);
    }

    #[test]
    fn clear_drops_everything() {
        let bus: SignalBus<Kind, ()> = SignalBus::new();
        bus.on(Kind::Ping, |_| {});
        bus.on(Kind::Pong, |_| {});
        assert!(!bus.is_empty());
        bus.clear();
        assert!(bus.is_empty());
        assert_eq!(bus.emit(Kind::Pong, &()), 0);
    }
}
