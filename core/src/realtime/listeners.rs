//! Listener registry for inbound realtime events

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::realtime::event::InboundEvent;

pub type Listener = Arc<dyn Fn(&InboundEvent) + Send + Sync>;

#[derive(Default)]
struct Inner {
    listeners: RwLock<Arc<Vec<(u64, Listener)>>>,
    next_id: AtomicU64,
}

/// Copy-on-write set of listeners
///
/// Dispatch walks a snapshot, so a listener may subscribe or unsubscribe
/// from inside its own callback. Ids are never reused.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<Inner>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Listener) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut slot = self.inner.listeners.write();
        let mut next = Vec::with_capacity(slot.len() + 1);
        next.extend(slot.iter().cloned());
        next.push((id, listener));
        *slot = Arc::new(next);

        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Call every listener with `event`, in subscription order
    pub fn dispatch(&self, event: &InboundEvent) {
        let snapshot = self.inner.listeners.read().clone();
        for (_, listener) in snapshot.iter() {
            listener(event);
        }
    }

    pub fn clear(&self) {
        *self.inner.listeners.write() = Arc::new(Vec::new());
    }

    pub fn len(&self) -> usize {
        self.inner.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Inner {
    fn remove(&self, id: u64) {
        let mut slot = self.listeners.write();
        if slot.iter().any(|(existing, _)| *existing == id) {
            let next: Vec<_> = slot
                .iter()
                .filter(|(existing, _)| *existing != id)
                .cloned()
                .collect();
            *slot = Arc::new(next);
        }
    }
}

/// Handle keeping a listener registered; dropping it unsubscribes
#[must_use = "dropping the subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    registry: Weak<Inner>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            inner.remove(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> Listener {
        let log = log.clone();
        Arc::new(move |event: &InboundEvent| {
            log.lock().push(format!("{}:{}", name, event.kind()));
        })
    }

    #[test]
    fn test_fan_out_in_order() {
        let registry = ListenerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = registry.subscribe(recorder(&log, "a"));
        let _b = registry.subscribe(recorder(&log, "b"));

        registry.dispatch(&InboundEvent::Pong);
        assert_eq!(*log.lock(), vec!["a:pong", "b:pong"]);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let registry = ListenerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = registry.subscribe(recorder(&log, "a"));
        let _b = registry.subscribe(recorder(&log, "b"));

        drop(a);
        registry.dispatch(&InboundEvent::Pong);
        assert_eq!(*log.lock(), vec!["b:pong"]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_stale_handle_after_clear() {
        let registry = ListenerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let stale = registry.subscribe(recorder(&log, "old"));

        registry.clear();
        let _fresh = registry.subscribe(recorder(&log, "new"));
        stale.unsubscribe();

        registry.dispatch(&InboundEvent::Pong);
        assert_eq!(*log.lock(), vec!["new:pong"]);
    }

    #[test]
    fn test_subscribe_during_dispatch() {
        let registry = ListenerRegistry::new();
        let added = Arc::new(Mutex::new(Vec::new()));

        let inner_registry = registry.clone();
        let inner_added = added.clone();
        let _outer = registry.subscribe(Arc::new(move |_: &InboundEvent| {
            let handle = inner_registry.subscribe(Arc::new(|_: &InboundEvent| {}));
            inner_added.lock().push(handle);
        }));

        registry.dispatch(&InboundEvent::Pong);
        assert_eq!(registry.len(), 2);
    }
}
