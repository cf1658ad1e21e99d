//! Observer registry
//!
//! Callbacks are stored in a concurrent map keyed by subscription id.
//! Notification snapshots the map first and calls out with no shard lock
//! held, so a callback may unsubscribe itself (or anyone else) while it runs.
//! A panicking callback is logged and skipped; the rest still run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use log::{debug, error};

use crate::domain::ConnectionStatus;

/// Callback invoked with the new status on every transition
pub type StatusCallback = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;

#[derive(Default)]
pub struct ObserverRegistry {
    observers: DashMap<u64, StatusCallback>,
    next_id: AtomicU64,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a callback and hand back the handle that removes it.
    pub fn register(self: &Arc<Self>, callback: StatusCallback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers.insert(id, callback);
        debug!("Observer {} subscribed, total: {}", id, self.observers.len());

        Subscription {
            id,
            registry: Arc::downgrade(self),
            active: AtomicBool::new(true),
        }
    }

    pub fn remove(&self, id: u64) -> bool {
        let removed = self.observers.remove(&id).is_some();
        if removed {
            debug!("Observer {} unsubscribed, remaining: {}", id, self.observers.len());
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Deliver `status` to every observer still registered at call time.
    pub fn notify(&self, status: ConnectionStatus) {
        let snapshot: Vec<(u64, StatusCallback)> = self
            .observers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        for (id, callback) in snapshot {
            // An earlier callback in this round may have removed this one
            if !self.observers.contains_key(&id) {
                continue;
            }
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(status))) {
                error!(
                    "Observer {} panicked on {}: {}",
                    id,
                    status,
                    panic_message(panic.as_ref())
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// Handle returned by `subscribe`.
///
/// `unsubscribe` is idempotent and safe from anywhere, including from the
/// subscribed callback itself. Dropping the handle unsubscribes as well.
#[must_use = "dropping a Subscription unsubscribes the callback"]
pub struct Subscription {
    id: u64,
    registry: Weak<ObserverRegistry>,
    active: AtomicBool,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
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
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn recorder() -> (Arc<Mutex<Vec<ConnectionStatus>>>, StatusCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: StatusCallback = Arc::new(move |s| sink.lock().unwrap().push(s));
        (seen, callback)
    }

    #[test]
    fn test_notify_reaches_all_observers() {
        let registry = ObserverRegistry::shared();
        let (a, cb_a) = recorder();
        let (b, cb_b) = recorder();
        let _sub_a = registry.register(cb_a);
        let _sub_b = registry.register(cb_b);

        registry.notify(ConnectionStatus::Online);

        assert_eq!(*a.lock().unwrap(), vec![ConnectionStatus::Online]);
        assert_eq!(*b.lock().unwrap(), vec![ConnectionStatus::Online]);
    }

    #[test]
    fn test_panicking_observer_does_not_block_others() {
        let registry = ObserverRegistry::shared();
        let (a, cb_a) = recorder();
        let (b, cb_b) = recorder();
        let _sub_a = registry.register(cb_a);
        let _bad = registry.register(Arc::new(|_| panic!("observer failure")));
        let _sub_b = registry.register(cb_b);

        registry.notify(ConnectionStatus::Online);
        registry.notify(ConnectionStatus::Offline);

        let expected = vec![ConnectionStatus::Online, ConnectionStatus::Offline];
        assert_eq!(*a.lock().unwrap(), expected);
        assert_eq!(*b.lock().unwrap(), expected);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let registry = ObserverRegistry::shared();
        let (seen, cb) = recorder();
        let sub = registry.register(cb);

        registry.notify(ConnectionStatus::Online);
        sub.unsubscribe();
        sub.unsubscribe();
        registry.notify(ConnectionStatus::Offline);

        assert_eq!(*seen.lock().unwrap(), vec![ConnectionStatus::Online]);
        assert!(registry.is_empty());
        assert!(!sub.is_active());
    }

    #[test]
    fn test_drop_unsubscribes() {
        let registry = ObserverRegistry::shared();
        let (_, cb) = recorder();
        let sub = registry.register(cb);
        assert_eq!(registry.len(), 1);

        drop(sub);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_unsubscribe_from_inside_callback() {
        let registry = ObserverRegistry::shared();
        let handle: Arc<OnceLock<Subscription>> = Arc::new(OnceLock::new());
        let calls = Arc::new(AtomicU64::new(0));

        let (other_seen, other_cb) = recorder();
        let _other = registry.register(other_cb);

        let self_handle = handle.clone();
        let counter = calls.clone();
        let sub = registry.register(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = self_handle.get() {
                sub.unsubscribe();
            }
        }));
        handle.set(sub).unwrap();

        registry.notify(ConnectionStatus::Online);
        registry.notify(ConnectionStatus::Offline);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *other_seen.lock().unwrap(),
            vec![ConnectionStatus::Online, ConnectionStatus::Offline]
        );
    }

    #[test]
    fn test_handle_outliving_registry_is_harmless() {
        let registry = ObserverRegistry::shared();
        let (_, cb) = recorder();
        let sub = registry.register(cb);

        drop(registry);
        sub.unsubscribe();
    }
}
