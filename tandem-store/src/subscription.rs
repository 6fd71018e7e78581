//! Change-handler registration shared by both stores.
//!
//! Handlers are stored as `Arc<dyn Fn(&T)>` so emission can snapshot the
//! list under the lock and invoke handlers after releasing it:
//!   - a handler removed *during* emission is still called in that round
//!   - a handler added *during* emission is not called until the next one
//!
//! Handlers may therefore call back into the registry without deadlocking.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// A live registration with a change source.
///
/// Stopping is idempotent. Dropping a subscription stops it.
pub trait Subscription: Send {
    /// Unregisters the handler. No new emission reaches it afterwards.
    fn stop(&mut self);

    /// Whether the handler is still registered.
    fn is_active(&self) -> bool;
}

/// Closure type for change handlers.
pub type HandlerFn<T> = dyn Fn(&T) + Send + Sync;

/// Typed synchronous handler registry.
pub struct HandlerRegistry<T> {
    handlers: Mutex<Vec<(u64, Arc<HandlerFn<T>>)>>,
    next_id: AtomicU64,
}

impl<T: 'static> HandlerRegistry<T> {
    /// Creates an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            handlers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Registers `handler`, returning a subscription that removes it.
    pub fn register(self: &Arc<Self>, handler: Box<HandlerFn<T>>) -> Registration<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.lock().push((id, Arc::from(handler)));
        Registration {
            registry: Arc::downgrade(self),
            id: Some(id),
        }
    }

    /// Invokes every handler registered at the time of the call.
    pub fn emit(&self, event: &T) {
        let snapshot: Vec<Arc<HandlerFn<T>>> = {
            let guard = self.handlers.lock();
            guard.iter().map(|(_, h)| Arc::clone(h)).collect()
        };
        for handler in snapshot {
            handler(event);
        }
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: u64) {
        self.handlers.lock().retain(|(hid, _)| *hid != id);
    }
}

/// Subscription handle returned by [`HandlerRegistry::register`].
pub struct Registration<T: 'static> {
    registry: Weak<HandlerRegistry<T>>,
    id: Option<u64>,
}

impl<T: 'static> Subscription for Registration<T> {
    fn stop(&mut self) {
        if let Some(id) = self.id.take() {
            if let Some(registry) = self.registry.upgrade() {
                registry.remove(id);
            }
        }
    }

    fn is_active(&self) -> bool {
        self.id.is_some() && self.registry.strong_count() > 0
    }
}

impl<T: 'static> Drop for Registration<T> {
    fn drop(&mut self) {
        self.stop();
    }
}
