//! Synchronous subscriber lists.
//!
//! Listeners are called on the emitting task, in subscription order, before
//! `emit` returns. Dropping the returned [`Subscription`] unsubscribes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Listeners<T> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Listener<T>)>>,
}

/// Fan-out of values of type `T` to registered listeners.
pub struct EventEmitter<T> {
    listeners: Arc<Listeners<T>>,
}

impl<T: 'static> EventEmitter<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Listeners {
                next_id: AtomicU64::new(0),
                entries: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register a listener. It stays registered while the handle is alive.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.listeners.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.listeners.entries).push((id, Arc::new(listener)));

        let weak: Weak<Listeners<T>> = Arc::downgrade(&self.listeners);
        Subscription {
            unsubscribe: Some(Box::new(move || {
                if let Some(listeners) = weak.upgrade() {
                    lock(&listeners.entries).retain(|(entry_id, _)| *entry_id != id);
                }
            })),
        }
    }

    /// Deliver `value` to every listener.
    ///
    /// The listener list is snapshotted first, so a listener may subscribe
    /// or unsubscribe from inside its callback.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Listener<T>> = lock(&self.listeners.entries)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(value);
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        lock(&self.listeners.entries).len()
    }
}

impl<T: 'static> Default for EventEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by `subscribe`; unsubscribes on drop or [`Subscription::unsubscribe`].
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// A handle that is not attached to anything.
    #[must_use]
    pub fn detached() -> Self {
        Self { unsubscribe: None }
    }

    pub fn unsubscribe(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
