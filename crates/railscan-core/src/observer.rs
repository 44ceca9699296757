//! Observer set: the fan-out primitive behind every signal in the crate.
//!
//! `NotificationBus`, the history change signal and the in-memory storage
//! watchers all sit on top of [`ObserverSet`].
//!
//! Design:
//! - Observers are plain closures, registered in arrival order.
//! - `emit` snapshots the list and releases the lock before calling anyone,
//!   so an observer may subscribe or unsubscribe from inside its callback.
//! - A panicking observer is logged and skipped; the rest still receive the event.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Observer<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
    next_id: u64,
    observers: Vec<(u64, Observer<E>)>,
}

/// A set of observers for events of type `E`.
///
/// Cloning shares the underlying set.
pub struct ObserverSet<E> {
    inner: Arc<Mutex<Registry<E>>>,
}

impl<E: 'static> ObserverSet<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 0,
                observers: Vec::new(),
            })),
        }
    }

    /// Register `observer` for every event emitted from now on.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = {
            let mut registry = lock(&self.inner);
            let id = registry.next_id;
            registry.next_id += 1;
            registry.observers.push((id, Arc::new(observer)));
            id
        };

        let registry: Weak<Mutex<Registry<E>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                lock(&registry).observers.retain(|(other, _)| *other != id);
            }
        })
    }

    /// Deliver `event` to every registered observer.
    ///
    /// Returns the number of observers that handled the event without panicking.
    pub fn emit(&self, event: &E) -> usize {
        let snapshot: Vec<Observer<E>> = lock(&self.inner)
            .observers
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        let mut delivered = 0;
        for observer in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| observer(event))) {
                Ok(()) => delivered += 1,
                Err(_) => tracing::error!("observer panicked, continuing with the remaining observers"),
            }
        }
        delivered
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: 'static> Default for ObserverSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for ObserverSet<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> fmt::Debug for ObserverSet<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let observers = lock(&self.inner).observers.len();
        f.debug_struct("ObserverSet")
            .field("observers", &observers)
            .finish()
    }
}

/// Handle returned by `subscribe`.
///
/// `unsubscribe` removes exactly the observer it was created for. Calling it
/// again is a no-op. Dropping the handle does NOT unsubscribe.
pub struct Subscription {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    pub fn unsubscribe(&self) {
        let cancel = lock(&self.cancel).take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    /// Has `unsubscribe` not been called yet?
    pub fn is_active(&self) -> bool {
        lock(&self.cancel).is_some()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
