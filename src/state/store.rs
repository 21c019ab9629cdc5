//! Observable value with synchronous change notification.
//!
//! DESIGN
//! ======
//! A `Writable<T>` holds one value and a list of listeners. Subscribing
//! calls the listener right away with the current value, then again after
//! every `set`/`update`. Listeners run after the lock is released, so a
//! listener may read or write any store, including this one.
//!
//! Delivery is serialized per store. Each change is queued together with
//! the listeners it should reach, and exactly one thread (the drainer)
//! delivers the queue in order. A `set` from another thread waits until the
//! current drainer is done, so listeners always see values in the order
//! they were stored and `set` returns only after its own value has been
//! delivered. A `set` issued from inside a listener is queued and delivered
//! by the outer call once that listener returns.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, ThreadId};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// The capability set shared by every store in this crate.
pub trait ReactiveStore<T> {
    /// Snapshot of the current value.
    fn get(&self) -> T;

    /// Replace the value and notify listeners.
    fn set(&self, value: T);

    /// Compute the next value from a snapshot of the current one, then
    /// `set` it. `f` runs without any lock held.
    fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T;

    /// Register `listener`, invoking it immediately with the current value.
    fn subscribe<F>(&self, listener: F) -> Unsubscriber
    where
        F: Fn(&T) + Send + Sync + 'static;
}

struct Inner<T> {
    value: T,
    listeners: Vec<(u64, Listener<T>)>,
    next_id: u64,
    pending: VecDeque<(T, Vec<Listener<T>>)>,
    drainer: Option<ThreadId>,
}

struct Shared<T> {
    state: Mutex<Inner<T>>,
    idle: Condvar,
}

/// Shared, cloneable handle to an observable value.
pub struct Writable<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Writable<T> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<T> Writable<T>
where
    T: Clone + Send + 'static,
{
    #[must_use]
    pub fn new(value: T) -> Self {
        let inner = Inner { value, listeners: Vec::new(), next_id: 0, pending: VecDeque::new(), drainer: None };
        Self { shared: Arc::new(Shared { state: Mutex::new(inner), idle: Condvar::new() }) }
    }

    /// Number of live listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock, waiting out any drainer running on another thread.
    fn lock_for_write(&self) -> MutexGuard<'_, Inner<T>> {
        let me = thread::current().id();
        let mut inner = self.lock();
        while inner.drainer.is_some_and(|id| id != me) {
            inner = self.shared.idle.wait(inner).unwrap_or_else(PoisonError::into_inner);
        }
        inner
    }

    /// Queue one delivery and drain the queue unless this thread already is.
    fn enqueue(&self, mut inner: MutexGuard<'_, Inner<T>>, value: T, listeners: Vec<Listener<T>>) {
        inner.pending.push_back((value, listeners));
        let me = thread::current().id();
        if inner.drainer == Some(me) {
            return;
        }
        inner.drainer = Some(me);
        drop(inner);

        let _drain = DrainGuard { shared: &self.shared };
        loop {
            let next = self.lock().pending.pop_front();
            let Some((value, listeners)) = next else {
                return;
            };
            for listener in listeners {
                listener(&value);
            }
        }
    }
}

/// Releases the drainer role, also when a listener panics.
struct DrainGuard<'a, T> {
    shared: &'a Shared<T>,
}

impl<T> Drop for DrainGuard<'_, T> {
    fn drop(&mut self) {
        let mut inner = self.shared.state.lock().unwrap_or_else(PoisonError::into_inner);
        inner.drainer = None;
        inner.pending.clear();
        drop(inner);
        self.shared.idle.notify_all();
    }
}

impl<T> ReactiveStore<T> for Writable<T>
where
    T: Clone + Send + 'static,
{
    fn get(&self) -> T {
        self.lock().value.clone()
    }

    fn set(&self, value: T) {
        let mut inner = self.lock_for_write();
        inner.value = value;
        let snapshot = inner.value.clone();
        let listeners = inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
        self.enqueue(inner, snapshot, listeners);
    }

    fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.get();
        self.set(f(&current));
    }

    fn subscribe<F>(&self, listener: F) -> Unsubscriber
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let listener: Listener<T> = Arc::new(listener);
        let mut inner = self.lock_for_write();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push((id, Arc::clone(&listener)));
        let current = inner.value.clone();
        self.enqueue(inner, current, vec![listener]);

        let weak: Weak<Shared<T>> = Arc::downgrade(&self.shared);
        Unsubscriber::new(move || {
            if let Some(shared) = weak.upgrade() {
                let mut inner = shared.state.lock().unwrap_or_else(PoisonError::into_inner);
                inner.listeners.retain(|(lid, _)| *lid != id);
            }
        })
    }
}

/// Handle returned by `subscribe`. Dropping it leaves the listener
/// installed; call [`Unsubscriber::unsubscribe`] to detach.
pub struct Unsubscriber {
    detach: Box<dyn FnOnce() + Send>,
}

impl Unsubscriber {
    pub(crate) fn new<F>(detach: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self { detach: Box::new(detach) }
    }

    pub fn unsubscribe(self) {
        (self.detach)();
    }
}

impl std::fmt::Debug for Unsubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Unsubscriber")
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
