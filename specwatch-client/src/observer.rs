// Copyright (c) The specwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Observable values with explicit subscriptions.
//!
//! The connection event loop owns all mutation; consumers register callbacks
//! that run synchronously on the mutating task whenever a value changes.
//! Subscriptions are disposed explicitly (or on drop), individually via
//! [`SubscriptionHandle`] or as a group via [`SubscriptionSet`].

use debug_ignore::DebugIgnore;
use std::sync::{
    Arc, Mutex, Weak,
    atomic::{AtomicU64, Ordering},
};

type Callback<T> = Box<dyn FnMut(&T) + Send>;

#[derive(Debug)]
struct Subscriber<T> {
    id: u64,
    callback: DebugIgnore<Callback<T>>,
}

struct Inner<T> {
    value: Mutex<T>,
    subscribers: Mutex<Vec<Subscriber<T>>>,
    next_id: AtomicU64,
}

/// A mutable value that notifies registered subscribers on change.
///
/// Notification is synchronous: `set` runs every callback on the calling
/// thread before returning. Callbacks must not subscribe to or dispose
/// subscriptions of the observable that is currently notifying them.
#[derive(Clone)]
pub struct Observable<T> {
    inner: Arc<Inner<T>>,
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("value", &*self.inner.value.lock().unwrap())
            .finish_non_exhaustive()
    }
}

impl<T: Clone + PartialEq + Send + 'static> Observable<T> {
    /// Creates a new observable holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                value: Mutex::new(value),
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Returns a clone of the current value.
    pub fn get(&self) -> T {
        self.inner.value.lock().unwrap().clone()
    }

    /// Replaces the value, notifying subscribers if it changed.
    pub fn set(&self, value: T) {
        {
            let mut guard = self.inner.value.lock().unwrap();
            if *guard == value {
                return;
            }
            *guard = value;
        }
        self.notify();
    }

    /// Applies `f` to the current value and stores the result, notifying
    /// subscribers if the value changed.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = {
            let guard = self.inner.value.lock().unwrap();
            f(&guard)
        };
        self.set(next);
    }

    /// Registers `callback` to run on every change.
    ///
    /// The callback is not invoked with the current value at registration
    /// time. Dropping the returned handle (or calling
    /// [`SubscriptionHandle::dispose`]) unregisters it.
    #[must_use = "dropping the handle immediately unsubscribes the callback"]
    pub fn subscribe(&self, callback: impl FnMut(&T) + Send + 'static) -> SubscriptionHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.lock().unwrap().push(Subscriber {
            id,
            callback: DebugIgnore(Box::new(callback)),
        });

        let weak: Weak<Inner<T>> = Arc::downgrade(&self.inner);
        SubscriptionHandle {
            dispose: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner
                        .subscribers
                        .lock()
                        .unwrap()
                        .retain(|subscriber| subscriber.id != id);
                }
            })),
        }
    }

    fn notify(&self) {
        let value = self.get();
        let mut subscribers = self.inner.subscribers.lock().unwrap();
        for subscriber in subscribers.iter_mut() {
            (subscriber.callback)(&value);
        }
    }
}

/// Disposal handle for a single subscription.
///
/// The subscription stays active until the handle is disposed or dropped.
pub struct SubscriptionHandle {
    dispose: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionHandle {
    /// Unregisters the callback now.
    pub fn dispose(mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle").finish_non_exhaustive()
    }
}

/// A group of subscriptions disposed together.
///
/// Replaces scope-based cleanup: the owner of a set of watchers holds one
/// `SubscriptionSet` and disposes (or drops) it when done.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    handles: Vec<SubscriptionHandle>,
}

impl SubscriptionSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscription to the set.
    pub fn insert(&mut self, handle: SubscriptionHandle) {
        self.handles.push(handle);
    }

    /// Disposes every subscription in the set.
    pub fn dispose(&mut self) {
        for handle in self.handles.drain(..) {
            handle.dispose();
        }
    }
}
