//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and an
//! ordered list of subscribers that are called whenever the value changes.
//!
//! # How Signals Work
//!
//! 1. When a signal is read inside a tracking frame, it records itself in
//!    that frame so the enclosing derived cell can subscribe to it.
//!
//! 2. `set` compares the new value with the current one using the signal's
//!    equality function. Equal values are dropped without notification.
//!
//! 3. A changed value is committed first, then every subscriber runs
//!    synchronously, in subscription order, before `set` returns.
//!
//! # Re-entrancy
//!
//! Notification is unguarded. A subscriber that sets the same signal recurses
//! straight back into `set`; a chain of updates that never settles on an
//! equal value overflows the stack. Panics raised by subscribers propagate
//! out of `set` to the writer.
//!
//! # Ownership
//!
//! Signals are single-threaded handles (`Rc`). Cloning a signal shares the
//! underlying cell; the value is dropped with the last handle.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::context::ReactiveContext;
use super::source::Source;
use super::subscriber::{SourceId, SubscriberId};

type Callback<T> = Rc<dyn Fn(&T)>;

/// Shared state behind every handle of one signal.
pub(crate) struct SignalInner<T> {
    id: SourceId,
    value: RefCell<T>,
    equals: Box<dyn Fn(&T, &T) -> bool>,
    subscribers: RefCell<IndexMap<SubscriberId, Callback<T>>>,
}

impl<T: 'static> Source for SignalInner<T> {
    fn source_id(&self) -> SourceId {
        self.id
    }

    fn subscribe_notify(&self, id: SubscriberId, notify: Rc<dyn Fn()>) {
        self.subscribers
            .borrow_mut()
            .insert(id, Rc::new(move |_: &T| notify()));
    }

    fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.borrow_mut().shift_remove(&id);
    }
}

/// A reactive signal holding a value of type T.
///
/// # Example
///
/// ```rust
/// use sprig_core::reactive::Signal;
///
/// let count = Signal::new(0);
/// let seen = std::rc::Rc::new(std::cell::Cell::new(0));
///
/// let seen_clone = seen.clone();
/// count.sub(move |v| seen_clone.set(*v));
///
/// count.set(5);
/// assert_eq!(seen.get(), 5);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

impl<T: PartialEq + 'static> Signal<T> {
    /// Create a new signal compared with `PartialEq`.
    pub fn new(value: T) -> Self {
        Self::with_equals(value, |a, b| a == b)
    }
}

impl<T: 'static> Signal<T> {
    /// Create a signal with a custom equality function.
    ///
    /// `set` skips notification whenever `equals(current, new)` holds, so an
    /// equality that always returns false makes every write notify.
    pub fn with_equals<F>(value: T, equals: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        Self {
            inner: Rc::new(SignalInner {
                id: SourceId::new(),
                value: RefCell::new(value),
                equals: Box::new(equals),
                subscribers: RefCell::new(IndexMap::new()),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// Read the value by reference.
    ///
    /// Tracked like [`Signal::get`]. The borrow is released before this
    /// returns, but `f` must not set this signal.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.inner.value.borrow())
    }

    /// Register a subscriber called with the new value after every change.
    pub fn sub<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&T) + 'static,
    {
        let id = SubscriberId::new();
        self.inner
            .subscribers
            .borrow_mut()
            .insert(id, Rc::new(callback));
        id
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub fn unsub(&self, id: SubscriberId) {
        self.inner.unsubscribe(id);
    }

    /// Remove every subscriber.
    pub fn unsub_all(&self) {
        self.inner.subscribers.borrow_mut().clear();
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    /// A handle that can read and subscribe but not write.
    pub fn read_only(&self) -> ReadSignal<T> {
        ReadSignal {
            signal: self.clone(),
        }
    }

    fn track(&self) {
        if ReactiveContext::is_active() {
            ReactiveContext::track(self.inner.clone());
        }
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// Get the current value.
    ///
    /// If called within a tracking frame, this also records the signal as a
    /// dependency of the computation that owns the frame.
    pub fn get(&self) -> T {
        self.track();
        self.get_untracked()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Set a new value and notify subscribers.
    ///
    /// Does nothing if the new value equals the current one.
    pub fn set(&self, value: T) {
        if self.commit(value) {
            self.notify();
        }
    }

    /// Store `value` without notifying. Returns false if it was equal to the
    /// current value and nothing changed.
    pub(crate) fn commit(&self, value: T) -> bool {
        {
            let current = self.inner.value.borrow();
            if (self.inner.equals)(&current, &value) {
                return false;
            }
        }

        *self.inner.value.borrow_mut() = value;
        true
    }

    /// Call every subscriber with the current value.
    pub(crate) fn notify(&self) {
        let value = self.get_untracked();

        // Snapshot so subscribers may sub, unsub or set while we iterate.
        let callbacks: SmallVec<[Callback<T>; 4]> =
            self.inner.subscribers.borrow().values().cloned().collect();

        for callback in callbacks {
            callback(&value);
        }
    }

    /// Update the value using a function of the current one.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = f(&self.inner.value.borrow());
        self.set(next);
    }

    /// Like [`Signal::sub`], but also calls `callback` once with the current
    /// value before returning.
    pub fn sub_immediate<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&T) + 'static,
    {
        let current = self.get_untracked();
        callback(&current);
        self.sub(callback)
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Read-only view of a [`Signal`].
///
/// Components hand these out for cells they own, keeping `set` private to
/// the component.
pub struct ReadSignal<T: 'static> {
    signal: Signal<T>,
}

impl<T: 'static> ReadSignal<T> {
    pub fn id(&self) -> SourceId {
        self.signal.id()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.signal.with(f)
    }

    pub fn sub<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&T) + 'static,
    {
        self.signal.sub(callback)
    }

    pub fn unsub(&self, id: SubscriberId) {
        self.signal.unsub(id);
    }

    pub fn unsub_all(&self) {
        self.signal.unsub_all();
    }

    pub fn subscriber_count(&self) -> usize {
        self.signal.subscriber_count()
    }
}

impl<T: Clone + 'static> ReadSignal<T> {
    pub fn get(&self) -> T {
        self.signal.get()
    }

    pub fn get_untracked(&self) -> T {
        self.signal.get_untracked()
    }

    pub fn sub_immediate<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&T) + 'static,
    {
        self.signal.sub_immediate(callback)
    }
}

impl<T: 'static> Clone for ReadSignal<T> {
    fn clone(&self) -> Self {
        Self {
            signal: self.signal.clone(),
        }
    }
}

impl<T: 'static> From<Signal<T>> for ReadSignal<T> {
    fn from(signal: Signal<T>) -> Self {
        Self { signal }
    }
}

impl<T: Debug + 'static> Debug for ReadSignal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.signal.fmt(f)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
