//! Computed Implementation
//!
//! A Computed is a derived cell: an output [`Signal`] whose value is produced
//! by re-running a function inside a tracking frame.
//!
//! # How Computeds Work
//!
//! `compute()` does four things, in this order:
//!
//! 1. Unsubscribe the update handler from every current dependency.
//!
//! 2. Run the function in a fresh tracking frame, collecting the cells it
//!    reads.
//!
//! 3. Subscribe the update handler to every collected cell.
//!
//! 4. Replace the dependency set with the collected one.
//!
//! The update handler runs `compute()` and writes the result into the output
//! signal. The output's equality check stops propagation when the value did
//! not change.
//!
//! Because the old subscriptions are dropped before the new run, the
//! dependency set is always exactly what the last run read. A branch that is
//! no longer taken stops triggering recomputation.
//!
//! # No Batching
//!
//! Every upstream notification recomputes immediately. In a diamond
//! (`A = f(S)`, `B = g(S)`, `C = h(A, B)`) a single write to `S` that changes
//! both `A` and `B` runs `C`'s function twice, once per path. Cycles are not
//! detected and recurse until the stack overflows.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use tracing::trace;

use super::context::{Dependencies, ReactiveContext};
use super::signal::Signal;
use super::subscriber::{SourceId, SubscriberId};

struct ComputedInner<T: 'static> {
    /// Id the update handler is registered under in every dependency.
    handler_id: SubscriberId,

    /// The update handler. Holds a weak reference back to this cell.
    handler: Rc<dyn Fn()>,

    compute: Box<dyn Fn() -> T>,

    output: Signal<T>,

    /// Cells read during the last run.
    dependencies: RefCell<Dependencies>,
}

impl<T: Clone + 'static> ComputedInner<T> {
    fn compute(&self) -> T {
        let previous = std::mem::take(&mut *self.dependencies.borrow_mut());
        for source in previous.iter() {
            source.unsubscribe(self.handler_id);
        }

        let (value, dependencies) = ReactiveContext::collect(|| (self.compute)());
        bind(self.handler_id, &self.handler, &dependencies);
        trace!(dependencies = dependencies.len(), "computed re-evaluated");

        *self.dependencies.borrow_mut() = dependencies;
        value
    }

    fn update(&self) {
        let value = self.compute();
        self.output.set(value);
    }
}

impl<T: 'static> ComputedInner<T> {
    fn detach(&self) {
        let dependencies = std::mem::take(&mut *self.dependencies.borrow_mut());
        for source in dependencies.iter() {
            source.unsubscribe(self.handler_id);
        }
    }
}

impl<T: 'static> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.detach();
    }
}

fn bind(id: SubscriberId, handler: &Rc<dyn Fn()>, dependencies: &Dependencies) {
    for source in dependencies.iter() {
        source.subscribe_notify(id, Rc::clone(handler));
    }
}

/// A derived value that recomputes whenever a cell it read changes.
///
/// The function runs once on construction and again, synchronously, after
/// every change of a current dependency.
///
/// # Example
///
/// ```rust
/// use sprig_core::reactive::{Computed, Signal};
///
/// let count = Signal::new(2);
/// let doubled = Computed::new({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + PartialEq + 'static> Computed<T> {
    /// Create a computed whose output is compared with `PartialEq`.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::with_equals(compute, |a, b| a == b)
    }
}

impl<T: Clone + 'static> Computed<T> {
    /// Create a computed with a custom equality for its output.
    pub fn with_equals<F, E>(compute: F, equals: E) -> Self
    where
        F: Fn() -> T + 'static,
        E: Fn(&T, &T) -> bool + 'static,
    {
        let inner = Rc::new_cyclic(|weak: &Weak<ComputedInner<T>>| {
            let handler_id = SubscriberId::new();
            let weak = weak.clone();
            let handler: Rc<dyn Fn()> = Rc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.update();
                }
            });

            let (value, dependencies) = ReactiveContext::collect(&compute);
            bind(handler_id, &handler, &dependencies);

            ComputedInner {
                handler_id,
                handler,
                compute: Box::new(compute),
                output: Signal::with_equals(value, equals),
                dependencies: RefCell::new(dependencies),
            }
        });

        Self { inner }
    }

    /// Get the current value.
    ///
    /// Inside a tracking frame this records the computed's output cell, not
    /// the cells the computed itself read.
    pub fn get(&self) -> T {
        self.inner.output.get()
    }

    pub fn get_untracked(&self) -> T {
        self.inner.output.get_untracked()
    }

    /// Re-run the function and rebind dependencies.
    ///
    /// Returns the fresh value without publishing it to the output cell.
    pub fn compute(&self) -> T {
        self.inner.compute()
    }

    pub fn sub_immediate<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&T) + 'static,
    {
        self.inner.output.sub_immediate(callback)
    }
}

impl<T: 'static> Computed<T> {
    /// Id of the output cell.
    pub fn id(&self) -> SourceId {
        self.inner.output.id()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.output.with(f)
    }

    pub fn sub<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&T) + 'static,
    {
        self.inner.output.sub(callback)
    }

    pub fn unsub(&self, id: SubscriberId) {
        self.inner.output.unsub(id);
    }

    /// Drop every subscription on both sides.
    ///
    /// Removes this computed's own subscribers and detaches it from its
    /// dependencies, so it keeps its last value and never recomputes again.
    pub fn unsub_all(&self) {
        self.inner.output.unsub_all();
        self.inner.detach();
    }

    /// Get the number of cells read during the last run.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.borrow().len()
    }

    /// Check whether the last run read the cell with the given id.
    pub fn depends_on(&self, id: SourceId) -> bool {
        self.inner.dependencies.borrow().contains(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.output.subscriber_count()
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("output", &self.inner.output)
            .field("dependencies", &*self.inner.dependencies.borrow())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
