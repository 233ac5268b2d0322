//! Reactive Context
//!
//! The reactive context is the dependency collector. While a tracking frame
//! is active, every cell whose `get()` runs is recorded in that frame; the
//! derived cell that opened the frame then subscribes to exactly those cells.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. A derived cell pushes a frame
//! before running its function and pops it afterwards. Reads are recorded
//! only in the topmost frame, so when one derived cell is computed while
//! another is being computed, the outer frame never sees the inner cell's
//! reads. It sees the inner cell itself only if the outer function calls
//! the inner cell's `get()`.
//!
//! Frames are popped by a guard, so a panicking computation leaves the
//! stack balanced.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use super::source::Source;
use super::subscriber::SourceId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// One entry of the context stack.
///
/// `reads` is `None` for an untracked frame, which swallows reads instead of
/// recording them.
struct Frame {
    reads: Option<IndexMap<SourceId, Rc<dyn Source>>>,
}

/// The set of cells read during one tracked run, in first-read order.
#[derive(Default)]
pub struct Dependencies {
    sources: IndexMap<SourceId, Rc<dyn Source>>,
}

impl Dependencies {
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn contains(&self, id: SourceId) -> bool {
        self.sources.contains_key(&id)
    }

    /// Ids of the recorded cells, in first-read order.
    pub fn ids(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.sources.keys().copied()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Rc<dyn Source>> + '_ {
        self.sources.values()
    }
}

impl std::fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.sources.keys()).finish()
    }
}

/// Guard for one frame of the context stack.
///
/// The frame is popped when the guard is dropped.
pub struct ReactiveContext {
    depth: usize,
}

impl ReactiveContext {
    fn push(reads: Option<IndexMap<SourceId, Rc<dyn Source>>>) -> Self {
        let depth = CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(Frame { reads });
            stack.len()
        });

        Self { depth }
    }

    /// Enter a new tracking frame.
    pub fn enter() -> Self {
        Self::push(Some(IndexMap::new()))
    }

    /// Enter a frame that ignores every read made while it is topmost.
    pub fn enter_untracked() -> Self {
        Self::push(None)
    }

    /// Pop this frame and return what it recorded.
    pub fn finish(self) -> Dependencies {
        let sources = CONTEXT_STACK.with(|stack| {
            stack
                .borrow_mut()
                .last_mut()
                .and_then(|frame| frame.reads.take())
                .unwrap_or_default()
        });

        // Dropping `self` pops the now-empty frame.
        Dependencies { sources }
    }

    /// Run `f` in a fresh tracking frame.
    ///
    /// Returns `f`'s result paired with every cell read while the frame was
    /// topmost.
    pub fn collect<R>(f: impl FnOnce() -> R) -> (R, Dependencies) {
        let ctx = Self::enter();
        let result = f();
        (result, ctx.finish())
    }

    /// Run `f` without recording any of its reads in the enclosing frame.
    pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
        let _ctx = Self::enter_untracked();
        f()
    }

    /// Check if reads are currently being recorded.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .is_some_and(|frame| frame.reads.is_some())
        })
    }

    /// Number of frames on the stack, tracked or not.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }

    /// Record a read of `source` in the topmost frame.
    ///
    /// Called by cells from `get()`. Does nothing outside a tracking frame.
    pub(crate) fn track(source: Rc<dyn Source>) {
        CONTEXT_STACK.with(|stack| {
            if let Some(reads) = stack
                .borrow_mut()
                .last_mut()
                .and_then(|frame| frame.reads.as_mut())
            {
                reads.entry(source.source_id()).or_insert(source);
            }
        });
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            // Frames are strictly nested; popping out of order is a bug.
            debug_assert_eq!(
                stack.len(),
                self.depth,
                "ReactiveContext mismatch: expected depth {}, got {}",
                self.depth,
                stack.len()
            );
            stack.pop();
        });
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
