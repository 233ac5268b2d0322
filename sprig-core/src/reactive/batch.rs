//! Grouped Writes
//!
//! A [`Batch`] stores writes to several signals first and notifies their
//! subscribers afterwards, so every subscriber observes all of the writes.
//! Ordinary `set` calls stay unbatched; this is for multi-cell state changes
//! whose cells must never be seen half-updated, such as a mount completing.
//!
//! Notification happens when the batch is committed or dropped, in the order
//! the signals were first written. Each changed signal notifies once, with
//! its value at notification time.

use smallvec::SmallVec;

use super::signal::Signal;
use super::subscriber::SourceId;

pub(crate) struct Batch {
    written: SmallVec<[SourceId; 4]>,
    pending: SmallVec<[Box<dyn FnOnce()>; 4]>,
}

impl Batch {
    pub(crate) fn new() -> Self {
        Self {
            written: SmallVec::new(),
            pending: SmallVec::new(),
        }
    }

    /// Store `value` now and queue the notification.
    pub(crate) fn set<T: Clone + 'static>(&mut self, signal: &Signal<T>, value: T) {
        if !signal.commit(value) || self.written.contains(&signal.id()) {
            return;
        }

        self.written.push(signal.id());
        let signal = signal.clone();
        self.pending.push(Box::new(move || signal.notify()));
    }

    /// Notify every changed signal.
    pub(crate) fn commit(self) {
        drop(self);
    }

    fn flush(&mut self) {
        for notify in std::mem::take(&mut self.pending) {
            notify();
        }
    }
}

impl Drop for Batch {
    fn drop(&mut self) {
        self.flush();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
