//! Non-concurrent operations
//!
//! A [`NonConcurrent`] wraps an asynchronous operation that must never
//! overlap with itself, such as a request to the host application or a
//! component's mount. It publishes three cells:
//!
//! - `promise`: the cancel handle of the call in flight, if any;
//! - `is_pending`: true exactly when `promise` holds a handle;
//! - `error`: the failure of the last call, cleared when a new call starts.
//!
//! A call made while another is pending is rejected on the spot with
//! [`Error::ConcurrentCall`]. It is neither queued nor merged, and it leaves
//! every cell untouched.
//!
//! Cancellation is not a failure: a cancelled call resolves to
//! [`Error::Cancelled`] but is never written to `error`.
//!
//! # Settling
//!
//! A call owns the cells from the moment it is accepted until its outcome is
//! written. The outcome and the release of the slot are one batched write,
//! so subscribers never see the slot free before the outcome is in place,
//! and a stale call never writes over a newer one.

use std::future::Future;
use std::rc::Rc;

use futures_util::future::{self, LocalBoxFuture};
use futures_util::FutureExt;
use tracing::{debug, warn};

use super::cancel::{until_cancelled, CancelHandle, CancelToken};
use crate::error::{Error, Result};
use crate::reactive::{Batch, ReadSignal, Signal};

/// Guarded runner for one asynchronous operation.
#[derive(Clone)]
pub struct NonConcurrent {
    name: Rc<str>,
    promise: Signal<Option<CancelHandle>>,
    is_pending: Signal<bool>,
    error: Signal<Option<Error>>,
}

impl NonConcurrent {
    /// Create a runner. `name` identifies the operation in errors and logs.
    pub fn new(name: impl Into<String>) -> Self {
        // Errors have no useful equality; every new failure notifies.
        let error = Signal::with_equals(None, |a: &Option<Error>, b: &Option<Error>| {
            a.is_none() && b.is_none()
        });

        Self {
            name: Rc::from(name.into()),
            promise: Signal::new(None),
            is_pending: Signal::new(false),
            error,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cancel handle of the call in flight.
    pub fn promise(&self) -> ReadSignal<Option<CancelHandle>> {
        self.promise.read_only()
    }

    /// True while a call is in flight.
    pub fn is_pending(&self) -> ReadSignal<bool> {
        self.is_pending.read_only()
    }

    /// Failure of the last call, if it failed.
    pub fn error(&self) -> ReadSignal<Option<Error>> {
        self.error.read_only()
    }

    /// Start `op` unless a call is already in flight.
    ///
    /// The pending state is published before this returns. `op` is called
    /// with the call's token on the first poll of the returned future, and
    /// not at all if the call is cancelled before that. Dropping the future
    /// before it completes cancels the call and frees the slot.
    pub fn run<R, F, Fut>(&self, op: F) -> LocalBoxFuture<'static, Result<R>>
    where
        R: 'static,
        F: FnOnce(CancelToken) -> Fut + 'static,
        Fut: Future<Output = Result<R>> + 'static,
    {
        let (operation, slot) = match self.start(op) {
            Ok(started) => started,
            Err(err) => return future::ready(Err(err)).boxed_local(),
        };

        async move {
            match operation.await {
                Ok(value) => {
                    let mut batch = Batch::new();
                    if slot.finish(&mut batch) {
                        Ok(value)
                    } else {
                        Err(Error::Cancelled)
                    }
                }
                Err(err) => Err(slot.fail(err)),
            }
        }
        .boxed_local()
    }

    /// Accept a call: publish its handle and return the wrapped operation
    /// together with the slot that owns the cells until the call settles.
    pub(crate) fn start<R, F, Fut>(
        &self,
        op: F,
    ) -> Result<(impl Future<Output = Result<R>> + 'static, Slot)>
    where
        R: 'static,
        F: FnOnce(CancelToken) -> Fut + 'static,
        Fut: Future<Output = Result<R>> + 'static,
    {
        if self.promise.get_untracked().is_some() {
            warn!(operation = %self.name, "rejected concurrent call");
            return Err(Error::concurrent_call(&*self.name));
        }

        let (handle, registration) = CancelHandle::new_pair();
        let token = handle.token();
        let operation = until_cancelled(async move { op(token).await }, registration);

        let slot = Slot {
            task: self.clone(),
            handle: Some(handle.clone()),
        };

        let mut batch = Batch::new();
        batch.set(&self.error, None);
        batch.set(&self.promise, Some(handle));
        batch.set(&self.is_pending, true);
        debug!(operation = %self.name, "operation started");
        batch.commit();

        Ok((operation, slot))
    }

    /// Cancel the call in flight, if any, and free the slot immediately.
    ///
    /// The cancelled future still resolves to [`Error::Cancelled`] the next
    /// time it is polled, but it no longer owns any state.
    pub fn cancel(&self) {
        let mut batch = Batch::new();
        self.cancel_into(&mut batch);
    }

    /// [`NonConcurrent::cancel`], with the cell writes added to `batch`.
    pub(crate) fn cancel_into(&self, batch: &mut Batch) {
        if let Some(handle) = self.promise.get_untracked() {
            handle.cancel();
            self.release_into(batch);
            debug!(operation = %self.name, "operation cancelled");
        }
    }

    pub(crate) fn clear_error_into(&self, batch: &mut Batch) {
        batch.set(&self.error, None);
    }

    fn release_into(&self, batch: &mut Batch) {
        batch.set(&self.promise, None);
        batch.set(&self.is_pending, false);
    }
}

impl std::fmt::Debug for NonConcurrent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonConcurrent")
            .field("name", &self.name)
            .field("pending", &self.is_pending.get_untracked())
            .finish()
    }
}

/// Ownership of a runner's cells for one accepted call.
///
/// The call keeps the slot until `finish` or `fail` writes its outcome. A
/// slot dropped before that cancels its call and frees the cells.
pub(crate) struct Slot {
    task: NonConcurrent,
    handle: Option<CancelHandle>,
}

impl Slot {
    /// Whether this call still owns the cells and has not been cancelled.
    pub(crate) fn is_current(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_cancelled() && self.owns(handle))
    }

    /// Settle successfully, adding the release to `batch` so it becomes
    /// visible together with the caller's own writes.
    ///
    /// Returns false if the call was cancelled or replaced in the meantime;
    /// the caller must then write nothing of its own.
    pub(crate) fn finish(mut self, batch: &mut Batch) -> bool {
        let live = self.is_current();
        if self.disarm() {
            self.task.release_into(batch);
        }
        if live {
            debug!(operation = %self.task.name, "operation succeeded");
        }
        live
    }

    /// Settle with `err`. Failures are mirrored into the error cell in the
    /// same write that frees the slot; nothing is written if a newer call
    /// owns the cells.
    pub(crate) fn fail(mut self, err: Error) -> Error {
        let name = Rc::clone(&self.task.name);
        if !self.disarm() {
            debug!(operation = %name, reason = %err, "stale call settled");
            return err;
        }

        let mut batch = Batch::new();
        self.task.release_into(&mut batch);
        if err.is_persisted() {
            warn!(operation = %name, error = %err, "operation failed");
            batch.set(&self.task.error, Some(err.clone()));
        } else {
            debug!(operation = %name, reason = %err, "operation stopped");
        }
        batch.commit();
        err
    }

    fn owns(&self, handle: &CancelHandle) -> bool {
        self.task.promise.get_untracked().as_ref() == Some(handle)
    }

    /// Stop guarding the call. Returns whether it still owned the cells.
    fn disarm(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => self.owns(&handle),
            None => false,
        }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        // Still armed: the future was dropped before completing.
        if let Some(handle) = self.handle.take() {
            handle.cancel();
            if self.owns(&handle) {
                let mut batch = Batch::new();
                self.task.release_into(&mut batch);
                debug!(operation = %self.task.name, "operation dropped");
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
