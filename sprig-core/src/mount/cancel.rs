//! Cancellation handles for guarded operations.
//!
//! Each guarded run gets one abort pair. The [`CancelHandle`] is published in
//! the operation's promise cell so that anyone (usually `unmount`) can stop
//! it; the [`CancelToken`] is passed to the operation so it can check for
//! cancellation between steps. The operation future itself is wrapped in
//! [`Abortable`], so after `cancel()` it stops at its next suspension point
//! even if it never looks at the token.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::future::{AbortHandle, AbortRegistration, Abortable, Aborted};

use crate::error::{Error, Result};

/// Caller-side handle of one in-flight operation.
///
/// Handles compare equal only to clones of themselves.
#[derive(Clone)]
pub struct CancelHandle {
    id: u64,
    abort: AbortHandle,
}

impl CancelHandle {
    pub(crate) fn new_pair() -> (Self, AbortRegistration) {
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let (abort, registration) = AbortHandle::new_pair();
        let handle = Self {
            id: COUNTER.fetch_add(1, Ordering::Relaxed),
            abort,
        };
        (handle, registration)
    }

    /// Request cancellation. Does not wait for the operation to stop.
    pub fn cancel(&self) {
        self.abort.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.abort.is_aborted()
    }

    /// Token for the operation side of this handle.
    pub fn token(&self) -> CancelToken {
        CancelToken {
            abort: self.abort.clone(),
        }
    }
}

impl PartialEq for CancelHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CancelHandle {}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Operation-side view of a cancellation request.
#[derive(Clone)]
pub struct CancelToken {
    abort: AbortHandle,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.abort.is_aborted()
    }

    /// Return [`Error::Cancelled`] if cancellation was requested.
    ///
    /// Useful between synchronous steps that have no suspension point.
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Drive `operation` until it completes or its handle is cancelled.
pub(crate) async fn until_cancelled<R, F>(operation: F, registration: AbortRegistration) -> Result<R>
where
    F: Future<Output = Result<R>>,
{
    match Abortable::new(operation, registration).await {
        Ok(outcome) => outcome,
        Err(Aborted) => Err(Error::Cancelled),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
