//! Error types shared by guarded operations and the mount coordinator.

use std::sync::Arc;

use thiserror::Error;

/// Boxed error accepted from initializers and host requests.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure of a guarded operation.
///
/// The enum is `Clone` so one failure can be returned to the caller and
/// mirrored into an error cell at the same time.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Another call of the same operation is still in flight.
    #[error("{operation}: a call is already in progress")]
    ConcurrentCall { operation: String },

    /// The operation was cancelled before it completed.
    #[error("operation was cancelled")]
    Cancelled,

    /// The capability check for the operation returned false.
    #[error("{operation}: not available in the current environment")]
    NotAvailable { operation: String },

    /// Any other failure reported by the operation itself.
    #[error("operation failed: {0}")]
    Failed(#[source] Arc<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap an arbitrary error as [`Error::Failed`].
    pub fn failed(err: impl Into<BoxError>) -> Self {
        Self::Failed(Arc::from(err.into()))
    }

    pub fn concurrent_call(operation: impl Into<String>) -> Self {
        Self::ConcurrentCall {
            operation: operation.into(),
        }
    }

    pub fn not_available(operation: impl Into<String>) -> Self {
        Self::NotAvailable {
            operation: operation.into(),
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    #[must_use]
    pub fn is_concurrent_call(&self) -> bool {
        matches!(self, Self::ConcurrentCall { .. })
    }

    /// Whether this error should be recorded in an operation's error cell.
    ///
    /// Only failures produced by the operation itself are persisted.
    #[must_use]
    pub(crate) fn is_persisted(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}
