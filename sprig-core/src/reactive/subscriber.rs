//! Identifiers for subscriptions and observable sources.
//!
//! Rust closures have no identity, so every subscription is addressed by a
//! [`SubscriberId`] and every observable cell by a [`SourceId`].

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a subscription.
///
/// Returned by `sub` and accepted by `unsub`. A derived cell uses one id for
/// its update handler across all of its dependencies, so re-subscribing it to
/// a source replaces the previous registration instead of duplicating it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for an observable cell.
///
/// A derived cell reports the id of its output cell, since that is the cell
/// other computations actually read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn source_ids_are_unique() {
        let a = SourceId::new();
        let b = SourceId::new();
        assert_ne!(a, b);
        assert!(a < b);
    }
}
