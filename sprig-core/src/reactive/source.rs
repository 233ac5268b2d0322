//! Type-erased view of an observable cell.
//!
//! The dependency collector records cells of many value types in one frame.
//! [`Source`] is the object-safe slice of a cell that a derived computation
//! needs: identity plus the ability to attach and detach a change handler.

use std::rc::Rc;

use super::subscriber::{SourceId, SubscriberId};

/// An observable cell, seen without its value type.
pub trait Source {
    /// Identity used to de-duplicate reads within one tracking frame.
    fn source_id(&self) -> SourceId;

    /// Register `notify` under `id`, replacing any callback already stored
    /// under that id. `notify` runs after every committed change.
    fn subscribe_notify(&self, id: SubscriberId, notify: Rc<dyn Fn()>);

    /// Remove the callback registered under `id`. Missing ids are ignored.
    fn unsubscribe(&self, id: SubscriberId);
}
