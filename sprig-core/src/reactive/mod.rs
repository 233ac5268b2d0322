//! Reactive Primitives
//!
//! This module implements the observable cells that every SDK component keeps
//! its state in: signals, derived cells, and the collector that connects them.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A [`Signal`] is a container for mutable state. Writing a different value
//! notifies every subscriber synchronously, in subscription order.
//!
//! ## Computeds
//!
//! A [`Computed`] is a derived value. It re-runs its function whenever one of
//! the cells it read last time changes, and re-subscribes to exactly the
//! cells read in the new run.
//!
//! ## Reactive context
//!
//! [`ReactiveContext`] is the dependency collector: a thread-local stack of
//! frames. A read inside a frame is recorded in the topmost frame only.
//!
//! # Implementation Notes
//!
//! The graph is single-threaded and eager. There is no scheduler, and `set`
//! never batches: every write propagates through the graph before it
//! returns. Inside the crate, multi-cell state changes go through a batch
//! so their cells are never observed half-written.

mod batch;
mod computed;
mod context;
mod signal;
mod source;
mod subscriber;

pub(crate) use batch::Batch;
pub use computed::Computed;
pub use context::{Dependencies, ReactiveContext};
pub use signal::{ReadSignal, Signal};
pub use source::Source;
pub use subscriber::{SourceId, SubscriberId};
