//! Component Lifecycle
//!
//! Guarded asynchronous operations and the mount coordinator built on them.
//!
//! - [`NonConcurrent`] runs one operation at a time, rejecting overlapping
//!   calls, and mirrors its pending state and last failure into cells.
//! - [`MountCoordinator`] layers the mounted flag, the post-mount hook and
//!   `unmount` on top of a `NonConcurrent` mount operation.
//! - [`CancelHandle`] / [`CancelToken`] connect `unmount` to the operation in
//!   flight.
//!
//! All futures here are `!Send` and meant for a single-threaded executor,
//! the same thread that owns the cells.

mod cancel;
mod coordinator;
mod non_concurrent;
mod phase;

pub use cancel::{CancelHandle, CancelToken};
pub use coordinator::{MountCoordinator, MountCoordinatorBuilder};
pub use non_concurrent::NonConcurrent;
pub use phase::MountPhase;
