//! Sprig Core
//!
//! This crate provides the state engine underneath the SDK's stateful
//! components. It implements:
//!
//! - Reactive primitives (signals, computeds) with automatic dependency
//!   tracking
//! - Guarded, cancellable asynchronous operations
//! - A mount coordinator that drives a component's async initialization and
//!   teardown
//!
//! Everything is single-threaded. Cells are `Rc` handles, the dependency
//! collector is thread-local, and the futures returned by guarded
//! operations are `!Send`.
//!
//! # Architecture
//!
//! - `reactive`: signals, computeds and the dependency collector
//! - `mount`: non-concurrent operations, cancellation and the mount
//!   coordinator
//! - `error`: the error type shared by guarded operations
//!
//! # Example
//!
//! ```rust
//! use sprig_core::reactive::{Computed, Signal};
//!
//! let height = Signal::new(600);
//! let stable_height = Signal::new(600);
//!
//! let is_stable = Computed::new({
//!     let (height, stable_height) = (height.clone(), stable_height.clone());
//!     move || height.get() == stable_height.get()
//! });
//!
//! height.set(540);
//! assert!(!is_stable.get());
//!
//! stable_height.set(540);
//! assert!(is_stable.get());
//! ```

pub mod error;
pub mod mount;
pub mod reactive;

pub use error::{BoxError, Error, Result};
pub use mount::{CancelHandle, CancelToken, MountCoordinator, MountPhase, NonConcurrent};
pub use reactive::{Computed, ReactiveContext, ReadSignal, Signal, SubscriberId};
