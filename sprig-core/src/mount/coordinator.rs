//! Mount Coordinator
//!
//! Every stateful component (viewport, back button, ...) has to be mounted
//! before use: an asynchronous initializer fetches its initial state from
//! the host, after which the component commits that state and starts
//! listening for host events. The coordinator drives that lifecycle.
//!
//! # State Machine
//!
//! ```text
//! Idle --mount--> Mounting --ok--------> Mounted
//!                     |----cancelled---> Idle
//!                     '----failed------> Failed
//! any --unmount--> Idle
//! ```
//!
//! At most one mount is in flight per coordinator. A second `mount()` while
//! mounting fails immediately with [`Error::ConcurrentCall`].
//!
//! Every transition writes its cells as one batch: all of them change before
//! any subscriber runs. `is_mounting` and `is_mounted` are therefore never
//! observed true together, `mount_promise` is set exactly when
//! `is_mounting` is true, and a subscriber that reacts to one flag by
//! calling `mount()` or `unmount()` sees the other flags already settled.

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

use futures_util::future::{self, LocalBoxFuture};
use futures_util::FutureExt;
use tracing::{debug, warn};

use super::cancel::{CancelHandle, CancelToken};
use super::non_concurrent::{NonConcurrent, Slot};
use super::phase::MountPhase;
use crate::error::{Error, Result};
use crate::reactive::{Batch, Computed, ReadSignal, Signal};

type Initializer<S> = Box<dyn Fn(CancelToken) -> LocalBoxFuture<'static, Result<S>>>;
type MountedHook<S> = Box<dyn Fn(S) -> Teardown>;
type Teardown = Box<dyn FnOnce()>;

struct Inner<S: 'static> {
    name: String,
    task: NonConcurrent,
    is_mounted: Signal<bool>,
    phase: Computed<MountPhase>,
    initializer: Initializer<S>,
    on_mounted: Option<MountedHook<S>>,
    availability: Option<Box<dyn Fn() -> bool>>,
    /// Undo for the side effects of the last successful mount.
    teardown: RefCell<Option<Teardown>>,
}

impl<S: 'static> Inner<S> {
    fn is_available(&self) -> bool {
        self.availability.as_ref().map_or(true, |check| check())
    }

    /// Finish a successful mount while `slot` still holds the in-flight
    /// call. The hook runs first; the release of the slot and
    /// `is_mounted = true` then become visible together.
    fn commit(&self, state: S, slot: Slot) -> Result<()> {
        let previous = self.teardown.borrow_mut().take();
        if let Some(previous) = previous {
            previous();
        }

        let teardown = self.on_mounted.as_ref().map(|hook| hook(state));

        // The hook may have unmounted the component.
        if !slot.is_current() {
            if let Some(teardown) = teardown {
                teardown();
            }
            return Err(slot.fail(Error::Cancelled));
        }

        *self.teardown.borrow_mut() = teardown;

        let mut batch = Batch::new();
        if !slot.finish(&mut batch) {
            return Err(Error::Cancelled);
        }
        batch.set(&self.is_mounted, true);
        debug!(component = %self.name, "component mounted");
        batch.commit();
        Ok(())
    }
}

/// Lifecycle coordinator for one component with state `S`.
///
/// Cloning shares the coordinator.
///
/// # Example
///
/// ```rust
/// use futures_util::FutureExt;
/// use sprig_core::mount::MountCoordinator;
/// use sprig_core::reactive::Signal;
///
/// let height = Signal::new(0u32);
/// let viewport = MountCoordinator::builder("viewport", |_token| async { Ok(640u32) })
///     .on_mounted({
///         let height = height.clone();
///         move |h| {
///             height.set(h);
///             || {}
///         }
///     })
///     .build();
///
/// viewport.mount().now_or_never().unwrap().unwrap();
/// assert!(viewport.is_mounted().get());
/// assert_eq!(height.get(), 640);
/// ```
pub struct MountCoordinator<S: 'static> {
    inner: Rc<Inner<S>>,
}

impl<S: 'static> MountCoordinator<S> {
    /// Start configuring a coordinator for the component called `name`.
    ///
    /// `initializer` produces the component's initial state. It receives a
    /// token that reports cancellation, and it is stopped at its next
    /// suspension point when the mount is cancelled.
    pub fn builder<F, Fut>(name: impl Into<String>, initializer: F) -> MountCoordinatorBuilder<S>
    where
        F: Fn(CancelToken) -> Fut + 'static,
        Fut: Future<Output = Result<S>> + 'static,
    {
        MountCoordinatorBuilder {
            name: name.into(),
            initializer: Box::new(move |token| initializer(token).boxed_local()),
            on_mounted: None,
            availability: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Mount the component.
    ///
    /// - Unavailable: resolves to [`Error::NotAvailable`], state untouched.
    /// - Already mounting: resolves to [`Error::ConcurrentCall`] at once,
    ///   state untouched.
    /// - Already mounted: resolves to `Ok(())` without running the
    ///   initializer again.
    ///
    /// Otherwise `is_mounting` is true when this returns and the initializer
    /// runs as the returned future is polled. On success the post-mount hook
    /// receives the state while the mount still holds its slot, then
    /// `is_mounting` and `is_mounted` flip together. On failure the error is
    /// stored in `mount_error` in the same write that clears `is_mounting`.
    /// Cancellation resolves to [`Error::Cancelled`] and stores nothing.
    pub fn mount(&self) -> LocalBoxFuture<'static, Result<()>> {
        let inner = &self.inner;

        if !inner.is_available() {
            warn!(component = %inner.name, "mount is not available");
            let err = Error::not_available(format!("{}.mount", inner.name));
            return future::ready(Err(err)).boxed_local();
        }

        if inner.is_mounted.get_untracked() {
            return future::ready(Ok(())).boxed_local();
        }

        let init = Rc::clone(inner);
        let (operation, slot) = match inner.task.start(move |token| (init.initializer)(token)) {
            Ok(started) => started,
            Err(err) => return future::ready(Err(err)).boxed_local(),
        };
        let inner = Rc::clone(inner);

        async move {
            match operation.await {
                Ok(state) => inner.commit(state, slot),
                Err(err) => Err(slot.fail(err)),
            }
        }
        .boxed_local()
    }

    /// Unmount the component.
    ///
    /// Runs the teardown of the last successful mount, then in one write
    /// cancels an in-flight mount without waiting for it, clears
    /// `mount_error` and forces `is_mounted` to false. Calling it again is a
    /// no-op.
    pub fn unmount(&self) {
        let inner = &self.inner;

        let teardown = inner.teardown.borrow_mut().take();
        if let Some(teardown) = teardown {
            teardown();
        }

        let was_mounted = inner.is_mounted.get_untracked();
        let mut batch = Batch::new();
        inner.task.cancel_into(&mut batch);
        inner.task.clear_error_into(&mut batch);
        batch.set(&inner.is_mounted, false);
        if was_mounted {
            debug!(component = %inner.name, "component unmounted");
        }
        batch.commit();
    }

    /// Capability check for `mount`. Independent of the mount state.
    pub fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    /// Cancel handle of the mount in flight.
    pub fn mount_promise(&self) -> ReadSignal<Option<CancelHandle>> {
        self.inner.task.promise()
    }

    pub fn is_mounting(&self) -> ReadSignal<bool> {
        self.inner.task.is_pending()
    }

    /// Failure of the last mount attempt.
    pub fn mount_error(&self) -> ReadSignal<Option<Error>> {
        self.inner.task.error()
    }

    pub fn is_mounted(&self) -> ReadSignal<bool> {
        self.inner.is_mounted.read_only()
    }

    /// Writable twin of [`MountCoordinator::is_mounted`], for the component's
    /// own use.
    pub fn is_mounted_writer(&self) -> Signal<bool> {
        self.inner.is_mounted.clone()
    }

    pub fn phase(&self) -> Computed<MountPhase> {
        self.inner.phase.clone()
    }
}

impl<S: 'static> Clone for MountCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S: 'static> std::fmt::Debug for MountCoordinator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountCoordinator")
            .field("name", &self.inner.name)
            .field("phase", &self.inner.phase.get_untracked())
            .finish()
    }
}

/// Builder for [`MountCoordinator`].
pub struct MountCoordinatorBuilder<S: 'static> {
    name: String,
    initializer: Initializer<S>,
    on_mounted: Option<MountedHook<S>>,
    availability: Option<Box<dyn Fn() -> bool>>,
}

impl<S: 'static> MountCoordinatorBuilder<S> {
    /// Hook run after a successful mount.
    ///
    /// It receives the initializer's state, commits it and registers
    /// listeners. The closure it returns is run by `unmount` to remove them.
    pub fn on_mounted<F, T>(mut self, hook: F) -> Self
    where
        F: Fn(S) -> T + 'static,
        T: FnOnce() + 'static,
    {
        self.on_mounted = Some(Box::new(move |state| Box::new(hook(state)) as Teardown));
        self
    }

    /// Capability check consulted by `mount` and `is_available`.
    ///
    /// Without one the component is always available.
    pub fn availability<F>(mut self, check: F) -> Self
    where
        F: Fn() -> bool + 'static,
    {
        self.availability = Some(Box::new(check));
        self
    }

    pub fn build(self) -> MountCoordinator<S> {
        let task = NonConcurrent::new(format!("{}.mount", self.name));
        let is_mounted = Signal::new(false);

        let phase = Computed::new({
            let is_mounting = task.is_pending();
            let mount_error = task.error();
            let is_mounted = is_mounted.clone();
            move || {
                MountPhase::from_flags(
                    is_mounting.get(),
                    is_mounted.get(),
                    mount_error.with(Option::is_some),
                )
            }
        });

        MountCoordinator {
            inner: Rc::new(Inner {
                name: self.name,
                task,
                is_mounted,
                phase,
                initializer: self.initializer,
                on_mounted: self.on_mounted,
                availability: self.availability,
                teardown: RefCell::new(None),
            }),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tokio::sync::oneshot;

    /// Host response the test resolves by hand.
    type Pending<S> = Rc<RefCell<Option<oneshot::Receiver<Result<S>>>>>;

    fn gated<S: 'static>(name: &str) -> (MountCoordinatorBuilder<S>, Pending<S>) {
        let pending: Pending<S> = Rc::new(RefCell::new(None));
        let slot = pending.clone();
        let builder = MountCoordinator::builder(name, move |_token| {
            let rx = slot.borrow_mut().take();
            async move {
                match rx {
                    Some(rx) => match rx.await {
                        Ok(outcome) => outcome,
                        Err(closed) => Err(Error::failed(closed)),
                    },
                    None => Err(Error::failed("no response prepared")),
                }
            }
        });
        (builder, pending)
    }

    fn respond<S>(pending: &Pending<S>) -> oneshot::Sender<Result<S>> {
        let (tx, rx) = oneshot::channel();
        *pending.borrow_mut() = Some(rx);
        tx
    }

    #[test]
    fn mount_success_commits_state_and_flags() {
        let committed = Rc::new(Cell::new(0u32));
        let (builder, pending) = gated::<u32>("viewport");
        let viewport = builder
            .on_mounted({
                let committed = committed.clone();
                move |height| {
                    committed.set(height);
                    || {}
                }
            })
            .build();
        let tx = respond(&pending);

        assert_eq!(viewport.phase().get(), MountPhase::Idle);
        let mut op = viewport.mount();
        assert!(viewport.is_mounting().get());
        assert!(!viewport.is_mounted().get());
        assert_eq!(viewport.phase().get(), MountPhase::Mounting);
        assert!((&mut op).now_or_never().is_none());

        tx.send(Ok(480)).unwrap();
        (&mut op).now_or_never().expect("mount finished").unwrap();

        assert_eq!(committed.get(), 480);
        assert!(viewport.is_mounted().get());
        assert!(!viewport.is_mounting().get());
        assert!(viewport.mount_promise().get().is_none());
        assert!(viewport.mount_error().get().is_none());
        assert_eq!(viewport.phase().get(), MountPhase::Mounted);
    }

    #[test]
    fn mounting_and_mounted_never_overlap() {
        let (builder, pending) = gated::<()>("backButton");
        let button = builder.build();
        let overlaps = Rc::new(Cell::new(0));

        let check = {
            let is_mounting = button.is_mounting();
            let is_mounted = button.is_mounted();
            let overlaps = overlaps.clone();
            move || {
                if is_mounting.get_untracked() && is_mounted.get_untracked() {
                    overlaps.set(overlaps.get() + 1);
                }
            }
        };
        let check = Rc::new(check);
        let c1 = check.clone();
        button.is_mounting().sub(move |_| c1());
        let c2 = check.clone();
        button.is_mounted().sub(move |_| c2());

        let tx = respond(&pending);
        let op = button.mount();
        tx.send(Ok(())).unwrap();
        op.now_or_never().expect("mount finished").unwrap();
        button.unmount();

        assert_eq!(overlaps.get(), 0);
    }

    #[test]
    fn failed_mount_stores_error_and_stays_unmounted() {
        let hook_runs = Rc::new(Cell::new(0));
        let (builder, pending) = gated::<u32>("viewport");
        let viewport = builder
            .on_mounted({
                let hook_runs = hook_runs.clone();
                move |_| {
                    hook_runs.set(hook_runs.get() + 1);
                    || {}
                }
            })
            .build();

        let tx = respond(&pending);
        let op = viewport.mount();
        tx.send(Err(Error::failed("viewport request timed out"))).unwrap();
        let err = op.now_or_never().expect("mount finished").unwrap_err();

        assert!(matches!(err, Error::Failed(_)));
        assert_eq!(hook_runs.get(), 0);
        assert!(!viewport.is_mounted().get());
        assert!(!viewport.is_mounting().get());
        assert_eq!(
            viewport.mount_error().get().map(|e| e.to_string()),
            Some("operation failed: viewport request timed out".to_string())
        );
        assert_eq!(viewport.phase().get(), MountPhase::Failed);
    }

    #[test]
    fn retry_after_failure_clears_error() {
        let (builder, pending) = gated::<u32>("viewport");
        let viewport = builder.build();

        let tx = respond(&pending);
        let op = viewport.mount();
        tx.send(Err(Error::failed("first attempt"))).unwrap();
        let _ = op.now_or_never();
        assert!(viewport.mount_error().get().is_some());

        let tx = respond(&pending);
        let op = viewport.mount();
        assert!(viewport.mount_error().get().is_none());
        tx.send(Ok(1)).unwrap();
        op.now_or_never().expect("mount finished").unwrap();
        assert_eq!(viewport.phase().get(), MountPhase::Mounted);
    }

    #[test]
    fn mount_while_mounted_is_a_no_op() {
        let calls = Rc::new(Cell::new(0));
        let viewport = MountCoordinator::builder("viewport", {
            let calls = calls.clone();
            move |_token| {
                calls.set(calls.get() + 1);
                async { Ok(()) }
            }
        })
        .build();

        viewport.mount().now_or_never().unwrap().unwrap();
        viewport.mount().now_or_never().unwrap().unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn unavailable_component_refuses_to_mount() {
        let supported = Rc::new(Cell::new(false));
        let viewport = MountCoordinator::builder("viewport", |_token| async { Ok(()) })
            .availability({
                let supported = supported.clone();
                move || supported.get()
            })
            .build();

        assert!(!viewport.is_available());
        let err = viewport.mount().now_or_never().unwrap().unwrap_err();
        assert!(matches!(err, Error::NotAvailable { .. }));
        assert!(viewport.mount_error().get().is_none());
        assert_eq!(viewport.phase().get(), MountPhase::Idle);

        supported.set(true);
        assert!(viewport.is_available());
        viewport.mount().now_or_never().unwrap().unwrap();
        assert!(viewport.is_mounted().get());
    }

    #[test]
    fn unmount_runs_teardown_once() {
        let teardowns = Rc::new(Cell::new(0));
        let viewport = MountCoordinator::builder("viewport", |_token| async { Ok(()) })
            .on_mounted({
                let teardowns = teardowns.clone();
                move |()| {
                    let teardowns = teardowns.clone();
                    move || teardowns.set(teardowns.get() + 1)
                }
            })
            .build();

        viewport.mount().now_or_never().unwrap().unwrap();
        viewport.unmount();
        viewport.unmount();

        assert_eq!(teardowns.get(), 1);
        assert!(!viewport.is_mounted().get());
        assert_eq!(viewport.phase().get(), MountPhase::Idle);
    }

    #[test]
    fn unmount_after_failure_resets_to_idle() {
        let viewport =
            MountCoordinator::builder("viewport", |_token| async { Err::<(), _>(Error::failed("x")) })
                .build();

        let _ = viewport.mount().now_or_never();
        assert_eq!(viewport.phase().get(), MountPhase::Failed);

        viewport.unmount();
        assert!(viewport.mount_error().get().is_none());
        assert_eq!(viewport.phase().get(), MountPhase::Idle);
    }

    #[test]
    fn writer_twin_drives_public_flag() {
        let viewport = MountCoordinator::builder("viewport", |_token| async { Ok(()) }).build();
        viewport.is_mounted_writer().set(true);
        assert!(viewport.is_mounted().get());
        assert_eq!(viewport.phase().get(), MountPhase::Mounted);
    }

    fn phase_log(component: &MountCoordinator<u32>) -> Rc<RefCell<Vec<MountPhase>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = log.clone();
        component.phase().sub(move |phase| log_clone.borrow_mut().push(*phase));
        log
    }

    #[test]
    fn successful_mount_goes_straight_to_mounted() {
        let (builder, pending) = gated::<u32>("viewport");
        let viewport = builder.build();
        let phases = phase_log(&viewport);

        let tx = respond(&pending);
        let op = viewport.mount();
        tx.send(Ok(640)).unwrap();
        op.now_or_never().expect("mount finished").unwrap();
        viewport.unmount();

        assert_eq!(
            *phases.borrow(),
            vec![MountPhase::Mounting, MountPhase::Mounted, MountPhase::Idle]
        );
    }

    #[test]
    fn failed_mount_goes_straight_to_failed() {
        let (builder, pending) = gated::<u32>("viewport");
        let viewport = builder.build();
        let phases = phase_log(&viewport);

        let tx = respond(&pending);
        let op = viewport.mount();
        tx.send(Err(Error::failed("host unreachable"))).unwrap();
        let _ = op.now_or_never().expect("mount finished");
        viewport.unmount();

        assert_eq!(
            *phases.borrow(),
            vec![MountPhase::Mounting, MountPhase::Failed, MountPhase::Idle]
        );
    }

    #[test]
    fn is_mounting_subscriber_sees_mount_completed() {
        let calls = Rc::new(Cell::new(0));
        let viewport = MountCoordinator::builder("viewport", {
            let calls = calls.clone();
            move |_token| {
                calls.set(calls.get() + 1);
                async { Ok(()) }
            }
        })
        .build();

        let remounts = Rc::new(Cell::new(0));
        let overlaps = Rc::new(Cell::new(0));
        {
            let component = viewport.clone();
            let (remounts, overlaps) = (remounts.clone(), overlaps.clone());
            viewport.is_mounting().sub(move |mounting| {
                let mounted = component.is_mounted().get_untracked();
                if *mounting && mounted {
                    overlaps.set(overlaps.get() + 1);
                }
                if !*mounting && !mounted {
                    remounts.set(remounts.get() + 1);
                    let _ = component.mount();
                }
            });
        }

        viewport.mount().now_or_never().expect("mount finished").unwrap();

        assert_eq!(calls.get(), 1);
        assert_eq!(remounts.get(), 0);
        assert_eq!(overlaps.get(), 0);
        assert!(viewport.is_mounted().get());
        assert!(!viewport.is_mounting().get());
        assert!(viewport.mount_promise().get().is_none());
    }

    #[test]
    fn retry_from_is_mounting_subscriber_keeps_error_cleared() {
        let (builder, pending) = gated::<u32>("viewport");
        let viewport = builder.build();
        let retry = Rc::new(RefCell::new(None));

        {
            let component = viewport.clone();
            let retry = retry.clone();
            viewport.is_mounting().sub(move |mounting| {
                let failed = component.mount_error().get_untracked().is_some();
                if !*mounting && failed && retry.borrow().is_none() {
                    *retry.borrow_mut() = Some(component.mount());
                }
            });
        }

        let tx = respond(&pending);
        let op = viewport.mount();
        tx.send(Err(Error::failed("first attempt"))).unwrap();
        let err = op.now_or_never().expect("mount finished").unwrap_err();
        assert!(matches!(err, Error::Failed(_)));

        assert!(viewport.is_mounting().get());
        assert!(viewport.mount_error().get().is_none());

        let tx = respond(&pending);
        tx.send(Ok(320)).unwrap();
        let retried = retry.borrow_mut().take().expect("retry started");
        retried.now_or_never().expect("retry finished").unwrap();

        assert!(viewport.is_mounted().get());
        assert!(viewport.mount_error().get().is_none());
        assert_eq!(viewport.phase().get(), MountPhase::Mounted);
    }

    #[test]
    fn unmount_from_hook_discards_the_mount() {
        let teardowns = Rc::new(Cell::new(0));
        let handle: Rc<RefCell<Option<MountCoordinator<()>>>> = Rc::new(RefCell::new(None));

        let viewport = MountCoordinator::builder("viewport", |_token| async { Ok(()) })
            .on_mounted({
                let (teardowns, handle) = (teardowns.clone(), handle.clone());
                move |()| {
                    if let Some(component) = handle.borrow().as_ref() {
                        component.unmount();
                    }
                    let teardowns = teardowns.clone();
                    move || teardowns.set(teardowns.get() + 1)
                }
            })
            .build();
        *handle.borrow_mut() = Some(viewport.clone());

        let err = viewport.mount().now_or_never().expect("mount finished").unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(teardowns.get(), 1);
        assert!(!viewport.is_mounted().get());
        assert!(!viewport.is_mounting().get());
        assert!(viewport.mount_error().get().is_none());
        assert_eq!(viewport.phase().get(), MountPhase::Idle);

        viewport.unmount();
        assert_eq!(teardowns.get(), 1);
    }
}
