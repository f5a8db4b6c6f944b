//! Observer Implementation
//!
//! An Observer is a function whose reactive reads are tracked. Every run
//! records the properties read; when one of them is later written, the
//! observer reacts.
//!
//! # How Observers React
//!
//! - With a scheduler, a change only calls the scheduler. The observer is
//!   never re-run by the engine; whoever owns the scheduler decides when to
//!   run it again. Render wrappers always work this way, which keeps writes
//!   from re-entering a render pass.
//!
//! - Without a scheduler (only for zero-argument observers created through
//!   [`observe`]), a change re-runs the observer immediately, unless it is
//!   the observer's own run that performed the write.
//!
//! # Subscription Updates
//!
//! Reads are collected in a [`ReactiveContext`] and handed to the runtime
//! once the function returns, replacing the previous set in one step. If
//! the function panics, the context is popped and the previous set stays
//! in place.
//!
//! # Disposal
//!
//! [`unobserve`] unregisters the observer. It is idempotent, and no change
//! reaches a disposed observer afterwards.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{trace, warn};

use super::context::ReactiveContext;
use super::runtime::{Reaction, ReactionHandle, Runtime};
use super::subscriber::SubscriberId;
use crate::error::{Error, Result};

/// Callback fired when a tracked property changes.
pub type Scheduler = Arc<dyn Fn() + Send + Sync>;

/// Options for [`observe`].
#[derive(Clone, Default)]
pub struct ObserveOptions {
    scheduler: Option<Scheduler>,
    lazy: bool,
}

impl ObserveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `scheduler` on change instead of re-running the observer.
    pub fn scheduler<F>(mut self, scheduler: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }

    /// Do not run the observer on creation.
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }
}

impl fmt::Debug for ObserveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserveOptions")
            .field("scheduler", &self.scheduler.is_some())
            .field("lazy", &self.lazy)
            .finish()
    }
}

/// Lifecycle of an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverState {
    /// Created but never run.
    Created,
    /// Ran at least once and still subscribed.
    Active,
    /// Disposed; will never run or react again.
    Disposed,
}

enum OnChange {
    Schedule(Scheduler),
    Rerun(Box<dyn Fn() + Send + Sync>),
}

struct ObserverInner<P, R> {
    subscriber_id: SubscriberId,
    run: Box<dyn Fn(&P) -> R + Send + Sync>,
    on_change: OnChange,
    state: Mutex<ObserverState>,
    handle: Mutex<Option<ReactionHandle>>,
    running: AtomicBool,
    run_count: AtomicUsize,
}

impl<P: 'static, R: 'static> Reaction for ObserverInner<P, R> {
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn react(&self) {
        if *self.state.lock() == ObserverState::Disposed {
            return;
        }

        match &self.on_change {
            OnChange::Schedule(scheduler) => {
                trace!(subscriber_id = ?self.subscriber_id, "scheduler fired");
                scheduler();
            }
            OnChange::Rerun(rerun) => {
                if self.running.load(Ordering::SeqCst) {
                    return;
                }
                rerun();
            }
        }
    }
}

/// A tracked function.
///
/// Clones share the same subscriptions and lifecycle.
pub struct Observer<P, R> {
    inner: Arc<ObserverInner<P, R>>,
}

/// Create a tracked render function.
///
/// The observer is lazy: nothing runs until [`Observer::run`] is called.
/// After each run, a write to any property read during that run calls
/// `scheduler`.
pub fn observe_render<P, R, F, S>(render: F, scheduler: S) -> Observer<P, R>
where
    P: 'static,
    R: 'static,
    F: Fn(&P) -> R + Send + Sync + 'static,
    S: Fn() + Send + Sync + 'static,
{
    Observer::from_parts(Box::new(render), |_| {
        OnChange::Schedule(Arc::new(scheduler))
    })
}

/// Create a tracked reaction.
///
/// Unless `options` make it lazy, it runs once right away. Without a
/// scheduler it re-runs itself whenever a property it read changes.
pub fn observe<R, F>(f: F, options: ObserveOptions) -> Observer<(), R>
where
    R: 'static,
    F: Fn() -> R + Send + Sync + 'static,
{
    let ObserveOptions { scheduler, lazy } = options;

    let observer = Observer::from_parts(Box::new(move |_: &()| f()), |weak| match scheduler {
        Some(scheduler) => OnChange::Schedule(scheduler),
        None => OnChange::Rerun(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                // A rerun can only fail if the observer was disposed.
                let _ = Observer { inner }.run(&());
            }
        })),
    });

    if !lazy {
        // Freshly created, cannot be disposed yet.
        let _ = observer.run(&());
    }
    observer
}

/// Dispose an observer. See [`Observer::dispose`].
pub fn unobserve<P: 'static, R: 'static>(observer: &Observer<P, R>) {
    observer.dispose();
}

impl<P: 'static, R: 'static> Observer<P, R> {
    fn from_parts(
        run: Box<dyn Fn(&P) -> R + Send + Sync>,
        on_change: impl FnOnce(Weak<ObserverInner<P, R>>) -> OnChange,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak| ObserverInner {
            subscriber_id: SubscriberId::new(),
            run,
            on_change: on_change(weak.clone()),
            state: Mutex::new(ObserverState::Created),
            handle: Mutex::new(None),
            running: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
        });

        let reaction: Arc<dyn Reaction> = inner.clone();
        *inner.handle.lock() = Some(Runtime::register(&reaction));

        Self { inner }
    }

    /// Run the function, tracking its reads.
    ///
    /// On success the subscription set becomes exactly the properties read
    /// by this run. Running a disposed observer does nothing and returns
    /// [`Error::Disposed`].
    pub fn run(&self, props: &P) -> Result<R> {
        let inner = &self.inner;
        if self.is_disposed() {
            warn!(subscriber_id = ?inner.subscriber_id, "ignoring run of a disposed observer");
            return Err(Error::Disposed(inner.subscriber_id));
        }

        let was_running = inner.running.swap(true, Ordering::SeqCst);
        let _running = RunningGuard {
            flag: &inner.running,
            restore: was_running,
        };

        let (output, dependencies) = {
            let ctx = ReactiveContext::enter(inner.subscriber_id);
            let output = (inner.run)(props);
            (output, ctx.take_dependencies())
        };

        Runtime::replace_dependencies(inner.subscriber_id, dependencies);
        inner.run_count.fetch_add(1, Ordering::SeqCst);

        let mut state = inner.state.lock();
        if *state == ObserverState::Created {
            *state = ObserverState::Active;
        }

        Ok(output)
    }

    /// Remove all subscriptions and stop reacting. Safe to call repeatedly.
    pub fn dispose(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state == ObserverState::Disposed {
                return;
            }
            *state = ObserverState::Disposed;
        }

        // Dropping the handle unregisters and clears the dependencies.
        let handle = self.inner.handle.lock().take();
        drop(handle);
        trace!(subscriber_id = ?self.inner.subscriber_id, "observer disposed");
    }
}

impl<P, R> Observer<P, R> {
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    pub fn state(&self) -> ObserverState {
        *self.inner.state.lock()
    }

    pub fn is_disposed(&self) -> bool {
        self.state() == ObserverState::Disposed
    }

    /// Number of completed runs.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Number of properties in the current subscription set.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependencies_of(self.inner.subscriber_id).len()
    }

    /// Whether both handles refer to the same observer.
    pub fn ptr_eq(&self, other: &Observer<P, R>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

struct RunningGuard<'a> {
    flag: &'a AtomicBool,
    restore: bool,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(self.restore, Ordering::SeqCst);
    }
}

impl<P, R> Clone for Observer<P, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, R> fmt::Debug for Observer<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("subscriber_id", &self.inner.subscriber_id)
            .field("state", &self.state())
            .field("run_count", &self.run_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
