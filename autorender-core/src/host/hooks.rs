//! Per-instance hook primitives.
//!
//! These are the host-side building blocks components use to keep state
//! between renders:
//!
//! - [`use_state`]: a value plus a setter that queues a re-render on change;
//! - [`use_rerender`]: a handle that always queues a re-render;
//! - [`use_memo`]: a value recomputed only when its dependencies change;
//! - [`use_effect_once`]: setup after the first render, cleanup on unmount.
//!
//! All hooks address their slot by call order.
//!
//! # Panics
//!
//! Every hook panics when called outside a component render, or when the
//! hooks of a component are called in a different order than on its
//! previous render.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use super::instance::{Cleanup, HookScope, Instance, RenderQueue};

fn rendering() -> (Arc<Instance>, usize) {
    match HookScope::next_slot() {
        Some(slot) => slot,
        None => panic!("hooks can only be called while a component is rendering"),
    }
}

/// Access the next hook slot of the rendering instance.
///
/// `init` creates the slot on the first render and may not call other
/// hooks. `f` runs on every render.
pub fn use_hook<T, U>(init: impl FnOnce() -> T, f: impl FnOnce(&mut T) -> U) -> U
where
    T: Send + 'static,
{
    let (instance, index) = rendering();
    instance.with_slot(index, init, f)
}

#[derive(Clone)]
struct RerenderTarget {
    instance: Weak<Instance>,
    queue: Arc<RenderQueue>,
}

impl RerenderTarget {
    fn current(instance: &Arc<Instance>) -> Self {
        Self {
            instance: Arc::downgrade(instance),
            queue: Arc::clone(instance.queue()),
        }
    }

    fn request(&self) {
        self.queue.note_request();
        match self.instance.upgrade() {
            Some(instance) if instance.is_mounted() => {
                trace!(instance = ?instance.id(), "re-render requested");
                self.queue.enqueue(&instance);
            }
            _ => trace!("re-render requested for an unmounted instance"),
        }
    }
}

/// Setter returned by [`use_state`].
pub struct SetState<T> {
    value: Arc<Mutex<T>>,
    target: RerenderTarget,
}

impl<T: PartialEq> SetState<T> {
    /// Store `value` and queue a re-render if it differs from the current one.
    pub fn set(&self, value: T) {
        {
            let mut current = self.value.lock();
            if *current == value {
                return;
            }
            *current = value;
        }
        self.target.request();
    }

    /// Compute the next value from the current one, then [`set`](Self::set) it.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.value.lock());
        self.set(next);
    }
}

impl<T> Clone for SetState<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            target: self.target.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for SetState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetState")
            .field("value", &*self.value.lock())
            .finish()
    }
}

/// State that survives re-renders.
///
/// Returns the current value and a setter. Setting a different value queues
/// a re-render of this instance.
pub fn use_state<T>(init: impl FnOnce() -> T) -> (T, SetState<T>)
where
    T: Clone + PartialEq + Send + 'static,
{
    let (instance, index) = rendering();
    let value = instance.with_slot(index, || Arc::new(Mutex::new(init())), |slot| Arc::clone(slot));
    let current = value.lock().clone();

    (
        current,
        SetState {
            value,
            target: RerenderTarget::current(&instance),
        },
    )
}

/// Handle that queues a re-render of the instance that created it.
#[derive(Clone, Debug)]
pub struct RerenderHandle {
    generation: SetState<u64>,
}

impl RerenderHandle {
    /// Queue a re-render. Every call counts as a change; the queue
    /// coalesces repeated requests before the next flush.
    pub fn request(&self) {
        self.generation.update(|generation| generation.wrapping_add(1));
    }
}

/// Obtain this instance's re-render handle.
pub fn use_rerender() -> RerenderHandle {
    let (_, generation) = use_state(|| 0u64);
    RerenderHandle { generation }
}

/// Compute a value once per distinct `deps`.
///
/// `compute` may call hooks only if it does so on every render.
pub fn use_memo<D, T>(deps: D, compute: impl FnOnce(&D) -> T) -> T
where
    D: PartialEq + Send + 'static,
    T: Clone + Send + 'static,
{
    let slot: Arc<Mutex<Option<(D, T)>>> = use_hook(|| Arc::new(Mutex::new(None)), |slot| Arc::clone(slot));
    let mut cached = slot.lock();

    if let Some((previous, value)) = cached.as_ref() {
        if *previous == deps {
            return value.clone();
        }
    }

    let value = compute(&deps);
    *cached = Some((deps, value.clone()));
    value
}

/// Run `setup` once, after this instance's first render; run the cleanup it
/// returns once, when the instance unmounts.
pub fn use_effect_once<S, C>(setup: S)
where
    S: FnOnce() -> C + Send + 'static,
    C: FnOnce() + Send + 'static,
{
    let (instance, index) = rendering();
    let first = instance.with_slot(index, || false, |registered| !std::mem::replace(registered, true));

    if first {
        instance.queue_effect(Box::new(move || -> Cleanup { Box::new(setup()) }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{Component, Node, Props};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn instance() -> Arc<Instance> {
        let component = Component::named("Probe", |_: &Props| Ok(Node::empty()));
        Instance::new(component, Props::new(), Arc::new(RenderQueue::default()))
    }

    fn render_with<U>(instance: &Arc<Instance>, f: impl FnOnce() -> U) -> U {
        let _scope = HookScope::enter(instance.clone());
        f()
    }

    #[test]
    #[should_panic(expected = "while a component is rendering")]
    fn hooks_outside_render_panic() {
        use_state(|| 0);
    }

    #[test]
    fn state_persists_and_queues_on_change() {
        let instance = instance();

        let (value, set) = render_with(&instance, || use_state(|| 1));
        assert_eq!(value, 1);
        assert_eq!(instance.queue().len(), 0);

        set.set(1);
        assert_eq!(instance.queue().len(), 0);

        set.set(2);
        assert_eq!(instance.queue().len(), 1);

        let (value, _) = render_with(&instance, || use_state(|| 100));
        assert_eq!(value, 2);
    }

    #[test]
    fn rerender_handle_always_requests() {
        let instance = instance();
        let handle = render_with(&instance, use_rerender);

        handle.request();
        handle.request();

        assert_eq!(instance.queue().requests(), 2);
        assert_eq!(instance.queue().len(), 1);
    }

    #[test]
    fn requests_after_teardown_are_not_queued() {
        let instance = instance();
        let handle = render_with(&instance, use_rerender);

        instance.teardown();
        handle.request();

        assert_eq!(instance.queue().len(), 0);
    }

    #[test]
    fn memo_recomputes_only_on_new_deps() {
        let instance = instance();
        let computed = AtomicUsize::new(0);
        let compute = |deps: &u32| {
            computed.fetch_add(1, Ordering::SeqCst);
            deps * 10
        };

        assert_eq!(render_with(&instance, || use_memo(1u32, compute)), 10);
        assert_eq!(render_with(&instance, || use_memo(1u32, compute)), 10);
        assert_eq!(render_with(&instance, || use_memo(2u32, compute)), 20);
        assert_eq!(computed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn effect_once_registers_a_single_cleanup() {
        let instance = instance();
        let setups = Arc::new(AtomicUsize::new(0));
        let cleanups = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let setups = setups.clone();
            let cleanups = cleanups.clone();
            render_with(&instance, || {
                use_effect_once(move || {
                    setups.fetch_add(1, Ordering::SeqCst);
                    move || {
                        cleanups.fetch_add(1, Ordering::SeqCst);
                    }
                })
            });
            instance.run_effects();
        }

        assert_eq!(setups.load(Ordering::SeqCst), 1);
        assert_eq!(cleanups.load(Ordering::SeqCst), 0);

        instance.teardown();
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }
}
