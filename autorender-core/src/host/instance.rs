//! Component instances and their hook state.
//!
//! Every mounted component node owns an [`Instance`]. The instance keeps the
//! hook slots that survive between renders, the effects waiting for the end
//! of the current render, the cleanups to run on unmount, and the subtree it
//! rendered last.
//!
//! While an instance renders, a thread-local cursor points at it so hook
//! functions can find their slot. Slots are addressed by call order, which
//! is why hooks must run in the same order on every render.

use std::any::Any;
use std::borrow::Cow;
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::error::Result;
use crate::render::{Component, Node, Props};

pub(crate) type Cleanup = Box<dyn FnOnce() + Send>;
pub(crate) type MountEffect = Box<dyn FnOnce() -> Cleanup + Send>;

/// Identity of a mounted component instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// The host-side tree that mirrors the last rendered nodes.
pub(crate) enum Mounted {
    Element {
        tag: Cow<'static, str>,
        props: Props,
        children: Vec<Mounted>,
    },
    Text(String),
    Component(Arc<Instance>),
    Empty,
}

/// Instances waiting to be re-rendered.
#[derive(Default)]
pub(crate) struct RenderQueue {
    pending: Mutex<IndexMap<InstanceId, Weak<Instance>>>,
    requests: AtomicUsize,
}

impl RenderQueue {
    pub(crate) fn note_request(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Queue an instance. Queuing one that is already pending is a no-op.
    pub(crate) fn enqueue(&self, instance: &Arc<Instance>) {
        self.pending
            .lock()
            .entry(instance.id)
            .or_insert_with(|| Arc::downgrade(instance));
    }

    pub(crate) fn remove(&self, id: InstanceId) {
        self.pending.lock().shift_remove(&id);
    }

    pub(crate) fn drain(&self) -> Vec<Weak<Instance>> {
        self.pending.lock().drain(..).map(|(_, weak)| weak).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.lock().len()
    }
}

pub(crate) struct Instance {
    id: InstanceId,
    component: Component,
    props: Mutex<Props>,
    slots: Mutex<Vec<Box<dyn Any + Send>>>,
    effects: Mutex<Vec<MountEffect>>,
    cleanups: Mutex<Vec<Cleanup>>,
    rendered: Mutex<Option<Mounted>>,
    mounted: AtomicBool,
    render_count: AtomicUsize,
    queue: Arc<RenderQueue>,
}

impl Instance {
    pub(crate) fn new(component: Component, props: Props, queue: Arc<RenderQueue>) -> Arc<Self> {
        Arc::new(Self {
            id: InstanceId::next(),
            component,
            props: Mutex::new(props),
            slots: Mutex::new(Vec::new()),
            effects: Mutex::new(Vec::new()),
            cleanups: Mutex::new(Vec::new()),
            rendered: Mutex::new(None),
            mounted: AtomicBool::new(true),
            render_count: AtomicUsize::new(0),
            queue,
        })
    }

    pub(crate) fn id(&self) -> InstanceId {
        self.id
    }

    pub(crate) fn component(&self) -> &Component {
        &self.component
    }

    pub(crate) fn queue(&self) -> &Arc<RenderQueue> {
        &self.queue
    }

    pub(crate) fn set_props(&self, props: Props) {
        *self.props.lock() = props;
    }

    pub(crate) fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    pub(crate) fn render_count(&self) -> usize {
        self.render_count.load(Ordering::SeqCst)
    }

    /// Run the component's render function with this instance's hooks.
    pub(crate) fn render(self: &Arc<Self>) -> Result<Node> {
        let props = self.props.lock().clone();
        let output = {
            let _scope = HookScope::enter(Arc::clone(self));
            self.component.render(&props)
        };
        self.render_count.fetch_add(1, Ordering::SeqCst);
        output
    }

    pub(crate) fn take_rendered(&self) -> Option<Mounted> {
        self.rendered.lock().take()
    }

    pub(crate) fn set_rendered(&self, mounted: Mounted) {
        *self.rendered.lock() = Some(mounted);
    }

    pub(crate) fn with_rendered<U>(&self, f: impl FnOnce(Option<&Mounted>) -> U) -> U {
        f(self.rendered.lock().as_ref())
    }

    /// Access hook slot `index`, creating it with `init` on first use.
    ///
    /// The slot is taken out while `f` runs, so `f` may call further hooks.
    ///
    /// # Panics
    ///
    /// If the slot holds a different type than on an earlier render, or if
    /// `init` itself calls hooks.
    pub(crate) fn with_slot<T, U>(
        &self,
        index: usize,
        init: impl FnOnce() -> T,
        f: impl FnOnce(&mut T) -> U,
    ) -> U
    where
        T: Send + 'static,
    {
        let existing = self
            .slots
            .lock()
            .get_mut(index)
            .map(|slot| std::mem::replace(slot, vacant_slot()));

        let mut slot: Box<dyn Any + Send> = match existing {
            Some(slot) => slot,
            None => {
                let value = init();
                let mut slots = self.slots.lock();
                assert_eq!(
                    slots.len(),
                    index,
                    "hooks must not be called while a hook slot is being initialized"
                );
                slots.push(vacant_slot());
                Box::new(value)
            }
        };

        let output = f(downcast_slot(&mut slot, index));
        self.slots.lock()[index] = slot;
        output
    }

    pub(crate) fn queue_effect(&self, effect: MountEffect) {
        self.effects.lock().push(effect);
    }

    /// Run the effects queued by the render that just finished.
    pub(crate) fn run_effects(&self) {
        let effects = std::mem::take(&mut *self.effects.lock());
        for effect in effects {
            let cleanup = effect();
            self.cleanups.lock().push(cleanup);
        }
    }

    /// Mark unmounted and run every cleanup, once.
    pub(crate) fn teardown(&self) {
        if !self.mounted.swap(false, Ordering::SeqCst) {
            return;
        }
        self.queue.remove(self.id);
        self.effects.lock().clear();

        let cleanups = std::mem::take(&mut *self.cleanups.lock());
        for cleanup in cleanups {
            cleanup();
        }
    }
}

fn vacant_slot() -> Box<dyn Any + Send> {
    Box::new(())
}

fn downcast_slot<T: 'static>(slot: &mut Box<dyn Any + Send>, index: usize) -> &mut T {
    match slot.downcast_mut::<T>() {
        Some(value) => value,
        None => panic!(
            "hook slot {index} changed type between renders; hooks must be called in the same order every render"
        ),
    }
}

struct Cursor {
    instance: Arc<Instance>,
    next: usize,
}

thread_local! {
    static CURRENT: RefCell<Option<Cursor>> = const { RefCell::new(None) };
}

/// Makes an instance the target of hook calls until dropped.
pub(crate) struct HookScope {
    previous: Option<Cursor>,
}

impl HookScope {
    pub(crate) fn enter(instance: Arc<Instance>) -> Self {
        let previous = CURRENT.with(|current| {
            current
                .borrow_mut()
                .replace(Cursor { instance, next: 0 })
        });
        Self { previous }
    }

    /// The rendering instance and the index of the next hook slot.
    pub(crate) fn next_slot() -> Option<(Arc<Instance>, usize)> {
        CURRENT.with(|current| {
            let mut current = current.borrow_mut();
            let cursor = current.as_mut()?;
            let index = cursor.next;
            cursor.next += 1;
            Some((Arc::clone(&cursor.instance), index))
        })
    }

    pub(crate) fn current_instance() -> Option<Arc<Instance>> {
        CURRENT.with(|current| {
            current
                .borrow()
                .as_ref()
                .map(|cursor| Arc::clone(&cursor.instance))
        })
    }
}

impl Drop for HookScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}
