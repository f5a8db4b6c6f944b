//! Component-local reactive state.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::host::use_hook;
use crate::reactive::{untrack, ReactiveObject};

/// Anything that can seed [`use_reactive_state`].
pub trait InitialState {
    fn into_reactive(self) -> Result<ReactiveObject>;
}

impl InitialState for ReactiveObject {
    fn into_reactive(self) -> Result<ReactiveObject> {
        Ok(self)
    }
}

impl InitialState for Value {
    fn into_reactive(self) -> Result<ReactiveObject> {
        ReactiveObject::from_value(self)
    }
}

impl InitialState for Map<String, Value> {
    fn into_reactive(self) -> Result<ReactiveObject> {
        Ok(ReactiveObject::from_map(self))
    }
}

/// Lazy initializer; only called on the instance's first render.
impl<F, S> InitialState for F
where
    F: FnOnce() -> S,
    S: InitialState,
{
    fn into_reactive(self) -> Result<ReactiveObject> {
        self().into_reactive()
    }
}

/// A reactive object owned by the rendering component instance.
///
/// The first render builds the object from `initial`; every later render of
/// the same instance returns that same object and ignores `initial`. Reads
/// made while building it are not tracked.
///
/// # Panics
///
/// When called outside a component render.
pub fn use_reactive_state<S: InitialState>(initial: S) -> Result<ReactiveObject> {
    let slot: Arc<Mutex<Option<ReactiveObject>>> =
        use_hook(|| Arc::new(Mutex::new(None)), |slot| Arc::clone(slot));

    let mut state = slot.lock();
    if let Some(existing) = state.as_ref() {
        return Ok(existing.clone());
    }

    let created = untrack(|| initial.into_reactive())?;
    *state = Some(created.clone());
    Ok(created)
}
