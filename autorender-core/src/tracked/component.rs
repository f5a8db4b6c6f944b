//! Per-instance tracked rendering.
//!
//! [`track_component`] wraps a component so that every mounted instance of
//! it renders inside its own lazy observer. The observer is created on the
//! instance's first render, reused on every later render, and disposed when
//! the instance unmounts. Its scheduler only asks the host for a re-render
//! of that one instance.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::Result;
use crate::host::{use_effect_once, use_hook, use_rerender, RerenderHandle};
use crate::reactive::{observe_render, Observer};
use crate::render::{Component, ComponentId, Node, Props};

type TrackedRender = Observer<Props, Result<Node>>;

/// One instance's observer, keyed by the component it tracks.
#[derive(Default)]
struct TrackedSlot {
    entry: Option<(ComponentId, TrackedRender)>,
}

impl TrackedSlot {
    fn observer_for(&mut self, raw: &Component, rerender: RerenderHandle) -> TrackedRender {
        if let Some((key, observer)) = &self.entry {
            if *key == raw.id() {
                return observer.clone();
            }
        }
        self.release();

        let source = raw.clone();
        let observer = observe_render(
            move |props: &Props| source.render(props),
            move || rerender.request(),
        );
        trace!(
            name = ?raw.display_name(),
            subscriber_id = ?observer.subscriber_id(),
            "tracked render created"
        );
        self.entry = Some((raw.id(), observer.clone()));
        observer
    }

    fn release(&mut self) {
        if let Some((_, observer)) = self.entry.take() {
            observer.dispose();
        }
    }
}

/// Wrap `raw` in a component whose instances re-render when the reactive
/// properties they read change.
///
/// The wrapper keeps `raw`'s display name. Wrapping a wrapper returns it
/// unchanged.
pub fn track_component(raw: &Component) -> Component {
    if raw.is_tracked() {
        return raw.clone();
    }

    let source = raw.clone();
    Component::tracked(raw.display_name_cow(), move |props: &Props| {
        render_tracked(&source, props)
    })
}

fn render_tracked(raw: &Component, props: &Props) -> Result<Node> {
    let rerender = use_rerender();
    let slot: Arc<Mutex<TrackedSlot>> = use_hook(
        || Arc::new(Mutex::new(TrackedSlot::default())),
        |slot| Arc::clone(slot),
    );

    let observer = slot.lock().observer_for(raw, rerender);

    let teardown = Arc::clone(&slot);
    use_effect_once(move || move || teardown.lock().release());

    observer.run(props)?
}
