//! The host renderer.
//!
//! [`Renderer`] turns a root [`Node`] into a tree of mounted elements and
//! component instances, re-renders queued instances on [`Renderer::flush`],
//! and tears everything down on unmount.
//!
//! Reconciliation is positional: an element keeps its mounted children when
//! it is re-rendered with the same tag, and a component node keeps its
//! instance when it is re-rendered with the same component. Anything else is
//! unmounted and mounted fresh.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace};

use super::instance::{Instance, Mounted, RenderQueue};
use crate::config::RendererConfig;
use crate::error::{Error, Result};
use crate::render::{Node, NodeType, Props};

/// The resolved output of a render: elements and text only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Element {
        tag: String,
        props: Props,
        children: Vec<View>,
    },
    Text(String),
    Empty,
}

impl View {
    /// Concatenated text of this view and its descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            View::Element { children, .. } => {
                for child in children {
                    child.collect_text(out);
                }
            }
            View::Text(text) => out.push_str(text),
            View::Empty => {}
        }
    }
}

/// Mounts render trees and keeps them up to date.
pub struct Renderer {
    config: RendererConfig,
    queue: Arc<RenderQueue>,
    root: Option<Mounted>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::with_config(RendererConfig::default())
    }

    pub fn with_config(config: RendererConfig) -> Self {
        Self {
            config,
            queue: Arc::new(RenderQueue::default()),
            root: None,
        }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Render `node` as the root, patching the current root if there is one.
    pub fn render(&mut self, node: Node) -> Result<()> {
        let mounted = match self.root.take() {
            Some(previous) => self.patch(previous, node)?,
            None => self.mount(node)?,
        };
        self.root = Some(mounted);
        Ok(())
    }

    /// Re-render queued instances until the queue is empty.
    ///
    /// Returns the number of instance renders performed. If a render fails,
    /// its error is returned and the instances not yet rendered stay queued.
    pub fn flush(&mut self) -> Result<usize> {
        let mut rendered = 0;

        for pass in 0..self.config.max_flush_passes {
            // Paired with the render count at drain time, so an instance
            // already re-rendered by an ancestor in this pass is skipped.
            let batch: Vec<(Arc<Instance>, usize)> = self
                .queue
                .drain()
                .into_iter()
                .filter_map(|weak| weak.upgrade())
                .map(|instance| {
                    let seen = instance.render_count();
                    (instance, seen)
                })
                .collect();
            if batch.is_empty() {
                if rendered > 0 {
                    debug!(rendered, passes = pass, "flush complete");
                }
                return Ok(rendered);
            }

            let mut batch = batch.into_iter();
            while let Some((instance, seen)) = batch.next() {
                if !is_stale(&instance, seen) {
                    continue;
                }
                if let Err(err) = self.render_instance(&instance) {
                    for (rest, seen) in batch {
                        if is_stale(&rest, seen) {
                            self.queue.enqueue(&rest);
                        }
                    }
                    return Err(err);
                }
                rendered += 1;
            }
        }

        if self.queue.len() == 0 {
            return Ok(rendered);
        }
        Err(Error::FlushLimitExceeded {
            passes: self.config.max_flush_passes,
        })
    }

    /// Unmount the whole tree.
    pub fn unmount(&mut self) {
        if let Some(root) = self.root.take() {
            unmount(root);
        }
    }

    /// Number of instances waiting for a re-render.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Total re-render requests received, including coalesced ones.
    pub fn requests(&self) -> usize {
        self.queue.requests()
    }

    /// The current output.
    pub fn view(&self) -> View {
        self.root.as_ref().map(view_of).unwrap_or(View::Empty)
    }

    /// Render counts of mounted instances, depth-first.
    pub fn render_counts(&self) -> Vec<usize> {
        let mut counts = Vec::new();
        if let Some(root) = &self.root {
            collect_render_counts(root, &mut counts);
        }
        counts
    }

    fn mount(&self, node: Node) -> Result<Mounted> {
        let Node {
            node_type,
            props,
            children,
        } = node;

        Ok(match node_type {
            NodeType::Element(tag) => {
                let mut mounted = Vec::with_capacity(children.len());
                for child in children {
                    match self.mount(child) {
                        Ok(child) => mounted.push(child),
                        Err(err) => {
                            mounted.into_iter().for_each(unmount);
                            return Err(err);
                        }
                    }
                }
                Mounted::Element {
                    tag,
                    props,
                    children: mounted,
                }
            }
            NodeType::Text(text) => Mounted::Text(text),
            NodeType::Empty => Mounted::Empty,
            NodeType::Component(component) => {
                let instance = Instance::new(component, props, Arc::clone(&self.queue));
                trace!(instance = ?instance.id(), name = ?instance.component().display_name(), "mounting");
                if let Err(err) = self.render_instance(&instance) {
                    unmount(Mounted::Component(instance));
                    return Err(err);
                }
                Mounted::Component(instance)
            }
        })
    }

    /// Patch `previous` into `node`. On error the whole of `previous` and
    /// anything mounted for `node` has been unmounted.
    fn patch(&self, previous: Mounted, node: Node) -> Result<Mounted> {
        match (previous, node.node_type) {
            (
                Mounted::Element {
                    tag,
                    children: old_children,
                    ..
                },
                NodeType::Element(new_tag),
            ) if tag == new_tag => Ok(Mounted::Element {
                tag,
                props: node.props,
                children: self.patch_children(old_children, node.children)?,
            }),
            (Mounted::Text(_), NodeType::Text(text)) => Ok(Mounted::Text(text)),
            (Mounted::Empty, NodeType::Empty) => Ok(Mounted::Empty),
            (Mounted::Component(instance), NodeType::Component(component))
                if instance.component().ptr_eq(&component) =>
            {
                instance.set_props(node.props);
                match self.render_instance(&instance) {
                    Ok(()) => Ok(Mounted::Component(instance)),
                    Err(err) => {
                        unmount(Mounted::Component(instance));
                        Err(err)
                    }
                }
            }
            (previous, node_type) => {
                unmount(previous);
                self.mount(Node {
                    node_type,
                    props: node.props,
                    children: node.children,
                })
            }
        }
    }

    fn patch_children(&self, previous: Vec<Mounted>, next: Vec<Node>) -> Result<Vec<Mounted>> {
        let mut previous = previous.into_iter();
        let mut children = Vec::with_capacity(next.len());

        for node in next {
            let child = match previous.next() {
                Some(old) => self.patch(old, node),
                None => self.mount(node),
            };
            match child {
                Ok(child) => children.push(child),
                Err(err) => {
                    children.into_iter().chain(previous).for_each(unmount);
                    return Err(err);
                }
            }
        }
        for stale in previous {
            unmount(stale);
        }
        Ok(children)
    }

    fn render_instance(&self, instance: &Arc<Instance>) -> Result<()> {
        self.queue.remove(instance.id());
        let output = instance.render()?;

        let mounted = match instance.take_rendered() {
            Some(previous) => self.patch(previous, output),
            None => self.mount(output),
        };
        let mounted = mounted.map(|mounted| instance.set_rendered(mounted));
        // Effects of a successful render run even if the subtree failed.
        instance.run_effects();
        mounted
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Still mounted and not rendered since `seen` was taken.
fn is_stale(instance: &Instance, seen: usize) -> bool {
    instance.is_mounted() && instance.render_count() == seen
}

fn unmount(mounted: Mounted) {
    match mounted {
        Mounted::Element { children, .. } => children.into_iter().for_each(unmount),
        Mounted::Component(instance) => {
            if let Some(rendered) = instance.take_rendered() {
                unmount(rendered);
            }
            trace!(instance = ?instance.id(), "unmounting");
            instance.teardown();
        }
        Mounted::Text(_) | Mounted::Empty => {}
    }
}

fn view_of(mounted: &Mounted) -> View {
    match mounted {
        Mounted::Element {
            tag,
            props,
            children,
        } => View::Element {
            tag: tag.to_string(),
            props: props.clone(),
            children: children.iter().map(view_of).collect(),
        },
        Mounted::Text(text) => View::Text(text.clone()),
        Mounted::Empty => View::Empty,
        Mounted::Component(instance) => {
            instance.with_rendered(|rendered| rendered.map(view_of).unwrap_or(View::Empty))
        }
    }
}

fn collect_render_counts(mounted: &Mounted, counts: &mut Vec<usize>) {
    match mounted {
        Mounted::Element { children, .. } => {
            for child in children {
                collect_render_counts(child, counts);
            }
        }
        Mounted::Component(instance) => {
            counts.push(instance.render_count());
            instance.with_rendered(|rendered| {
                if let Some(rendered) = rendered {
                    collect_render_counts(rendered, counts);
                }
            });
        }
        Mounted::Text(_) | Mounted::Empty => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::hooks::{use_effect_once, use_state, SetState};
    use crate::render::Component;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn label(props: &Props) -> Result<Node> {
        let text: String = props.get_as("text")?.unwrap_or_default();
        Ok(Node::element("span").child(Node::text(text)))
    }

    #[test]
    fn mounts_elements_and_components() {
        let label = Component::new(label);
        let mut renderer = Renderer::new();

        renderer
            .render(
                Node::element("div")
                    .child(Node::component(&label, Props::new().with("text", "a")))
                    .child(Node::text("b")),
            )
            .unwrap();

        assert_eq!(renderer.view().text_content(), "ab");
        assert_eq!(
            serde_json::to_value(renderer.view()).unwrap(),
            json!({
                "element": {
                    "tag": "div",
                    "props": {},
                    "children": [
                        { "element": { "tag": "span", "props": {}, "children": [{ "text": "a" }] } },
                        { "text": "b" }
                    ]
                }
            })
        );
    }

    #[test]
    fn same_component_keeps_its_instance() {
        let mounts = Arc::new(AtomicUsize::new(0));
        let counter = mounts.clone();
        let component = Component::named("Stateful", move |props: &Props| {
            let counter = counter.clone();
            use_effect_once(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                || {}
            });
            let text: String = props.get_as("text")?.unwrap_or_default();
            Ok(Node::text(text))
        });

        let mut renderer = Renderer::new();
        renderer
            .render(Node::component(&component, Props::new().with("text", "one")))
            .unwrap();
        renderer
            .render(Node::component(&component, Props::new().with("text", "two")))
            .unwrap();

        assert_eq!(renderer.view(), View::Text("two".into()));
        assert_eq!(mounts.load(Ordering::SeqCst), 1);
        assert_eq!(renderer.render_counts(), vec![2]);
    }

    #[test]
    fn different_component_remounts() {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let counter = cleanups.clone();
        let first = Component::named("First", move |_: &Props| {
            let counter = counter.clone();
            use_effect_once(move || {
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            });
            Ok(Node::text("first"))
        });
        let second = Component::named("Second", |_: &Props| Ok(Node::text("second")));

        let mut renderer = Renderer::new();
        renderer.render(Node::component(&first, Props::new())).unwrap();
        renderer.render(Node::component(&second, Props::new())).unwrap();

        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(renderer.view().text_content(), "second");
    }

    #[test]
    fn extra_children_are_unmounted() {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let counter = cleanups.clone();
        let item = Component::named("Item", move |_: &Props| {
            let counter = counter.clone();
            use_effect_once(move || {
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            });
            Ok(Node::text("."))
        });
        let list = |n: usize| {
            Node::element("ul").children((0..n).map(|_| Node::component(&item, Props::new())))
        };

        let mut renderer = Renderer::new();
        renderer.render(list(3)).unwrap();
        renderer.render(list(1)).unwrap();

        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
        assert_eq!(renderer.view().text_content(), ".");
    }

    #[test]
    fn flush_rerenders_queued_instances() {
        let setter: Arc<Mutex<Option<SetState<i32>>>> = Arc::new(Mutex::new(None));
        let slot = setter.clone();
        let counter = Component::named("Counter", move |_: &Props| {
            let (count, set) = use_state(|| 0);
            *slot.lock() = Some(set);
            Ok(Node::text(count.to_string()))
        });

        let mut renderer = Renderer::new();
        renderer.render(Node::component(&counter, Props::new())).unwrap();
        assert_eq!(renderer.flush().unwrap(), 0);

        let set = setter.lock().clone().unwrap();
        set.set(1);
        set.set(2);
        assert_eq!(renderer.pending(), 1);
        assert_eq!(renderer.requests(), 2);

        assert_eq!(renderer.flush().unwrap(), 1);
        assert_eq!(renderer.view(), View::Text("2".into()));
        assert_eq!(renderer.pending(), 0);
    }

    #[test]
    fn runaway_updates_hit_the_flush_limit() {
        let looping = Component::named("Loop", |_: &Props| {
            let (count, set) = use_state(|| 0u64);
            set.set(count + 1);
            Ok(Node::text(count.to_string()))
        });

        let mut renderer = Renderer::with_config(RendererConfig {
            max_flush_passes: 4,
        });
        renderer.render(Node::component(&looping, Props::new())).unwrap();

        let err = renderer.flush().unwrap_err();
        assert!(matches!(err, Error::FlushLimitExceeded { passes: 4 }));
    }

    #[test]
    fn render_errors_propagate() {
        let failing = Component::named("Failing", |_: &Props| Err(Error::render("no data")));
        let mut renderer = Renderer::new();

        let err = renderer.render(Node::component(&failing, Props::new())).unwrap_err();
        assert_eq!(err.to_string(), "component render failed: no data");
    }

    #[test]
    fn failed_patch_tears_down_mounted_siblings() {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let counter = cleanups.clone();
        let keeper = Component::named("Keeper", move |_: &Props| {
            let counter = counter.clone();
            use_effect_once(move || {
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            });
            Ok(Node::text("kept"))
        });
        let failing = Component::named("Failing", |_: &Props| Err(Error::render("no data")));

        let mut renderer = Renderer::new();
        renderer
            .render(Node::element("div").child(Node::component(&keeper, Props::new())))
            .unwrap();

        let result = renderer.render(
            Node::element("div")
                .child(Node::component(&keeper, Props::new()))
                .child(Node::component(&failing, Props::new())),
        );
        assert!(result.is_err());
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(renderer.view(), View::Empty);

        renderer.unmount();
        drop(renderer);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn child_rendered_by_its_parent_is_not_rendered_again() {
        let setters: Arc<Mutex<Vec<SetState<i32>>>> = Arc::new(Mutex::new(Vec::new()));

        let child_setters = setters.clone();
        let child = Component::named("Child", move |_: &Props| {
            let (count, set) = use_state(|| 0);
            child_setters.lock().push(set);
            Ok(Node::text(count.to_string()))
        });
        let parent_setters = setters.clone();
        let parent = Component::named("Parent", move |_: &Props| {
            let (count, set) = use_state(|| 0);
            parent_setters.lock().push(set);
            Ok(Node::element("p")
                .child(Node::text(count.to_string()))
                .child(Node::component(&child, Props::new())))
        });

        let mut renderer = Renderer::new();
        renderer.render(Node::component(&parent, Props::new())).unwrap();

        let (parent_set, child_set) = {
            let setters = setters.lock();
            (setters[0].clone(), setters[1].clone())
        };
        parent_set.set(1);
        child_set.set(2);
        assert_eq!(renderer.pending(), 2);

        assert_eq!(renderer.flush().unwrap(), 1);
        assert_eq!(renderer.render_counts(), vec![2, 2]);
        assert_eq!(renderer.view().text_content(), "12");
        assert_eq!(renderer.pending(), 0);
    }

    #[test]
    fn unmount_runs_cleanups_and_clears_the_view() {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let counter = cleanups.clone();
        let component = Component::named("Tracked", move |_: &Props| {
            let counter = counter.clone();
            use_effect_once(move || {
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            });
            Ok(Node::empty())
        });

        let mut renderer = Renderer::new();
        renderer.render(Node::component(&component, Props::new())).unwrap();
        renderer.unmount();
        renderer.unmount();

        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(renderer.view(), View::Empty);
    }
}
