//! Process-wide installation of component tracking.

use std::sync::OnceLock;

use dashmap::DashMap;
use tracing::trace;

use super::component::track_component;
use crate::render::{hook, install_node_hook, Component, ComponentId, Node, NodeType};

/// Name of the node hook [`install`] registers.
pub const TRACKING_HOOK: &str = "autorender::track-components";

// Wrappers live as long as the process and keep their raw component alive,
// so a ComponentId is never reused for a different component.
static WRAPPERS: OnceLock<DashMap<ComponentId, Component>> = OnceLock::new();

fn wrappers() -> &'static DashMap<ComponentId, Component> {
    WRAPPERS.get_or_init(DashMap::new)
}

/// Make every component node built from now on render tracked.
///
/// Returns `true` on the first call and `false` afterwards; later calls
/// change nothing.
pub fn install() -> bool {
    install_node_hook(TRACKING_HOOK, intercept)
}

/// Whether [`install`] has run in this process.
pub fn is_installed() -> bool {
    hook::is_installed(TRACKING_HOOK)
}

/// The shared wrapper for `raw`.
///
/// Every call with the same component returns the same wrapper, so the host
/// sees a stable component across renders. Wrappers are returned unchanged.
pub fn wrapper_for(raw: &Component) -> Component {
    if raw.is_tracked() {
        return raw.clone();
    }

    wrappers()
        .entry(raw.id())
        .or_insert_with(|| {
            trace!(name = ?raw.display_name(), "caching tracked wrapper");
            track_component(raw)
        })
        .value()
        .clone()
}

fn intercept(node: &mut Node) {
    let wrapper = match &node.node_type {
        NodeType::Component(raw) if !raw.is_tracked() => wrapper_for(raw),
        _ => return,
    };
    node.node_type = NodeType::Component(wrapper);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{HookChain, Props};
    use std::sync::Arc;

    fn greeting(_: &Props) -> crate::Result<Node> {
        Ok(Node::text("hello"))
    }

    #[test]
    fn wrapper_is_cached_per_component() {
        let raw = Component::new(greeting);

        let first = wrapper_for(&raw);
        let second = wrapper_for(&raw);

        assert!(first.is_tracked());
        assert!(first.ptr_eq(&second));
        assert!(wrapper_for(&first).ptr_eq(&first));
    }

    #[test]
    fn distinct_components_get_distinct_wrappers() {
        let a = Component::named("A", |_: &Props| Ok(Node::empty()));
        let b = Component::named("B", |_: &Props| Ok(Node::empty()));

        let wa = wrapper_for(&a);
        let wb = wrapper_for(&b);
        assert!(!wa.ptr_eq(&wb));
        assert_eq!(wa.display_name(), Some("A"));
        assert_eq!(wb.display_name(), Some("B"));
    }

    #[test]
    fn intercept_replaces_only_raw_components() {
        let mut chain = HookChain::new();
        assert!(chain.compose(TRACKING_HOOK, Arc::new(intercept)));

        let raw = Component::new(greeting);
        let mut node = Node {
            node_type: NodeType::Component(raw.clone()),
            props: Props::new(),
            children: Vec::new(),
        };
        chain.run(&mut node);

        let wrapped = node.as_component().cloned().unwrap();
        assert!(wrapped.is_tracked());
        assert!(wrapped.ptr_eq(&wrapper_for(&raw)));

        chain.run(&mut node);
        assert!(node.as_component().unwrap().ptr_eq(&wrapped));

        let mut element = Node {
            node_type: NodeType::Element("div".into()),
            props: Props::new(),
            children: Vec::new(),
        };
        chain.run(&mut element);
        assert_eq!(element.node_type, NodeType::Element("div".into()));
    }
}
