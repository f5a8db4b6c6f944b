//! Node construction hooks.
//!
//! Extensions that need to see every node as it is built install a hook
//! here. Hooks form a single chain: installing composes the new hook in
//! front of the existing chain, so the newest hook runs first and then hands
//! the node to the ones installed before it.
//!
//! Hooks are installed by name and each name at most once per process.
//! Installing a name again leaves the chain untouched.

use std::sync::{Arc, OnceLock};

use indexmap::IndexSet;
use parking_lot::RwLock;
use tracing::debug;

use super::node::Node;

/// A node hook. Runs once per constructed node and may rewrite it in place.
pub type NodeHook = Arc<dyn Fn(&mut Node) + Send + Sync>;

/// A chain of node hooks.
#[derive(Default)]
pub struct HookChain {
    installed: IndexSet<&'static str>,
    head: Option<NodeHook>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put `hook` in front of the chain under `name`.
    ///
    /// Returns `false` without changing anything if `name` is already
    /// installed.
    pub fn compose(&mut self, name: &'static str, hook: NodeHook) -> bool {
        if !self.installed.insert(name) {
            return false;
        }

        let head: NodeHook = match self.head.take() {
            Some(previous) => Arc::new(move |node: &mut Node| {
                hook(node);
                previous(node);
            }),
            None => hook,
        };
        self.head = Some(head);
        true
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.installed.contains(name)
    }

    /// Names in installation order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.installed.iter().copied()
    }

    /// The composed chain, if any hook is installed.
    pub fn head(&self) -> Option<NodeHook> {
        self.head.clone()
    }

    pub fn run(&self, node: &mut Node) {
        if let Some(head) = &self.head {
            head(node);
        }
    }
}

static NODE_HOOKS: OnceLock<RwLock<HookChain>> = OnceLock::new();

fn node_hooks() -> &'static RwLock<HookChain> {
    NODE_HOOKS.get_or_init(|| RwLock::new(HookChain::new()))
}

/// Install a process-wide node hook.
///
/// Returns `true` if the hook was installed, `false` if a hook with the same
/// name already was.
pub fn install_node_hook<F>(name: &'static str, hook: F) -> bool
where
    F: Fn(&mut Node) + Send + Sync + 'static,
{
    let installed = node_hooks().write().compose(name, Arc::new(hook));
    if installed {
        debug!(name, "node hook installed");
    } else {
        debug!(name, "node hook already installed");
    }
    installed
}

/// Whether a process-wide hook with this name is installed.
pub fn is_installed(name: &str) -> bool {
    node_hooks().read().is_installed(name)
}

/// Pass a freshly built node through the process-wide chain.
pub(crate) fn dispatch(node: &mut Node) {
    // Hooks may build nodes themselves, so the lock is not held while they run.
    let head = match NODE_HOOKS.get() {
        Some(hooks) => hooks.read().head(),
        None => return,
    };
    if let Some(head) = head {
        head(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::node::NodeType;
    use parking_lot::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> NodeHook {
        let log = log.clone();
        Arc::new(move |_: &mut Node| log.lock().push(label))
    }

    fn bare_node() -> Node {
        Node {
            node_type: NodeType::Empty,
            props: Default::default(),
            children: Vec::new(),
        }
    }

    #[test]
    fn newest_hook_runs_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = HookChain::new();

        assert!(chain.compose("first", recorder(&log, "first")));
        assert!(chain.compose("second", recorder(&log, "second")));

        chain.run(&mut bare_node());
        assert_eq!(*log.lock(), vec!["second", "first"]);
        assert_eq!(chain.names().collect::<Vec<_>>(), vec!["first", "second"]);
    }

    #[test]
    fn installing_a_name_twice_is_a_noop() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = HookChain::new();

        assert!(chain.compose("tracker", recorder(&log, "a")));
        assert!(!chain.compose("tracker", recorder(&log, "b")));

        chain.run(&mut bare_node());
        assert_eq!(*log.lock(), vec!["a"]);
    }

    #[test]
    fn hooks_can_rewrite_nodes() {
        let mut chain = HookChain::new();
        chain.compose(
            "shout",
            Arc::new(|node: &mut Node| {
                if let NodeType::Text(text) = &mut node.node_type {
                    *text = text.to_uppercase();
                }
            }),
        );

        let mut node = Node {
            node_type: NodeType::Text("hi".into()),
            ..bare_node()
        };
        chain.run(&mut node);
        assert_eq!(node.node_type, NodeType::Text("HI".into()));
    }

    #[test]
    fn empty_chain_leaves_nodes_alone() {
        let chain = HookChain::new();
        let mut node = bare_node();
        chain.run(&mut node);
        assert_eq!(node.node_type, NodeType::Empty);
        assert!(chain.head().is_none());
    }

    #[test]
    fn global_install_is_idempotent() {
        let hits = Arc::new(Mutex::new(0usize));
        let counter = hits.clone();
        let hook = move |node: &mut Node| {
            if node.node_type == NodeType::Element("hook-test-probe".into()) {
                *counter.lock() += 1;
            }
        };

        let first = install_node_hook("hook-test-probe", hook.clone());
        assert!(first);
        assert!(!install_node_hook("hook-test-probe", hook));
        assert!(is_installed("hook-test-probe"));

        Node::element("hook-test-probe");
        assert_eq!(*hits.lock(), 1);
    }
}
