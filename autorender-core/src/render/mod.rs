//! Render Trees
//!
//! Components render to trees of [`Node`]s. Node construction is observable
//! through a process-wide hook chain ([`install_node_hook`]), which lets an
//! extension substitute component references before the host ever sees
//! them.

pub mod hook;
mod node;

pub use hook::{install_node_hook, HookChain, NodeHook};
pub use node::{Component, ComponentId, Node, NodeType, Props, RenderFn};
