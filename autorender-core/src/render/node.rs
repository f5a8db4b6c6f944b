//! Node descriptors and components.
//!
//! A [`Node`] describes one piece of the tree a component renders: an
//! element with a tag, a text leaf, a nested component, or nothing. Every
//! constructor passes the new node through the installed node hooks before
//! handing it back, which is how component references get replaced.

use std::any::type_name;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::hook;
use crate::error::Result;

/// Properties passed to an element or component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Props(Map<String, Value>);

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_owned(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Deserialize a single property.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.0.get(key) {
            Some(value) => Ok(Some(T::deserialize(value)?)),
            None => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<Map<String, Value>> for Props {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// A component's render function.
pub type RenderFn = dyn Fn(&Props) -> Result<Node> + Send + Sync;

/// Identity of a component, derived from its allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId(usize);

struct ComponentInner {
    render: Box<RenderFn>,
    display_name: Option<Cow<'static, str>>,
    tracked: bool,
}

/// A function component.
///
/// Components are compared by identity: two clones of one `Component` are
/// the same component, two `Component::new` calls never are.
#[derive(Clone)]
pub struct Component {
    inner: Arc<ComponentInner>,
}

impl Component {
    /// Create a component. Its display name is the function's name when
    /// `render` is a named `fn` item, and absent for closures.
    pub fn new<F>(render: F) -> Self
    where
        F: Fn(&Props) -> Result<Node> + Send + Sync + 'static,
    {
        Self::build(Box::new(render), fn_name::<F>().map(Cow::Borrowed), false)
    }

    /// Create a component with an explicit display name.
    pub fn named<F>(name: impl Into<Cow<'static, str>>, render: F) -> Self
    where
        F: Fn(&Props) -> Result<Node> + Send + Sync + 'static,
    {
        Self::build(Box::new(render), Some(name.into()), false)
    }

    pub(crate) fn tracked<F>(display_name: Option<Cow<'static, str>>, render: F) -> Self
    where
        F: Fn(&Props) -> Result<Node> + Send + Sync + 'static,
    {
        Self::build(Box::new(render), display_name, true)
    }

    fn build(
        render: Box<RenderFn>,
        display_name: Option<Cow<'static, str>>,
        tracked: bool,
    ) -> Self {
        Self {
            inner: Arc::new(ComponentInner {
                render,
                display_name,
                tracked,
            }),
        }
    }

    pub fn id(&self) -> ComponentId {
        ComponentId(Arc::as_ptr(&self.inner) as usize)
    }

    pub fn display_name(&self) -> Option<&str> {
        self.inner.display_name.as_deref()
    }

    pub(crate) fn display_name_cow(&self) -> Option<Cow<'static, str>> {
        self.inner.display_name.clone()
    }

    /// Whether this component is a tracking wrapper around another one.
    pub fn is_tracked(&self) -> bool {
        self.inner.tracked
    }

    pub fn ptr_eq(&self, other: &Component) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Call the render function directly.
    pub fn render(&self, props: &Props) -> Result<Node> {
        (self.inner.render)(props)
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Component {}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.display_name())
            .field("id", &self.id())
            .field("tracked", &self.is_tracked())
            .finish()
    }
}

fn fn_name<F>() -> Option<&'static str> {
    let full = type_name::<F>();
    if full.contains("{{closure}}") {
        return None;
    }
    full.rsplit("::").next().filter(|name| !name.is_empty())
}

/// What a node is.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeType {
    Element(Cow<'static, str>),
    Text(String),
    Component(Component),
    Empty,
}

/// One node of a render tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub node_type: NodeType,
    pub props: Props,
    pub children: Vec<Node>,
}

impl Node {
    fn build(node_type: NodeType, props: Props) -> Self {
        let mut node = Node {
            node_type,
            props,
            children: Vec::new(),
        };
        hook::dispatch(&mut node);
        node
    }

    pub fn element(tag: impl Into<Cow<'static, str>>) -> Self {
        Self::build(NodeType::Element(tag.into()), Props::new())
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::build(NodeType::Text(text.into()), Props::new())
    }

    pub fn component(component: &Component, props: Props) -> Self {
        Self::build(NodeType::Component(component.clone()), props)
    }

    pub fn empty() -> Self {
        Self::build(NodeType::Empty, Props::new())
    }

    pub fn prop(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.props.set(key, value);
        self
    }

    pub fn child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }

    /// The component this node renders, if it is a component node.
    pub fn as_component(&self) -> Option<&Component> {
        match &self.node_type {
            NodeType::Component(component) => Some(component),
            _ => None,
        }
    }
}
