//! Autorender Core
//!
//! Function components that re-render themselves when the reactive state
//! they read changes. The crate implements:
//!
//! - Reactive objects with property-level read tracking
//! - Observers that rebuild their subscriptions on every run
//! - A node hook chain that substitutes tracked wrappers for components
//! - A small host renderer with per-instance hooks and a coalescing queue
//!
//! # Architecture
//!
//! - `reactive`: reactive objects, observers and the subscription runtime
//! - `render`: render tree nodes, components and the node hook chain
//! - `host`: component instances, hooks and the renderer
//! - `tracked`: the wrappers that connect components to observers
//!
//! # Example
//!
//! ```rust,ignore
//! use autorender_core::{install, reactive, Component, Node, Props, Renderer};
//! use serde_json::json;
//!
//! install();
//!
//! let state = reactive(&json!({ "count": 0 }))?;
//! let reader = state.clone();
//! let counter = Component::named("Counter", move |_: &Props| {
//!     Ok(Node::text(reader.get("count").unwrap_or_default().to_string()))
//! });
//!
//! let mut renderer = Renderer::new();
//! renderer.render(Node::component(&counter, Props::new()))?;
//!
//! state.set("count", 1);
//! // Counter is queued, not rendered; flush applies the change.
//! renderer.flush()?;
//! assert_eq!(renderer.view().text_content(), "1");
//! ```

pub mod config;
mod error;
pub mod host;
pub mod reactive;
pub mod render;
pub mod tracked;

pub use config::RendererConfig;
pub use error::{Error, Result};
pub use host::Renderer;
pub use reactive::{observe, observe_render, reactive, unobserve, untrack, ReactiveObject};
pub use render::{Component, Node, Props};
pub use tracked::{install, track_component, use_reactive_state};
