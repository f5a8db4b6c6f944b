//! Host Runtime
//!
//! A small host for function components: it mounts render trees, keeps
//! per-instance hook state, queues re-render requests and replays them on
//! flush. It is the collaborator the tracked wrappers plug into; nothing in
//! here knows about reactive objects.
//!
//! Re-render requests never render synchronously. They mark the instance as
//! pending, and [`Renderer::flush`] re-renders pending instances in passes.
//! Any number of requests for one instance before a flush coalesce into a
//! single render.

pub mod hooks;
mod instance;
mod renderer;

pub use hooks::{
    use_effect_once, use_hook, use_memo, use_rerender, use_state, RerenderHandle, SetState,
};
pub use renderer::{Renderer, View};
