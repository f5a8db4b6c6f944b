//! Reactive Primitives
//!
//! This module implements the tracking engine that the rest of the crate is
//! built on: reactive objects, observers, and the runtime that connects
//! them.
//!
//! # Concepts
//!
//! ## Reactive Objects
//!
//! A [`ReactiveObject`] is a map of named properties. Reading a property
//! while an observer runs records the read; writing it notifies every
//! observer whose last run read it.
//!
//! ## Observers
//!
//! An [`Observer`] wraps a function and tracks the properties it reads. The
//! subscription set is rebuilt on every run, so properties that are no
//! longer read stop notifying. Render observers are lazy and only ever call
//! a scheduler on change; they never re-run themselves.
//!
//! # Implementation Notes
//!
//! The currently running observer is found through a thread-local context
//! stack ([`ReactiveContext`]). Subscriptions live in a global registry
//! ([`Runtime`]) that maps properties to observers and back.

mod context;
mod key;
mod object;
mod observer;
mod runtime;
mod subscriber;

pub use context::{untrack, Dependencies, ReactiveContext};
pub use key::{Key, ObjectId, PropertyKey};
pub use object::{reactive, ReactiveObject};
pub use observer::{
    observe, observe_render, unobserve, ObserveOptions, Observer, ObserverState, Scheduler,
};
pub use runtime::{Reaction, ReactionHandle, Runtime};
pub use subscriber::SubscriberId;
