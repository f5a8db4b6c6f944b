//! Tracked Components
//!
//! Components wrapped here re-render on their own when reactive state they
//! read during their last render changes. Each mounted instance gets its own
//! observer; a change only queues a re-render of the instances that read the
//! changed property, through the host's ordinary re-render path.
//!
//! [`install`] turns this on for every component node built afterwards.
//! [`track_component`] wraps a single component without installing
//! anything.

mod component;
mod install;
mod state;

pub use component::track_component;
pub use install::{install, is_installed, wrapper_for, TRACKING_HOOK};
pub use state::{use_reactive_state, InitialState};
