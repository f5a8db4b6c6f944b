//! Error types shared by the reactive engine, the tracked wrappers and the
//! host renderer.

use thiserror::Error;

use crate::reactive::SubscriberId;

/// Errors produced by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A reactive object was requested for data that is not a map of
    /// named properties.
    #[error("expected a structured object, found {found}")]
    NotAnObject {
        /// The JSON kind that was supplied instead.
        found: &'static str,
    },

    /// An observer was run after it had been disposed.
    #[error("observer {0:?} was run after disposal")]
    Disposed(SubscriberId),

    /// The render queue kept refilling itself.
    #[error("render queue did not settle after {passes} flush passes")]
    FlushLimitExceeded {
        /// Number of passes that were attempted.
        passes: usize,
    },

    /// Conversion between typed values and reactive properties failed.
    #[error("value conversion failed: {0}")]
    Json(#[from] serde_json::Error),

    /// A component's render function failed.
    #[error("component render failed: {0}")]
    Render(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap an application error raised while rendering a component.
    pub fn render<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Render(error.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
