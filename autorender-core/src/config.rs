//! Renderer configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Settings for a [`Renderer`](crate::host::Renderer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Maximum number of queue passes a single flush may take before it
    /// gives up with [`Error::FlushLimitExceeded`](crate::Error::FlushLimitExceeded).
    pub max_flush_passes: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            max_flush_passes: 64,
        }
    }
}

impl RendererConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
