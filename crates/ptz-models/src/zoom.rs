//! Zoom model.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Zoom factor of the PTZ window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct Zoom {
    pub zoom: f64,
}

impl Zoom {
    pub fn new(zoom: f64) -> Self {
        Self { zoom }
    }
}

impl std::fmt::Display for Zoom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "zoom={}", self.zoom)
    }
}
