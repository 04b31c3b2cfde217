//! Pan/tilt position model.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Orientation of the PTZ window inside the input frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct Position {
    /// Horizontal angle
    pub pan: f64,
    /// Vertical angle
    pub tilt: f64,
}

impl Position {
    /// Create a new position.
    pub fn new(pan: f64, tilt: f64) -> Self {
        Self { pan, tilt }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pan={} tilt={}", self.pan, self.tilt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_json_shape() {
        let position: Position = serde_json::from_str(r#"{"pan": 1.5, "tilt": -2.0}"#).unwrap();
        assert_eq!(position, Position::new(1.5, -2.0));

        let json = serde_json::to_value(position).unwrap();
        assert_eq!(json, serde_json::json!({"pan": 1.5, "tilt": -2.0}));
    }

    #[test]
    fn test_position_rejects_missing_field() {
        let result = serde_json::from_str::<Position>(r#"{"pan": 1.0}"#);
        assert!(result.is_err());
    }
}
