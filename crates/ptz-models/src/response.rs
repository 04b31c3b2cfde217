//! Error envelope returned by the HTTP API.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// `{code, message}` envelope used for every failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ApiResponse {
    pub code: i32,
    pub message: String,
}

impl ApiResponse {
    /// Error code reported for every failure.
    pub const ERROR_CODE: i32 = 1;

    /// Create an error envelope.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: Self::ERROR_CODE,
            message: message.into(),
        }
    }
}
