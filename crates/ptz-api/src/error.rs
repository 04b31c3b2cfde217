//! API error types.

use axum::extract::rejection::JsonRejection;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use ptz_models::ApiResponse;
use thiserror::Error;
use tracing::error;

use crate::controller::ControllerError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Every variant renders as HTTP 400 with a `{code: 1, message}` body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Validation(String),

    #[error("Method {0} not supported")]
    MethodNotSupported(Method),

    #[error(transparent)]
    Controller(#[from] ControllerError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Malformed or unparsable request body for `operation`.
    pub fn body(operation: &str, rejection: JsonRejection) -> Self {
        Self::BadRequest(format!("Error {}, error: {}", operation, rejection.body_text()))
    }

    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();
        error!(status = %status, "{}", message);
        (status, Json(ApiResponse::error(message))).into_response()
    }
}

/// Fallback for methods a resource does not serve.
pub async fn method_not_supported(method: Method) -> ApiError {
    ApiError::MethodNotSupported(method)
}
