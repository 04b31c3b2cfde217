//! Stream handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use ptz_models::StreamConfig;
use tracing::info;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Get the current input URI, output port and output mapping.
pub async fn get_stream(State(state): State<AppState>) -> ApiResult<Json<StreamConfig>> {
    Ok(Json(state.controller.get_stream()?))
}

/// Replace the stream. Rebuilds the pipeline and echoes the request body.
pub async fn put_stream(
    State(state): State<AppState>,
    payload: Result<Json<StreamConfig>, JsonRejection>,
) -> ApiResult<Json<StreamConfig>> {
    let Json(stream) = payload.map_err(|e| ApiError::body("setting the in_uri, out_port and out_mapping", e))?;
    stream.validate().map_err(|e| {
        ApiError::validation(format!(
            "Error setting the in_uri, out_port and out_mapping, error: {}",
            e
        ))
    })?;

    state.controller.set_stream(&stream).await?;
    info!(
        in_uri = %stream.in_uri,
        out_port = stream.out_port,
        out_mapping = %stream.out_mapping,
        "Setting in_uri, out_port, out_mapping"
    );
    Ok(Json(stream))
}
