//! Position (pan/tilt) handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use ptz_models::Position;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Get the current pan and tilt.
pub async fn get_position(State(state): State<AppState>) -> ApiResult<Json<Position>> {
    Ok(Json(state.controller.get_position()?))
}

/// Set pan and tilt. Echoes the applied position.
pub async fn put_position(
    State(state): State<AppState>,
    payload: Result<Json<Position>, JsonRejection>,
) -> ApiResult<Json<Position>> {
    let Json(position) = payload.map_err(|e| ApiError::body("setting position", e))?;
    position
        .validate()
        .map_err(|e| ApiError::validation(format!("Error setting position, error: {}", e)))?;

    state.controller.set_position(&position)?;
    Ok(Json(position))
}
