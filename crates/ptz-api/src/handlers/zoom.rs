//! Zoom handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use ptz_models::Zoom;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Get the current zoom.
pub async fn get_zoom(State(state): State<AppState>) -> ApiResult<Json<Zoom>> {
    Ok(Json(state.controller.get_zoom()?))
}

/// Set the zoom. Echoes the applied value.
pub async fn put_zoom(
    State(state): State<AppState>,
    payload: Result<Json<Zoom>, JsonRejection>,
) -> ApiResult<Json<Zoom>> {
    let Json(zoom) = payload.map_err(|e| ApiError::body("setting zoom", e))?;
    zoom.validate()
        .map_err(|e| ApiError::validation(format!("Error setting zoom, error: {}", e)))?;

    state.controller.set_zoom(&zoom)?;
    Ok(Json(zoom))
}
