//! Axum HTTP API server for pan/tilt/zoom control.
//!
//! This crate provides:
//! - `GET`/`PUT` on `/position`, `/zoom` and `/stream`
//! - The controller tying stream resolution to the pipeline supervisor
//! - Liveness/readiness probes and Prometheus metrics

pub mod config;
pub mod controller;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod pipeline;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use controller::{ControllerError, ControllerResult, PtzController};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
