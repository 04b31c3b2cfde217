//! Shared data models for the PTZ service.
//!
//! This crate provides Serde-serializable types for:
//! - PTZ position (pan/tilt) and zoom
//! - Input/output stream configuration
//! - The `{code, message}` response envelope

pub mod position;
pub mod response;
pub mod stream;
pub mod zoom;

pub use position::Position;
pub use response::ApiResponse;
pub use stream::{is_direct_uri, StreamConfig, RTSP_SCHEME};
pub use zoom::Zoom;
