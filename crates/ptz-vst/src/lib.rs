//! Stream source resolution for the PTZ service.
//!
//! A source identifier is either a direct RTSP URI or the name of a stream
//! registered in a VST (Video Storage Toolkit) directory. This crate
//! provides:
//! - [`VstClient`], an HTTP client for the directory's live stream listing
//! - [`StreamResolver`], which turns an identifier into a playable URI

pub mod client;
pub mod error;
pub mod metrics;
pub mod resolver;

pub use client::{VstClient, VstConfig};
pub use error::{ResolveError, ResolveResult, VstError, VstResult};
pub use resolver::{ActiveStream, ResolvedSource, StreamDirectory, StreamResolver};
