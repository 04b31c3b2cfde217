//! Input/output stream configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// URI scheme recognized as a directly playable source.
pub const RTSP_SCHEME: &str = "rtsp://";

/// Desired source and destination of the PTZ pipeline.
///
/// `in_uri` is either a direct RTSP URI or the name of a stream registered
/// in the stream directory. It may be empty, in which case the first active
/// directory stream is used.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Validate)]
pub struct StreamConfig {
    /// Input URI or directory stream name
    pub in_uri: String,
    /// Port the output RTSP server listens on
    #[validate(range(min = 1, max = 65535))]
    pub out_port: u32,
    /// Mapping (path) of the output stream
    pub out_mapping: String,
}

impl StreamConfig {
    /// Create a new stream configuration.
    pub fn new(in_uri: impl Into<String>, out_port: u32, out_mapping: impl Into<String>) -> Self {
        Self {
            in_uri: in_uri.into(),
            out_port,
            out_mapping: out_mapping.into(),
        }
    }

    /// Whether `in_uri` is already a playable URI rather than a stream name.
    pub fn is_direct_uri(&self) -> bool {
        is_direct_uri(&self.in_uri)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::new("", 5021, "ptz_out")
    }
}

/// Check whether an identifier is a direct RTSP URI.
pub fn is_direct_uri(identifier: &str) -> bool {
    identifier.starts_with(RTSP_SCHEME)
}
