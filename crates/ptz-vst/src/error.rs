//! VST client and resolver error types.

use thiserror::Error;

/// Result type for VST client operations.
pub type VstResult<T> = Result<T, VstError>;

/// Result type for stream resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Errors that can occur while talking to the VST directory.
#[derive(Debug, Error)]
pub enum VstError {
    #[error("Invalid VST URL: {0}")]
    InvalidUrl(String),

    #[error("Request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl VstError {
    pub fn invalid_url(msg: impl Into<String>) -> Self {
        Self::InvalidUrl(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }
}

/// Errors produced while resolving a source identifier.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("VST doesn't have active streams")]
    NoActiveStreams,

    #[error("Stream directory unavailable: {0}")]
    DirectoryUnavailable(String),
}

impl ResolveError {
    pub fn directory_unavailable(msg: impl Into<String>) -> Self {
        Self::DirectoryUnavailable(msg.into())
    }
}

impl From<VstError> for ResolveError {
    fn from(err: VstError) -> Self {
        Self::DirectoryUnavailable(err.to_string())
    }
}
