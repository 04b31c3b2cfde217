//! Source identifier resolution.

use std::sync::Arc;

use async_trait::async_trait;
use ptz_models::is_direct_uri;
use tracing::{info, warn};

use crate::error::{ResolveError, ResolveResult, VstResult};

/// A stream listed by the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveStream {
    pub name: String,
    pub url: String,
}

impl ActiveStream {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// A concrete, playable source URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub uri: String,
}

impl ResolvedSource {
    pub fn as_str(&self) -> &str {
        &self.uri
    }
}

/// Registry of active streams.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StreamDirectory: Send + Sync {
    /// Active streams in directory order.
    async fn list_active_streams(&self) -> VstResult<Vec<ActiveStream>>;
}

/// Turns source identifiers into playable URIs.
#[derive(Clone)]
pub struct StreamResolver {
    directory: Arc<dyn StreamDirectory>,
}

impl StreamResolver {
    pub fn new(directory: Arc<dyn StreamDirectory>) -> Self {
        Self { directory }
    }

    /// Resolve `identifier`.
    ///
    /// RTSP URIs are returned unchanged without querying the directory. Any
    /// other identifier is looked up by stream name; when no stream has that
    /// name the first listed stream is used.
    pub async fn resolve(&self, identifier: &str) -> ResolveResult<ResolvedSource> {
        if is_direct_uri(identifier) {
            return Ok(ResolvedSource {
                uri: identifier.to_string(),
            });
        }

        let streams = self.directory.list_active_streams().await.map_err(|e| {
            warn!(identifier, "Error getting VST streams: {}", e);
            ResolveError::from(e)
        })?;

        let Some(first) = streams.first() else {
            warn!("VST doesn't have active streams");
            return Err(ResolveError::NoActiveStreams);
        };

        let uri = match streams.iter().find(|s| s.name == identifier) {
            Some(stream) => stream.url.clone(),
            None => {
                warn!(
                    identifier,
                    fallback = %first.name,
                    "VST doesn't have a stream with this name, using the first one"
                );
                first.url.clone()
            }
        };

        info!(identifier, uri = %uri, "Using VST uri");
        Ok(ResolvedSource { uri })
    }
}
