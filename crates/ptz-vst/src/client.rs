//! VST REST API client.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info_span, warn, Instrument};
use url::Url;

use crate::error::{VstError, VstResult};
use crate::metrics::record_request;
use crate::resolver::{ActiveStream, StreamDirectory};

/// Path of the live stream listing, relative to the VST base URL.
pub const LIVE_STREAMS_PATH: &str = "api/v1/live/streams";

/// VST client configuration.
#[derive(Debug, Clone)]
pub struct VstConfig {
    /// Base URL of the VST service
    pub base_url: Url,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
}

impl VstConfig {
    /// Create a config for the VST service at `base_url`.
    pub fn new(base_url: &str) -> VstResult<Self> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| VstError::invalid_url(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(VstError::invalid_url(base_url.to_string()));
        }
        // Keep any path prefix when joining the listing path
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            base_url,
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        })
    }
}

/// One stream entry as listed by VST.
#[derive(Debug, Clone, Deserialize)]
struct VstStreamEntry {
    name: String,
    url: String,
}

/// Client for the VST stream directory.
#[derive(Clone)]
pub struct VstClient {
    http: Client,
    config: VstConfig,
}

impl VstClient {
    pub fn new(config: VstConfig) -> VstResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("ptz-vst/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { http, config })
    }

    pub fn base_url(&self) -> &Url {
        &self.config.base_url
    }

    /// List the active RTSP streams, one per sensor, in directory order.
    pub async fn get_rtsp_streams(&self) -> VstResult<Vec<ActiveStream>> {
        let url = self
            .config
            .base_url
            .join(LIVE_STREAMS_PATH)
            .map_err(|e| VstError::invalid_url(e.to_string()))?;
        let span = info_span!("vst_request", url = %url);

        async {
            let start = Instant::now();
            let result = self.fetch_streams(url).await;
            let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

            match &result {
                Ok(streams) => {
                    record_request("ok", latency_ms);
                    debug!(count = streams.len(), latency_ms, "Listed VST streams");
                }
                Err(e) => {
                    record_request("error", latency_ms);
                    warn!(latency_ms, "Failed to list VST streams: {}", e);
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn fetch_streams(&self, url: Url) -> VstResult<Vec<ActiveStream>> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VstError::RequestFailed {
                status: status.as_u16(),
                body,
            });
        }

        let sensors: Vec<BTreeMap<String, Vec<VstStreamEntry>>> = response
            .json()
            .await
            .map_err(|e| VstError::invalid_response(e.to_string()))?;

        Ok(sensors
            .into_iter()
            .flat_map(|sensor| sensor.into_values())
            .filter_map(|entries| entries.into_iter().next())
            .map(|entry| ActiveStream::new(entry.name, entry.url))
            .collect())
    }
}

#[async_trait]
impl StreamDirectory for VstClient {
    async fn list_active_streams(&self) -> VstResult<Vec<ActiveStream>> {
        self.get_rtsp_streams().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> VstClient {
        VstClient::new(VstConfig::new(&server.uri()).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_lists_first_stream_per_sensor_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/live/streams"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"sensor-1": [
                    {"name": "lobby", "url": "rtsp://vst/lobby", "isMain": true},
                    {"name": "lobby-sub", "url": "rtsp://vst/lobby-sub", "isMain": false}
                ]},
                {"sensor-2": [{"name": "dock", "url": "rtsp://vst/dock"}]},
                {"sensor-3": []}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let streams = client_for(&server).await.get_rtsp_streams().await.unwrap();

        assert_eq!(
            streams,
            vec![
                ActiveStream::new("lobby", "rtsp://vst/lobby"),
                ActiveStream::new("dock", "rtsp://vst/dock"),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/live/streams"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let streams = client_for(&server).await.list_active_streams().await.unwrap();
        assert!(streams.is_empty());
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/live/streams"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = client_for(&server).await.get_rtsp_streams().await.unwrap_err();
        assert!(matches!(err, VstError::RequestFailed { status: 503, ref body } if body == "maintenance"));
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/live/streams"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"streams": "nope"})))
            .mount(&server)
            .await;

        let err = client_for(&server).await.get_rtsp_streams().await.unwrap_err();
        assert!(matches!(err, VstError::InvalidResponse(_)));
    }

    #[test]
    fn test_config_keeps_path_prefix() {
        let config = VstConfig::new("http://127.0.0.1:81/vst").unwrap();
        assert_eq!(
            config.base_url.join(LIVE_STREAMS_PATH).unwrap().as_str(),
            "http://127.0.0.1:81/vst/api/v1/live/streams"
        );
        assert!(VstConfig::new("not a url").is_err());
    }
}
