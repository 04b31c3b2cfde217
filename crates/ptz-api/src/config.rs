//! API configuration.

use std::time::Duration;

use clap::{ArgAction, Parser};
use ptz_media::SupervisorConfig;
use ptz_models::StreamConfig;

use crate::pipeline;

/// PTZ server configuration.
///
/// Every flag falls back to an environment variable, so the service can be
/// configured from a `.env` file as well as from the command line.
#[derive(Debug, Clone, Parser)]
#[command(name = "ptz", version, about = "Pan/tilt/zoom control service")]
pub struct ApiConfig {
    /// Server ip address
    #[arg(long, env = "PTZ_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port for server
    #[arg(long, env = "PTZ_PORT", default_value_t = 5010)]
    pub port: u16,

    /// Size of the PTZ output window in pixels. The final resolution will be (Size x Size)
    #[arg(long, env = "PTZ_WINDOW_SIZE", default_value_t = 500)]
    pub ptz_window_size: u32,

    /// URL of the VST service used to resolve stream names
    #[arg(long, env = "VST_URL", default_value = "http://127.0.0.1:81")]
    pub vst_url: String,

    /// Seconds to wait before rebuilding a failed pipeline
    #[arg(long, env = "PTZ_RECONNECT_DELAY_SECS", default_value_t = 5)]
    pub reconnect_delay_secs: u64,

    /// Give up after this many consecutive failed reconnects (unset retries forever)
    #[arg(long, env = "PTZ_MAX_RECONNECT_ATTEMPTS")]
    pub max_reconnect_attempts: Option<u32>,

    /// Allowed CORS origins, comma separated
    #[arg(long, env = "CORS_ORIGINS", default_value = "*", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    /// Max request body size in bytes
    #[arg(long, env = "PTZ_MAX_BODY_SIZE", default_value_t = 64 * 1024)]
    pub max_body_size: usize,

    /// Input URI or VST stream name applied at startup
    #[arg(long, env = "PTZ_INITIAL_IN_URI", default_value_t = String::new())]
    pub initial_in_uri: String,

    /// Output RTSP port applied at startup
    #[arg(long, env = "PTZ_INITIAL_OUT_PORT", default_value_t = 5021)]
    pub initial_out_port: u32,

    /// Output RTSP mapping applied at startup
    #[arg(long, env = "PTZ_INITIAL_OUT_MAPPING", default_value = "ptz_out")]
    pub initial_out_mapping: String,

    /// Expose Prometheus metrics at /metrics
    #[arg(long = "metrics", env = "METRICS_ENABLED", default_value_t = true, action = ArgAction::Set)]
    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        let initial = StreamConfig::default();
        Self {
            host: "127.0.0.1".to_string(),
            port: 5010,
            ptz_window_size: 500,
            vst_url: "http://127.0.0.1:81".to_string(),
            reconnect_delay_secs: 5,
            max_reconnect_attempts: None,
            cors_origins: vec!["*".to_string()],
            max_body_size: 64 * 1024,
            initial_in_uri: initial.in_uri,
            initial_out_port: initial.out_port,
            initial_out_mapping: initial.out_mapping,
            metrics_enabled: true,
        }
    }
}

impl ApiConfig {
    /// Address the HTTP server binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    /// Stream applied when the service starts.
    pub fn initial_stream(&self) -> StreamConfig {
        StreamConfig::new(
            self.initial_in_uri.clone(),
            self.initial_out_port,
            self.initial_out_mapping.clone(),
        )
    }

    /// Supervisor settings for the PTZ pipeline session.
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig::new("ptz")
            .with_retry_delay(self.reconnect_delay())
            .with_max_reconnect_attempts(self.max_reconnect_attempts)
            .with_known_elements(pipeline::KNOWN_ELEMENTS)
    }
}
