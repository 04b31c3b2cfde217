//! PTZ API server binary.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ptz_api::{create_router, metrics, ApiConfig, AppState};
use ptz_media::PipelineEngine;
use ptz_vst::{VstClient, VstConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing()?;

    let config = ApiConfig::parse();
    info!(
        host = %config.host,
        port = config.port,
        window_size = config.ptz_window_size,
        vst_url = %config.vst_url,
        "Starting ptz"
    );

    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics()?)
    } else {
        None
    };

    let engine = create_engine()?;
    let vst = VstClient::new(VstConfig::new(&config.vst_url)?)?;
    let state = AppState::new(config.clone(), engine, Arc::new(vst));

    // A missing source must not keep the API from coming up
    let initial = config.initial_stream();
    match state.controller.set_stream(&initial).await {
        Ok(()) => info!(in_uri = %initial.in_uri, "Initial stream applied"),
        Err(e) => error!("Failed to apply initial stream: {}", e),
    }

    let supervisor = state.supervisor().clone();
    let app = create_router(state, metrics_handle);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    supervisor.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Colored output for dev, JSON when `LOG_FORMAT=json`.
fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("ptz=info".parse()?)
        .add_directive("ptz_api=info".parse()?)
        .add_directive("ptz_media=info".parse()?)
        .add_directive("ptz_vst=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

#[cfg(feature = "gstreamer")]
fn create_engine() -> anyhow::Result<Arc<dyn PipelineEngine>> {
    Ok(Arc::new(ptz_media::GstEngine::new()?))
}

#[cfg(not(feature = "gstreamer"))]
fn create_engine() -> anyhow::Result<Arc<dyn PipelineEngine>> {
    warn!("Built without the gstreamer feature, using the in-memory pipeline engine");
    Ok(Arc::new(ptz_media::SimulatedEngine::new()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
