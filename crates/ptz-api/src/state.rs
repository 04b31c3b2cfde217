//! Application state.

use std::sync::Arc;

use ptz_media::{PipelineEngine, PipelineSupervisor};
use ptz_vst::{StreamDirectory, StreamResolver};

use crate::config::ApiConfig;
use crate::controller::PtzController;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub controller: Arc<PtzController>,
}

impl AppState {
    /// Wire the supervisor, resolver and controller for `engine` and `directory`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: ApiConfig,
        engine: Arc<dyn PipelineEngine>,
        directory: Arc<dyn StreamDirectory>,
    ) -> Self {
        let supervisor = PipelineSupervisor::new(engine, config.supervisor_config());
        let resolver = StreamResolver::new(directory);
        let controller = PtzController::new(supervisor, resolver, config.ptz_window_size);

        Self {
            config,
            controller: Arc::new(controller),
        }
    }

    pub fn supervisor(&self) -> &PipelineSupervisor {
        self.controller.supervisor()
    }
}
