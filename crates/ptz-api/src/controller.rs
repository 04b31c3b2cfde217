//! PTZ controller.
//!
//! Composes stream resolution, the pipeline template and the supervisor
//! into the position, zoom and stream operations served over HTTP.

use ptz_media::{PipelineSupervisor, PropertyValue, SupervisorError};
use ptz_models::{Position, StreamConfig, Zoom};
use ptz_vst::{ResolveError, StreamResolver};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::pipeline::{self, PTZ_ELEMENT, SINK_ELEMENT, SRC_ELEMENT};

pub type ControllerResult<T> = Result<T, ControllerError>;

/// Controller failures, carrying the operation they happened in.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Error resolving input stream: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Error {operation}: {source}")]
    Pipeline {
        operation: &'static str,
        #[source]
        source: SupervisorError,
    },

    #[error("Error {operation}: unexpected {property} value '{value}'")]
    UnexpectedValue {
        operation: &'static str,
        property: &'static str,
        value: PropertyValue,
    },

    #[error("Error getting stream: running pipeline has no stream configuration")]
    NoStreamApplied,
}

impl ControllerError {
    fn pipeline(operation: &'static str) -> impl FnOnce(SupervisorError) -> Self {
        move |source| Self::Pipeline { operation, source }
    }

    fn unexpected(operation: &'static str, property: &'static str, value: PropertyValue) -> Self {
        Self::UnexpectedValue {
            operation,
            property,
            value,
        }
    }

    /// Check if the failure was caused by there being no running pipeline.
    pub fn is_no_active_pipeline(&self) -> bool {
        matches!(self, Self::Pipeline { source, .. } if source.is_no_active_pipeline())
    }
}

/// Pan/tilt/zoom control over the supervised pipeline.
pub struct PtzController {
    supervisor: PipelineSupervisor,
    resolver: StreamResolver,
    window_size: u32,
    /// Serializes stream changes end to end
    apply: Mutex<()>,
}

impl PtzController {
    pub fn new(supervisor: PipelineSupervisor, resolver: StreamResolver, window_size: u32) -> Self {
        Self {
            supervisor,
            resolver,
            window_size,
            apply: Mutex::new(()),
        }
    }

    pub fn supervisor(&self) -> &PipelineSupervisor {
        &self.supervisor
    }

    pub fn get_position(&self) -> ControllerResult<Position> {
        const OP: &str = "getting position";
        let pan = self.read_f64(OP, "pan")?;
        let tilt = self.read_f64(OP, "tilt")?;
        info!(pan, tilt, "Getting position from the pipeline");
        Ok(Position::new(pan, tilt))
    }

    pub fn set_position(&self, position: &Position) -> ControllerResult<()> {
        const OP: &str = "setting position";
        self.supervisor
            .set_property(PTZ_ELEMENT, "pan", position.pan)
            .map_err(ControllerError::pipeline(OP))?;
        self.supervisor
            .set_property(PTZ_ELEMENT, "tilt", position.tilt)
            .map_err(ControllerError::pipeline(OP))?;
        info!("Setting position to {}", position);
        Ok(())
    }

    pub fn get_zoom(&self) -> ControllerResult<Zoom> {
        let zoom = self.read_f64("getting zoom", "zoom")?;
        info!(zoom, "Getting zoom");
        Ok(Zoom::new(zoom))
    }

    pub fn set_zoom(&self, zoom: &Zoom) -> ControllerResult<()> {
        self.supervisor
            .set_property(PTZ_ELEMENT, "zoom", zoom.zoom)
            .map_err(ControllerError::pipeline("setting zoom"))?;
        info!("Setting zoom to {}", zoom);
        Ok(())
    }

    /// Current stream: input and port are read from the running pipeline,
    /// the mapping from the configuration that pipeline was built from.
    ///
    /// All three fields come from the same pipeline generation.
    pub fn get_stream(&self) -> ControllerResult<StreamConfig> {
        const OP: &str = "getting stream";

        let live = self.supervisor.live().map_err(ControllerError::pipeline(OP))?;

        let location = live
            .get_property(SRC_ELEMENT, "location")
            .map_err(ControllerError::pipeline(OP))?;
        let in_uri = match location.as_str() {
            Some(uri) => uri.to_string(),
            None => return Err(ControllerError::unexpected(OP, "in_uri", location)),
        };

        let service = live
            .get_property(SINK_ELEMENT, "service")
            .map_err(ControllerError::pipeline(OP))?;
        let out_port = match service.as_i64().and_then(|p| u32::try_from(p).ok()) {
            Some(port) => port,
            None => return Err(ControllerError::unexpected(OP, "out_port", service)),
        };

        let out_mapping = live
            .description()
            .stream()
            .map(|applied| applied.out_mapping.clone())
            .ok_or(ControllerError::NoStreamApplied)?;

        info!(generation = live.generation(), "Getting: in_uri, out_port and out_mapping");
        Ok(StreamConfig::new(in_uri, out_port, out_mapping))
    }

    /// Resolve the input, render the pipeline and replace the running one.
    ///
    /// Concurrent calls are applied one at a time. The configuration travels
    /// with the description, so it becomes visible together with the new
    /// pipeline.
    pub async fn set_stream(&self, config: &StreamConfig) -> ControllerResult<()> {
        let _apply = self.apply.lock().await;

        let source = self.resolver.resolve(&config.in_uri).await?;
        let description = pipeline::render(
            source.as_str(),
            config.out_port,
            &config.out_mapping,
            self.window_size,
        )
        .with_stream(config.clone());

        self.supervisor
            .replace(description)
            .await
            .map_err(ControllerError::pipeline("setting stream"))?;

        info!(
            in_uri = %config.in_uri,
            uri = %source.as_str(),
            out_port = config.out_port,
            out_mapping = %config.out_mapping,
            "Stream applied"
        );
        Ok(())
    }

    fn read_f64(&self, operation: &'static str, property: &'static str) -> ControllerResult<f64> {
        let value = self
            .supervisor
            .get_property(PTZ_ELEMENT, property)
            .map_err(ControllerError::pipeline(operation))?;
        value
            .as_f64()
            .ok_or_else(|| ControllerError::unexpected(operation, property, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use ptz_media::{SimulatedEngine, SupervisorConfig};
    use ptz_vst::{ActiveStream, StreamDirectory, VstResult};

    #[derive(Default)]
    struct FakeDirectory {
        streams: Vec<ActiveStream>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl StreamDirectory for FakeDirectory {
        async fn list_active_streams(&self) -> VstResult<Vec<ActiveStream>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.streams.clone())
        }
    }

    fn controller(engine: &SimulatedEngine, directory: Arc<FakeDirectory>) -> PtzController {
        let supervisor = PipelineSupervisor::new(
            Arc::new(engine.clone()),
            SupervisorConfig::new("test").with_known_elements(pipeline::KNOWN_ELEMENTS),
        );
        PtzController::new(supervisor, StreamResolver::new(directory), 500)
    }

    #[tokio::test]
    async fn test_direct_uri_skips_directory() {
        let engine = SimulatedEngine::new();
        let directory = Arc::new(FakeDirectory::default());
        let controller = controller(&engine, directory.clone());

        controller
            .set_stream(&StreamConfig::new("rtsp://cam/1", 5021, "ptz_out"))
            .await
            .unwrap();

        assert_eq!(directory.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            engine.playing_descriptions(),
            vec![pipeline::render("rtsp://cam/1", 5021, "ptz_out", 500)
                .with_stream(StreamConfig::new("rtsp://cam/1", 5021, "ptz_out"))]
        );
    }

    #[tokio::test]
    async fn test_empty_directory_builds_nothing() {
        let engine = SimulatedEngine::new();
        let controller = controller(&engine, Arc::new(FakeDirectory::default()));

        let err = controller
            .set_stream(&StreamConfig::new("lobby", 5021, "ptz_out"))
            .await
            .unwrap_err();

        assert!(matches!(err, ControllerError::Resolve(ResolveError::NoActiveStreams)));
        assert_eq!(engine.build_count(), 0);
    }

    #[tokio::test]
    async fn test_get_stream_merges_live_and_applied() {
        let engine = SimulatedEngine::new();
        let directory = Arc::new(FakeDirectory {
            streams: vec![ActiveStream::new("lobby", "rtsp://vst/lobby")],
            ..Default::default()
        });
        let controller = controller(&engine, directory);

        controller
            .set_stream(&StreamConfig::new("lobby", 8554, "cam_ptz"))
            .await
            .unwrap();

        assert_eq!(
            controller.get_stream().unwrap(),
            StreamConfig::new("rtsp://vst/lobby", 8554, "cam_ptz")
        );
    }

    #[tokio::test]
    async fn test_position_and_zoom_echo() {
        let engine = SimulatedEngine::new();
        let controller = controller(&engine, Arc::new(FakeDirectory::default()));
        controller
            .set_stream(&StreamConfig::new("rtsp://cam/1", 5021, "ptz_out"))
            .await
            .unwrap();

        controller.set_position(&Position::new(1.5, -2.0)).unwrap();
        assert_eq!(controller.get_position().unwrap(), Position::new(1.5, -2.0));

        assert_eq!(controller.get_zoom().unwrap(), Zoom::new(1.0));
        controller.set_zoom(&Zoom::new(3.0)).unwrap();
        assert_eq!(controller.get_zoom().unwrap(), Zoom::new(3.0));
    }

    #[tokio::test]
    async fn test_reads_fail_fast_without_pipeline() {
        let engine = SimulatedEngine::new();
        let controller = controller(&engine, Arc::new(FakeDirectory::default()));

        assert!(controller.get_position().unwrap_err().is_no_active_pipeline());
        assert!(controller.get_zoom().unwrap_err().is_no_active_pipeline());
        assert!(controller.get_stream().unwrap_err().is_no_active_pipeline());
        assert!(controller
            .set_position(&Position::new(0.0, 0.0))
            .unwrap_err()
            .is_no_active_pipeline());
    }

    #[tokio::test]
    async fn test_failed_replace_keeps_previous_applied_config() {
        let engine = SimulatedEngine::new();
        let controller = controller(&engine, Arc::new(FakeDirectory::default()));
        controller
            .set_stream(&StreamConfig::new("rtsp://cam/1", 5021, "first"))
            .await
            .unwrap();

        engine.fail_builds(Some("no element \"rtspsrc\""));
        let err = controller
            .set_stream(&StreamConfig::new("rtsp://cam/2", 5022, "second"))
            .await
            .unwrap_err();

        assert!(matches!(err, ControllerError::Pipeline { operation: "setting stream", .. }));
        assert!(controller.get_stream().unwrap_err().is_no_active_pipeline());
        let last = controller.supervisor().description().await.unwrap();
        assert_eq!(last.stream().map(|c| c.out_mapping.as_str()), Some("first"));
    }

    fn numbered_stream(i: u32) -> StreamConfig {
        StreamConfig::new(format!("rtsp://cam/{}", i), 5000 + i, format!("map_{}", i))
    }

    fn is_consistent(stream: &StreamConfig) -> bool {
        let Some(i) = stream.in_uri.strip_prefix("rtsp://cam/").and_then(|i| i.parse().ok()) else {
            return false;
        };
        *stream == numbered_stream(i)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_set_stream_keeps_readback_consistent() {
        let engine = SimulatedEngine::new();
        let controller = Arc::new(controller(&engine, Arc::new(FakeDirectory::default())));
        let done = Arc::new(AtomicBool::new(false));

        let reader = {
            let controller = Arc::clone(&controller);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                let mut mixed = Vec::new();
                while !done.load(Ordering::SeqCst) {
                    if let Ok(stream) = controller.get_stream() {
                        if !is_consistent(&stream) {
                            mixed.push(stream);
                        }
                    }
                }
                mixed
            })
        };

        let tasks: Vec<_> = (0..100)
            .map(|i| {
                let controller = Arc::clone(&controller);
                tokio::spawn(async move { controller.set_stream(&numbered_stream(i % 8)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        done.store(true, Ordering::SeqCst);
        let mixed = reader.join().unwrap();
        assert!(mixed.is_empty(), "mixed readback: {:?}", mixed.first());

        assert_eq!(engine.playing_count(), 1);
        assert_eq!(engine.max_concurrent_playing(), 1);
        let live = engine.playing_descriptions().remove(0);
        assert_eq!(controller.get_stream().unwrap(), live.stream().cloned().unwrap());
    }
}
