//! Reconnecting pipeline supervisor.
//!
//! Owns the lifecycle of one pipeline session:
//!
//! ```text
//! Idle --replace--> Starting --ok--> Running
//! Starting --build/play fails--> Idle
//! Running --replace--> Stopping --> Starting
//! Running --engine error--> Stopping --> AwaitingReconnect --delay--> Starting
//! Starting/AwaitingReconnect --stop--> Idle
//! ```
//!
//! Every transition and handle swap happens while holding the session lock,
//! which is shared by `replace()`, `stop()`, the engine-error handler and the
//! reconnect timer. A single worker task consumes engine notifications and
//! drives the reconnect timer; it never blocks request handlers.
//!
//! Property access does not take the session lock. It reads the live slot,
//! which only holds a [`LivePipeline`] while the session is `Running`, so
//! calls made during a rebuild fail fast with
//! [`SupervisorError::NoActivePipeline`]. The slot pairs the handle with the
//! description it was built from, so readers never mix two generations.
//!
//! Engine calls are synchronous and may block; they run on the blocking pool.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::bridge::PropertyBridge;
use crate::engine::{
    EngineEvent, EngineEventKind, EventSink, PipelineDescription, PipelineEngine, PipelineHandle,
    PropertyValue, TargetState,
};
use crate::error::{BuildError, SupervisorError, SupervisorResult, TransitionError};
use crate::metrics;

/// Default delay before a failed pipeline is rebuilt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Lifecycle state of a supervised pipeline session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SupervisorState {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
    AwaitingReconnect,
}

impl SupervisorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupervisorState::Idle => "idle",
            SupervisorState::Starting => "starting",
            SupervisorState::Running => "running",
            SupervisorState::Stopping => "stopping",
            SupervisorState::AwaitingReconnect => "awaiting_reconnect",
        }
    }

    /// Stable numeric encoding used for the state gauge.
    pub fn as_index(&self) -> u8 {
        match self {
            SupervisorState::Idle => 0,
            SupervisorState::Starting => 1,
            SupervisorState::Running => 2,
            SupervisorState::Stopping => 3,
            SupervisorState::AwaitingReconnect => 4,
        }
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Supervisor configuration.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Session name used in logs and metric labels
    pub session: String,
    /// Delay between a runtime failure and the rebuild
    pub retry_delay: Duration,
    /// Give up after this many consecutive failed reconnects (`None` retries forever)
    pub max_reconnect_attempts: Option<u32>,
    /// Element names property access may target (empty allows any)
    pub known_elements: BTreeSet<String>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            session: "ptz".to_string(),
            retry_delay: DEFAULT_RETRY_DELAY,
            max_reconnect_attempts: None,
            known_elements: BTreeSet::new(),
        }
    }
}

impl SupervisorConfig {
    /// Create a config for a named session.
    pub fn new(session: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            ..Default::default()
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, max: Option<u32>) -> Self {
        self.max_reconnect_attempts = max;
        self
    }

    pub fn with_known_elements<I, S>(mut self, elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_elements = elements.into_iter().map(Into::into).collect();
        self
    }
}

/// The running pipeline together with the description it was built from.
///
/// Obtained from [`PipelineSupervisor::live`]. Every read goes to the same
/// handle, even if the supervisor swaps pipelines in the meantime.
#[derive(Debug, Clone)]
pub struct LivePipeline {
    bridge: PropertyBridge,
    description: PipelineDescription,
    known_elements: Arc<BTreeSet<String>>,
}

impl LivePipeline {
    pub fn generation(&self) -> u64 {
        self.bridge.generation()
    }

    pub fn description(&self) -> &PipelineDescription {
        &self.description
    }

    pub fn get_property(&self, element: &str, property: &str) -> SupervisorResult<PropertyValue> {
        check_element(&self.known_elements, element)?;
        Ok(self.bridge.get_property(element, property)?)
    }

    pub fn set_property(
        &self,
        element: &str,
        property: &str,
        value: &PropertyValue,
    ) -> SupervisorResult<()> {
        check_element(&self.known_elements, element)?;
        Ok(self.bridge.set_property(element, property, value)?)
    }
}

fn check_element(known: &BTreeSet<String>, element: &str) -> SupervisorResult<()> {
    if known.is_empty() || known.contains(element) {
        Ok(())
    } else {
        Err(SupervisorError::UnknownElement(element.to_string()))
    }
}

/// Supervises one pipeline session. Cheap to clone.
///
/// ```
/// use std::sync::Arc;
/// use ptz_media::{PipelineSupervisor, SimulatedEngine, SupervisorConfig, SupervisorState};
///
/// # tokio_test::block_on(async {
/// let supervisor = PipelineSupervisor::new(
///     Arc::new(SimulatedEngine::new()),
///     SupervisorConfig::new("doc"),
/// );
/// supervisor
///     .replace("rrpanoramaptz name=rr_panorama_ptz".into())
///     .await
///     .unwrap();
/// assert_eq!(supervisor.state(), SupervisorState::Running);
///
/// supervisor.set_property("rr_panorama_ptz", "zoom", 2.0).unwrap();
/// supervisor.shutdown().await;
/// # });
/// ```
#[derive(Clone)]
pub struct PipelineSupervisor {
    inner: Arc<Inner>,
}

struct Inner {
    config: SupervisorConfig,
    engine: Arc<dyn PipelineEngine>,
    known_elements: Arc<BTreeSet<String>>,
    session: Mutex<Session>,
    live: RwLock<Option<LivePipeline>>,
    state: watch::Sender<SupervisorState>,
    transitions: broadcast::Sender<SupervisorState>,
    schedule: watch::Sender<Option<Instant>>,
    events: mpsc::UnboundedSender<(u64, EngineEvent)>,
    generations: AtomicU64,
    shutdown: watch::Sender<bool>,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct Session {
    /// Last successfully applied description
    description: Option<PipelineDescription>,
    current: Option<PropertyBridge>,
    reconnect_attempts: u32,
    shut_down: bool,
}

impl PipelineSupervisor {
    /// Create a supervisor and spawn its worker task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(engine: Arc<dyn PipelineEngine>, config: SupervisorConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(SupervisorState::Idle);
        let (transitions_tx, _) = broadcast::channel(64);
        let (schedule_tx, schedule_rx) = watch::channel(None);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let known_elements = Arc::new(config.known_elements.clone());
        let inner = Arc::new(Inner {
            config,
            engine,
            known_elements,
            session: Mutex::new(Session::default()),
            live: RwLock::new(None),
            state: state_tx,
            transitions: transitions_tx,
            schedule: schedule_tx,
            events: events_tx,
            generations: AtomicU64::new(0),
            shutdown: shutdown_tx,
            worker: std::sync::Mutex::new(None),
        });

        let span = info_span!("supervisor", session = %inner.config.session);
        let worker = tokio::spawn(
            run_worker(Arc::downgrade(&inner), events_rx, schedule_rx, shutdown_rx).instrument(span),
        );
        *inner.worker.lock().unwrap_or_else(|e| e.into_inner()) = Some(worker);
        metrics::set_state(&inner.config.session, SupervisorState::Idle);

        info!(
            session = %inner.config.session,
            retry_delay = ?inner.config.retry_delay,
            max_reconnect_attempts = ?inner.config.max_reconnect_attempts,
            "Pipeline supervisor created"
        );

        Self { inner }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SupervisorState {
        *self.inner.state.borrow()
    }

    /// Watch the current state.
    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.inner.state.subscribe()
    }

    /// Receive every state transition, in order.
    pub fn transitions(&self) -> broadcast::Receiver<SupervisorState> {
        self.inner.transitions.subscribe()
    }

    /// Last successfully applied description.
    ///
    /// Waits for an in-flight rebuild to finish.
    pub async fn description(&self) -> Option<PipelineDescription> {
        self.inner.session.lock().await.description.clone()
    }

    /// Replace the running pipeline with one built from `description`.
    ///
    /// Returns once the new pipeline is playing or the attempt failed.
    /// Concurrent calls are applied one at a time in arrival order. Any
    /// running pipeline is stopped first; a failure to stop it is logged and
    /// the build proceeds. On failure the session is left `Idle`.
    pub async fn replace(&self, description: PipelineDescription) -> SupervisorResult<()> {
        let inner = &self.inner;
        let mut session = inner.session.lock().await;
        if session.shut_down {
            return Err(SupervisorError::ShutDown);
        }

        inner.cancel_reconnect();
        session.reconnect_attempts = 0;
        inner.teardown(&mut session).await;

        match inner.start(&mut session, description).await {
            Ok(()) => Ok(()),
            Err(e) => {
                inner.set_state(SupervisorState::Idle);
                Err(e)
            }
        }
    }

    /// Stop the session, cancelling any scheduled reconnection.
    pub async fn stop(&self) {
        let inner = &self.inner;
        let mut session = inner.session.lock().await;
        inner.cancel_reconnect();
        inner.teardown(&mut session).await;
        inner.set_state(SupervisorState::Idle);
        info!(session = %inner.config.session, "Pipeline session stopped");
    }

    /// Stop the session, join the worker task and shut the engine down.
    ///
    /// Later calls to [`replace`](Self::replace) fail with
    /// [`SupervisorError::ShutDown`].
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        {
            let mut session = inner.session.lock().await;
            if session.shut_down {
                return;
            }
            session.shut_down = true;
            inner.cancel_reconnect();
            inner.teardown(&mut session).await;
            inner.set_state(SupervisorState::Idle);
        }

        inner.shutdown.send_replace(true);
        let worker = inner.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!("Supervisor worker ended abnormally: {}", e);
            }
        }

        let engine = Arc::clone(&inner.engine);
        if let Err(e) = tokio::task::spawn_blocking(move || engine.shutdown()).await {
            warn!("Engine shutdown task failed: {}", e);
        }
        info!(session = %inner.config.session, "Pipeline supervisor shut down");
    }

    /// Snapshot of the running pipeline.
    ///
    /// Use it to read several properties from one pipeline generation.
    pub fn live(&self) -> SupervisorResult<LivePipeline> {
        self.inner
            .live
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(SupervisorError::NoActivePipeline)
    }

    /// Read a property from the running pipeline.
    pub fn get_property(&self, element: &str, property: &str) -> SupervisorResult<PropertyValue> {
        check_element(&self.inner.known_elements, element)?;
        self.live()?.get_property(element, property)
    }

    /// Write a property on the running pipeline.
    pub fn set_property(
        &self,
        element: &str,
        property: &str,
        value: impl Into<PropertyValue>,
    ) -> SupervisorResult<()> {
        check_element(&self.inner.known_elements, element)?;
        self.live()?.set_property(element, property, &value.into())
    }
}

impl Inner {
    fn current_state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    /// Publish `state`. Transitions are only broadcast when the state changes.
    fn set_state(&self, state: SupervisorState) {
        let previous = self.state.send_replace(state);
        if previous == state {
            return;
        }
        let _ = self.transitions.send(state);
        debug!(from = %previous, to = %state, "Supervisor state changed");
        metrics::set_state(&self.config.session, state);
    }

    fn set_live(&self, live: Option<LivePipeline>) {
        *self.live.write().unwrap_or_else(|e| e.into_inner()) = live;
    }

    fn cancel_reconnect(&self) {
        self.schedule.send_replace(None);
    }

    /// Stop and discard the current pipeline, if any. Best effort.
    async fn teardown(&self, session: &mut Session) {
        let Some(bridge) = session.current.take() else {
            return;
        };

        self.set_state(SupervisorState::Stopping);
        self.set_live(None);

        let generation = bridge.generation();
        match transition_blocking(bridge, TargetState::Stopped).await {
            Ok(()) => info!(generation, "Pipeline stopped"),
            Err(e) => warn!(generation, "Failed to stop pipeline, discarding it anyway: {}", e),
        }
    }

    /// Build and play `description`. Leaves the state at `Starting` on failure.
    async fn start(
        &self,
        session: &mut Session,
        description: PipelineDescription,
    ) -> SupervisorResult<()> {
        self.set_state(SupervisorState::Starting);

        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let sink = EventSink::new(generation, self.events.clone());

        let handle = match build_blocking(Arc::clone(&self.engine), description.clone(), sink).await {
            Ok(handle) => handle,
            Err(e) => {
                error!(generation, "Error creating pipeline: {}", e);
                metrics::record_build(&self.config.session, "build_failed");
                return Err(e.into());
            }
        };

        let bridge = PropertyBridge::new(generation, handle);
        if let Err(e) = transition_blocking(bridge.clone(), TargetState::Playing).await {
            error!(generation, "Error playing the pipeline: {}", e);
            metrics::record_build(&self.config.session, "play_failed");
            if let Err(stop_err) = transition_blocking(bridge, TargetState::Stopped).await {
                warn!(generation, "Failed to stop pipeline after play failure: {}", stop_err);
            }
            return Err(e.into());
        }

        info!(generation, description = %description, "Pipeline playing");
        session.current = Some(bridge.clone());
        session.description = Some(description.clone());
        self.set_live(Some(LivePipeline {
            bridge,
            description,
            known_elements: Arc::clone(&self.known_elements),
        }));
        self.set_state(SupervisorState::Running);
        metrics::record_build(&self.config.session, "ok");
        Ok(())
    }

    /// Move to `AwaitingReconnect` and arm the timer, unless the retry budget is spent.
    fn schedule_reconnect(&self, session: &mut Session) {
        if let Some(max) = self.config.max_reconnect_attempts {
            if session.reconnect_attempts >= max {
                error!(
                    attempts = session.reconnect_attempts,
                    "Giving up on stream reconnection"
                );
                self.cancel_reconnect();
                self.set_state(SupervisorState::Idle);
                return;
            }
        }

        info!(delay = ?self.config.retry_delay, "Scheduling stream reconnection");
        self.set_state(SupervisorState::AwaitingReconnect);
        self.schedule
            .send_replace(Some(Instant::now() + self.config.retry_delay));
    }

    async fn on_engine_event(&self, generation: u64, event: EngineEvent) {
        let mut session = self.session.lock().await;

        let is_current = session.current.as_ref().map(PropertyBridge::generation) == Some(generation);
        if !is_current || session.shut_down {
            debug!(
                generation,
                detail = %event.detail,
                "Ignoring notification from inactive pipeline"
            );
            return;
        }

        match event.kind {
            EngineEventKind::Error => {
                warn!(generation, "Something went wrong: {}", event.detail);
                metrics::record_runtime_error(&self.config.session);
                self.teardown(&mut session).await;
                self.schedule_reconnect(&mut session);
            }
        }
    }

    async fn reconnect(&self) {
        let mut session = self.session.lock().await;
        self.cancel_reconnect();

        if session.shut_down || self.current_state() != SupervisorState::AwaitingReconnect {
            debug!("Reconnection no longer pending");
            return;
        }

        let Some(description) = session.description.clone() else {
            self.set_state(SupervisorState::Idle);
            return;
        };

        session.reconnect_attempts += 1;
        metrics::record_reconnect(&self.config.session);
        info!(attempt = session.reconnect_attempts, "Reconnecting ...");

        match self.start(&mut session, description).await {
            Ok(()) => {
                info!(
                    attempts = session.reconnect_attempts,
                    "Stream reconnected"
                );
                session.reconnect_attempts = 0;
            }
            Err(e) => {
                warn!(
                    attempt = session.reconnect_attempts,
                    "Reconnection attempt failed: {}", e
                );
                self.schedule_reconnect(&mut session);
            }
        }
    }
}

async fn build_blocking(
    engine: Arc<dyn PipelineEngine>,
    description: PipelineDescription,
    events: EventSink,
) -> Result<Box<dyn PipelineHandle>, BuildError> {
    tokio::task::spawn_blocking(move || engine.build(&description, events))
        .await
        .unwrap_or_else(|e| Err(BuildError::new(format!("Blocking task join error: {}", e))))
}

async fn transition_blocking(
    bridge: PropertyBridge,
    target: TargetState,
) -> Result<(), TransitionError> {
    tokio::task::spawn_blocking(move || bridge.transition_to(target))
        .await
        .unwrap_or_else(|e| {
            Err(TransitionError::failed(
                target,
                format!("Blocking task join error: {}", e),
            ))
        })
}

/// Worker loop: engine notifications, reconnect timer and shutdown.
async fn run_worker(
    inner: Weak<Inner>,
    mut events: mpsc::UnboundedReceiver<(u64, EngineEvent)>,
    mut schedule: watch::Receiver<Option<Instant>>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!("Supervisor worker started");

    loop {
        let deadline = *schedule.borrow_and_update();

        tokio::select! {
            biased;

            _ = shutdown.changed() => break,

            event = events.recv() => {
                let Some((generation, event)) = event else { break };
                let Some(inner) = inner.upgrade() else { break };
                inner.on_engine_event(generation, event).await;
            }

            changed = schedule.changed() => {
                if changed.is_err() {
                    break;
                }
            }

            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                let Some(inner) = inner.upgrade() else { break };
                inner.reconnect().await;
            }
        }
    }

    debug!("Supervisor worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PropertyError;
    use crate::simulated::SimulatedEngine;
    use ptz_models::StreamConfig;

    const DELAY: Duration = Duration::from_secs(5);

    fn description(uri: &str) -> PipelineDescription {
        PipelineDescription::new(format!(
            "rtspsrc name=src location={} ! rrpanoramaptz name=rr_panorama_ptz ! rtspsink name=rtspsink service=5021",
            uri
        ))
    }

    fn supervisor(engine: &SimulatedEngine) -> PipelineSupervisor {
        PipelineSupervisor::new(
            Arc::new(engine.clone()),
            SupervisorConfig::new("test")
                .with_retry_delay(DELAY)
                .with_known_elements(["src", "rr_panorama_ptz", "rtspsink"]),
        )
    }

    async fn wait_for(supervisor: &PipelineSupervisor, state: SupervisorState) {
        let mut rx = supervisor.subscribe();
        rx.wait_for(|s| *s == state).await.unwrap();
    }

    #[tokio::test]
    async fn test_replace_reaches_running() {
        let engine = SimulatedEngine::new();
        let supervisor = supervisor(&engine);
        assert_eq!(supervisor.state(), SupervisorState::Idle);

        supervisor.replace(description("rtsp://cam/1")).await.unwrap();

        assert_eq!(supervisor.state(), SupervisorState::Running);
        assert_eq!(engine.playing_count(), 1);
        assert_eq!(supervisor.description().await, Some(description("rtsp://cam/1")));
        assert_eq!(
            supervisor.get_property("src", "location").unwrap(),
            PropertyValue::from("rtsp://cam/1")
        );
    }

    #[tokio::test]
    async fn test_build_failure_leaves_idle() {
        let engine = SimulatedEngine::new();
        engine.fail_builds(Some("no element \"rtspsrc\""));
        let supervisor = supervisor(&engine);

        let err = supervisor.replace(description("rtsp://cam/1")).await.unwrap_err();

        assert!(matches!(err, SupervisorError::BuildFailed(_)));
        assert_eq!(supervisor.state(), SupervisorState::Idle);
        assert!(supervisor.get_property("src", "location").unwrap_err().is_no_active_pipeline());
    }

    #[tokio::test]
    async fn test_play_failure_leaves_idle_and_stops_handle() {
        let engine = SimulatedEngine::new();
        engine.fail_plays(Some("port in use"));
        let supervisor = supervisor(&engine);

        let err = supervisor.replace(description("rtsp://cam/1")).await.unwrap_err();

        assert!(matches!(err, SupervisorError::Transition(_)));
        assert_eq!(supervisor.state(), SupervisorState::Idle);
        assert_eq!(engine.playing_count(), 0);
        assert_eq!(engine.build_count(), 1);
    }

    #[tokio::test]
    async fn test_replace_stops_previous_pipeline() {
        let engine = SimulatedEngine::new();
        let supervisor = supervisor(&engine);

        supervisor.replace(description("rtsp://cam/1")).await.unwrap();
        supervisor.replace(description("rtsp://cam/2")).await.unwrap();

        assert_eq!(engine.playing_count(), 1);
        assert_eq!(engine.max_concurrent_playing(), 1);
        assert_eq!(engine.playing_descriptions(), vec![description("rtsp://cam/2")]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_replaces_converge_to_one_pipeline() {
        let engine = SimulatedEngine::new();
        let supervisor = supervisor(&engine);

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let supervisor = supervisor.clone();
                tokio::spawn(async move {
                    supervisor
                        .replace(description(&format!("rtsp://cam/{}", i)))
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(engine.build_count(), 16);
        assert_eq!(engine.playing_count(), 1);
        assert_eq!(engine.max_concurrent_playing(), 1);

        let applied = supervisor.description().await.unwrap();
        assert_eq!(engine.playing_descriptions(), vec![applied.clone()]);
        assert_eq!(engine.builds().last(), Some(&applied));
    }

    #[tokio::test(start_paused = true)]
    async fn test_runtime_error_triggers_delayed_rebuild_with_same_description() {
        let engine = SimulatedEngine::new();
        let supervisor = supervisor(&engine);
        let mut transitions = supervisor.transitions();

        supervisor.replace(description("rtsp://cam/1")).await.unwrap();
        assert_eq!(engine.inject_error("Could not read from resource"), 1);

        wait_for(&supervisor, SupervisorState::AwaitingReconnect).await;
        let failed_at = Instant::now();
        assert_eq!(engine.playing_count(), 0);

        wait_for(&supervisor, SupervisorState::Running).await;
        let elapsed = failed_at.elapsed();
        assert!(elapsed >= DELAY, "rebuilt too early: {:?}", elapsed);
        assert!(elapsed < DELAY + Duration::from_millis(100), "rebuilt too late: {:?}", elapsed);

        let builds = engine.builds();
        assert_eq!(builds.len(), 2);
        assert_eq!(builds[0], builds[1]);
        assert_eq!(engine.playing_count(), 1);

        let mut seen = Vec::new();
        while let Ok(state) = transitions.try_recv() {
            seen.push(state);
        }
        assert_eq!(
            seen,
            vec![
                SupervisorState::Starting,
                SupervisorState::Running,
                SupervisorState::Stopping,
                SupervisorState::AwaitingReconnect,
                SupervisorState::Starting,
                SupervisorState::Running,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_property_access_fails_fast_while_awaiting_reconnect() {
        let engine = SimulatedEngine::new();
        let supervisor = supervisor(&engine);

        supervisor.replace(description("rtsp://cam/1")).await.unwrap();
        engine.inject_error("stream dropped");
        wait_for(&supervisor, SupervisorState::AwaitingReconnect).await;

        let err = supervisor.get_property("rr_panorama_ptz", "pan").unwrap_err();
        assert!(err.is_no_active_pipeline());
        let err = supervisor
            .set_property("rr_panorama_ptz", "zoom", 2.0)
            .unwrap_err();
        assert!(err.is_no_active_pipeline());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_reconnect() {
        let engine = SimulatedEngine::new();
        let supervisor = supervisor(&engine);

        supervisor.replace(description("rtsp://cam/1")).await.unwrap();
        engine.inject_error("stream dropped");
        wait_for(&supervisor, SupervisorState::AwaitingReconnect).await;

        let mut transitions = supervisor.transitions();
        supervisor.stop().await;
        tokio::time::sleep(DELAY * 3).await;

        assert_eq!(supervisor.state(), SupervisorState::Idle);
        assert_eq!(engine.build_count(), 1);
        assert_eq!(transitions.try_recv().unwrap(), SupervisorState::Idle);
        assert!(transitions.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reconnects_retry_until_source_recovers() {
        let engine = SimulatedEngine::new();
        let supervisor = supervisor(&engine);

        supervisor.replace(description("rtsp://cam/1")).await.unwrap();
        engine.fail_plays(Some("connection refused"));
        engine.inject_error("stream dropped");

        // Three failed attempts, each rescheduled after the fixed delay
        tokio::time::sleep(DELAY * 3 + Duration::from_millis(10)).await;
        assert_eq!(engine.build_count(), 4);
        assert_eq!(supervisor.state(), SupervisorState::AwaitingReconnect);

        engine.fail_plays(None);
        wait_for(&supervisor, SupervisorState::Running).await;
        assert_eq!(engine.build_count(), 5);
        assert_eq!(engine.playing_descriptions(), vec![description("rtsp://cam/1")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_reconnects_give_up() {
        let engine = SimulatedEngine::new();
        let supervisor = PipelineSupervisor::new(
            Arc::new(engine.clone()),
            SupervisorConfig::new("bounded")
                .with_retry_delay(DELAY)
                .with_max_reconnect_attempts(Some(2)),
        );

        supervisor.replace(description("rtsp://cam/1")).await.unwrap();
        engine.fail_builds(Some("unreachable"));
        engine.inject_error("stream dropped");

        tokio::time::sleep(DELAY * 5).await;
        assert_eq!(supervisor.state(), SupervisorState::Idle);
        // Initial build plus two reconnect attempts
        assert_eq!(engine.build_count(), 3);
    }

    #[tokio::test]
    async fn test_unknown_element_rejected_before_engine() {
        let engine = SimulatedEngine::new();
        let supervisor = supervisor(&engine);
        supervisor.replace(description("rtsp://cam/1")).await.unwrap();

        let err = supervisor.get_property("rr_panorama_pts", "pan").unwrap_err();
        assert!(matches!(err, SupervisorError::UnknownElement(ref e) if e == "rr_panorama_pts"));
    }

    #[tokio::test]
    async fn test_property_round_trip_and_rejection() {
        let engine = SimulatedEngine::new();
        let supervisor = supervisor(&engine);
        supervisor.replace(description("rtsp://cam/1")).await.unwrap();

        supervisor.set_property("rr_panorama_ptz", "pan", 1.5).unwrap();
        assert_eq!(
            supervisor.get_property("rr_panorama_ptz", "pan").unwrap(),
            PropertyValue::Float(1.5)
        );

        let err = supervisor
            .set_property("rr_panorama_ptz", "pan", "left")
            .unwrap_err();
        assert!(matches!(
            err,
            SupervisorError::Property(PropertyError::PropertyRejected { .. })
        ));
    }

    #[tokio::test]
    async fn test_shutdown_joins_worker_and_rejects_replace() {
        let engine = SimulatedEngine::new();
        let supervisor = supervisor(&engine);
        supervisor.replace(description("rtsp://cam/1")).await.unwrap();

        supervisor.shutdown().await;

        assert_eq!(engine.playing_count(), 0);
        assert_eq!(engine.shutdown_count(), 1);
        assert_eq!(supervisor.state(), SupervisorState::Idle);
        assert!(matches!(
            supervisor.replace(description("rtsp://cam/2")).await,
            Err(SupervisorError::ShutDown)
        ));

        // A second shutdown is a no-op
        supervisor.shutdown().await;
        assert_eq!(engine.shutdown_count(), 1);
    }

    #[tokio::test]
    async fn test_only_real_transitions_are_broadcast() {
        let engine = SimulatedEngine::new();
        let supervisor = supervisor(&engine);
        let mut transitions = supervisor.transitions();

        supervisor.stop().await;
        assert!(transitions.try_recv().is_err());

        supervisor.replace(description("rtsp://cam/1")).await.unwrap();
        supervisor.stop().await;
        supervisor.stop().await;

        let mut seen = Vec::new();
        while let Ok(state) = transitions.try_recv() {
            seen.push(state);
        }
        assert_eq!(
            seen,
            vec![
                SupervisorState::Starting,
                SupervisorState::Running,
                SupervisorState::Stopping,
                SupervisorState::Idle,
            ]
        );
    }

    #[tokio::test]
    async fn test_live_snapshot_stays_on_its_generation() {
        let engine = SimulatedEngine::new();
        let supervisor = supervisor(&engine);

        let first = description("rtsp://cam/1")
            .with_stream(StreamConfig::new("rtsp://cam/1", 5021, "first"));
        supervisor.replace(first.clone()).await.unwrap();
        let live = supervisor.live().unwrap();
        assert_eq!(live.description(), &first);

        supervisor.replace(description("rtsp://cam/2")).await.unwrap();

        // The old snapshot keeps answering from the pipeline it was taken from
        assert_eq!(
            live.get_property("src", "location").unwrap(),
            PropertyValue::from("rtsp://cam/1")
        );
        assert_eq!(live.description().stream().map(|s| s.out_mapping.as_str()), Some("first"));

        let current = supervisor.live().unwrap();
        assert!(current.generation() > live.generation());
        assert_eq!(current.description().stream(), None);
        assert!(matches!(
            current.get_property("sink", "service"),
            Err(SupervisorError::UnknownElement(_))
        ));
    }
}
