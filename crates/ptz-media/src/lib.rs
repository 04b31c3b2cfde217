//! Pipeline supervision for the PTZ service.
//!
//! This crate provides:
//! - An engine abstraction over a media framework ([`PipelineEngine`])
//! - A property bridge for reading and writing element properties
//! - A supervisor that owns the pipeline lifecycle and rebuilds it after runtime failures

pub mod bridge;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod supervisor;

#[cfg(feature = "gstreamer")]
pub mod gst;
#[cfg(any(test, feature = "simulated"))]
pub mod simulated;

pub use bridge::PropertyBridge;
pub use engine::{
    EngineEvent, EngineEventKind, EventSink, PipelineDescription, PipelineEngine, PipelineHandle,
    PropertyValue, TargetState,
};
pub use error::{BuildError, PropertyError, SupervisorError, SupervisorResult, TransitionError};
pub use supervisor::{
    LivePipeline, PipelineSupervisor, SupervisorConfig, SupervisorState, DEFAULT_RETRY_DELAY,
};

#[cfg(feature = "gstreamer")]
pub use gst::GstEngine;
#[cfg(any(test, feature = "simulated"))]
pub use simulated::SimulatedEngine;
