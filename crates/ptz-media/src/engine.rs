//! Pipeline engine contract.
//!
//! The engine turns a textual [`PipelineDescription`] into a running
//! pipeline. Everything the supervisor needs from it is expressed by two
//! traits:
//! - [`PipelineEngine`] builds handles
//! - [`PipelineHandle`] changes state and reads/writes element properties
//!
//! Runtime failures are not reported through return values. Each built
//! handle receives an [`EventSink`] tagged with the handle's generation and
//! pushes [`EngineEvent`]s into it until it is stopped.

use std::fmt;

use ptz_models::StreamConfig;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{BuildError, PropertyError, TransitionError};

/// Declarative description of a pipeline topology.
///
/// May carry the stream configuration it was rendered from. The supervisor
/// publishes it together with the live handle, so both are always read from
/// the same pipeline generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineDescription {
    launch: String,
    stream: Option<StreamConfig>,
}

impl PipelineDescription {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            launch: description.into(),
            stream: None,
        }
    }

    /// Attach the stream configuration this description implements.
    pub fn with_stream(mut self, stream: StreamConfig) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn as_str(&self) -> &str {
        &self.launch
    }

    pub fn stream(&self) -> Option<&StreamConfig> {
        self.stream.as_ref()
    }
}

impl fmt::Display for PipelineDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.launch)
    }
}

impl From<String> for PipelineDescription {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for PipelineDescription {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Target of a pipeline state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetState {
    Playing,
    Stopped,
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetState::Playing => write!(f, "playing"),
            TargetState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Dynamically typed element property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl PropertyValue {
    /// Numeric view of the value. Integers widen to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(v) => Some(*v),
            PropertyValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Integer view of the value.
    ///
    /// Strings holding a decimal integer are accepted, since some sinks
    /// expose ports as string properties.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            PropertyValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Short type name used in log and error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Int(_) => "int",
            PropertyValue::Float(_) => "float",
            PropertyValue::String(_) => "string",
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "{}", v),
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::Float(v) => write!(f, "{}", v),
            PropertyValue::String(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// Kind of an out-of-band engine notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEventKind {
    Error,
}

/// Out-of-band notification emitted by a running pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineEvent {
    pub kind: EngineEventKind,
    pub detail: String,
}

impl EngineEvent {
    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            kind: EngineEventKind::Error,
            detail: detail.into(),
        }
    }
}

/// Notification channel handed to one built pipeline.
///
/// Events are tagged with the generation of the handle they belong to so
/// late events from a replaced pipeline can be told apart from events of
/// the live one.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<(u64, EngineEvent)>,
}

impl EventSink {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<(u64, EngineEvent)>) -> Self {
        Self { generation, tx }
    }

    /// Generation of the handle this sink belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report an event. Returns `false` once the receiving side is gone.
    pub fn send(&self, event: EngineEvent) -> bool {
        self.tx.send((self.generation, event)).is_ok()
    }

    /// Report a pipeline error.
    pub fn error(&self, detail: impl Into<String>) -> bool {
        self.send(EngineEvent::error(detail))
    }
}

/// Builds pipelines from descriptions.
///
/// Engine calls may block; the supervisor runs them on the blocking pool.
pub trait PipelineEngine: Send + Sync + 'static {
    /// Parse `description` and construct a pipeline in the stopped state.
    fn build(
        &self,
        description: &PipelineDescription,
        events: EventSink,
    ) -> Result<Box<dyn PipelineHandle>, BuildError>;

    /// Release engine-wide resources such as event loop threads.
    ///
    /// Called once all pipelines are torn down. Must be idempotent.
    fn shutdown(&self) {}
}

/// A constructed pipeline.
pub trait PipelineHandle: Send + Sync {
    /// Change the pipeline state.
    fn set_state(&self, state: TargetState) -> Result<(), TransitionError>;

    /// Read a property of a named element.
    fn get_property(&self, element: &str, property: &str) -> Result<PropertyValue, PropertyError>;

    /// Write a property of a named element.
    fn set_property(
        &self,
        element: &str,
        property: &str,
        value: &PropertyValue,
    ) -> Result<(), PropertyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_value_numeric_views() {
        assert_eq!(PropertyValue::Int(5021).as_i64(), Some(5021));
        assert_eq!(PropertyValue::from("5021").as_i64(), Some(5021));
        assert_eq!(PropertyValue::from("ptz").as_i64(), None);
        assert_eq!(PropertyValue::Int(2).as_f64(), Some(2.0));
        assert_eq!(PropertyValue::Float(1.5).as_f64(), Some(1.5));
        assert_eq!(PropertyValue::Bool(true).as_f64(), None);
    }

    #[test]
    fn test_property_value_untagged_json() {
        let value: PropertyValue = serde_json::from_str("1.5").unwrap();
        assert_eq!(value, PropertyValue::Float(1.5));
        let value: PropertyValue = serde_json::from_str("\"rtsp://cam\"").unwrap();
        assert_eq!(value.as_str(), Some("rtsp://cam"));
    }

    #[test]
    fn test_event_sink_tags_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(7, tx);
        assert!(sink.error("source dropped"));

        let (generation, event) = rx.try_recv().unwrap();
        assert_eq!(generation, 7);
        assert_eq!(event, EngineEvent::error("source dropped"));

        drop(rx);
        assert!(!sink.error("nobody listening"));
    }

    #[test]
    fn test_description_carries_stream() {
        let plain = PipelineDescription::new("fakesrc ! fakesink");
        assert_eq!(plain.stream(), None);

        let stream = StreamConfig::new("rtsp://cam/1", 5021, "ptz_out");
        let described = plain.clone().with_stream(stream.clone());
        assert_eq!(described.stream(), Some(&stream));
        assert_eq!(described.to_string(), "fakesrc ! fakesink");
        assert_ne!(described, plain);
    }
}
