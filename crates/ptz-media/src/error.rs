//! Error types for pipeline operations.

use thiserror::Error;

use crate::engine::TargetState;

/// Result type for supervisor operations.
pub type SupervisorResult<T> = Result<T, SupervisorError>;

/// The engine could not turn a description into a pipeline.
#[derive(Debug, Clone, Error)]
#[error("Pipeline build failed: {0}")]
pub struct BuildError(pub String);

impl BuildError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Errors raised by named-element property access.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PropertyError {
    #[error("Element not found in pipeline: {0}")]
    ElementNotFound(String),

    #[error("Property {element}.{property} rejected: {reason}")]
    PropertyRejected {
        element: String,
        property: String,
        reason: String,
    },
}

impl PropertyError {
    pub fn element_not_found(element: impl Into<String>) -> Self {
        Self::ElementNotFound(element.into())
    }

    pub fn rejected(
        element: impl Into<String>,
        property: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::PropertyRejected {
            element: element.into(),
            property: property.into(),
            reason: reason.into(),
        }
    }
}

/// A pipeline refused to change state.
///
/// Terminal for the handle that produced it: the handle is only ever
/// superseded by a rebuild, never transitioned again in place.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransitionError {
    #[error("Transition to {target} failed: {reason}")]
    TransitionFailed { target: TargetState, reason: String },
}

impl TransitionError {
    pub fn failed(target: TargetState, reason: impl Into<String>) -> Self {
        Self::TransitionFailed {
            target,
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by [`crate::PipelineSupervisor`].
#[derive(Debug, Clone, Error)]
pub enum SupervisorError {
    #[error("{0}")]
    BuildFailed(#[from] BuildError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Property(#[from] PropertyError),

    #[error("No active pipeline")]
    NoActivePipeline,

    #[error("Unknown pipeline element: {0}")]
    UnknownElement(String),

    #[error("Supervisor has been shut down")]
    ShutDown,
}

impl SupervisorError {
    /// Check if the error means no pipeline was running at the time of the call.
    pub fn is_no_active_pipeline(&self) -> bool {
        matches!(self, SupervisorError::NoActivePipeline)
    }
}
