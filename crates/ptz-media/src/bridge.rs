//! Property bridge over a single built pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::engine::{PipelineHandle, PropertyValue, TargetState};
use crate::error::{PropertyError, TransitionError};

/// Shared access to one pipeline handle.
///
/// Cloning is cheap; all clones refer to the same pipeline. The bridge
/// never retries: every engine failure is returned to the caller as is.
#[derive(Clone)]
pub struct PropertyBridge {
    generation: u64,
    handle: Arc<dyn PipelineHandle>,
    failed: Arc<AtomicBool>,
}

impl PropertyBridge {
    pub fn new(generation: u64, handle: Box<dyn PipelineHandle>) -> Self {
        Self {
            generation,
            handle: Arc::from(handle),
            failed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Generation number assigned by the supervisor when the pipeline was built.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a state transition on this handle has already failed.
    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn set_property(
        &self,
        element: &str,
        property: &str,
        value: &PropertyValue,
    ) -> Result<(), PropertyError> {
        self.handle.set_property(element, property, value)?;
        debug!(
            generation = self.generation,
            element, property, %value, "Property set"
        );
        Ok(())
    }

    pub fn get_property(&self, element: &str, property: &str) -> Result<PropertyValue, PropertyError> {
        let value = self.handle.get_property(element, property)?;
        debug!(
            generation = self.generation,
            element, property, %value, "Property read"
        );
        Ok(value)
    }

    /// Move the pipeline to `target`.
    ///
    /// After a failed transition the handle only accepts `Stopped`, so it can
    /// still be torn down but never restarted in place.
    pub fn transition_to(&self, target: TargetState) -> Result<(), TransitionError> {
        if target == TargetState::Playing && self.is_failed() {
            return Err(TransitionError::failed(
                target,
                "handle already failed a transition",
            ));
        }

        match self.handle.set_state(target) {
            Ok(()) => {
                debug!(generation = self.generation, %target, "Pipeline transitioned");
                Ok(())
            }
            Err(e) => {
                self.failed.store(true, Ordering::SeqCst);
                warn!(generation = self.generation, %target, "Pipeline transition failed: {}", e);
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for PropertyBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyBridge")
            .field("generation", &self.generation)
            .field("failed", &self.is_failed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Handle whose transitions fail on demand and which counts calls.
    #[derive(Default)]
    struct FlakyHandle {
        fail_play: bool,
        calls: Mutex<Vec<TargetState>>,
    }

    impl PipelineHandle for FlakyHandle {
        fn set_state(&self, state: TargetState) -> Result<(), TransitionError> {
            self.calls.lock().unwrap().push(state);
            if self.fail_play && state == TargetState::Playing {
                return Err(TransitionError::failed(state, "sink refused"));
            }
            Ok(())
        }

        fn get_property(&self, element: &str, _property: &str) -> Result<PropertyValue, PropertyError> {
            Err(PropertyError::element_not_found(element))
        }

        fn set_property(
            &self,
            element: &str,
            property: &str,
            _value: &PropertyValue,
        ) -> Result<(), PropertyError> {
            Err(PropertyError::rejected(element, property, "read-only"))
        }
    }

    #[test]
    fn test_failed_transition_is_terminal() {
        let bridge = PropertyBridge::new(
            1,
            Box::new(FlakyHandle {
                fail_play: true,
                ..Default::default()
            }),
        );

        assert!(bridge.transition_to(TargetState::Playing).is_err());
        assert!(bridge.is_failed());

        // A second play is refused without reaching the engine
        let err = bridge.transition_to(TargetState::Playing).unwrap_err();
        assert!(matches!(err, TransitionError::TransitionFailed { .. }));

        // Teardown is still allowed
        assert!(bridge.transition_to(TargetState::Stopped).is_ok());
    }

    #[test]
    fn test_property_errors_pass_through() {
        let bridge = PropertyBridge::new(3, Box::new(FlakyHandle::default()));

        assert_eq!(
            bridge.get_property("missing", "pan").unwrap_err(),
            PropertyError::element_not_found("missing")
        );
        assert!(matches!(
            bridge.set_property("src", "location", &"rtsp://cam".into()),
            Err(PropertyError::PropertyRejected { .. })
        ));
        assert_eq!(bridge.generation(), 3);
    }
}
