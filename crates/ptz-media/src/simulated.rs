//! In-memory pipeline engine.
//!
//! Parses launch-style descriptions well enough to know which named
//! elements exist and what their initial properties are, then echoes
//! property writes back on reads. Failures can be injected at build time,
//! at play time, or while a pipeline is playing.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::engine::{EventSink, PipelineDescription, PipelineEngine, PipelineHandle, PropertyValue, TargetState};
use crate::error::{BuildError, PropertyError, TransitionError};

type Elements = HashMap<String, HashMap<String, PropertyValue>>;

/// Shareable handle to a simulated engine. Clones observe the same state.
#[derive(Clone, Default)]
pub struct SimulatedEngine {
    shared: Arc<Mutex<Shared>>,
}

#[derive(Default)]
struct Shared {
    builds: Vec<PipelineDescription>,
    next_id: u64,
    playing: BTreeMap<u64, (PipelineDescription, EventSink)>,
    max_playing: usize,
    build_failure: Option<String>,
    play_failure: Option<String>,
    shutdowns: usize,
}

impl SimulatedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every following build fail with `reason` (`None` clears it).
    pub fn fail_builds(&self, reason: Option<&str>) {
        self.lock().build_failure = reason.map(str::to_string);
    }

    /// Make every following transition to playing fail with `reason` (`None` clears it).
    pub fn fail_plays(&self, reason: Option<&str>) {
        self.lock().play_failure = reason.map(str::to_string);
    }

    /// Report a runtime error from every playing pipeline.
    ///
    /// Returns how many pipelines the error was delivered to.
    pub fn inject_error(&self, detail: &str) -> usize {
        let sinks: Vec<EventSink> = self.lock().playing.values().map(|(_, sink)| sink.clone()).collect();
        sinks.iter().filter(|sink| sink.error(detail)).count()
    }

    /// Every description a build was attempted for, in order.
    pub fn builds(&self) -> Vec<PipelineDescription> {
        self.lock().builds.clone()
    }

    pub fn build_count(&self) -> usize {
        self.lock().builds.len()
    }

    pub fn playing_count(&self) -> usize {
        self.lock().playing.len()
    }

    /// Highest number of pipelines that were ever playing at the same time.
    pub fn max_concurrent_playing(&self) -> usize {
        self.lock().max_playing
    }

    pub fn playing_descriptions(&self) -> Vec<PipelineDescription> {
        self.lock().playing.values().map(|(d, _)| d.clone()).collect()
    }

    /// How many times the engine was shut down.
    pub fn shutdown_count(&self) -> usize {
        self.lock().shutdowns
    }
}

impl PipelineEngine for SimulatedEngine {
    fn build(
        &self,
        description: &PipelineDescription,
        events: EventSink,
    ) -> Result<Box<dyn PipelineHandle>, BuildError> {
        let id = {
            let mut shared = self.lock();
            shared.builds.push(description.clone());
            if let Some(reason) = &shared.build_failure {
                return Err(BuildError::new(reason.clone()));
            }
            shared.next_id += 1;
            shared.next_id
        };

        let elements = parse_elements(description.as_str())?;
        debug!(id, elements = elements.len(), "Simulated pipeline built");

        Ok(Box::new(SimulatedHandle {
            id,
            description: description.clone(),
            events,
            elements: Mutex::new(elements),
            shared: Arc::clone(&self.shared),
        }))
    }

    fn shutdown(&self) {
        self.lock().shutdowns += 1;
        debug!("Simulated engine shut down");
    }
}

struct SimulatedHandle {
    id: u64,
    description: PipelineDescription,
    events: EventSink,
    elements: Mutex<Elements>,
    shared: Arc<Mutex<Shared>>,
}

impl SimulatedHandle {
    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn elements(&self) -> MutexGuard<'_, Elements> {
        self.elements.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PipelineHandle for SimulatedHandle {
    fn set_state(&self, state: TargetState) -> Result<(), TransitionError> {
        let mut shared = self.shared();
        match state {
            TargetState::Playing => {
                if let Some(reason) = &shared.play_failure {
                    return Err(TransitionError::failed(state, reason.clone()));
                }
                shared
                    .playing
                    .insert(self.id, (self.description.clone(), self.events.clone()));
                shared.max_playing = shared.max_playing.max(shared.playing.len());
            }
            TargetState::Stopped => {
                shared.playing.remove(&self.id);
            }
        }
        Ok(())
    }

    fn get_property(&self, element: &str, property: &str) -> Result<PropertyValue, PropertyError> {
        let elements = self.elements();
        let props = elements
            .get(element)
            .ok_or_else(|| PropertyError::element_not_found(element))?;
        props
            .get(property)
            .cloned()
            .ok_or_else(|| PropertyError::rejected(element, property, "no such property"))
    }

    fn set_property(
        &self,
        element: &str,
        property: &str,
        value: &PropertyValue,
    ) -> Result<(), PropertyError> {
        let mut elements = self.elements();
        let props = elements
            .get_mut(element)
            .ok_or_else(|| PropertyError::element_not_found(element))?;

        let stored = match (props.get(property), value) {
            (None, v) => v.clone(),
            (Some(PropertyValue::Float(_)), PropertyValue::Int(v)) => PropertyValue::Float(*v as f64),
            (Some(current), v) if current.type_name() == v.type_name() => v.clone(),
            (Some(current), v) => {
                return Err(PropertyError::rejected(
                    element,
                    property,
                    format!("expected {}, got {}", current.type_name(), v.type_name()),
                ))
            }
        };
        props.insert(property.to_string(), stored);
        Ok(())
    }
}

impl Drop for SimulatedHandle {
    fn drop(&mut self) {
        self.shared().playing.remove(&self.id);
    }
}

/// Properties an element exposes before any are set explicitly.
fn factory_defaults(factory: &str) -> HashMap<String, PropertyValue> {
    let mut props = HashMap::new();
    if factory == "rrpanoramaptz" {
        props.insert("pan".to_string(), PropertyValue::Float(0.0));
        props.insert("tilt".to_string(), PropertyValue::Float(0.0));
        props.insert("zoom".to_string(), PropertyValue::Float(1.0));
    }
    props
}

fn parse_value(raw: &str) -> PropertyValue {
    let raw = raw.trim_matches('"');
    if let Ok(v) = raw.parse::<i64>() {
        PropertyValue::Int(v)
    } else if let Ok(v) = raw.parse::<f64>() {
        PropertyValue::Float(v)
    } else if let Ok(v) = raw.parse::<bool>() {
        PropertyValue::Bool(v)
    } else {
        PropertyValue::String(raw.to_string())
    }
}

/// Collect named elements and their properties from a launch-style description.
fn parse_elements(description: &str) -> Result<Elements, BuildError> {
    if description.trim().is_empty() {
        return Err(BuildError::new("empty pipeline description"));
    }

    let mut elements = Elements::new();
    for segment in description.split('!') {
        let mut tokens = segment.split_whitespace();
        let Some(factory) = tokens.next() else {
            return Err(BuildError::new("empty element in pipeline description"));
        };
        // Caps shorthand, e.g. video/x-raw,width=500
        if factory.contains('/') {
            continue;
        }

        let mut props = factory_defaults(factory);
        let mut name = None;
        for token in tokens {
            let (key, raw) = token
                .split_once('=')
                .ok_or_else(|| BuildError::new(format!("malformed property '{}' on {}", token, factory)))?;
            if key == "name" {
                name = Some(raw.trim_matches('"').to_string());
            } else {
                props.insert(key.to_string(), parse_value(raw));
            }
        }

        if let Some(name) = name {
            if elements.insert(name.clone(), props).is_some() {
                return Err(BuildError::new(format!("duplicate element name '{}'", name)));
            }
        }
    }
    Ok(elements)
}
