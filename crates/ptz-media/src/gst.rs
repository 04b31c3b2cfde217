//! GStreamer-backed pipeline engine.
//!
//! GStreamer elements such as the RTSP server sink attach their sources to
//! the default GLib main context, so the engine runs a main loop on a
//! dedicated thread for as long as it lives.

use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use gstreamer as gst;
use gstreamer::glib;
use gstreamer::prelude::*;
use tracing::{debug, error, info, warn};

use crate::engine::{EventSink, PipelineDescription, PipelineEngine, PipelineHandle, PropertyValue, TargetState};
use crate::error::{BuildError, PropertyError, TransitionError};

/// Builds pipelines with `gst::parse::launch`.
pub struct GstEngine {
    main_loop: glib::MainLoop,
    main_thread: Mutex<Option<JoinHandle<()>>>,
}

impl GstEngine {
    /// Initialize GStreamer and start the GLib main loop thread.
    pub fn new() -> Result<Self, BuildError> {
        gst::init().map_err(|e| BuildError::new(format!("Failed to initialize GStreamer: {}", e)))?;
        debug!(version = %gst::version_string(), "GStreamer initialized");

        let context = glib::MainContext::default();
        let main_loop = glib::MainLoop::new(Some(&context), false);
        let main_thread = thread::Builder::new()
            .name("gst-main-loop".to_string())
            .spawn({
                let main_loop = main_loop.clone();
                move || {
                    debug!("GLib main loop started");
                    main_loop.run();
                    debug!("GLib main loop stopped");
                }
            })
            .map_err(|e| BuildError::new(format!("Failed to start GLib main loop thread: {}", e)))?;

        Ok(Self {
            main_loop,
            main_thread: Mutex::new(Some(main_thread)),
        })
    }

    fn stop_main_loop(&self) {
        let Some(main_thread) = self
            .main_thread
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        else {
            return;
        };

        // Dispatched from inside the loop, so a quit racing startup is not lost
        let main_loop = self.main_loop.clone();
        self.main_loop.context().invoke(move || main_loop.quit());
        if main_thread.join().is_err() {
            warn!("GLib main loop thread panicked");
        } else {
            info!("GLib main loop joined");
        }
    }
}

impl Drop for GstEngine {
    fn drop(&mut self) {
        self.stop_main_loop();
    }
}

impl PipelineEngine for GstEngine {
    fn build(
        &self,
        description: &PipelineDescription,
        events: EventSink,
    ) -> Result<Box<dyn PipelineHandle>, BuildError> {
        let pipeline = gst::parse::launch(description.as_str())
            .map_err(|e| BuildError::new(e.to_string()))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| BuildError::new("description did not produce a pipeline"))?;

        let bus = pipeline
            .bus()
            .ok_or_else(|| BuildError::new("pipeline has no bus"))?;

        let generation = events.generation();
        bus.set_sync_handler(move |_bus, msg| {
            if let gst::MessageView::Error(err) = msg.view() {
                let source = err.src().map(|s| s.name().to_string());
                error!(
                    generation,
                    source = ?source,
                    debug = ?err.debug(),
                    "Pipeline error: {}", err.error()
                );
                events.error(err.error().to_string());
            }
            gst::BusSyncReply::Drop
        });

        Ok(Box::new(GstHandle { pipeline }))
    }

    fn shutdown(&self) {
        self.stop_main_loop();
    }
}

struct GstHandle {
    pipeline: gst::Pipeline,
}

impl GstHandle {
    fn element(&self, name: &str) -> Result<gst::Element, PropertyError> {
        self.pipeline
            .by_name(name)
            .ok_or_else(|| PropertyError::element_not_found(name))
    }
}

impl PipelineHandle for GstHandle {
    fn set_state(&self, state: TargetState) -> Result<(), TransitionError> {
        let target = match state {
            TargetState::Playing => gst::State::Playing,
            TargetState::Stopped => gst::State::Null,
        };
        self.pipeline
            .set_state(target)
            .map(|_| ())
            .map_err(|e| TransitionError::failed(state, e.to_string()))
    }

    fn get_property(&self, element: &str, property: &str) -> Result<PropertyValue, PropertyError> {
        let el = self.element(element)?;
        let pspec = el
            .find_property(property)
            .ok_or_else(|| PropertyError::rejected(element, property, "Property not found"))?;

        let value = el.property_value(property);
        let type_name = pspec.value_type().name();
        let converted = match type_name {
            "gchararray" => PropertyValue::String(
                value.get::<Option<String>>().ok().flatten().unwrap_or_default(),
            ),
            "gboolean" => PropertyValue::Bool(value.get::<bool>().unwrap_or_default()),
            "gint" => PropertyValue::Int(value.get::<i32>().unwrap_or_default() as i64),
            "guint" => PropertyValue::Int(value.get::<u32>().unwrap_or_default() as i64),
            "gint64" => PropertyValue::Int(value.get::<i64>().unwrap_or_default()),
            "guint64" => PropertyValue::Int(value.get::<u64>().unwrap_or_default() as i64),
            "gfloat" => PropertyValue::Float(value.get::<f32>().unwrap_or_default() as f64),
            "gdouble" => PropertyValue::Float(value.get::<f64>().unwrap_or_default()),
            other => {
                // Fall back to the string form (caps, enums, ...)
                let as_string = value
                    .transform::<String>()
                    .ok()
                    .and_then(|v| v.get::<Option<String>>().ok().flatten());
                match as_string {
                    Some(s) => PropertyValue::String(s),
                    None => {
                        return Err(PropertyError::rejected(
                            element,
                            property,
                            format!("unsupported property type {}", other),
                        ))
                    }
                }
            }
        };
        Ok(converted)
    }

    fn set_property(
        &self,
        element: &str,
        property: &str,
        value: &PropertyValue,
    ) -> Result<(), PropertyError> {
        let el = self.element(element)?;
        let pspec = el
            .find_property(property)
            .ok_or_else(|| PropertyError::rejected(element, property, "Property not found"))?;

        if !pspec.flags().contains(glib::ParamFlags::WRITABLE) {
            return Err(PropertyError::rejected(element, property, "Property is not writable"));
        }

        let source: glib::Value = match value {
            PropertyValue::Bool(v) => v.to_value(),
            PropertyValue::Int(v) => v.to_value(),
            PropertyValue::Float(v) => v.to_value(),
            PropertyValue::String(v) => v.to_value(),
        };

        let target_type = pspec.value_type();
        let converted = if source.type_() == target_type {
            source
        } else {
            source.transform_with_type(target_type).map_err(|_| {
                PropertyError::rejected(
                    element,
                    property,
                    format!("cannot convert {} to {}", value.type_name(), target_type.name()),
                )
            })?
        };

        el.set_property_from_value(property, &converted);
        Ok(())
    }
}

impl Drop for GstHandle {
    fn drop(&mut self) {
        if let Some(bus) = self.pipeline.bus() {
            bus.unset_sync_handler();
        }
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!("Failed to set dropped pipeline to Null: {}", e);
        }
    }
}
