//! PTZ pipeline description template.
//!
//! RTSP source, H.264 decode, PTZ transform, H.264 encode, RTSP sink.

use ptz_media::PipelineDescription;

/// RTSP source; `location` holds the input URI.
pub const SRC_ELEMENT: &str = "src";
/// PTZ transform exposing `pan`, `tilt` and `zoom`.
pub const PTZ_ELEMENT: &str = "rr_panorama_ptz";
/// Output caps filter carrying the stream mapping.
pub const CAPS_ELEMENT: &str = "capsfilter";
/// RTSP sink; `service` holds the output port.
pub const SINK_ELEMENT: &str = "rtspsink";

/// Elements the API may address.
pub const KNOWN_ELEMENTS: [&str; 4] = [SRC_ELEMENT, PTZ_ELEMENT, CAPS_ELEMENT, SINK_ELEMENT];

/// Render the description for one input/output pair.
pub fn render(in_uri: &str, out_port: u32, out_mapping: &str, window_size: u32) -> PipelineDescription {
    let d = window_size;
    PipelineDescription::new(format!(
        "rtspsrc name={SRC_ELEMENT} latency=10 location={in_uri} ! queue ! rtph264depay ! h264parse \
         ! nvv4l2decoder ! capssetter caps=video/x-raw,framerate=30/1 ! queue ! nvvidconv ! queue \
         ! rrpanoramaptz name={PTZ_ELEMENT} ! video/x-raw,width={d},height={d} ! queue ! nvvidconv \
         ! queue ! nvv4l2h264enc idrinterval=30 insert-sps-pps=true \
         ! capsfilter name={CAPS_ELEMENT} caps=\"video/x-h264,framerate=30/1,mapping={out_mapping}\" \
         ! queue ! rtspsink name={SINK_ELEMENT} service={out_port}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_injects_parameters() {
        let description = render("rtsp://cam:554/main", 5021, "ptz_out", 500);
        let text = description.as_str();

        assert!(text.starts_with("rtspsrc name=src latency=10 location=rtsp://cam:554/main ! "));
        assert!(text.contains("video/x-raw,width=500,height=500"));
        assert!(text.contains("caps=\"video/x-h264,framerate=30/1,mapping=ptz_out\""));
        assert!(text.ends_with("rtspsink name=rtspsink service=5021"));
    }

    #[test]
    fn test_render_is_deterministic() {
        assert_eq!(
            render("rtsp://a", 8554, "m", 720),
            render("rtsp://a", 8554, "m", 720)
        );
    }

    #[test]
    fn test_every_known_element_is_named() {
        let description = render("rtsp://a", 8554, "m", 720);
        for element in KNOWN_ELEMENTS {
            assert!(description.as_str().contains(&format!("name={} ", element)));
        }
    }
}
