//! Capability probing for the GraphStream back-end's encoder choices.
//!
//! Probing GStreamer element availability can block on driver/device
//! queries, so it runs on a dedicated thread with a bounded wait rather
//! than on the async runtime (§4.3): a probe that times out is reported
//! "unavailable", not fatal, unless it turns out to be the only
//! configured back-end.

use std::sync::mpsc;
use std::time::Duration;
use tracing::warn;

use crate::config::VideoEncoder;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// GStreamer element name used to construct an encoder of this kind.
fn encoder_element_name(encoder: VideoEncoder) -> &'static str {
    match encoder {
        VideoEncoder::H264 => "x264enc",
        VideoEncoder::H265 => "x265enc",
        VideoEncoder::Vp8 => "vp8enc",
        VideoEncoder::Vp9 => "vp9enc",
        VideoEncoder::Av1 => "av1enc",
    }
}

/// Probe whether the named encoder can actually be instantiated, off the
/// async runtime, bounded by [`PROBE_TIMEOUT`].
pub fn probe_encoder_available(encoder: VideoEncoder) -> bool {
    let element = encoder_element_name(encoder);
    let (tx, rx) = mpsc::channel();

    let element = element.to_string();
    std::thread::spawn(move || {
        let available = gstreamer::ElementFactory::find(&element).is_some();
        let _ = tx.send(available);
    });

    match rx.recv_timeout(PROBE_TIMEOUT) {
        Ok(available) => available,
        Err(_) => {
            warn!(encoder = %element, "encoder capability probe timed out, treating as unavailable");
            false
        }
    }
}

/// Probe every encoder kind once at startup.
pub fn probe_all() -> Vec<(VideoEncoder, bool)> {
    [
        VideoEncoder::H264,
        VideoEncoder::H265,
        VideoEncoder::Vp8,
        VideoEncoder::Vp9,
        VideoEncoder::Av1,
    ]
    .into_iter()
    .map(|e| (e, probe_encoder_available(e)))
    .collect()
}
