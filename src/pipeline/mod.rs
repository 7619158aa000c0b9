//! Media Pipeline: one capability interface, two back-ends (§4.3, §9).

pub mod bridge;
pub mod direct_capture;
pub mod encoder_registry;
pub mod graphstream;
pub mod settings;
pub mod traits;

pub use bridge::PipelineBridge;
pub use settings::PipelineSettings;
pub use traits::{EncodedFrame, EncoderControl, MediaKind, MediaPipelineBackend, PipelineState};

use std::sync::Arc;

use crate::config::PipelineBackend;
use crate::error::Result;

/// Build the configured back-end. Direct-Capture requires a vendor
/// [`direct_capture::CaptureLibrary`] and is not wired up by default since
/// no such library ships with this crate; selecting it without one is a
/// startup-time `PLUGIN_MISSING`.
pub fn build_backend(
    cfg: &crate::config::PipelineConfig,
    display_dpi: u32,
    direct_capture_library: Option<Arc<dyn direct_capture::CaptureLibrary>>,
) -> Result<Arc<dyn MediaPipelineBackend>> {
    match cfg.backend {
        PipelineBackend::GraphStream => {
            Ok(Arc::new(graphstream::GraphStreamPipeline::new(cfg, display_dpi)))
        }
        PipelineBackend::DirectCapture => match direct_capture_library {
            Some(library) => Ok(Arc::new(direct_capture::DirectCapturePipeline::new(library, cfg))),
            None => Err(crate::error::AppError::PluginMissing(
                "direct-capture backend selected but no capture library is configured".into(),
            )),
        },
    }
}
