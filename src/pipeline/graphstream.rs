//! GStreamer-backed Media Pipeline: capture -> colorspace -> encoder ->
//! appsink, one branch per media kind, wired with a low-latency profile
//! (CBR, zero-latency tuning, small VBV, GOP derived from keyframe cadence).
//!
//! Grounded on the teacher's encoder-registry pattern (one shared
//! `set_*` surface over a tagged encoder kind) generalized from hardware
//! V4L2/VAAPI encoders onto GStreamer elements, enriched with the
//! GStreamer wiring style from the frecar-beam example.

use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use parking_lot::Mutex as PLMutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{PipelineConfig, VideoEncoder};
use crate::error::{AppError, Result};
use crate::pipeline::bridge::PipelineBridge;
use crate::pipeline::settings::PipelineSettings;
use crate::pipeline::traits::{EncodedFrame, EncoderControl, MediaPipelineBackend, MediaKind, PipelineState};

struct EncoderHandle {
    element: gstreamer::Element,
    bitrate_prop: &'static str,
}

pub struct GraphStreamPipeline {
    settings: PLMutex<PipelineSettings>,
    pipeline: PLMutex<Option<gstreamer::Pipeline>>,
    video_encoder: PLMutex<Option<EncoderHandle>>,
    audio_device: String,
    display_dpi: u32,
    state: AtomicU32,
    pointer_visible: AtomicBool,
}

fn state_from_u32(v: u32) -> PipelineState {
    match v {
        0 => PipelineState::New,
        1 => PipelineState::Starting,
        2 => PipelineState::Running,
        3 => PipelineState::Stopping,
        _ => PipelineState::Stopped,
    }
}

impl GraphStreamPipeline {
    pub fn new(cfg: &PipelineConfig, display_dpi: u32) -> Self {
        Self {
            settings: PLMutex::new(PipelineSettings::from(cfg)),
            pipeline: PLMutex::new(None),
            video_encoder: PLMutex::new(None),
            audio_device: cfg.audio_device.clone(),
            display_dpi,
            state: AtomicU32::new(0),
            pointer_visible: AtomicBool::new(true),
        }
    }

    fn encoder_bin_description(&self, settings: &PipelineSettings) -> String {
        let gop = settings.keyframe_frames();
        let gop_clause = if gop < 0 {
            String::new()
        } else {
            format!(" key-int-max={gop}")
        };

        match settings.encoder {
            VideoEncoder::H264 => format!(
                "x264enc tune=zerolatency speed-preset=ultrafast byte-stream=true \
                 bitrate={}{gop_clause} name=venc",
                settings.fec_video_bitrate_kbps()
            ),
            VideoEncoder::H265 => format!(
                "x265enc tune=zerolatency speed-preset=ultrafast \
                 bitrate={}{gop_clause} name=venc",
                settings.fec_video_bitrate_kbps()
            ),
            VideoEncoder::Vp8 => format!(
                "vp8enc deadline=1 cpu-used=8 target-bitrate={} name=venc",
                settings.fec_video_bitrate_kbps() * 1000
            ),
            VideoEncoder::Vp9 => format!(
                "vp9enc deadline=1 cpu-used=8 target-bitrate={} name=venc",
                settings.fec_video_bitrate_kbps() * 1000
            ),
            VideoEncoder::Av1 => format!(
                "av1enc usage-profile=realtime target-bitrate={} name=venc",
                settings.fec_video_bitrate_kbps()
            ),
        }
    }

    fn bitrate_property(encoder: VideoEncoder) -> &'static str {
        match encoder {
            VideoEncoder::H264 | VideoEncoder::H265 => "bitrate",
            VideoEncoder::Vp8 | VideoEncoder::Vp9 => "target-bitrate",
            VideoEncoder::Av1 => "target-bitrate",
        }
    }

    fn build_pipeline(
        &self,
        settings: &PipelineSettings,
        video_out: Arc<PipelineBridge<EncodedFrame>>,
        audio_out: Arc<PipelineBridge<EncodedFrame>>,
    ) -> Result<gstreamer::Pipeline> {
        let framerate = settings.framerate;
        let video_branch = format!(
            "ximagesrc use-damage=false show-pointer={} ! \
             video/x-raw,framerate={framerate}/1 ! videoconvert ! \
             {} ! appsink name=vsink sync=false max-buffers=1 drop=true",
            self.pointer_visible.load(Ordering::Relaxed),
            self.encoder_bin_description(settings),
        );

        let audio_branch = format!(
            "pulsesrc device=\"{}\" ! audioconvert ! audioresample ! \
             opusenc bitrate={} audio-type=restricted-lowdelay bandwidth=fullband \
             frame-size=10 inband-fec={} ! \
             appsink name=asink sync=false max-buffers=1 drop=true",
            self.audio_device,
            settings.fec_audio_bitrate_bps(),
            if settings.audio_packetloss_pct > 0.0 { "true" } else { "false" },
        );

        let description = format!("{video_branch}  {audio_branch}");
        let pipeline = gstreamer::parse::launch(&description)
            .map_err(|e| AppError::PluginMissing(format!("gstreamer pipeline build failed: {e}")))?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| AppError::PipelineError("parsed graph was not a Pipeline".into()))?;

        let vsink = pipeline
            .by_name("vsink")
            .and_then(|e| e.dynamic_cast::<AppSink>().ok())
            .ok_or_else(|| AppError::PipelineError("missing vsink".into()))?;
        let asink = pipeline
            .by_name("asink")
            .and_then(|e| e.dynamic_cast::<AppSink>().ok())
            .ok_or_else(|| AppError::PipelineError("missing asink".into()))?;

        wire_appsink(vsink, MediaKind::Video, video_out, framerate);
        wire_appsink(asink, MediaKind::Audio, audio_out, framerate);

        if let Some(venc) = pipeline.by_name("venc") {
            *self.video_encoder.lock() = Some(EncoderHandle {
                element: venc,
                bitrate_prop: Self::bitrate_property(settings.encoder),
            });
        }

        Ok(pipeline)
    }
}

fn wire_appsink(
    sink: AppSink,
    kind: MediaKind,
    out: Arc<PipelineBridge<EncodedFrame>>,
    framerate: u32,
) {
    let frame_counter = Arc::new(AtomicI64::new(0));
    sink.set_callbacks(
        gstreamer_app::AppSinkCallbacks::builder()
            .new_sample(move |sink| {
                let sample = sink.pull_sample().map_err(|_| gstreamer::FlowError::Eos)?;
                let buffer = sample.buffer().ok_or(gstreamer::FlowError::Error)?;
                let map = buffer.map_readable().map_err(|_| gstreamer::FlowError::Error)?;

                let pts = match kind {
                    MediaKind::Video => {
                        let id = frame_counter.fetch_add(1, Ordering::Relaxed);
                        id * (90_000 / framerate.max(1) as i64)
                    }
                    MediaKind::Audio => buffer
                        .pts()
                        .map(|p| (p.nseconds() as i64) * 48_000 / 1_000_000_000)
                        .unwrap_or(0),
                };

                out.set(EncodedFrame {
                    payload: bytes::Bytes::copy_from_slice(&map),
                    pts,
                    is_keyframe: !buffer.flags().contains(gstreamer::BufferFlags::DELTA_UNIT),
                    kind,
                });

                Ok(gstreamer::FlowSuccess::Ok)
            })
            .build(),
    );
}

#[async_trait]
impl EncoderControl for GraphStreamPipeline {
    async fn set_bitrate(&self, kbps: u32) -> Result<()> {
        self.settings.lock().video_bitrate_kbps = kbps;
        if let Some(handle) = self.video_encoder.lock().as_ref() {
            handle.element.set_property_from_str(handle.bitrate_prop, &kbps.to_string());
        }
        Ok(())
    }

    async fn set_framerate(&self, fps: u32) -> Result<()> {
        self.settings.lock().framerate = fps;
        // GStreamer caps renegotiation on a running pipeline is restart-bound;
        // next start() picks up the new caps string.
        Ok(())
    }

    async fn set_keyframe_interval(&self, _frames: i64) -> Result<()> {
        if let Some(handle) = self.video_encoder.lock().as_ref() {
            handle.element.emit_by_name::<()>("force-keyunit", &[]);
        }
        Ok(())
    }

    async fn request_keyframe(&self) -> Result<()> {
        if let Some(handle) = self.video_encoder.lock().as_ref() {
            let event = gstreamer_video::UpstreamForceKeyUnitEvent::builder()
                .all_headers(true)
                .build();
            handle.element.send_event(event);
            Ok(())
        } else {
            Err(AppError::PipelineError("no active video encoder".into()))
        }
    }

    async fn set_pointer_visible(&self, visible: bool) -> Result<()> {
        self.pointer_visible.store(visible, Ordering::Relaxed);
        // ximagesrc's show-pointer isn't live-settable; caller restarts capture.
        Ok(())
    }
}

#[async_trait]
impl MediaPipelineBackend for GraphStreamPipeline {
    async fn start(
        &self,
        video_out: Arc<PipelineBridge<EncodedFrame>>,
        audio_out: Arc<PipelineBridge<EncodedFrame>>,
    ) -> Result<()> {
        if state_from_u32(self.state.load(Ordering::SeqCst)) == PipelineState::Running {
            return Ok(());
        }
        self.state.store(1, Ordering::SeqCst);

        let settings = *self.settings.lock();
        let pipeline = self.build_pipeline(&settings, video_out, audio_out)?;
        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| AppError::PipelineError(format!("failed to start pipeline: {e}")))?;

        *self.pipeline.lock() = Some(pipeline);
        self.state.store(2, Ordering::SeqCst);
        info!("GraphStream pipeline started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if state_from_u32(self.state.load(Ordering::SeqCst)) != PipelineState::Running {
            return Ok(());
        }
        self.state.store(3, Ordering::SeqCst);

        if let Some(pipeline) = self.pipeline.lock().take() {
            if let Err(e) = pipeline.set_state(gstreamer::State::Null) {
                warn!("error tearing down pipeline: {e}");
            }
        }
        self.video_encoder.lock().take();
        self.state.store(4, Ordering::SeqCst);
        debug!("GraphStream pipeline stopped");
        Ok(())
    }

    fn state(&self) -> PipelineState {
        state_from_u32(self.state.load(Ordering::SeqCst))
    }
}
