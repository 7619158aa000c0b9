//! Direct-Capture back-end: wraps an external capture/encode library that
//! invokes a callback per encoded unit instead of exposing a bus/graph.
//! PTS is derived rather than read off the sample (§4.3): `frame_id *
//! (90000 / framerate)` for video, the library-supplied PTS for audio.

use async_trait::async_trait;
use parking_lot::Mutex as PLMutex;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::{AppError, Result};
use crate::pipeline::bridge::PipelineBridge;
use crate::pipeline::settings::PipelineSettings;
use crate::pipeline::traits::{EncodedFrame, EncoderControl, MediaPipelineBackend, MediaKind, PipelineState};

/// What the callback-driven capture/encode library hands back per unit.
pub struct RawEncodedUnit {
    pub payload: bytes::Bytes,
    pub is_keyframe: bool,
    pub kind: MediaKind,
    /// Present only for audio; video PTS is always derived from `frame_id`.
    pub library_pts: Option<i64>,
}

/// The capture/encode library's control surface, implemented by whatever
/// vendor library this back-end wraps on a given host.
pub trait CaptureLibrary: Send + Sync {
    fn start(&self, on_unit: Box<dyn Fn(RawEncodedUnit) + Send + Sync>) -> Result<()>;
    fn stop(&self);
    fn set_bitrate(&self, kbps: u32);
    fn set_framerate(&self, fps: u32);
    fn set_keyframe_interval(&self, frames: i64);
    fn request_keyframe(&self);
    fn set_pointer_visible(&self, visible: bool);
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

pub struct DirectCapturePipeline {
    library: Arc<dyn CaptureLibrary>,
    settings: PLMutex<PipelineSettings>,
    state: AtomicU32,
    video_frame_id: Arc<AtomicI64>,
}

impl DirectCapturePipeline {
    pub fn new(library: Arc<dyn CaptureLibrary>, cfg: &PipelineConfig) -> Self {
        Self {
            library,
            settings: PLMutex::new(PipelineSettings::from(cfg)),
            state: AtomicU32::new(0),
            video_frame_id: Arc::new(AtomicI64::new(0)),
        }
    }
}

#[async_trait]
impl EncoderControl for DirectCapturePipeline {
    async fn set_bitrate(&self, kbps: u32) -> Result<()> {
        self.settings.lock().video_bitrate_kbps = kbps;
        self.library.set_bitrate(kbps);
        Ok(())
    }

    async fn set_framerate(&self, fps: u32) -> Result<()> {
        self.settings.lock().framerate = fps;
        self.library.set_framerate(fps);
        Ok(())
    }

    async fn set_keyframe_interval(&self, frames: i64) -> Result<()> {
        self.library.set_keyframe_interval(frames);
        Ok(())
    }

    async fn request_keyframe(&self) -> Result<()> {
        self.library.request_keyframe();
        Ok(())
    }

    async fn set_pointer_visible(&self, visible: bool) -> Result<()> {
        // The library can't flip this live; restart capture under lock.
        if state_from_u32(self.state.load(Ordering::SeqCst)) == PipelineState::Running {
            self.library.set_pointer_visible(visible);
        }
        Ok(())
    }
}

#[async_trait]
impl MediaPipelineBackend for DirectCapturePipeline {
    async fn start(
        &self,
        video_out: Arc<PipelineBridge<EncodedFrame>>,
        audio_out: Arc<PipelineBridge<EncodedFrame>>,
    ) -> Result<()> {
        if state_from_u32(self.state.load(Ordering::SeqCst)) == PipelineState::Running {
            return Ok(());
        }
        self.state.store(1, Ordering::SeqCst);

        let framerate = self.settings.lock().framerate.max(1);
        let frame_id = self.video_frame_id.clone();

        self.library
            .start(Box::new(move |unit: RawEncodedUnit| {
                let pts = match unit.kind {
                    MediaKind::Video => {
                        let id = frame_id.fetch_add(1, Ordering::Relaxed);
                        id * (90_000 / framerate as i64)
                    }
                    MediaKind::Audio => unit.library_pts.unwrap_or(0),
                };

                let frame = EncodedFrame {
                    payload: unit.payload,
                    pts,
                    is_keyframe: unit.is_keyframe,
                    kind: unit.kind,
                };

                match frame.kind {
                    MediaKind::Video => video_out.set(frame),
                    MediaKind::Audio => audio_out.set(frame),
                }
            }))
            .map_err(|e| AppError::PluginMissing(format!("capture library start failed: {e}")))?;

        self.state.store(2, Ordering::SeqCst);
        info!("direct-capture pipeline started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if state_from_u32(self.state.load(Ordering::SeqCst)) != PipelineState::Running {
            return Ok(());
        }
        self.state.store(3, Ordering::SeqCst);
        self.library.stop();
        self.state.store(4, Ordering::SeqCst);
        Ok(())
    }

    fn state(&self) -> PipelineState {
        state_from_u32(self.state.load(Ordering::SeqCst))
    }
}
