//! Capability interface shared by both Media Pipeline back-ends (§4.3, §9
//! "polymorphic media pipeline back-ends"). Grounded on the teacher's
//! encoder `Encoder`/`EncoderFactory` trait pair: a tagged variant replaces
//! the long if/elif encoder ladder, with one shared `set_*` surface.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::pipeline::bridge::PipelineBridge;

/// A unit of encoded media, produced by a back-end, consumed by a transport.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub payload: bytes::Bytes,
    /// 90 kHz for video, codec clock rate for audio.
    pub pts: i64,
    pub is_keyframe: bool,
    pub kind: MediaKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

/// Shared `set_*` surface every encoder kind exposes, replacing a
/// per-codec if/elif ladder with one interface (§9).
#[async_trait]
pub trait EncoderControl: Send + Sync {
    async fn set_bitrate(&self, kbps: u32) -> Result<()>;
    async fn set_framerate(&self, fps: u32) -> Result<()>;
    async fn set_keyframe_interval(&self, frames: i64) -> Result<()>;
    async fn request_keyframe(&self) -> Result<()>;
    async fn set_pointer_visible(&self, visible: bool) -> Result<()>;
}

/// `new -> starting -> running -> stopping -> stopped` (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    New,
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// One interface, two implementations (GraphStream, Direct-Capture); the
/// Supervisor and WebRTC Session depend only on this (§9).
#[async_trait]
pub trait MediaPipelineBackend: EncoderControl {
    /// Idempotent when already running.
    async fn start(
        &self,
        video_out: Arc<PipelineBridge<EncodedFrame>>,
        audio_out: Arc<PipelineBridge<EncodedFrame>>,
    ) -> Result<()>;

    /// Idempotent when not running.
    async fn stop(&self) -> Result<()>;

    fn state(&self) -> PipelineState;
}
