//! Runtime-tunable pipeline knobs and their derived FEC/keyframe values (§3).

use crate::config::{PipelineBackend, VideoEncoder};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    pub encoder: VideoEncoder,
    pub backend: PipelineBackend,
    pub framerate: u32,
    pub video_bitrate_kbps: u32,
    pub audio_bitrate_bps: u32,
    pub keyframe_distance_s: i64,
    pub audio_channels: u8,
    pub video_packetloss_pct: f64,
    pub audio_packetloss_pct: f64,
}

impl PipelineSettings {
    /// `video_bitrate / (1 + packetloss/100)` — FEC inflates wire rate up to target.
    pub fn fec_video_bitrate_kbps(&self) -> u32 {
        let inflated = self.video_bitrate_kbps as f64 / (1.0 + self.video_packetloss_pct / 100.0);
        inflated.round() as u32
    }

    /// `audio_bitrate * (1 + packetloss/100)`.
    pub fn fec_audio_bitrate_bps(&self) -> u32 {
        let inflated = self.audio_bitrate_bps as f64 * (1.0 + self.audio_packetloss_pct / 100.0);
        inflated.round() as u32
    }

    /// `-1` for infinite GOP, else `max(60, round(framerate * keyframe_distance_s))`.
    pub fn keyframe_frames(&self) -> i64 {
        if self.keyframe_distance_s == -1 {
            return -1;
        }
        let frames = (self.framerate as f64 * self.keyframe_distance_s as f64).round() as i64;
        frames.max(60)
    }
}

impl From<&crate::config::PipelineConfig> for PipelineSettings {
    fn from(cfg: &crate::config::PipelineConfig) -> Self {
        Self {
            encoder: cfg.encoder,
            backend: cfg.backend,
            framerate: cfg.framerate,
            video_bitrate_kbps: cfg.video_bitrate_kbps,
            audio_bitrate_bps: cfg.audio_bitrate_bps,
            keyframe_distance_s: cfg.keyframe_distance_s,
            audio_channels: cfg.audio_channels,
            video_packetloss_pct: cfg.video_packetloss_pct,
            audio_packetloss_pct: cfg.audio_packetloss_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> PipelineSettings {
        PipelineSettings {
            encoder: VideoEncoder::H264,
            backend: PipelineBackend::GraphStream,
            framerate: 30,
            video_bitrate_kbps: 4000,
            audio_bitrate_bps: 64_000,
            keyframe_distance_s: -1,
            audio_channels: 2,
            video_packetloss_pct: 0.0,
            audio_packetloss_pct: 0.0,
        }
    }

    #[test]
    fn infinite_gop_when_distance_is_negative_one() {
        assert_eq!(base().keyframe_frames(), -1);
    }

    #[test]
    fn keyframe_frames_floor_is_sixty() {
        let mut s = base();
        s.keyframe_distance_s = 1;
        s.framerate = 10;
        assert_eq!(s.keyframe_frames(), 60);
    }

    #[test]
    fn fec_video_bitrate_never_exceeds_target() {
        let mut s = base();
        s.video_packetloss_pct = 5.0;
        assert!(s.fec_video_bitrate_kbps() <= s.video_bitrate_kbps);
    }

    #[test]
    fn fec_audio_bitrate_is_at_least_target() {
        let mut s = base();
        s.audio_packetloss_pct = 5.0;
        assert!(s.fec_audio_bitrate_bps() >= s.audio_bitrate_bps);
    }
}
