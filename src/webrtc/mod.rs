//! WebRTC Session (§4.4): single-peer-at-a-time remote desktop streaming
//! over a browser RTCPeerConnection.
//!
//! ```text
//! MediaPipelineBackend --(EncodedFrame)--> PipelineBridge --> RTP track
//!                                                                |
//! signaling::client <--(SDP/ICE)--------------------------> RTCPeerConnection
//!                                                                |
//! input::InputSink <---(JSON)---------------------------- "input" data channel
//! ```

pub mod config;
pub mod datachannel;
pub mod mdns;
pub mod rtp;
pub mod sdp;
pub mod session;
pub mod signaling;

pub use rtp::{H264VideoTrack, H264VideoTrackConfig, OpusAudioTrack, RawVideoTrack, VideoTrack};
pub use sdp::munge_sdp;
pub use session::{run, SessionDeps};
pub use signaling::{ConnectionState, IceCandidate};
