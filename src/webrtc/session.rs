//! Single-peer WebRTC Session lifecycle (§4.4), grounded on
//! `original_source/src/selkies/rtc.py`'s `RTCApp`
//! (`_start_rtc_pipeline`, `on_sdp`, `on_ice`, `force_codec`, data channel
//! wiring) and `webrtc/peer.rs`'s webrtc-rs setup idiom.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice::mdns::MulticastDnsMode;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecParameters;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;

use crate::config::schema::{PipelineConfig, VideoEncoder};
use crate::error::{AppError, Result};
use crate::input::InputSink;
use crate::pipeline::bridge::PipelineBridge;
use crate::pipeline::traits::{EncodedFrame, MediaKind, MediaPipelineBackend};
use crate::signaling::client::{self, OutboundMessage, SignalingClientConfig, SignalingEvent};

use super::config::build_configuration;
use super::datachannel;
use super::mdns::{default_mdns_host_name, mdns_mode};
use super::rtp::{H264VideoTrack, H264VideoTrackConfig, OpusAudioTrack, RawVideoTrack, VideoTrack, H264_CLOCK_RATE};
use super::sdp::munge_sdp;
use super::signaling::ConnectionState;

/// Everything the session needs from the rest of the core; owned by
/// whatever entrypoint the Supervisor spawns for `StreamMode::Webrtc`.
pub struct SessionDeps {
    pub rtc_config: crate::rtc_config::RtcConfigCache,
    pub signaling: SignalingClientConfig,
    pub pipeline: Arc<dyn MediaPipelineBackend>,
    pub pipeline_config: PipelineConfig,
    pub input: Arc<Mutex<dyn InputSink>>,
}

/// Runs until `cancel` fires; any negotiation error ends this session only
/// (§7 `RtcNegotiation`), never the process.
pub async fn run(deps: SessionDeps, cancel: CancellationToken) {
    if let Err(e) = run_inner(deps, &cancel).await {
        warn!(error = %e, "webrtc session ended");
    }
}

async fn run_inner(deps: SessionDeps, cancel: &CancellationToken) -> Result<()> {
    let session_id = uuid::Uuid::new_v4().to_string();
    info!(session_id, "starting webrtc session");

    let rtc_config = deps.rtc_config.get();
    let pc = Arc::new(build_peer_connection(&rtc_config, &session_id).await?);
    let (state_tx, mut state_rx) = watch::channel(ConnectionState::New);
    register_state_handler(&pc, state_tx);

    let video_bridge = Arc::new(PipelineBridge::<EncodedFrame>::new());
    let audio_bridge = Arc::new(PipelineBridge::<EncodedFrame>::new());
    deps.pipeline.start(video_bridge.clone(), audio_bridge.clone()).await?;

    let video_track = build_video_track(deps.pipeline_config.encoder, &deps.pipeline_config);
    let video_sender = pc
        .add_track(video_track.as_track_local())
        .await
        .map_err(|e| AppError::RtcNegotiation(format!("failed to add video track: {e}")))?;

    let audio_track = Arc::new(OpusAudioTrack::new("audio0", "selkies-stream"));
    pc.add_track(audio_track.as_track_local())
        .await
        .map_err(|e| AppError::RtcNegotiation(format!("failed to add audio track: {e}")))?;

    force_codec(&pc, deps.pipeline_config.encoder).await;

    let data_channel = pc
        .create_data_channel(
            "input",
            Some(RTCDataChannelInit { ordered: Some(true), max_retransmits: Some(0), ..Default::default() }),
        )
        .await
        .map_err(|e| AppError::RtcNegotiation(format!("failed to create data channel: {e}")))?;
    register_input_handler(&data_channel, deps.input.clone());

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    register_ice_handler(&pc, outbound_tx.clone());

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();
    tasks.push(tokio::spawn(client::run(deps.signaling, events_tx, outbound_rx, cancel.clone())));
    tasks.push(spawn_video_bridge(video_track, video_bridge, cancel.clone()));
    tasks.push(spawn_audio_bridge(audio_track, audio_bridge, cancel.clone()));
    tasks.push(spawn_pli_watcher(video_sender, deps.pipeline.clone(), cancel.clone()));

    create_and_send_offer(&pc, &outbound_tx).await?;

    let result = drive_session(&pc, &mut events_rx, &mut state_rx, cancel).await;

    for task in tasks {
        task.abort();
    }
    let _ = deps.pipeline.stop().await;
    let _ = pc.close().await;
    info!(session_id, "webrtc session torn down");

    result
}

async fn build_peer_connection(
    rtc_config: &crate::rtc_config::RtcConfig,
    session_id: &str,
) -> Result<RTCPeerConnection> {
    let mut media_engine = MediaEngine::default();
    media_engine
        .register_default_codecs()
        .map_err(|e| AppError::RtcNegotiation(format!("failed to register codecs: {e}")))?;

    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut media_engine)
        .map_err(|e| AppError::RtcNegotiation(format!("failed to register interceptors: {e}")))?;

    let mut setting_engine = SettingEngine::default();
    let mode = mdns_mode();
    setting_engine.set_ice_multicast_dns_mode(mode);
    if mode == MulticastDnsMode::QueryAndGather {
        setting_engine.set_multicast_dns_host_name(default_mdns_host_name(session_id));
    }

    let api = APIBuilder::new()
        .with_setting_engine(setting_engine)
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    api.new_peer_connection(build_configuration(rtc_config))
        .await
        .map_err(|e| AppError::RtcNegotiation(format!("failed to create peer connection: {e}")))
}

fn register_state_handler(pc: &Arc<RTCPeerConnection>, state_tx: watch::Sender<ConnectionState>) {
    pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
        let state_tx = state_tx.clone();
        Box::pin(async move {
            let _ = state_tx.send(ConnectionState::from(s));
        })
    }));
}

fn register_ice_handler(pc: &Arc<RTCPeerConnection>, outbound: mpsc::UnboundedSender<OutboundMessage>) {
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let outbound = outbound.clone();
        Box::pin(async move {
            let Some(candidate) = candidate else { return };
            let Ok(json) = candidate.to_json() else { return };
            let _ = outbound.send(OutboundMessage::Ice {
                candidate: json.candidate,
                sdp_mline_index: json.sdp_mline_index.unwrap_or_default() as u32,
            });
        })
    }));
}

fn register_input_handler(channel: &Arc<RTCDataChannel>, input: Arc<Mutex<dyn InputSink>>) {
    channel.on_message(Box::new(move |msg: DataChannelMessage| {
        let input = input.clone();
        Box::pin(async move {
            if !msg.is_string {
                debug!(bytes = msg.data.len(), "ignoring binary message on input channel");
                return;
            }
            let Ok(text) = String::from_utf8(msg.data.to_vec()) else { return };
            let mut sink = input.lock().await;
            datachannel::handle_inbound_text(&text, &mut *sink);
        })
    }));
}

/// Picks the RTP track matching the configured encoder (§4.4 step 5):
/// H264 keeps the NAL-aware track (SPS/PPS caching before IDR frames);
/// every other supported codec writes whole frames straight to a
/// `TrackLocalStaticSample` of the matching mime type.
fn build_video_track(encoder: VideoEncoder, pipeline_config: &PipelineConfig) -> Arc<dyn VideoTrack> {
    match encoder {
        VideoEncoder::H264 => Arc::new(H264VideoTrack::new(H264VideoTrackConfig {
            bitrate_kbps: pipeline_config.video_bitrate_kbps,
            fps: pipeline_config.framerate,
            ..Default::default()
        })),
        other => Arc::new(RawVideoTrack::new(other.mime_type(), H264_CLOCK_RATE, "video0", "selkies-stream")),
    }
}

/// Best-effort translation of `rtc.py::force_codec`: restricts the video
/// transceiver to the configured codec plus its RTX companion, ahead of
/// `createOffer`, so the browser only sees one codec choice.
async fn force_codec(pc: &Arc<RTCPeerConnection>, encoder: VideoEncoder) {
    let mime = encoder.mime_type();
    let transceivers = pc.get_transceivers().await;
    let Some(transceiver) = transceivers.iter().find(|t| {
        matches!(
            t.sender().track().map(|tr| tr.kind()),
            Some(k) if k == webrtc::rtp_transceiver::rtp_codec::RTPCodecType::Video
        )
    }) else {
        warn!(mime, "no video transceiver found to restrict codec preferences on");
        return;
    };

    let sender_params = transceiver.sender().get_parameters().await;
    let chosen: Vec<RTCRtpCodecParameters> = sender_params
        .rtp_parameters
        .codecs
        .into_iter()
        .filter(|c| {
            c.capability.mime_type.eq_ignore_ascii_case(mime)
                || c.capability.mime_type.eq_ignore_ascii_case("video/rtx")
        })
        .collect();

    if chosen.is_empty() {
        warn!(mime, "force_codec found no matching codec capabilities, leaving browser defaults");
        return;
    }

    if let Err(e) = transceiver.set_codec_preferences(chosen).await {
        warn!(mime, error = %e, "failed to set codec preferences");
    }
}

async fn create_and_send_offer(
    pc: &Arc<RTCPeerConnection>,
    outbound: &mpsc::UnboundedSender<OutboundMessage>,
) -> Result<()> {
    let offer = pc
        .create_offer(None)
        .await
        .map_err(|e| AppError::RtcNegotiation(format!("failed to create offer: {e}")))?;

    pc.set_local_description(offer.clone())
        .await
        .map_err(|e| AppError::RtcNegotiation(format!("failed to set local description: {e}")))?;

    let munged = munge_sdp(&offer.sdp);
    let _ = outbound.send(OutboundMessage::Sdp { sdp_type: "offer".to_string(), sdp: munged });
    Ok(())
}

/// Main event loop: applies remote SDP/ICE as it arrives and watches
/// connection state for terminal transitions.
async fn drive_session(
    pc: &Arc<RTCPeerConnection>,
    events: &mut mpsc::UnboundedReceiver<SignalingEvent>,
    state_rx: &mut watch::Receiver<ConnectionState>,
    cancel: &CancellationToken,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = state_rx.changed() => {
                match *state_rx.borrow() {
                    ConnectionState::Connected => info!("webrtc session connected"),
                    ConnectionState::Disconnected => warn!("webrtc session disconnected, tolerating"),
                    ConnectionState::Failed => {
                        return Err(AppError::RtcNegotiation("peer connection failed".into()));
                    }
                    ConnectionState::Closed => return Ok(()),
                    _ => {}
                }
            }
            event = events.recv() => {
                let Some(event) = event else { return Ok(()) };
                handle_signaling_event(pc, event).await;
            }
        }
    }
}

async fn handle_signaling_event(pc: &Arc<RTCPeerConnection>, event: SignalingEvent) {
    match event {
        SignalingEvent::Sdp { sdp_type, sdp } => {
            if sdp_type != "answer" {
                warn!(sdp_type, "ignoring non-answer SDP from signaling server");
                return;
            }
            match RTCSessionDescription::answer(sdp) {
                Ok(desc) => {
                    if let Err(e) = pc.set_remote_description(desc).await {
                        warn!(error = %e, "failed to set remote description");
                    }
                }
                Err(e) => warn!(error = %e, "invalid remote SDP answer"),
            }
        }
        SignalingEvent::Ice { candidate, sdp_mline_index } => {
            let init = RTCIceCandidateInit {
                candidate,
                sdp_mline_index: Some(sdp_mline_index as u16),
                ..Default::default()
            };
            if let Err(e) = pc.add_ice_candidate(init).await {
                warn!(error = %e, "failed to add remote ice candidate");
            }
        }
        SignalingEvent::Connected => debug!("signaling connected"),
        SignalingEvent::Disconnected => warn!("signaling disconnected"),
        SignalingEvent::Session { peer_id } => debug!(peer_id, "signaling session established"),
        SignalingEvent::Error(reason) => warn!(reason, "signaling reported an error"),
    }
}

/// Pumps encoded video frames out of the pipeline bridge onto the RTP
/// track, tracking a running duration from each frame's clock-rate PTS.
fn spawn_video_bridge(
    track: Arc<dyn VideoTrack>,
    bridge: Arc<PipelineBridge<EncodedFrame>>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_pts: Option<i64> = None;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                frame = bridge.get() => {
                    debug_assert_eq!(frame.kind, MediaKind::Video);
                    let duration = pts_duration(&mut last_pts, frame.pts, 90_000);
                    if let Err(e) = track.write_frame(&frame.payload, duration, frame.is_keyframe).await {
                        debug!(error = %e, "failed to write video frame");
                    }
                }
            }
        }
    })
}

fn spawn_audio_bridge(
    track: Arc<OpusAudioTrack>,
    bridge: Arc<PipelineBridge<EncodedFrame>>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_pts: Option<i64> = None;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                frame = bridge.get() => {
                    debug_assert_eq!(frame.kind, MediaKind::Audio);
                    let samples = pts_delta(&mut last_pts, frame.pts, 960);
                    if let Err(e) = track.write_packet(&frame.payload, samples).await {
                        debug!(error = %e, "failed to write audio packet");
                    }
                }
            }
        }
    })
}

fn pts_delta(last_pts: &mut Option<i64>, pts: i64, default: u32) -> u32 {
    let delta = match *last_pts {
        Some(prev) if pts > prev => (pts - prev) as u32,
        _ => default,
    };
    *last_pts = Some(pts);
    delta
}

fn pts_duration(last_pts: &mut Option<i64>, pts: i64, clock_rate: u32) -> Duration {
    let ticks = pts_delta(last_pts, pts, clock_rate / 30);
    Duration::from_secs_f64(ticks as f64 / clock_rate as f64)
}

/// Watches the video sender's RTCP stream for PLI and requests a fresh
/// keyframe from the pipeline, grounded on `rtc.py`'s
/// `sender.on("pli", self.on_pli)`.
fn spawn_pli_watcher(
    sender: Arc<RTCRtpSender>,
    pipeline: Arc<dyn MediaPipelineBackend>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = sender.read_rtcp() => {
                    let Ok((packets, _)) = result else { break };
                    for packet in packets {
                        if packet
                            .as_any()
                            .downcast_ref::<webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication>()
                            .is_some()
                        {
                            if let Err(e) = pipeline.request_keyframe().await {
                                debug!(error = %e, "failed to request keyframe after PLI");
                            }
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pts_delta_falls_back_to_default_on_first_frame() {
        let mut last = None;
        assert_eq!(pts_delta(&mut last, 1000, 960), 960);
        assert_eq!(last, Some(1000));
    }

    #[test]
    fn pts_delta_uses_running_difference() {
        let mut last = Some(1000);
        assert_eq!(pts_delta(&mut last, 1960, 960), 960);
    }

    #[test]
    fn pts_duration_converts_ticks_to_seconds() {
        let mut last = Some(0);
        let duration = pts_duration(&mut last, 3000, 90_000);
        assert!((duration.as_secs_f64() - (3000.0 / 90_000.0)).abs() < 1e-9);
    }
}
