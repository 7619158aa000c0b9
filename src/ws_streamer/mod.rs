//! WebSocket Streamer (§4.5): alternative transport that multiplexes
//! encoded media, input, clipboard, and control as framed messages on one
//! socket, for clients that cannot or choose not to speak WebRTC.
//!
//! Grounded on `stream/ws_hid.rs`'s per-client task shape (one task per
//! accepted socket, a `shutdown_tx` to cut it short, `tokio::select!
//! biased` dispatch) generalized from a HID-only binary protocol to the
//! full media/input/clipboard/control mix this transport carries.
//!
//! Binary frames carry media: one leading tag byte (see [`FrameTag`])
//! followed by an 8-byte little-endian PTS and the encoded payload. Text
//! frames carry input as the same `{"type": ..., "data": ...}` envelope
//! the WebRTC data channel uses (`webrtc::datachannel`), so
//! `handle_inbound_text` is shared verbatim; clipboard/control share the
//! wire but have no recognized kind yet and are dropped like any other
//! unknown envelope type.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::input::InputSink;
use crate::pipeline::bridge::PipelineBridge;
use crate::pipeline::traits::{EncodedFrame, MediaKind, MediaPipelineBackend};
use crate::webrtc::datachannel::handle_inbound_text;

/// Leading byte of a binary media frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum FrameTag {
    Video = 0,
    Audio = 1,
}

impl From<MediaKind> for FrameTag {
    fn from(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Video => FrameTag::Video,
            MediaKind::Audio => FrameTag::Audio,
        }
    }
}

/// Everything one streaming socket needs; owned by whatever entrypoint
/// the Supervisor spawns for `StreamMode::Websockets`.
pub struct WsStreamerDeps {
    pub pipeline: Arc<dyn MediaPipelineBackend>,
    pub input: Arc<Mutex<dyn InputSink>>,
}

/// Hands accepted sockets from the HTTP upgrade handler to whichever task
/// the Supervisor currently has running for `StreamMode::Websockets`.
/// Capacity 1: a second connection attempt while one is already live is
/// rejected rather than queued, mirroring the single-peer WebRTC session.
#[derive(Clone)]
pub struct WsStreamerHandle {
    socket_tx: mpsc::Sender<WebSocket>,
}

impl WsStreamerHandle {
    pub fn new() -> (Self, Arc<Mutex<mpsc::Receiver<WebSocket>>>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { socket_tx: tx }, Arc::new(Mutex::new(rx)))
    }

    /// Hands off an upgraded socket. Returns `false` (and the caller
    /// should close the socket) if a session is already being served.
    pub fn accept(&self, socket: WebSocket) -> bool {
        self.socket_tx.try_send(socket).is_ok()
    }
}

/// Runs until `cancel` fires, serving at most one socket at a time off
/// `sockets`. Suitable as the body of a Supervisor `ModeEntrypoint`: each
/// call waits for the next handed-off connection and runs it to
/// completion, then waits for the next one, until cancelled.
pub async fn run(sockets: Arc<Mutex<mpsc::Receiver<WebSocket>>>, deps: Arc<WsStreamerDeps>, cancel: CancellationToken) {
    loop {
        let socket = {
            let mut rx = sockets.lock().await;
            tokio::select! {
                _ = cancel.cancelled() => return,
                socket = rx.recv() => socket,
            }
        };
        let Some(socket) = socket else { return };

        if let Err(e) = serve(socket, deps.clone(), cancel.clone()).await {
            warn!(error = %e, "websocket streamer session ended");
        }
    }
}

async fn serve(socket: WebSocket, deps: Arc<WsStreamerDeps>, cancel: CancellationToken) -> Result<()> {
    info!("websocket streamer client connected");
    let (mut sink, mut stream) = socket.split();

    let video_bridge = Arc::new(PipelineBridge::<EncodedFrame>::new());
    let audio_bridge = Arc::new(PipelineBridge::<EncodedFrame>::new());
    deps.pipeline
        .start(video_bridge.clone(), audio_bridge.clone())
        .await
        .map_err(|e| AppError::PipelineError(format!("failed to start pipeline for ws streamer: {e}")))?;

    let (frame_tx, mut frame_rx) = mpsc::channel::<Vec<u8>>(8);
    let video_task = spawn_media_pump(video_bridge, frame_tx.clone(), cancel.clone());
    let audio_task = spawn_media_pump(audio_bridge, frame_tx, cancel.clone());

    let result = loop {
        tokio::select! {
            _ = cancel.cancelled() => break Ok(()),
            frame = frame_rx.recv() => {
                let Some(frame) = frame else { break Ok(()) };
                if sink.send(Message::Binary(frame)).await.is_err() {
                    break Ok(());
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let mut input = deps.input.lock().await;
                        handle_inbound_text(&text, &mut *input);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sink.send(Message::Pong(data)).await.is_err() {
                            break Ok(());
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("websocket streamer client disconnected");
                        break Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        break Err(AppError::Internal(format!("websocket streamer receive error: {e}")));
                    }
                }
            }
        }
    };

    video_task.abort();
    audio_task.abort();
    let _ = deps.pipeline.stop().await;
    result
}

/// Pumps one bridge's frames into the shared outbound channel as tagged
/// binary frames: `[tag:1][pts:8 LE][payload]`.
fn spawn_media_pump(
    bridge: Arc<PipelineBridge<EncodedFrame>>,
    out: mpsc::Sender<Vec<u8>>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                frame = bridge.get() => {
                    let mut buf = Vec::with_capacity(9 + frame.payload.len());
                    buf.push(FrameTag::from(frame.kind) as u8);
                    buf.extend_from_slice(&frame.pts.to_le_bytes());
                    buf.extend_from_slice(&frame.payload);
                    if out.send(buf).await.is_err() {
                        break;
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
    fn frame_tag_matches_media_kind() {
        assert_eq!(FrameTag::from(MediaKind::Video) as u8, 0);
        assert_eq!(FrameTag::from(MediaKind::Audio) as u8, 1);
    }
}
