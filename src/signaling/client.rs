//! WebRTC Session's signaling client: reconnect-with-backoff against an
//! external signaling server (§4.4), grounded on
//! `original_source/src/selkies/webrtc_signaling.py`'s `WebRTCSignaling`.

use base64::{engine::general_purpose::STANDARD, Engine};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

const RECONNECT_DELAY: std::time::Duration = std::time::Duration::from_secs(2);

/// Messages delivered up from the signaling client to the WebRTC Session.
#[derive(Debug, Clone)]
pub enum SignalingEvent {
    Connected,
    Disconnected,
    Session { peer_id: String },
    Sdp { sdp_type: String, sdp: String },
    Ice { candidate: String, sdp_mline_index: u32 },
    Error(String),
}

#[derive(Serialize)]
struct SdpMessage<'a> {
    sdp: SdpPayload<'a>,
}

#[derive(Serialize)]
struct SdpPayload<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    sdp: &'a str,
}

#[derive(Serialize)]
struct IceMessage<'a> {
    ice: IcePayload<'a>,
}

#[derive(Serialize)]
struct IcePayload<'a> {
    candidate: &'a str,
    #[serde(rename = "sdpMLineIndex")]
    sdp_mline_index: u32,
}

#[derive(Deserialize)]
struct InboundJson {
    sdp: Option<InboundSdp>,
    ice: Option<InboundIce>,
}

#[derive(Deserialize)]
struct InboundSdp {
    #[serde(rename = "type")]
    kind: String,
    sdp: String,
}

#[derive(Deserialize)]
struct InboundIce {
    candidate: String,
    #[serde(rename = "sdpMLineIndex")]
    sdp_mline_index: u32,
}

pub struct SignalingClientConfig {
    pub server_url: String,
    pub id: String,
    pub basic_auth: Option<(String, String)>,
}

/// A message the WebRTC Session hands down to be sent over the live
/// connection. Dropped silently while disconnected; the session re-sends
/// whatever is still relevant (a fresh offer) once reconnected.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    Sdp { sdp_type: String, sdp: String },
    Ice { candidate: String, sdp_mline_index: u32 },
}

/// Connects, sends `HELLO <id>`, relays inbound messages as
/// [`SignalingEvent`]s, and forwards anything received on `outbound` to the
/// live connection, until `stop` fires. Reconnects with a 2s backoff.
pub async fn run(
    config: SignalingClientConfig,
    events: mpsc::UnboundedSender<SignalingEvent>,
    mut outbound: mpsc::UnboundedReceiver<OutboundMessage>,
    stop: tokio_util::sync::CancellationToken,
) {
    while !stop.is_cancelled() {
        tokio::select! {
            _ = stop.cancelled() => break,
            result = connect_and_listen(&config, &events, &mut outbound) => {
                if let Err(e) = result {
                    warn!(error = %e, "signaling client connection failed, retrying");
                }
                let _ = events.send(SignalingEvent::Disconnected);
            }
        }

        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
    }
}

async fn connect_and_listen(
    config: &SignalingClientConfig,
    events: &mpsc::UnboundedSender<SignalingEvent>,
    outbound: &mut mpsc::UnboundedReceiver<OutboundMessage>,
) -> anyhow::Result<()> {
    info!(server = %config.server_url, "connecting to signaling server");

    let mut request = config.server_url.as_str().into_client_request()?;
    if let Some((user, pass)) = &config.basic_auth {
        let token = STANDARD.encode(format!("{user}:{pass}"));
        request
            .headers_mut()
            .insert("Authorization", HeaderValue::from_str(&format!("Basic {token}"))?);
    }

    let (ws, _) = tokio_tungstenite::connect_async(request).await?;
    let (mut sink, mut stream) = ws.split();

    sink.send(Message::Text(format!("HELLO {}", config.id))).await?;

    loop {
        tokio::select! {
            msg = stream.next() => {
                let Some(msg) = msg else { break };
                let Message::Text(text) = msg? else { continue };
                handle_inbound(&text, events);
            }
            outbound_msg = outbound.recv() => {
                match outbound_msg {
                    Some(OutboundMessage::Sdp { sdp_type, sdp }) => {
                        send_sdp(&mut sink, &sdp_type, &sdp).await?;
                    }
                    Some(OutboundMessage::Ice { candidate, sdp_mline_index }) => {
                        send_ice(&mut sink, &candidate, sdp_mline_index).await?;
                    }
                    None => break,
                }
            }
        }
    }

    Ok(())
}

fn handle_inbound(text: &str, events: &mpsc::UnboundedSender<SignalingEvent>) {
    if text == "HELLO" {
        let _ = events.send(SignalingEvent::Connected);
        return;
    }

    if let Some(rest) = text.strip_prefix("SESSION") {
        if let Some(peer_id) = rest.split_whitespace().next() {
            let _ = events.send(SignalingEvent::Session { peer_id: peer_id.to_string() });
        }
        return;
    }

    if let Some(reason) = text.strip_prefix("ERROR") {
        let _ = events.send(SignalingEvent::Error(reason.trim().to_string()));
        return;
    }

    match serde_json::from_str::<InboundJson>(text) {
        Ok(InboundJson { sdp: Some(sdp), .. }) => {
            let _ = events.send(SignalingEvent::Sdp { sdp_type: sdp.kind, sdp: sdp.sdp });
        }
        Ok(InboundJson { ice: Some(ice), .. }) => {
            let _ = events.send(SignalingEvent::Ice {
                candidate: ice.candidate,
                sdp_mline_index: ice.sdp_mline_index,
            });
        }
        Ok(_) => {
            let _ = events.send(SignalingEvent::Error(format!("unhandled JSON message: {text}")));
        }
        Err(e) => {
            let _ = events.send(SignalingEvent::Error(format!("error parsing message as JSON: {e}")));
        }
    }
}

pub async fn send_sdp(
    sink: &mut (impl SinkExt<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin),
    sdp_type: &str,
    sdp: &str,
) -> anyhow::Result<()> {
    let payload = serde_json::to_string(&SdpMessage { sdp: SdpPayload { kind: sdp_type, sdp } })?;
    sink.send(Message::Text(payload)).await?;
    Ok(())
}

pub async fn send_ice(
    sink: &mut (impl SinkExt<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin),
    candidate: &str,
    sdp_mline_index: u32,
) -> anyhow::Result<()> {
    let payload = serde_json::to_string(&IceMessage { ice: IcePayload { candidate, sdp_mline_index } })?;
    sink.send(Message::Text(payload)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hello_produces_connected_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        handle_inbound("HELLO", &tx);
        assert!(matches!(rx.recv().await, Some(SignalingEvent::Connected)));
    }

    #[tokio::test]
    async fn session_message_extracts_peer_id() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        handle_inbound("SESSION peer-42", &tx);
        match rx.recv().await {
            Some(SignalingEvent::Session { peer_id }) => assert_eq!(peer_id, "peer-42"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn sdp_json_is_parsed() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        handle_inbound(r#"{"sdp":{"type":"answer","sdp":"v=0..."}}"#, &tx);
        match rx.recv().await {
            Some(SignalingEvent::Sdp { sdp_type, sdp }) => {
                assert_eq!(sdp_type, "answer");
                assert_eq!(sdp, "v=0...");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_json_reports_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        handle_inbound("{not json", &tx);
        assert!(matches!(rx.recv().await, Some(SignalingEvent::Error(_))));
    }
}
