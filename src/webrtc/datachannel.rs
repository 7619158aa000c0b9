//! Data channel JSON envelope (§4.4), grounded on
//! `original_source/src/selkies/rtc.py`'s `__send_data_channel_message`
//! and `send_clipboard_data`.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use webrtc::data_channel::RTCDataChannel;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use std::sync::Arc;

use crate::input::{InputEvent, InputSink};

/// Chunk size, in bytes of base64 payload, for clipboard transfer.
const CLIPBOARD_CHUNK_SIZE: usize = 65_400;

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    #[serde(rename = "type")]
    kind: &'a str,
    data: T,
}

/// Send one `{"type": kind, "data": data}` message if (and only if) the
/// channel is open and the peer connection is `connected`; otherwise the
/// message is dropped and logged at debug, never queued.
pub fn send(
    channel: &Arc<RTCDataChannel>,
    pc_state: RTCPeerConnectionState,
    kind: &str,
    data: impl Serialize,
) {
    if channel.ready_state() != webrtc::data_channel::data_channel_state::RTCDataChannelState::Open
        || pc_state != RTCPeerConnectionState::Connected
    {
        debug!(kind, "dropping data channel message: channel not ready");
        return;
    }

    let Ok(payload) = serde_json::to_string(&Envelope { kind, data }) else {
        debug!(kind, "failed to serialize data channel message");
        return;
    };

    let channel = channel.clone();
    tokio::spawn(async move {
        if let Err(e) = channel.send_text(payload).await {
            debug!(error = %e, "data channel send failed");
        }
    });
}

/// Base64-encode `data` and send it in `CLIPBOARD_CHUNK_SIZE`-byte chunks,
/// all but the last tagged `"clipboard-msg"`, the last `"clipboard-msg-end"`.
pub fn send_clipboard(channel: &Arc<RTCDataChannel>, pc_state: RTCPeerConnectionState, data: &str) {
    let encoded = STANDARD.encode(data.as_bytes());
    let mut read = 0;
    while read < encoded.len() {
        let end = (read + CLIPBOARD_CHUNK_SIZE).min(encoded.len());
        let chunk = &encoded[read..end];
        let kind = if end < encoded.len() { "clipboard-msg" } else { "clipboard-msg-end" };
        send(channel, pc_state, kind, serde_json::json!({ "content": chunk }));
        read = end;
    }
    debug!(len = data.len(), "sent clipboard data");
}

/// Inbound message on the `"input"` channel, dispatched to `sink`. Format is
/// `{"type": <InputEvent kind>, "data": {...}}`, mirroring the outbound
/// envelope shape for symmetry; unrecognized or malformed messages are
/// logged and dropped, never treated as fatal.
pub fn handle_inbound_text(text: &str, sink: &mut dyn InputSink) {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        debug!(text, "dropping malformed input channel message");
        return;
    };
    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        debug!("dropping input channel message with no type");
        return;
    };
    let data = value.get("data").cloned().unwrap_or(Value::Null);

    let event = match kind {
        "key" => serde_json::from_value::<KeyMsg>(data)
            .ok()
            .map(|m| InputEvent::Key { code: m.code, pressed: m.pressed }),
        "mousemove_abs" => serde_json::from_value::<MoveAbsMsg>(data)
            .ok()
            .map(|m| InputEvent::MouseMoveAbs { x: m.x, y: m.y }),
        "mousemove_rel" => serde_json::from_value::<MoveRelMsg>(data)
            .ok()
            .map(|m| InputEvent::MouseMoveRel { dx: m.dx, dy: m.dy }),
        "mousebutton" => serde_json::from_value::<ButtonMsg>(data)
            .ok()
            .map(|m| InputEvent::MouseButton { button: m.button, pressed: m.pressed }),
        "scroll" => serde_json::from_value::<ScrollMsg>(data)
            .ok()
            .map(|m| InputEvent::Scroll { dx: m.dx, dy: m.dy }),
        other => {
            debug!(kind = other, "ignoring unknown input channel message type");
            None
        }
    };

    if let Some(event) = event {
        if let Err(e) = sink.inject(event) {
            debug!(error = %e, "failed to inject input event");
        }
    }
}

#[derive(serde::Deserialize)]
struct KeyMsg {
    code: u16,
    pressed: bool,
}

#[derive(serde::Deserialize)]
struct MoveAbsMsg {
    x: f64,
    y: f64,
}

#[derive(serde::Deserialize)]
struct MoveRelMsg {
    dx: f64,
    dy: f64,
}

#[derive(serde::Deserialize)]
struct ButtonMsg {
    button: u8,
    pressed: bool,
}

#[derive(serde::Deserialize)]
struct ScrollMsg {
    dx: f64,
    dy: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;

    struct RecordingSink(Vec<InputEvent>);
    impl InputSink for RecordingSink {
        fn inject(&mut self, event: InputEvent) -> Result<()> {
            self.0.push(event);
            Ok(())
        }
    }

    #[test]
    fn parses_key_event() {
        let mut sink = RecordingSink(Vec::new());
        handle_inbound_text(r#"{"type":"key","data":{"code":30,"pressed":true}}"#, &mut sink);
        assert_eq!(sink.0, vec![InputEvent::Key { code: 30, pressed: true }]);
    }

    #[test]
    fn ignores_unknown_type() {
        let mut sink = RecordingSink(Vec::new());
        handle_inbound_text(r#"{"type":"bogus","data":{}}"#, &mut sink);
        assert!(sink.0.is_empty());
    }

    #[test]
    fn ignores_malformed_json() {
        let mut sink = RecordingSink(Vec::new());
        handle_inbound_text("{not json", &mut sink);
        assert!(sink.0.is_empty());
    }
}
