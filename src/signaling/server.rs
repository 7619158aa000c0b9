//! Signaling Server HTTP/WS surface (§4.2, §6), grounded on
//! `examples/original_source/src/selkies_gstreamer/signalling_web.py`'s
//! `WebRTCSimpleServer`.

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tower_http::services::ServeDir;
use tracing::{info, warn};

use super::registry::{PeerRegistry, PeerStatus};
use crate::rtc_config::RtcConfigCache;

pub struct SignalingState {
    pub registry: Mutex<PeerRegistry>,
    pub rtc_config: RtcConfigCache,
    pub keepalive_timeout: Duration,
}

pub fn router(state: Arc<SignalingState>, web_root: Option<&str>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/turn", get(turn))
        .route("/:uid/signalling", get(signalling))
        .with_state(state);

    if let Some(root) = web_root {
        router = router.fallback_service(ServeDir::new(root));
    }
    router
}

async fn health() -> &'static str {
    "ok"
}

/// Close code 1002 ("protocol error") with `reason`, per the signaling
/// wire protocol's `SIGNALING_PROTOCOL` close convention (§4.2, §7).
fn close_frame(reason: &str) -> Message {
    Message::Close(Some(CloseFrame { code: 1002, reason: reason.to_string().into() }))
}

async fn turn(State(state): State<Arc<SignalingState>>) -> Response {
    let config = state.rtc_config.get();
    (StatusCode::OK, [("content-type", "application/json")], config.raw_json.clone()).into_response()
}

async fn signalling(
    Path(uid): Path<String>,
    State(state): State<Arc<SignalingState>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, uid, state))
}

async fn handle_socket(socket: WebSocket, uid: String, state: Arc<SignalingState>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let Some(hello) = receiver.next().await else {
        return;
    };
    let Ok(Message::Text(hello_text)) = hello else {
        return;
    };

    let Some((peer_uid, exists, meta)) = hello_peer(&hello_text, &uid, &state, &tx).await else {
        let _ = sender.send(close_frame("invalid HELLO")).await;
        return;
    };

    if exists {
        remove_peer(&state, &peer_uid, "already exists").await;
        state.registry.lock().await.insert(peer_uid.clone(), tx.clone(), meta);
    }

    if tx.send(Message::Text("HELLO".to_string())).is_err() {
        return;
    }

    info!(uid = %peer_uid, "signaling peer registered");

    let forward = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    loop {
        let received = tokio::time::timeout(state.keepalive_timeout, receiver.next()).await;
        let msg = match received {
            Ok(Some(Ok(Message::Text(text)))) => text,
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => break,
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(e))) => {
                warn!(uid = %peer_uid, error = %e, "signaling websocket receive error");
                break;
            }
            Err(_) => {
                // Keepalive: nudge the forwarding task with a ping.
                if tx.send(Message::Ping(vec![])).is_err() {
                    break;
                }
                continue;
            }
        };

        handle_message(&state, &peer_uid, &msg, &tx).await;
    }

    remove_peer(&state, &peer_uid, "").await;
    forward.abort();
}

async fn hello_peer(
    hello: &str,
    expected_uid: &str,
    state: &Arc<SignalingState>,
    tx: &mpsc::UnboundedSender<Message>,
) -> Option<(String, bool, Option<String>)> {
    let mut parts = hello.splitn(2, ' ');
    let verb = parts.next()?;
    let rest = parts.next()?.trim();
    let mut rest_parts = rest.splitn(2, ' ');
    let uid = rest_parts.next()?;
    let meta = rest_parts.next().map(|m| m.trim().to_string()).filter(|m| !m.is_empty());

    if verb != "HELLO" || uid.is_empty() || uid != expected_uid {
        return None;
    }

    let mut registry = state.registry.lock().await;
    let exists = registry.contains(uid);
    if !exists {
        registry.insert(uid.to_string(), tx.clone(), meta.clone());
    }
    Some((uid.to_string(), exists, meta))
}

async fn remove_peer(state: &Arc<SignalingState>, uid: &str, reason: &str) {
    let mut registry = state.registry.lock().await;

    if let Some(other_id) = registry.cleanup_session(uid) {
        if registry.send_to(&other_id, "ERROR peer disconnected".to_string()) {
            info!(uid, other_id, "closed paired session peer");
        }
    } else if let Some(PeerStatus::Room(room_id)) = registry.status(uid) {
        for pid in registry.cleanup_room(uid, &room_id) {
            registry.send_to(&pid, format!("ROOM_PEER_LEFT {uid}"));
        }
    }

    if let Some(peer) = registry.remove(uid) {
        let msg = if reason.is_empty() { Message::Close(None) } else { close_frame(reason) };
        let _ = peer.sender.send(msg);
    }

    if !reason.is_empty() {
        info!(uid, reason, "peer removed");
    }
}

async fn handle_message(state: &Arc<SignalingState>, uid: &str, msg: &str, tx: &mpsc::UnboundedSender<Message>) {
    let status = {
        let registry = state.registry.lock().await;
        registry.status(uid)
    };

    match status {
        Some(PeerStatus::Session) => {
            let other_id = {
                let registry = state.registry.lock().await;
                registry.session_peer(uid)
            };
            if let Some(other_id) = other_id {
                let mut registry = state.registry.lock().await;
                registry.send_to(&other_id, msg.to_string());
            }
        }
        Some(PeerStatus::Room(room_id)) => handle_room_message(state, uid, &room_id, msg).await,
        Some(PeerStatus::None) | None => handle_idle_message(state, uid, msg, tx).await,
    }
}

async fn handle_idle_message(state: &Arc<SignalingState>, uid: &str, msg: &str, tx: &mpsc::UnboundedSender<Message>) {
    if let Some(callee_id) = msg.strip_prefix("SESSION ") {
        let callee_id = callee_id.trim();
        let mut registry = state.registry.lock().await;
        if !registry.contains(callee_id) {
            let _ = tx.send(Message::Text(format!("ERROR peer '{callee_id}' not found")));
            return;
        }
        if registry.status(callee_id) != Some(PeerStatus::None) {
            let _ = tx.send(Message::Text(format!("ERROR peer '{callee_id}' busy")));
            return;
        }
        registry.start_session(uid, callee_id);
        let callee_meta = registry.meta(callee_id).unwrap_or_default();
        let _ = tx.send(Message::Text(format!("SESSION_OK {callee_meta}")));
        return;
    }

    if let Some(room_id) = msg.strip_prefix("ROOM ") {
        let room_id = room_id.trim();
        if room_id == "session" || room_id.is_empty() || room_id.split_whitespace().count() != 1 {
            let _ = tx.send(Message::Text(format!("ERROR invalid room id '{room_id}'")));
            return;
        }
        let mut registry = state.registry.lock().await;
        let existing = registry.join_room(uid, room_id);
        let _ = tx.send(Message::Text(format!("ROOM_OK {}", existing.join(" "))));
        for pid in &existing {
            registry.send_to(pid, format!("ROOM_PEER_JOINED {uid}"));
        }
        return;
    }

    warn!(uid, msg, "ignoring unknown signaling message");
}

async fn handle_room_message(state: &Arc<SignalingState>, uid: &str, room_id: &str, msg: &str) {
    let mut registry = state.registry.lock().await;

    if let Some(rest) = msg.strip_prefix("ROOM_PEER_MSG ") {
        let Some((other_id, payload)) = rest.split_once(' ') else {
            registry.send_to(uid, "ERROR malformed ROOM_PEER_MSG".to_string());
            return;
        };
        if !registry.peer_in_room(room_id, other_id) {
            registry.send_to(uid, format!("ERROR peer '{other_id}' is not in the room"));
            return;
        }
        registry.send_to(other_id, format!("ROOM_PEER_MSG {uid} {payload}"));
    } else if msg == "ROOM_PEER_LIST" {
        let peers = registry.room_peers(room_id, uid);
        registry.send_to(uid, format!("ROOM_PEER_LIST {}", peers.join(" ")));
    } else {
        registry.send_to(uid, "ERROR invalid msg, already in room".to_string());
    }
}

pub fn local_addr(bind: &str, port: u16) -> SocketAddr {
    format!("{bind}:{port}").parse().unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)))
}
