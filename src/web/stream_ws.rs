//! HTTP upgrade endpoint for the WebSocket Streamer (§4.5). Accepting the
//! socket is all this layer does; `ws_streamer::run` (spawned by whichever
//! `ModeEntrypoint` the Supervisor has active for `StreamMode::Websockets`)
//! owns the actual session.

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

use crate::state::AppState;

pub async fn stream_ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| async move {
        if !state.ws_streamer.accept(socket) {
            warn!("rejected websocket streamer connection: a session is already active");
        }
    })
}
