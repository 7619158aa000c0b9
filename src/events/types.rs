//! System event types
//!
//! Defines all event types broadcast through the event bus: mode switches,
//! pipeline state transitions, peer connection lifecycle, and RTC config
//! refreshes. Consumers are WebSocket/SSE status subscribers and internal
//! coordination (the Supervisor's control API reads `Supervisor::status()`
//! directly rather than through this bus; the bus is for fan-out).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level system event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SystemEvent {
    /// The Supervisor switched the active transport mode
    StreamModeChanged {
        mode: Option<String>,
        status: String,
        at: DateTime<Utc>,
    },
    /// The Media Pipeline transitioned state (new/starting/running/stopping/stopped)
    PipelineStateChanged { state: String, at: DateTime<Utc> },
    /// A WebRTC peer connection changed ICE/connection state
    PeerConnectionStateChanged {
        peer_uid: String,
        state: String,
        at: DateTime<Utc>,
    },
    /// A signaling peer registered, paired, or disconnected
    SignalingPeerEvent {
        uid: String,
        kind: String,
        at: DateTime<Utc>,
    },
    /// The RTC configuration was refreshed by a monitor
    RtcConfigRefreshed { source: String, at: DateTime<Utc> },
    /// A non-fatal error surfaced from a component
    SystemError {
        module: String,
        severity: String,
        message: String,
    },
}
