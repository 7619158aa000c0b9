//! Types shared between the peer connection and the signaling client
//! (§4.4), grounded on `original_source/src/selkies/rtc.py`'s
//! `connectionState` string values and `RTCIceCandidateInit` shape.

use serde::{Deserialize, Serialize};

/// Mirrors `RTCPeerConnectionState`'s browser-visible string so log lines
/// and the status WebSocket read the same as a browser console would.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::New => write!(f, "new"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Failed => write!(f, "failed"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

impl From<webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState> for ConnectionState {
    fn from(s: webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState) -> Self {
        use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState as S;
        match s {
            S::New | S::Unspecified => ConnectionState::New,
            S::Connecting => ConnectionState::Connecting,
            S::Connected => ConnectionState::Connected,
            S::Disconnected => ConnectionState::Disconnected,
            S::Failed => ConnectionState::Failed,
            S::Closed => ConnectionState::Closed,
        }
    }
}

/// An ICE candidate exchanged over the signaling transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
    #[serde(rename = "usernameFragment")]
    pub username_fragment: Option<String>,
}

impl From<IceCandidate> for webrtc::ice_transport::ice_candidate::RTCIceCandidateInit {
    fn from(c: IceCandidate) -> Self {
        Self {
            candidate: c.candidate,
            sdp_mid: c.sdp_mid,
            sdp_mline_index: c.sdp_mline_index,
            username_fragment: c.username_fragment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_state_display_matches_browser_strings() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Failed.to_string(), "failed");
    }
}
