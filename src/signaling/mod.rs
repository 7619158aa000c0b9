//! Signaling Server & Client (§4.2): room/session relay over WebSocket plus
//! the client side used when acting purely as a WebRTC peer against an
//! external signaling server.

pub mod client;
pub mod registry;
pub mod server;

pub use registry::{PeerRegistry, PeerStatus};
pub use server::{router, SignalingState};
