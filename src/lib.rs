//! selkies-rs - single-user remote desktop streaming server
//!
//! Streams one X11 display to a single browser client over WebRTC or a
//! framed WebSocket fallback, with a Supervisor that switches between the
//! two transports without restarting the process.

pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod input;
pub mod pipeline;
pub mod rtc_config;
pub mod signaling;
pub mod state;
pub mod supervisor;
pub mod utils;
pub mod web;
pub mod webrtc;
pub mod ws_streamer;

pub use error::{AppError, Result};
