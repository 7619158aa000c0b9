//! Utility modules
//!
//! This module contains common utilities used across the codebase.

pub mod net;
pub mod throttle;

pub use net::{bind_tcp_listener, bind_udp_socket};
pub use throttle::LogThrottler;
