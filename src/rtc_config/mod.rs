//! RTC-Config Resolver & Monitors (§4.6). Six-source priority chain,
//! grounded on `original_source/src/selkies/webrtc_utils.py`
//! (`get_rtc_configuration`, `HMACRTCMonitor`, `RestApiRTCMonitor`).

pub mod hmac_turn;
pub mod monitor;
pub mod resolver;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// `{stun_uris, turn_uris, raw_json}` (§3).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RtcConfig {
    pub stun_uris: Vec<String>,
    pub turn_uris: Vec<String>,
    pub raw_json: Vec<u8>,
}

/// Read by many, replaced atomically by monitors (§5 shared resources).
#[derive(Clone)]
pub struct RtcConfigCache {
    inner: Arc<ArcSwap<RtcConfig>>,
}

impl RtcConfigCache {
    pub fn new(initial: RtcConfig) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(initial)),
        }
    }

    pub fn get(&self) -> Arc<RtcConfig> {
        self.inner.load_full()
    }

    pub fn set(&self, config: RtcConfig) {
        self.inner.store(Arc::new(config));
    }
}
