//! Shared state for the web-facing routers (`web::routes`, `auth`): the
//! small slice of the running server every HTTP/WS handler needs.
//!
//! The Signaling Server and Supervisor control API carry their own,
//! narrower state (`signaling::server::SignalingState`,
//! `supervisor::Supervisor`) since they're mounted as independent routers
//! (§6); this `AppState` is for the general status/health surface and the
//! WebSocket Streamer's HTTP upgrade endpoint.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::ConfigStore;
use crate::events::EventBus;
use crate::rtc_config::RtcConfigCache;
use crate::supervisor::Supervisor;
use crate::ws_streamer::WsStreamerHandle;

pub struct AppState {
    pub config: ConfigStore,
    pub events: Arc<EventBus>,
    pub supervisor: Arc<Supervisor>,
    pub rtc_config: RtcConfigCache,
    pub ws_streamer: WsStreamerHandle,
    pub shutdown_tx: broadcast::Sender<()>,
    data_dir: PathBuf,
}

impl AppState {
    pub fn new(
        config: ConfigStore,
        events: Arc<EventBus>,
        supervisor: Arc<Supervisor>,
        rtc_config: RtcConfigCache,
        ws_streamer: WsStreamerHandle,
        shutdown_tx: broadcast::Sender<()>,
        data_dir: PathBuf,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            events,
            supervisor,
            rtc_config,
            ws_streamer,
            shutdown_tx,
            data_dir,
        })
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }
}
