//! Supervisor: owns the lifecycle of the currently active transport mode
//! and serializes mode changes (§4.1).
//!
//! Grounded on `original_source/src/selkies/__main__.py`'s
//! `StreamSupervisor`: a single async lock guards `current_mode`/
//! `current_task`; `switch_to` cancels the old task, waits up to a grace
//! window, then spawns the new one.

pub mod control_api;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::StreamMode;
use crate::error::{AppError, Result};

const SWITCH_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, serde::Serialize)]
pub struct SupervisorStatus {
    pub current_mode: Option<StreamMode>,
    pub status: &'static str,
}

struct RunningMode {
    mode: StreamMode,
    task: JoinHandle<()>,
    cancel: tokio_util::sync::CancellationToken,
}

/// Spawns and tears down per-mode entrypoints. The entrypoint closure
/// receives a cancellation token it must observe promptly.
pub type ModeEntrypoint =
    Arc<dyn Fn(tokio_util::sync::CancellationToken) -> JoinHandle<()> + Send + Sync>;

pub struct Supervisor {
    running: Mutex<Option<RunningMode>>,
    entrypoints: std::collections::HashMap<StreamMode, ModeEntrypoint>,
    enable_dual_mode: bool,
}

impl Supervisor {
    pub fn new(
        entrypoints: std::collections::HashMap<StreamMode, ModeEntrypoint>,
        enable_dual_mode: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            running: Mutex::new(None),
            entrypoints,
            enable_dual_mode,
        })
    }

    /// Cancel whatever is running (if anything) and start `mode`.
    pub async fn switch_to(&self, mode: StreamMode) -> Result<String> {
        if !self.enable_dual_mode {
            return Err(AppError::ControlForbidden("dual mode disabled".into()));
        }

        let Some(entrypoint) = self.entrypoints.get(&mode).cloned() else {
            return Err(AppError::ControlRejected(format!("unknown mode '{mode}'")));
        };

        let mut guard = self.running.lock().await;

        if let Some(running) = guard.as_ref() {
            if running.mode == mode {
                return Err(AppError::ControlRejected("ALREADY_RUNNING".into()));
            }
        }

        Self::teardown(guard.take()).await;

        let cancel = tokio_util::sync::CancellationToken::new();
        let task = entrypoint(cancel.clone());

        *guard = Some(RunningMode { mode, task, cancel });
        info!(%mode, "supervisor switched mode");
        Ok(format!("Switched to '{mode}'"))
    }

    /// Cancel the active mode task, if any, and leave the Supervisor stopped.
    /// Used by process shutdown (§5 ordering), never by a mode switch.
    pub async fn shutdown(&self) {
        let mut guard = self.running.lock().await;
        Self::teardown(guard.take()).await;
    }

    async fn teardown(running: Option<RunningMode>) {
        let Some(running) = running else { return };
        running.cancel.cancel();
        match tokio::time::timeout(SWITCH_GRACE, running.task).await {
            Ok(_) => info!(from = %running.mode, "previous mode task terminated cleanly"),
            Err(_) => warn!(from = %running.mode, "previous mode task exceeded grace window, proceeding anyway"),
        }
    }

    pub async fn status(&self) -> SupervisorStatus {
        let guard = self.running.lock().await;
        match guard.as_ref() {
            Some(running) => SupervisorStatus {
                current_mode: Some(running.mode),
                status: "running",
            },
            None => SupervisorStatus {
                current_mode: None,
                status: "stopped",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn fake_entrypoint(started: Arc<AtomicBool>) -> ModeEntrypoint {
        Arc::new(move |cancel| {
            let started = started.clone();
            tokio::spawn(async move {
                started.store(true, Ordering::SeqCst);
                cancel.cancelled().await;
            })
        })
    }

    #[tokio::test]
    async fn switching_to_the_same_mode_is_rejected() {
        let started = Arc::new(AtomicBool::new(false));
        let mut entrypoints: HashMap<StreamMode, ModeEntrypoint> = HashMap::new();
        entrypoints.insert(StreamMode::Webrtc, fake_entrypoint(started));
        let supervisor = Supervisor::new(entrypoints, true);

        supervisor.switch_to(StreamMode::Webrtc).await.unwrap();
        let err = supervisor.switch_to(StreamMode::Webrtc).await.unwrap_err();
        assert!(matches!(err, AppError::ControlRejected(msg) if msg == "ALREADY_RUNNING"));
    }

    #[tokio::test]
    async fn disabled_dual_mode_rejects_every_switch() {
        let started = Arc::new(AtomicBool::new(false));
        let mut entrypoints: HashMap<StreamMode, ModeEntrypoint> = HashMap::new();
        entrypoints.insert(StreamMode::Webrtc, fake_entrypoint(started));
        let supervisor = Supervisor::new(entrypoints, false);

        assert!(supervisor.switch_to(StreamMode::Webrtc).await.is_err());
    }

    #[tokio::test]
    async fn status_reports_current_mode() {
        let started = Arc::new(AtomicBool::new(false));
        let mut entrypoints: HashMap<StreamMode, ModeEntrypoint> = HashMap::new();
        entrypoints.insert(StreamMode::Websockets, fake_entrypoint(started));
        let supervisor = Supervisor::new(entrypoints, true);

        assert_eq!(supervisor.status().await.status, "stopped");
        supervisor.switch_to(StreamMode::Websockets).await.unwrap();
        let status = supervisor.status().await;
        assert_eq!(status.status, "running");
        assert_eq!(status.current_mode, Some(StreamMode::Websockets));
    }
}
