//! Loopback-only control plane: `POST /switch`, `GET /status` (§4.1, §6).

use axum::{extract::State, routing::{get, post}, Json, Router};
use serde::Deserialize;
use std::sync::Arc;

use super::Supervisor;
use crate::config::StreamMode;
use crate::error::{AppError, Result};

#[derive(Deserialize)]
pub struct SwitchRequest {
    pub mode: String,
}

#[derive(serde::Serialize)]
pub struct SwitchResponse {
    pub message: String,
}

pub fn router(supervisor: Arc<Supervisor>) -> Router {
    Router::new()
        .route("/switch", post(switch_handler))
        .route("/status", get(status_handler))
        .with_state(supervisor)
}

async fn switch_handler(
    State(supervisor): State<Arc<Supervisor>>,
    Json(req): Json<SwitchRequest>,
) -> Result<Json<SwitchResponse>> {
    let mode: StreamMode = req
        .mode
        .parse()
        .map_err(|_| AppError::ControlRejected("INVALID_MODE".into()))?;

    let message = supervisor.switch_to(mode).await?;
    Ok(Json(SwitchResponse { message }))
}

async fn status_handler(State(supervisor): State<Arc<Supervisor>>) -> Json<super::SupervisorStatus> {
    Json(supervisor.status().await)
}
