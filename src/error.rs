//! Application-wide error taxonomy (§7).
//!
//! Leaf components translate library-specific failures into one of these
//! kinds and attach context; mid-level components log at warning and
//! continue where safe. Fatal kinds (`ConfigInvalid`, `PluginMissing`) only
//! abort the process during startup — once the server is running they
//! collapse the active session instead.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed setting or impossible combination. Fatal at startup.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Required capture/encoder capability absent. Fatal for the chosen
    /// pipeline back-end.
    #[error("required capability missing: {0}")]
    PluginMissing(String),

    /// Runtime media bus error or EOS. Tears down the active session only.
    #[error("pipeline error: {0}")]
    PipelineError(String),

    /// Network or handshake error on the signaling transport. Callers
    /// reconnect with backoff; this is never fatal.
    #[error("signaling transport error: {0}")]
    SignalingTransient(String),

    /// Malformed HELLO or unknown verb. Callers close the socket with
    /// code 1002 and this message as the reason.
    #[error("signaling protocol violation: {0}")]
    SignalingProtocol(String),

    /// SDP type not `answer`, ICE parsing failure, or peer connection
    /// negotiation failure. Aborts the current session only.
    #[error("rtc negotiation failed: {0}")]
    RtcNegotiation(String),

    /// Mode switch request denied: unknown mode, or a switch already in
    /// flight / already in the requested mode. Maps to HTTP 409.
    #[error("control request rejected: {0}")]
    ControlRejected(String),

    /// Mode switch requested while dual mode is disabled by config. Maps
    /// to HTTP 403, distinct from `ControlRejected`'s 409.
    #[error("control request forbidden: {0}")]
    ControlForbidden(String),

    /// Attempt to mutate a locked setting at runtime. Logged and ignored,
    /// never propagated to a client as a hard failure beyond this status.
    #[error("resource busy: {0}")]
    ResourceBusy(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),

    // Kept as an alias while modules migrate call sites onto the specific
    // taxonomy kinds above; maps to `ConfigInvalid`.
    #[error("configuration error: {0}")]
    Config(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::ConfigInvalid(_) | AppError::Config(_) => "CONFIG_INVALID",
            AppError::PluginMissing(_) => "PLUGIN_MISSING",
            AppError::PipelineError(_) => "PIPELINE_ERROR",
            AppError::SignalingTransient(_) => "SIGNALING_TRANSIENT",
            AppError::SignalingProtocol(_) => "SIGNALING_PROTOCOL",
            AppError::RtcNegotiation(_) => "RTC_NEGOTIATION",
            AppError::ControlRejected(_) => "CONTROL_REJECTED",
            AppError::ControlForbidden(_) => "CONTROL_FORBIDDEN",
            AppError::ResourceBusy(_) => "RESOURCE_BUSY",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ConfigInvalid(_) | AppError::Config(_) | AppError::PluginMissing(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::PipelineError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::SignalingTransient(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::SignalingProtocol(_) => StatusCode::BAD_REQUEST,
            AppError::RtcNegotiation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ControlRejected(_) => StatusCode::CONFLICT,
            AppError::ControlForbidden(_) => StatusCode::FORBIDDEN,
            AppError::ResourceBusy(_) => StatusCode::LOCKED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Database(_) | AppError::Io(_) | AppError::Serialization(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code().to_string(),
            message: self.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(error_code = body.error, message = %body.message, "request failed");
        } else {
            tracing::warn!(error_code = body.error, message = %body.message, "request rejected");
        }

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
