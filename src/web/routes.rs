//! General web surface: health, the status WebSocket, the WebSocket
//! Streamer's upgrade endpoint, and static client assets (§6). The
//! Signaling Server and the Supervisor's control API are separate routers
//! (`signaling::server::router`, `supervisor::control_api::router`) since
//! they carry their own state and bind policy.

use axum::{middleware, routing::any, routing::get, Router};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::stream_ws::stream_ws_handler;
use super::ws::ws_handler;
use crate::auth::basic_auth_middleware;
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public_routes = Router::new().route("/health", get(health_check));

    let protected_routes = Router::new()
        .route("/ws", any(ws_handler))
        .route("/ws/stream", any(stream_ws_handler))
        .layer(middleware::from_fn_with_state(state.clone(), basic_auth_middleware));

    let api_routes = Router::new().merge(public_routes).merge(protected_routes);

    let static_routes = super::static_files::static_file_router();

    Router::new()
        .nest("/api", api_routes)
        .merge(static_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}
