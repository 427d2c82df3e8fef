//! HTTP surface of the gateway.

use crate::limiter::FixedWindowLimiter;
use crate::middleware::RateLimitLayer;
use crate::ws;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use fm_fanout::FanoutHub;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct GatewayState {
    pub hub: Arc<FanoutHub>,
}

/// Build the gateway router: the fan-out bridge plus liveness, with
/// admission control in front of every route.
pub fn router(hub: Arc<FanoutHub>, limiter: Arc<FixedWindowLimiter>) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/healthz", get(healthz))
        .layer(RateLimitLayer::new(limiter))
        .layer(TraceLayer::new_for_http())
        .with_state(GatewayState { hub })
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> Response {
    ws.on_upgrade(move |socket| ws::handle_socket(socket, state.hub))
}

async fn healthz() -> &'static str {
    "ok"
}
