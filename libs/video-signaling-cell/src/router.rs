// libs/video-signaling-cell/src/router.rs
use std::sync::Arc;

use axum::{routing::get, Router};

use shared_config::AppConfig;

use crate::handlers::*;
use crate::services::SignalingRelay;

/// Creates the signaling relay routes.
/// Clients connect at `/` (or `/ws`) on the relay's dedicated port.
pub fn signaling_routes(config: Arc<AppConfig>, relay: SignalingRelay) -> Router {
    let state = SignalingState { config, relay };

    Router::new()
        .route("/", get(signaling_socket))
        .route("/ws", get(signaling_socket))
        .route("/health", get(signaling_health))
        .route("/groups/{appointment_id}", get(get_rendezvous_group))
        .with_state(state)
}
