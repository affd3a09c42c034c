// libs/video-signaling-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    response::Response,
    Json,
};
use serde_json::{json, Value};
use tracing::debug;

use shared_config::AppConfig;

use crate::error::SignalingError;
use crate::models::GroupSnapshot;
use crate::services::{serve_connection, SignalingRelay};

#[derive(Clone)]
pub struct SignalingState {
    pub config: Arc<AppConfig>,
    pub relay: SignalingRelay,
}

/// Upgrade to the signaling protocol
pub async fn signaling_socket(
    State(state): State<SignalingState>,
    ws: WebSocketUpgrade,
) -> Response {
    let heartbeat = state.config.heartbeat_interval();
    let relay = state.relay.clone();

    ws.on_upgrade(move |socket| serve_connection(socket, relay, heartbeat))
}

pub async fn signaling_health(State(state): State<SignalingState>) -> Json<Value> {
    let stats = state.relay.stats().await;

    Json(json!({
        "status": "healthy",
        "participants": stats.participants,
        "rendezvous_groups": stats.rendezvous_groups,
        "connections": stats.connections,
        "heartbeat_enabled": state.config.is_heartbeat_enabled(),
        "message": "Video call signaling relay is operational"
    }))
}

/// Current membership of one appointment's rendezvous group
pub async fn get_rendezvous_group(
    State(state): State<SignalingState>,
    Path(appointment_id): Path<String>,
) -> Result<Json<GroupSnapshot>, SignalingError> {
    debug!("Rendezvous group lookup for appointment {}", appointment_id);

    let snapshot = state.relay.group_snapshot(&appointment_id).await?;
    Ok(Json(snapshot))
}
