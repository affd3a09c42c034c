use std::io;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::ConnectionId;

#[derive(Error, Debug)]
pub enum SignalingError {
    #[error("Malformed message: {0}")]
    MalformedMessage(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid role '{0}', expected 'doctor' or 'patient'")]
    InvalidRole(String),

    #[error("Connection is not registered")]
    NotRegistered,

    #[error("No other user found in appointment {appointment_id}")]
    NoPeerAvailable { appointment_id: String },

    #[error("Target user {identity} not found or not connected")]
    TargetNotFound { identity: String },

    #[error("Rendezvous group not found: {0}")]
    GroupNotFound(String),

    #[error("Connection {0} is closed")]
    ConnectionClosed(ConnectionId),

    #[error("Outbound queue of connection {0} is full")]
    OutboundFull(ConnectionId),

    #[error("Serialization error: {0}")]
    Serialization(serde_json::Error),

    #[error("Failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("No available port in range {first}-{last}")]
    NoAvailablePort { first: u16, last: u16 },
}

impl SignalingError {
    /// Protocol errors are reported back to the sender as an `error` message.
    /// Routing misses and transport failures are only logged.
    pub fn notifies_sender(&self) -> bool {
        matches!(
            self,
            SignalingError::MalformedMessage(_)
                | SignalingError::MissingField(_)
                | SignalingError::InvalidRole(_)
                | SignalingError::NotRegistered
                | SignalingError::NoPeerAvailable { .. }
        )
    }
}

impl IntoResponse for SignalingError {
    fn into_response(self) -> Response {
        let status = match &self {
            SignalingError::GroupNotFound(_) => StatusCode::NOT_FOUND,
            SignalingError::MalformedMessage(_)
            | SignalingError::MissingField(_)
            | SignalingError::InvalidRole(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        tracing::error!("Error: {}: {}", status, self);

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
