// libs/video-signaling-cell/src/lib.rs
//! # Video Signaling Cell
//!
//! WebRTC signaling relay for peer-to-peer doctor/patient video calls.
//! The relay pairs participants by appointment and forwards session setup
//! messages between them. Media flows directly between the peers.
//!
//! ## Architecture
//!
//! ```text
//! +-----------------------------------------------------+
//! |                 Video Signaling Cell                |
//! +-----------------------------------------------------+
//! |  handlers.rs     |  WebSocket upgrade, health       |
//! |  router.rs       |  Route definitions               |
//! |  models.rs       |  Wire messages & participants    |
//! |  error.rs        |  Error taxonomy                  |
//! |  services/       |                                  |
//! |    registry.rs   |  Participant & group maps        |
//! |    relay.rs      |  Message routing                 |
//! |    connection.rs |  Per-socket task                 |
//! |    listener.rs   |  Port binding with fallback      |
//! +-----------------------------------------------------+
//! ```
//!
//! ## Protocol
//!
//! Every frame is a JSON object with a `type` field.
//!
//! | client sends    | relay action                                 |
//! |-----------------|----------------------------------------------|
//! | `register`      | record participant, announce peers both ways |
//! | `call-offer`    | forward to the other member of the group     |
//! | `call-answer`   | forward to `to`                              |
//! | `ice-candidate` | forward to `to`                              |
//! | `call-ended`    | forward to every other member of the group   |
//!
//! The relay answers with `user-registered`, `user-joined`,
//! `user-disconnected` and `error`, and adds `from` to every forwarded
//! message.
//!
//! ## HTTP Endpoints
//!
//! - `GET /` or `GET /ws` - WebSocket upgrade
//! - `GET /health` - Relay status and counts
//! - `GET /groups/{appointment_id}` - Rendezvous group membership
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use shared_config::AppConfig;
//! use video_signaling_cell::{bind_with_fallback, signaling_routes, SignalingRelay};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(AppConfig::from_env());
//! let listener = bind_with_fallback(
//!     &config.signaling_host,
//!     config.port_range(),
//!     config.port_retry_delay(),
//! )
//! .await?;
//! let app = signaling_routes(config, SignalingRelay::new());
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use error::SignalingError;
pub use models::{
    ClientMessage, ConnectionHandle, ConnectionId, ParticipantRole, PeerSummary, Registration,
    RelayStats, ServerMessage,
};
pub use router::signaling_routes;
pub use services::{bind_with_fallback, serve_connection, SignalingRelay};
