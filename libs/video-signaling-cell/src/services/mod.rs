// libs/video-signaling-cell/src/services/mod.rs

pub mod connection;
pub mod listener;
pub mod registry;
pub mod relay;

pub use connection::serve_connection;
pub use listener::bind_with_fallback;
pub use registry::{Departure, ParticipantRegistry, PeerRoute, RegistrationOutcome};
pub use relay::SignalingRelay;
