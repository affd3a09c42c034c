// libs/video-signaling-cell/src/services/relay.rs
use std::sync::Arc;

use serde_json::value::RawValue;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::SignalingError;
use crate::models::{
    ClientMessage, ConnectionHandle, ConnectionId, GroupSnapshot, PeerSummary, Registration,
    RelayStats, ServerMessage,
};
use crate::services::registry::{Departure, ParticipantRegistry, PeerRoute};

/// Signaling relay for peer-to-peer video calls.
///
/// Pairs participants by appointment and forwards session setup messages
/// between them. Offers and hangups go to the sender's group implicitly,
/// answers and ICE candidates go to the identity named in `to`. Clients
/// depend on that asymmetry, so it is kept as is.
///
/// Registration and disconnect take the write lock, forwarding takes the
/// read lock. Deliveries are pushed while the lock is held, which keeps
/// lifecycle notifications ordered with respect to each other.
pub struct SignalingRelay {
    registry: Arc<RwLock<ParticipantRegistry>>,
}

impl SignalingRelay {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(RwLock::new(ParticipantRegistry::new())),
        }
    }

    /// Handles one text frame from a connection. Never fails: protocol
    /// errors are reported to the sender, routing misses are logged.
    pub async fn handle_text(&self, connection: &ConnectionHandle, text: &str) {
        let result = match ClientMessage::parse(text) {
            Ok(message) => {
                debug!("Received {} from connection {}", message.kind(), connection.id());
                self.dispatch(connection, message).await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            self.report(connection, e);
        }
    }

    pub async fn dispatch(
        &self,
        connection: &ConnectionHandle,
        message: ClientMessage,
    ) -> Result<(), SignalingError> {
        match message {
            ClientMessage::Register(registration) => {
                self.register(connection, registration).await;
                Ok(())
            }
            ClientMessage::CallOffer {
                offer,
                appointment_id,
            } => self.forward_offer(connection, offer, appointment_id).await,
            ClientMessage::CallAnswer { answer, to } => {
                self.forward_answer(connection, answer, &to).await
            }
            ClientMessage::IceCandidate { candidate, to } => {
                self.forward_candidate(connection, candidate, &to).await
            }
            ClientMessage::CallEnded { appointment_id } => {
                self.end_call(connection, appointment_id).await
            }
            ClientMessage::Unknown(kind) => {
                info!("Unknown message type: {}", kind);
                Ok(())
            }
        }
    }

    pub async fn register(&self, connection: &ConnectionHandle, registration: Registration) {
        let identity = registration.identity.clone();
        let role = registration.role;
        let appointment_id = registration.appointment_id.clone();

        info!(
            "Registering user: {} as {} for appointment {}",
            identity, role, appointment_id
        );

        let mut registry = self.registry.write().await;
        let outcome = registry.register(registration, connection.clone());

        if let Some(previous) = outcome.replaced_connection {
            info!("User {} re-registered, replacing connection {}", identity, previous);
        }
        if let Some(displaced) = &outcome.displaced {
            warn!(
                "Role {} in appointment {} reassigned from {} to {}",
                role, appointment_id, displaced, identity
            );
        }
        for departure in &outcome.departures {
            notify_departure(departure);
        }

        deliver(
            connection,
            ServerMessage::UserRegistered {
                user_id: identity.clone(),
                role,
            },
        );

        debug!(
            "Found {} other users in appointment {}",
            outcome.peers.len(),
            appointment_id
        );

        if !outcome.peers.is_empty() {
            deliver(
                connection,
                ServerMessage::UserJoined {
                    users: outcome.peers.iter().map(PeerRoute::summary).collect(),
                },
            );

            let joined = PeerSummary { id: identity.clone(), role };
            for peer in outcome.peers.iter().filter(|peer| peer.connection.is_open()) {
                debug!("Notifying {} about {} joining", peer.identity, identity);
                deliver(
                    &peer.connection,
                    ServerMessage::UserJoined {
                        users: vec![joined.clone()],
                    },
                );
            }
        }

        info!(
            "User {} registered as {} for appointment {}",
            identity, role, appointment_id
        );
    }

    pub async fn forward_offer(
        &self,
        connection: &ConnectionHandle,
        offer: Box<RawValue>,
        appointment_id: Option<String>,
    ) -> Result<(), SignalingError> {
        let registry = self.registry.read().await;
        let sender = sender_identity(&registry, connection)?;
        let registered_appointment = registered_appointment(&registry, &sender, appointment_id);

        let target = registry
            .peers_of(&sender)
            .into_iter()
            .find(|peer| peer.connection.is_open())
            .ok_or_else(|| SignalingError::NoPeerAvailable {
                appointment_id: registered_appointment,
            })?;

        deliver(
            &target.connection,
            ServerMessage::CallOffer {
                offer,
                from: sender.clone(),
            },
        );
        info!("Call offer sent from {} to {}", sender, target.identity);
        Ok(())
    }

    pub async fn forward_answer(
        &self,
        connection: &ConnectionHandle,
        answer: Box<RawValue>,
        to: &str,
    ) -> Result<(), SignalingError> {
        let registry = self.registry.read().await;
        let sender = sender_identity(&registry, connection)?;
        let target = routable_target(&registry, to)?;

        deliver(
            &target,
            ServerMessage::CallAnswer {
                answer,
                from: sender.clone(),
            },
        );
        info!("Call answer sent from {} to {}", sender, to);
        Ok(())
    }

    pub async fn forward_candidate(
        &self,
        connection: &ConnectionHandle,
        candidate: Box<RawValue>,
        to: &str,
    ) -> Result<(), SignalingError> {
        let registry = self.registry.read().await;
        let sender = sender_identity(&registry, connection)?;
        let target = routable_target(&registry, to)?;

        deliver(
            &target,
            ServerMessage::IceCandidate {
                candidate,
                from: sender.clone(),
            },
        );
        debug!("ICE candidate forwarded from {} to {}", sender, to);
        Ok(())
    }

    pub async fn end_call(
        &self,
        connection: &ConnectionHandle,
        appointment_id: Option<String>,
    ) -> Result<(), SignalingError> {
        let registry = self.registry.read().await;
        let sender = sender_identity(&registry, connection)?;
        let registered_appointment = registered_appointment(&registry, &sender, appointment_id);

        for peer in registry
            .peers_of(&sender)
            .iter()
            .filter(|peer| peer.connection.is_open())
        {
            deliver(
                &peer.connection,
                ServerMessage::CallEnded {
                    from: sender.clone(),
                },
            );
        }

        info!("Call ended by {} in appointment {}", sender, registered_appointment);
        Ok(())
    }

    /// Cleans up after a closed or failed connection.
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        let mut registry = self.registry.write().await;

        match registry.remove_connection(connection_id) {
            Some(departure) => {
                notify_departure(&departure);
                info!("User {} disconnected", departure.identity);
            }
            None => debug!("Unregistered connection {} closed", connection_id),
        }
    }

    pub async fn stats(&self) -> RelayStats {
        self.registry.read().await.stats()
    }

    pub async fn group_snapshot(&self, appointment_id: &str) -> Result<GroupSnapshot, SignalingError> {
        self.registry
            .read()
            .await
            .group_snapshot(appointment_id)
            .ok_or_else(|| SignalingError::GroupNotFound(appointment_id.to_string()))
    }

    fn report(&self, connection: &ConnectionHandle, error: SignalingError) {
        if error.notifies_sender() {
            warn!("Rejected message from connection {}: {}", connection.id(), error);
            deliver(connection, ServerMessage::error(error.to_string()));
        } else {
            info!("Dropped message from connection {}: {}", connection.id(), error);
        }
    }
}

impl Default for SignalingRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SignalingRelay {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

fn sender_identity(
    registry: &ParticipantRegistry,
    connection: &ConnectionHandle,
) -> Result<String, SignalingError> {
    registry
        .identity_for(connection.id())
        .map(str::to_string)
        .ok_or(SignalingError::NotRegistered)
}

/// Routing always uses the appointment the sender registered under.
fn registered_appointment(
    registry: &ParticipantRegistry,
    sender: &str,
    claimed: Option<String>,
) -> String {
    let registered = registry
        .participant(sender)
        .map(|participant| participant.appointment_id.clone())
        .unwrap_or_default();

    if let Some(claimed) = claimed {
        if claimed != registered {
            warn!(
                "User {} referenced appointment {} but is registered for {}",
                sender, claimed, registered
            );
        }
    }

    registered
}

fn routable_target(
    registry: &ParticipantRegistry,
    to: &str,
) -> Result<ConnectionHandle, SignalingError> {
    registry
        .route_to(to)
        .ok_or_else(|| SignalingError::TargetNotFound {
            identity: to.to_string(),
        })
}

fn notify_departure(departure: &Departure) {
    for peer in departure
        .remaining_peers
        .iter()
        .filter(|peer| peer.connection.is_open())
    {
        deliver(
            &peer.connection,
            ServerMessage::UserDisconnected {
                user_id: departure.identity.clone(),
            },
        );
    }
}

fn deliver(connection: &ConnectionHandle, message: ServerMessage) {
    let kind = message.kind();
    match connection.send(message) {
        Ok(()) => {}
        Err(e @ SignalingError::OutboundFull(_)) => warn!("Failed to deliver {}: {}", kind, e),
        Err(e) => debug!("Failed to deliver {}: {}", kind, e),
    }
}
