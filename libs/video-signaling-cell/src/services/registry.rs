// libs/video-signaling-cell/src/services/registry.rs
use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, info};

use crate::models::{
    ConnectionHandle, ConnectionId, GroupMemberSnapshot, GroupSnapshot, Participant,
    ParticipantRole, PeerSummary, Registration, RelayStats, RendezvousGroup,
};

/// Where to deliver a message for one registered participant.
#[derive(Debug, Clone)]
pub struct PeerRoute {
    pub identity: String,
    pub role: ParticipantRole,
    pub connection: ConnectionHandle,
}

impl PeerRoute {
    pub fn summary(&self) -> PeerSummary {
        PeerSummary {
            id: self.identity.clone(),
            role: self.role,
        }
    }
}

impl From<&Participant> for PeerRoute {
    fn from(participant: &Participant) -> Self {
        Self {
            identity: participant.identity.clone(),
            role: participant.role,
            connection: participant.connection.clone(),
        }
    }
}

/// A participant that left a rendezvous group, with the peers still in it.
#[derive(Debug)]
pub struct Departure {
    pub identity: String,
    pub appointment_id: String,
    pub remaining_peers: Vec<PeerRoute>,
}

#[derive(Debug)]
pub struct RegistrationOutcome {
    /// Other members of the group, in join order.
    pub peers: Vec<PeerRoute>,
    /// Identities that left a group as a side effect of this registration.
    pub departures: Vec<Departure>,
    /// Connection previously bound to this identity, if it was a different one.
    pub replaced_connection: Option<ConnectionId>,
    /// Identity that held the same role slot before this registration.
    pub displaced: Option<String>,
}

/// Participant and rendezvous-group bookkeeping. All three maps are kept
/// consistent by the operations below; callers serialize access.
#[derive(Debug, Default)]
pub struct ParticipantRegistry {
    participants: HashMap<String, Participant>,
    groups: HashMap<String, RendezvousGroup>,
    connections: HashMap<ConnectionId, String>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        registration: Registration,
        connection: ConnectionHandle,
    ) -> RegistrationOutcome {
        let Registration {
            identity,
            role,
            appointment_id,
        } = registration;
        let mut departures = Vec::new();

        // A connection carries one identity at a time.
        let previous_identity = self
            .connections
            .get(&connection.id())
            .filter(|previous| **previous != identity)
            .cloned();
        if let Some(previous_identity) = previous_identity {
            if let Some(departure) = self.detach(&previous_identity) {
                departures.push(departure);
            }
        }

        let mut replaced_connection = None;
        let existing = self
            .participants
            .get(&identity)
            .map(|p| (p.connection.id(), p.appointment_id.clone()));
        if let Some((old_connection, old_appointment)) = existing {
            if old_connection != connection.id() {
                self.connections.remove(&old_connection);
                replaced_connection = Some(old_connection);
            }
            if old_appointment != appointment_id {
                let remaining_peers = self.leave_group(&old_appointment, &identity);
                departures.push(Departure {
                    identity: identity.clone(),
                    appointment_id: old_appointment,
                    remaining_peers,
                });
            }
        }

        self.participants.insert(
            identity.clone(),
            Participant {
                identity: identity.clone(),
                role,
                appointment_id: appointment_id.clone(),
                connection: connection.clone(),
                registered_at: Utc::now(),
            },
        );
        self.connections.insert(connection.id(), identity.clone());

        let group = self.groups.entry(appointment_id.clone()).or_insert_with(|| {
            info!("Created rendezvous group for appointment {}", appointment_id);
            RendezvousGroup::new()
        });
        if !group.members.contains(&identity) {
            group.members.push(identity.clone());
        }
        group.role_slots.retain(|_, holder| *holder != identity);
        let displaced = group.role_slots.insert(role, identity.clone());

        RegistrationOutcome {
            peers: self.peers_of(&identity),
            departures,
            replaced_connection,
            displaced,
        }
    }

    pub fn identity_for(&self, connection_id: ConnectionId) -> Option<&str> {
        self.connections.get(&connection_id).map(String::as_str)
    }

    pub fn participant(&self, identity: &str) -> Option<&Participant> {
        self.participants.get(identity)
    }

    /// Other registered members of the identity's group, in join order.
    pub fn peers_of(&self, identity: &str) -> Vec<PeerRoute> {
        let Some(participant) = self.participants.get(identity) else {
            return Vec::new();
        };

        self.groups
            .get(&participant.appointment_id)
            .map(|group| {
                group
                    .members
                    .iter()
                    .filter(|member| member.as_str() != identity)
                    .filter_map(|member| self.participants.get(member))
                    .map(PeerRoute::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resolves an explicitly addressed target. A registered participant
    /// whose connection is no longer open counts as not found.
    pub fn route_to(&self, identity: &str) -> Option<ConnectionHandle> {
        self.participants
            .get(identity)
            .map(|participant| &participant.connection)
            .filter(|connection| connection.is_open())
            .cloned()
    }

    /// Drops whatever participant is bound to the connection. Connections
    /// whose identity has since re-registered elsewhere remove nothing.
    pub fn remove_connection(&mut self, connection_id: ConnectionId) -> Option<Departure> {
        let identity = self.connections.remove(&connection_id)?;
        self.detach(&identity)
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            participants: self.participants.len(),
            rendezvous_groups: self.groups.len(),
            connections: self.connections.len(),
        }
    }

    pub fn has_group(&self, appointment_id: &str) -> bool {
        self.groups.contains_key(appointment_id)
    }

    pub fn group_snapshot(&self, appointment_id: &str) -> Option<GroupSnapshot> {
        let group = self.groups.get(appointment_id)?;

        let members = group
            .members
            .iter()
            .filter_map(|member| self.participants.get(member))
            .map(|participant| GroupMemberSnapshot {
                id: participant.identity.clone(),
                role: participant.role,
                registered_at: participant.registered_at,
                connected: participant.connection.is_open(),
            })
            .collect();

        Some(GroupSnapshot {
            appointment_id: appointment_id.to_string(),
            members,
            role_slots: group.role_slots.clone(),
            created_at: group.created_at,
        })
    }

    fn detach(&mut self, identity: &str) -> Option<Departure> {
        let participant = self.participants.remove(identity)?;

        let connection_id = participant.connection.id();
        if self.identity_for(connection_id) == Some(identity) {
            self.connections.remove(&connection_id);
        }

        let remaining_peers = self.leave_group(&participant.appointment_id, identity);
        Some(Departure {
            identity: participant.identity,
            appointment_id: participant.appointment_id,
            remaining_peers,
        })
    }

    fn leave_group(&mut self, appointment_id: &str, identity: &str) -> Vec<PeerRoute> {
        let (now_empty, members) = match self.groups.get_mut(appointment_id) {
            Some(group) => {
                group.members.retain(|member| member.as_str() != identity);
                group.role_slots.retain(|_, holder| holder.as_str() != identity);
                (group.is_empty(), group.members.clone())
            }
            None => return Vec::new(),
        };

        if now_empty {
            self.groups.remove(appointment_id);
            debug!("Removed empty rendezvous group for appointment {}", appointment_id);
            return Vec::new();
        }

        members
            .iter()
            .filter_map(|member| self.participants.get(member))
            .map(PeerRoute::from)
            .collect()
    }
}
