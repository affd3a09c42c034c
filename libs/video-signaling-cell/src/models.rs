// libs/video-signaling-cell/src/models.rs
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::error::SignalingError;

// ==============================================================================
// PARTICIPANT DOMAIN MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ParticipantRole {
    #[serde(rename = "doctor")]
    Doctor,
    #[serde(rename = "patient")]
    Patient,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantRole::Doctor => "doctor",
            ParticipantRole::Patient => "patient",
        }
    }
}

impl fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ParticipantRole {
    type Err = SignalingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "doctor" => Ok(ParticipantRole::Doctor),
            "patient" => Ok(ParticipantRole::Patient),
            other => Err(SignalingError::InvalidRole(other.to_string())),
        }
    }
}

/// Relay-assigned identifier of one accepted socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Messages a connection may have queued before it counts as stalled.
pub const OUTBOUND_CAPACITY: usize = 256;

pub type OutboundSender = mpsc::Sender<ServerMessage>;
pub type OutboundReceiver = mpsc::Receiver<ServerMessage>;

/// Push side of a participant's socket. The socket task owns the receiver;
/// once it exits the handle reports closed. A push onto a full queue flags
/// the connection as overflowed so its socket task can drop it.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: OutboundSender,
    overflow: Arc<Notify>,
}

impl ConnectionHandle {
    pub fn channel() -> (Self, OutboundReceiver) {
        Self::with_capacity(OUTBOUND_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, OutboundReceiver) {
        let (sender, receiver) = mpsc::channel(capacity);
        (
            Self {
                id: ConnectionId::new(),
                sender,
                overflow: Arc::new(Notify::new()),
            },
            receiver,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    pub fn send(&self, message: ServerMessage) -> Result<(), SignalingError> {
        self.sender.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => {
                self.overflow.notify_one();
                SignalingError::OutboundFull(self.id)
            }
            TrySendError::Closed(_) => SignalingError::ConnectionClosed(self.id),
        })
    }

    /// Resolves once a send has hit a full queue.
    pub async fn overflowed(&self) {
        self.overflow.notified().await
    }
}

/// Validated contents of a `register` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub identity: String,
    pub role: ParticipantRole,
    pub appointment_id: String,
}

#[derive(Debug, Clone)]
pub struct Participant {
    pub identity: String,
    pub role: ParticipantRole,
    pub appointment_id: String,
    pub connection: ConnectionHandle,
    pub registered_at: DateTime<Utc>,
}

impl Participant {
    pub fn summary(&self) -> PeerSummary {
        PeerSummary {
            id: self.identity.clone(),
            role: self.role,
        }
    }
}

/// Participants sharing one appointment. Members are kept in join order so
/// implicit routing picks the longest-present peer.
#[derive(Debug, Clone)]
pub struct RendezvousGroup {
    pub members: Vec<String>,
    pub role_slots: HashMap<ParticipantRole, String>,
    pub created_at: DateTime<Utc>,
}

impl RendezvousGroup {
    pub fn new() -> Self {
        Self {
            members: Vec::new(),
            role_slots: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Default for RendezvousGroup {
    fn default() -> Self {
        Self::new()
    }
}

// ==============================================================================
// WIRE MESSAGES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSummary {
    pub id: String,
    pub role: ParticipantRole,
}

/// Messages sent by the relay. Opaque session payloads are re-emitted as the
/// exact JSON text the sender supplied.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    UserRegistered {
        user_id: String,
        role: ParticipantRole,
    },
    UserJoined {
        users: Vec<PeerSummary>,
    },
    CallOffer {
        offer: Box<RawValue>,
        from: String,
    },
    CallAnswer {
        answer: Box<RawValue>,
        from: String,
    },
    IceCandidate {
        candidate: Box<RawValue>,
        from: String,
    },
    CallEnded {
        from: String,
    },
    UserDisconnected {
        user_id: String,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::UserRegistered { .. } => "user-registered",
            ServerMessage::UserJoined { .. } => "user-joined",
            ServerMessage::CallOffer { .. } => "call-offer",
            ServerMessage::CallAnswer { .. } => "call-answer",
            ServerMessage::IceCandidate { .. } => "ice-candidate",
            ServerMessage::CallEnded { .. } => "call-ended",
            ServerMessage::UserDisconnected { .. } => "user-disconnected",
            ServerMessage::Error { .. } => "error",
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, SignalingError> {
        serde_json::to_string(self).map_err(SignalingError::Serialization)
    }
}

/// Messages accepted from clients.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    Register(Registration),
    CallOffer {
        offer: Box<RawValue>,
        appointment_id: Option<String>,
    },
    CallAnswer {
        answer: Box<RawValue>,
        to: String,
    },
    IceCandidate {
        candidate: Box<RawValue>,
        to: String,
    },
    CallEnded {
        appointment_id: Option<String>,
    },
    Unknown(String),
}

#[derive(Deserialize)]
struct TypeProbe {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterFrame {
    #[serde(alias = "identity", deserialize_with = "opaque_key")]
    user_id: String,
    role: String,
    #[serde(alias = "rendezvousKey", deserialize_with = "opaque_key")]
    appointment_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OfferFrame {
    offer: Box<RawValue>,
    #[serde(default, alias = "rendezvousKey", deserialize_with = "optional_opaque_key")]
    appointment_id: Option<String>,
}

#[derive(Deserialize)]
struct AnswerFrame {
    answer: Box<RawValue>,
    #[serde(deserialize_with = "opaque_key")]
    to: String,
}

#[derive(Deserialize)]
struct CandidateFrame {
    candidate: Box<RawValue>,
    #[serde(deserialize_with = "opaque_key")]
    to: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallEndedFrame {
    #[serde(default, alias = "rendezvousKey", deserialize_with = "optional_opaque_key")]
    appointment_id: Option<String>,
}

/// Identities and appointment keys are opaque; clients may send them as
/// JSON strings or numbers. Numbers are keyed by their decimal text, so
/// `999` and `"999"` name the same appointment.
fn opaque_key<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(key) => Ok(key),
        Value::Number(key) => Ok(key.to_string()),
        other => Err(de::Error::invalid_type(
            unexpected(&other),
            &"a string or number",
        )),
    }
}

fn optional_opaque_key<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(key) => Ok(Some(key)),
        Value::Number(key) => Ok(Some(key.to_string())),
        other => Err(de::Error::invalid_type(
            unexpected(&other),
            &"a string, number or null",
        )),
    }
}

fn unexpected(value: &Value) -> de::Unexpected<'_> {
    match value {
        Value::Null => de::Unexpected::Unit,
        Value::Bool(b) => de::Unexpected::Bool(*b),
        Value::Number(_) => de::Unexpected::Other("number"),
        Value::String(s) => de::Unexpected::Str(s),
        Value::Array(_) => de::Unexpected::Seq,
        Value::Object(_) => de::Unexpected::Map,
    }
}

impl ClientMessage {
    /// Parses one text frame. Each known type is decoded straight from the
    /// frame text so opaque payloads keep their original bytes.
    pub fn parse(text: &str) -> Result<Self, SignalingError> {
        let probe: TypeProbe = serde_json::from_str(text)?;

        let message = match probe.kind.as_str() {
            "register" => {
                let frame: RegisterFrame = serde_json::from_str(text)?;
                ClientMessage::Register(Registration {
                    identity: non_empty("userId", frame.user_id)?,
                    role: frame.role.parse()?,
                    appointment_id: non_empty("appointmentId", frame.appointment_id)?,
                })
            }
            "call-offer" => {
                let frame: OfferFrame = serde_json::from_str(text)?;
                ClientMessage::CallOffer {
                    offer: frame.offer,
                    appointment_id: frame.appointment_id,
                }
            }
            "call-answer" => {
                let frame: AnswerFrame = serde_json::from_str(text)?;
                ClientMessage::CallAnswer {
                    answer: frame.answer,
                    to: non_empty("to", frame.to)?,
                }
            }
            "ice-candidate" => {
                let frame: CandidateFrame = serde_json::from_str(text)?;
                ClientMessage::IceCandidate {
                    candidate: frame.candidate,
                    to: non_empty("to", frame.to)?,
                }
            }
            "call-ended" => {
                let frame: CallEndedFrame = serde_json::from_str(text)?;
                ClientMessage::CallEnded {
                    appointment_id: frame.appointment_id,
                }
            }
            _ => ClientMessage::Unknown(probe.kind),
        };

        Ok(message)
    }

    pub fn kind(&self) -> &str {
        match self {
            ClientMessage::Register(_) => "register",
            ClientMessage::CallOffer { .. } => "call-offer",
            ClientMessage::CallAnswer { .. } => "call-answer",
            ClientMessage::IceCandidate { .. } => "ice-candidate",
            ClientMessage::CallEnded { .. } => "call-ended",
            ClientMessage::Unknown(kind) => kind,
        }
    }
}

fn non_empty(field: &'static str, value: String) -> Result<String, SignalingError> {
    if value.trim().is_empty() {
        Err(SignalingError::MissingField(field))
    } else {
        Ok(value)
    }
}

// ==============================================================================
// OPERATIONAL VIEWS
// ==============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    pub participants: usize,
    pub rendezvous_groups: usize,
    pub connections: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMemberSnapshot {
    pub id: String,
    pub role: ParticipantRole,
    pub registered_at: DateTime<Utc>,
    pub connected: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSnapshot {
    pub appointment_id: String,
    pub members: Vec<GroupMemberSnapshot>,
    pub role_slots: HashMap<ParticipantRole, String>,
    pub created_at: DateTime<Utc>,
}
