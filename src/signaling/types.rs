use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Sender,
    Receiver,
}

impl Role {
    pub fn opposite(self) -> Role {
        match self {
            Role::Sender => Role::Receiver,
            Role::Receiver => Role::Sender,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Sender => "sender",
            Role::Receiver => "receiver",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Messages a client sends to the coordinator.
///
/// `sdp` and `candidate` are opaque to the coordinator and relayed as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Create {
        #[serde(default)]
        share_id: String,
    },
    Join {
        #[serde(default)]
        share_id: String,
    },
    Offer {
        #[serde(default)]
        share_id: String,
        #[serde(default)]
        sdp: serde_json::Value,
    },
    Answer {
        #[serde(default)]
        share_id: String,
        #[serde(default)]
        sdp: serde_json::Value,
    },
    IceCandidate {
        #[serde(default)]
        share_id: String,
        #[serde(default)]
        candidate: serde_json::Value,
    },
    Cancel {
        #[serde(default)]
        share_id: String,
    },
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Create { .. } => "create",
            ClientMessage::Join { .. } => "join",
            ClientMessage::Offer { .. } => "offer",
            ClientMessage::Answer { .. } => "answer",
            ClientMessage::IceCandidate { .. } => "ice-candidate",
            ClientMessage::Cancel { .. } => "cancel",
        }
    }
}

/// Messages the coordinator sends to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Created { share_id: String },
    Joined { share_id: String },
    ReceiverJoined { share_id: String },
    SenderReady { share_id: String },
    Offer { share_id: String, sdp: serde_json::Value },
    Answer { share_id: String, sdp: serde_json::Value },
    IceCandidate { share_id: String, candidate: serde_json::Value },
    PeerDisconnected { role: Role, share_id: String },
    ShareCancelled { share_id: String },
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

/// Item queued for a connection's writer task
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(ServerMessage),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(Uuid);

impl ConnId {
    pub fn new() -> Self {
        ConnId(Uuid::new_v4())
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Write side of one signaling connection.
///
/// Delivery is best-effort: once the writer task is gone, messages are
/// dropped silently.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    id: ConnId,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl PeerHandle {
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            id: ConnId::new(),
            tx,
        }
    }

    /// Handle plus the receiving end its writer task should drain
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn deliver(&self, message: ServerMessage) -> bool {
        match self.tx.send(Outbound::Message(message)) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(
                    conn = %self.id,
                    "dropping message for closed connection: {:?}",
                    e.0
                );
                false
            }
        }
    }

    /// Ask the writer task to close the connection
    pub fn close(&self) {
        if self.tx.send(Outbound::Close).is_err() {
            tracing::debug!(conn = %self.id, "connection already closed");
        }
    }
}

/// Role and share id bound to a connection after a successful create or join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTag {
    pub role: Role,
    pub share_id: String,
}

/// Mint a fresh share identifier
pub fn new_share_id() -> String {
    Uuid::new_v4().simple().to_string()
}
