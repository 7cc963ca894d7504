//! Per-connection signaling session.
//!
//! Parses client messages, dispatches them to the room registry and owns the
//! connection's `SessionTag` once a create or join succeeds.

use crate::metrics;
use crate::signaling::error::{SignalingError, SignalingResult};
use crate::signaling::registry::RoomRegistry;
use crate::signaling::types::{ClientMessage, PeerHandle, Role, ServerMessage, SessionTag};
use std::sync::Arc;

pub struct SignalingSession {
    conn: PeerHandle,
    registry: Arc<RoomRegistry>,
    tag: Option<SessionTag>,
}

impl SignalingSession {
    pub fn new(conn: PeerHandle, registry: Arc<RoomRegistry>) -> Self {
        Self {
            conn,
            registry,
            tag: None,
        }
    }

    pub fn tag(&self) -> Option<&SessionTag> {
        self.tag.as_ref()
    }

    pub fn conn(&self) -> &PeerHandle {
        &self.conn
    }

    /// Handle one raw text frame. Any failure is reported to this connection
    /// only; the connection stays open.
    pub fn handle_text(&mut self, text: &str) {
        let result = serde_json::from_str::<ClientMessage>(text)
            .map_err(|e| {
                tracing::debug!(conn = %self.conn.id(), "malformed signaling message: {}", e);
                SignalingError::InvalidMessage
            })
            .and_then(|message| self.handle_message(message));

        if let Err(e) = result {
            self.reply_error(&e);
        }
    }

    pub fn handle_message(&mut self, message: ClientMessage) -> SignalingResult<()> {
        let kind = message.kind();
        tracing::trace!(conn = %self.conn.id(), kind, "signaling message");

        match message {
            ClientMessage::Create { share_id } => {
                self.bind(share_id, Role::Sender)
            }
            ClientMessage::Join { share_id } => {
                self.bind(share_id, Role::Receiver)
            }
            ClientMessage::Offer { share_id, sdp } => {
                let relayed = ServerMessage::Offer {
                    share_id: share_id.clone(),
                    sdp,
                };
                self.relay(kind, &share_id, Role::Receiver, relayed)
            }
            ClientMessage::Answer { share_id, sdp } => {
                let relayed = ServerMessage::Answer {
                    share_id: share_id.clone(),
                    sdp,
                };
                self.relay(kind, &share_id, Role::Sender, relayed)
            }
            ClientMessage::IceCandidate {
                share_id,
                candidate,
            } => {
                // Candidates flow to the opposite side of whoever sent them
                let target = self
                    .tag
                    .as_ref()
                    .map(|tag| tag.role.opposite())
                    .ok_or(SignalingError::NotConnected)?;
                let relayed = ServerMessage::IceCandidate {
                    share_id: share_id.clone(),
                    candidate,
                };
                self.relay(kind, &share_id, target, relayed)
            }
            ClientMessage::Cancel { share_id } => {
                self.registry.cancel(&share_id, self.conn.id());
                Ok(())
            }
        }
    }

    /// Signaling is text-only; a binary frame gets the same reply as a
    /// malformed message.
    pub fn handle_binary(&self, len: usize) {
        tracing::debug!(conn = %self.conn.id(), len, "binary frame on signaling connection");
        self.reply_error(&SignalingError::InvalidMessage);
    }

    /// Connection closed or failed: release whatever slot this session holds
    pub fn close(self) {
        match &self.tag {
            Some(tag) => self.registry.disconnect(tag, self.conn.id()),
            None => tracing::debug!(conn = %self.conn.id(), "untagged connection closed"),
        }
    }

    fn bind(&mut self, share_id: String, role: Role) -> SignalingResult<()> {
        if share_id.trim().is_empty() {
            return Err(SignalingError::MissingShareId);
        }
        if let Some(tag) = &self.tag {
            return Err(SignalingError::AlreadyBound(tag.share_id.clone()));
        }

        match role {
            Role::Sender => self.registry.create(&share_id, &self.conn)?,
            Role::Receiver => self.registry.join(&share_id, &self.conn)?,
        }
        self.tag = Some(SessionTag { role, share_id });
        Ok(())
    }

    fn relay(
        &self,
        kind: &'static str,
        share_id: &str,
        target: Role,
        message: ServerMessage,
    ) -> SignalingResult<()> {
        self.registry.forward(share_id, target, message)?;
        metrics::record_message_relayed(kind);
        Ok(())
    }

    fn reply_error(&self, error: &SignalingError) {
        metrics::record_signaling_error(error.code());
        tracing::debug!(conn = %self.conn.id(), "signaling error: {}", error);
        self.conn.deliver(ServerMessage::error(error.to_string()));
    }
}
