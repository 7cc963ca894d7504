//! Process-wide room registry.
//!
//! Each share id maps to at most one room holding at most one sender and one
//! receiver. Every operation goes through the `DashMap` entry API, so all
//! mutations of a given room are serialized by its shard lock while unrelated
//! rooms proceed independently. Notifications are pushed onto unbounded
//! per-connection queues and never block while the lock is held.

use crate::metrics;
use crate::signaling::error::{SignalingError, SignalingResult};
use crate::signaling::types::{ConnId, PeerHandle, Role, ServerMessage, SessionTag};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

struct Room {
    sender: Option<PeerHandle>,
    receiver: Option<PeerHandle>,
    created_at: DateTime<Utc>,
}

impl Room {
    fn with_sender(sender: PeerHandle) -> Self {
        Self {
            sender: Some(sender),
            receiver: None,
            created_at: Utc::now(),
        }
    }

    fn is_empty(&self) -> bool {
        self.sender.is_none() && self.receiver.is_none()
    }

    fn occupant(&self, role: Role) -> Option<&PeerHandle> {
        match role {
            Role::Sender => self.sender.as_ref(),
            Role::Receiver => self.receiver.as_ref(),
        }
    }
}

/// Point-in-time view of a room, for inspection and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub sender: Option<ConnId>,
    pub receiver: Option<ConnId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<String, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the sender slot of `share_id`, creating the room if needed.
    ///
    /// On success `conn` receives `created`, followed by `receiver-joined`
    /// when a receiver is already waiting.
    pub fn create(&self, share_id: &str, conn: &PeerHandle) -> SignalingResult<()> {
        match self.rooms.entry(share_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let room = entry.get_mut();
                if room.sender.is_some() {
                    return Err(SignalingError::AlreadyExists);
                }
                room.sender = Some(conn.clone());
                conn.deliver(ServerMessage::Created {
                    share_id: share_id.to_string(),
                });
                if room.receiver.is_some() {
                    conn.deliver(ServerMessage::ReceiverJoined {
                        share_id: share_id.to_string(),
                    });
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Room::with_sender(conn.clone()));
                metrics::record_room_created();
                conn.deliver(ServerMessage::Created {
                    share_id: share_id.to_string(),
                });
            }
        }

        tracing::info!(share_id, conn = %conn.id(), "sender registered");
        Ok(())
    }

    /// Claim the receiver slot of an existing room.
    ///
    /// On success the sender is told `receiver-joined` and `conn` receives
    /// `joined` then `sender-ready`.
    pub fn join(&self, share_id: &str, conn: &PeerHandle) -> SignalingResult<()> {
        let mut room = self
            .rooms
            .get_mut(share_id)
            .ok_or(SignalingError::NotFound)?;

        let sender = room.sender.clone().ok_or(SignalingError::NotFound)?;
        if room.receiver.is_some() {
            return Err(SignalingError::AlreadyFull);
        }
        room.receiver = Some(conn.clone());

        conn.deliver(ServerMessage::Joined {
            share_id: share_id.to_string(),
        });
        sender.deliver(ServerMessage::ReceiverJoined {
            share_id: share_id.to_string(),
        });
        conn.deliver(ServerMessage::SenderReady {
            share_id: share_id.to_string(),
        });

        tracing::info!(share_id, conn = %conn.id(), "receiver joined");
        Ok(())
    }

    /// Deliver `message` to whoever holds `target` in `share_id`.
    ///
    /// The payload is not inspected, and the caller is trusted to have picked
    /// a sensible target.
    pub fn forward(
        &self,
        share_id: &str,
        target: Role,
        message: ServerMessage,
    ) -> SignalingResult<()> {
        let room = self.rooms.get(share_id).ok_or(SignalingError::NotConnected)?;
        let occupant = room.occupant(target).ok_or(SignalingError::NotConnected)?;
        occupant.deliver(message);
        Ok(())
    }

    /// Tear the room down, telling every occupant other than `by` that the
    /// share was cancelled. No-op for unknown rooms.
    pub fn cancel(&self, share_id: &str, by: ConnId) {
        let Some((_, room)) = self.rooms.remove(share_id) else {
            tracing::debug!(share_id, "cancel for unknown share");
            return;
        };
        metrics::record_room_removed(room.created_at);

        for occupant in [room.sender, room.receiver].into_iter().flatten() {
            if occupant.id() != by {
                occupant.deliver(ServerMessage::ShareCancelled {
                    share_id: share_id.to_string(),
                });
            }
        }

        tracing::info!(share_id, conn = %by, "share cancelled");
    }

    /// Release the slot `tag` describes if `conn` still holds it.
    ///
    /// Losing the sender also evicts and closes the receiver, since a room
    /// without a sender can never complete. Losing the receiver leaves the
    /// sender waiting for a new one. Empty rooms are removed.
    pub fn disconnect(&self, tag: &SessionTag, conn: ConnId) {
        let Entry::Occupied(mut entry) = self.rooms.entry(tag.share_id.clone()) else {
            return;
        };

        let room = entry.get_mut();
        let holds_slot = room.occupant(tag.role).map(PeerHandle::id) == Some(conn);
        if !holds_slot {
            return;
        }

        match tag.role {
            Role::Sender => {
                room.sender = None;
                if let Some(receiver) = room.receiver.take() {
                    receiver.deliver(ServerMessage::PeerDisconnected {
                        role: Role::Sender,
                        share_id: tag.share_id.clone(),
                    });
                    receiver.close();
                }
            }
            Role::Receiver => {
                room.receiver = None;
                if let Some(sender) = &room.sender {
                    sender.deliver(ServerMessage::PeerDisconnected {
                        role: Role::Receiver,
                        share_id: tag.share_id.clone(),
                    });
                }
            }
        }
        metrics::record_peer_disconnected(tag.role);
        tracing::info!(share_id = %tag.share_id, role = %tag.role, conn = %conn, "peer left room");

        if entry.get().is_empty() {
            let room = entry.remove();
            metrics::record_room_removed(room.created_at);
            tracing::debug!(share_id = %tag.share_id, "room removed");
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn snapshot(&self, share_id: &str) -> Option<RoomSnapshot> {
        self.rooms.get(share_id).map(|room| RoomSnapshot {
            sender: room.sender.as_ref().map(PeerHandle::id),
            receiver: room.receiver.as_ref().map(PeerHandle::id),
            created_at: room.created_at,
        })
    }
}
