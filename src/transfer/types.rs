use crate::signaling::ServerMessage;
use crate::transfer::error::TransferResult;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Declared once per transfer, before any chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMetadata {
    pub name: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
}

impl TransferMetadata {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            mime: None,
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }
}

/// Text-encoded control frames exchanged over the peer channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlFrame {
    Metadata(TransferMetadata),
    Complete,
    CompleteAck,
}

impl ControlFrame {
    pub fn encode(&self) -> TransferResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> TransferResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// One message as delivered by the peer channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMessage {
    Text(String),
    Binary(Bytes),
}

impl ChannelMessage {
    pub fn len(&self) -> usize {
        match self {
            ChannelMessage::Text(text) => text.len(),
            ChannelMessage::Binary(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What the local coordinator connection reports about the remote peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerPresence {
    Present,
    /// The coordinator sent `peer-disconnected`
    Disconnected,
    /// The coordinator sent `share-cancelled`
    Cancelled,
}

impl PeerPresence {
    /// Map a coordinator message onto the presence feed. Only the two
    /// departure notices change presence.
    pub fn from_server_message(message: &ServerMessage) -> Option<PeerPresence> {
        match message {
            ServerMessage::PeerDisconnected { .. } => Some(PeerPresence::Disconnected),
            ServerMessage::ShareCancelled { .. } => Some(PeerPresence::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Idle,
    MetadataSent,
    Streaming,
    AllChunksSent,
    AwaitingAck,
    Acked,
    TimedOut,
    ChannelClosed,
    Failed,
}

impl SenderState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SenderState::Acked
                | SenderState::TimedOut
                | SenderState::ChannelClosed
                | SenderState::Failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    AwaitingMetadata,
    Receiving,
    CompletionSeen,
    InferredComplete,
    Acknowledged,
    Failed,
}

/// How the receiver learned the transfer was complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionKind {
    /// A `complete` frame arrived
    Explicit,
    /// The channel or the peer went away after exactly `size` bytes arrived
    Inferred,
}

#[derive(Debug, Clone)]
pub struct SendReport {
    pub bytes_sent: u64,
    pub chunks_sent: u64,
    pub backpressure_pauses: u64,
    pub elapsed: Duration,
}

/// The assembled artifact handed to the receiving application
#[derive(Debug, Clone)]
pub struct ReceivedFile {
    pub metadata: TransferMetadata,
    pub data: Bytes,
    /// BLAKE3 digest of `data`, hex encoded
    pub checksum: String,
    pub completion: CompletionKind,
    /// Whether `complete-ack` was flushed before the channel went away
    pub ack_delivered: bool,
}

impl ReceivedFile {
    /// Write the artifact into `dir`, using only the final component of the
    /// declared name.
    pub async fn save_into(&self, dir: &Path) -> TransferResult<PathBuf> {
        let file_name = Path::new(&self.metadata.name)
            .file_name()
            .filter(|name| !name.is_empty())
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "download".into());

        let path = dir.join(file_name);
        tokio::fs::write(&path, &self.data).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_presence_from_server_message() {
        use crate::signaling::Role;

        let disconnected = ServerMessage::PeerDisconnected {
            role: Role::Receiver,
            share_id: "s1".into(),
        };
        let cancelled = ServerMessage::ShareCancelled {
            share_id: "s1".into(),
        };
        let error = ServerMessage::Error {
            message: "nope".into(),
        };

        assert_eq!(
            PeerPresence::from_server_message(&disconnected),
            Some(PeerPresence::Disconnected)
        );
        assert_eq!(
            PeerPresence::from_server_message(&cancelled),
            Some(PeerPresence::Cancelled)
        );
        assert_eq!(PeerPresence::from_server_message(&error), None);
    }

    #[test]
    fn test_control_frame_wire_format() {
        let metadata =
            ControlFrame::Metadata(TransferMetadata::new("a.txt", 12).with_mime("text/plain"));
        assert_eq!(
            serde_json::to_value(&metadata).unwrap(),
            json!({"type": "metadata", "name": "a.txt", "size": 12, "mime": "text/plain"})
        );
        assert_eq!(ControlFrame::Complete.encode().unwrap(), r#"{"type":"complete"}"#);
        assert_eq!(
            ControlFrame::CompleteAck.encode().unwrap(),
            r#"{"type":"complete-ack"}"#
        );
    }

    #[test]
    fn test_metadata_without_mime() {
        let frame = ControlFrame::decode(r#"{"type":"metadata","name":"b.bin","size":0}"#).unwrap();
        assert_eq!(frame, ControlFrame::Metadata(TransferMetadata::new("b.bin", 0)));

        let text = frame.encode().unwrap();
        assert!(!text.contains("mime"));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(ControlFrame::decode("{}").is_err());
        assert!(ControlFrame::decode(r#"{"type":"resume"}"#).is_err());
    }

    #[tokio::test]
    async fn test_save_into_strips_directories() {
        let dir = tempfile::tempdir().unwrap();
        let file = ReceivedFile {
            metadata: TransferMetadata::new("../../etc/passwd", 5),
            data: Bytes::from_static(b"hello"),
            checksum: blake3::hash(b"hello").to_hex().to_string(),
            completion: CompletionKind::Explicit,
            ack_delivered: true,
        };

        let path = file.save_into(dir.path()).await.unwrap();
        assert_eq!(path, dir.path().join("passwd"));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_save_into_fallback_name() {
        let dir = tempfile::tempdir().unwrap();
        let file = ReceivedFile {
            metadata: TransferMetadata::new("..", 1),
            data: Bytes::from_static(b"x"),
            checksum: String::new(),
            completion: CompletionKind::Inferred,
            ack_delivered: false,
        };

        let path = file.save_into(dir.path()).await.unwrap();
        assert_eq!(path, dir.path().join("download"));
    }
}
