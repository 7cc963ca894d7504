use crate::config::ConfigError;
use crate::transfer::types::PeerPresence;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Channel not open")]
    ChannelNotOpen,

    #[error("Channel closed")]
    ChannelClosed,

    #[error("No completion acknowledgment within {0:?}")]
    AckTimeout(Duration),

    #[error("Remote peer gone: {0:?}")]
    PeerGone(PeerPresence),

    #[error("Size mismatch: declared {expected} bytes, received {received}")]
    SizeMismatch { expected: u64, received: u64 },

    #[error("Source ended after {read} of {expected} bytes")]
    SourceTruncated { expected: u64, read: u64 },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid transfer config: {0}")]
    Config(#[from] ConfigError),
}

impl TransferError {
    /// Short label for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            TransferError::ChannelNotOpen => "channel_not_open",
            TransferError::ChannelClosed => "channel_closed",
            TransferError::AckTimeout(_) => "ack_timeout",
            TransferError::PeerGone(_) => "peer_gone",
            TransferError::SizeMismatch { .. } => "size_mismatch",
            TransferError::SourceTruncated { .. } => "source_truncated",
            TransferError::Protocol(_) => "protocol",
            TransferError::Io(_) => "io",
            TransferError::Serialization(_) => "serialization",
            TransferError::Config(_) => "config",
        }
    }
}

pub type TransferResult<T> = Result<T, TransferError>;
