use thiserror::Error;

/// Errors reported back to the offending signaling connection.
///
/// The Display text is what the client sees in the `error` reply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalingError {
    #[error("Invalid message")]
    InvalidMessage,

    #[error("Missing shareId")]
    MissingShareId,

    #[error("Connection already bound to share {0}")]
    AlreadyBound(String),

    #[error("Share already exists")]
    AlreadyExists,

    #[error("Share not found")]
    NotFound,

    #[error("Share is full")]
    AlreadyFull,

    #[error("Peer not connected")]
    NotConnected,
}

impl SignalingError {
    pub fn code(&self) -> &'static str {
        match self {
            SignalingError::InvalidMessage
            | SignalingError::MissingShareId
            | SignalingError::AlreadyBound(_) => "protocol",
            SignalingError::AlreadyExists
            | SignalingError::NotFound
            | SignalingError::AlreadyFull => "pairing",
            SignalingError::NotConnected => "relay",
        }
    }
}

pub type SignalingResult<T> = Result<T, SignalingError>;
