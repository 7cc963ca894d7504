//! Peer-to-peer file transfer over an already-open message channel.
//!
//! One metadata frame, raw binary chunks, then a `complete` / `complete-ack`
//! handshake. The sender applies high/low water mark backpressure against the
//! channel's buffered amount. The receiver treats a full byte count as
//! authoritative when the channel goes away before `complete` arrives.

mod channel;
mod error;
mod memory;
mod receiver;
mod sender;
mod types;

pub use channel::PeerChannel;
pub use error::{TransferError, TransferResult};
pub use memory::MemoryChannel;
pub use receiver::ReceiverSession;
pub use sender::SenderSession;
pub use types::{
    ChannelMessage, CompletionKind, ControlFrame, PeerPresence, ReceivedFile, ReceiverState,
    SendReport, SenderState, TransferMetadata,
};
