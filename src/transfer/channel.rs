//! Boundary to the external peer transport.
//!
//! Whatever negotiated the connection (ICE/DTLS/SCTP or anything else) only
//! has to expose a reliable, ordered message channel with a queryable count
//! of bytes accepted for sending but not yet handed to the network.

use crate::transfer::error::TransferResult;
use crate::transfer::types::{ChannelMessage, PeerPresence};
use bytes::Bytes;
use std::future::Future;
use tokio::sync::watch;

pub trait PeerChannel: Send + Sync {
    fn is_open(&self) -> bool;

    /// Queue a text frame. Fails with `ChannelClosed` once the channel is gone.
    fn send_text(&self, text: String) -> impl Future<Output = TransferResult<()>> + Send;

    /// Queue a binary frame. Fails with `ChannelClosed` once the channel is gone.
    fn send_binary(&self, data: Bytes) -> impl Future<Output = TransferResult<()>> + Send;

    /// Bytes queued locally and not yet sent
    fn buffered_amount(&self) -> usize;

    /// Resolves once `buffered_amount() <= threshold`
    fn wait_buffered_at_most(&self, threshold: usize) -> impl Future<Output = ()> + Send;

    /// Resolves once the channel has closed
    fn closed(&self) -> impl Future<Output = ()> + Send;

    /// Next inbound message, or `None` once the channel is closed and drained
    fn recv(&self) -> impl Future<Output = Option<ChannelMessage>> + Send;
}

/// Resolves with the new presence once the peer is reported gone.
///
/// Never resolves without a presence feed, or after the feed is dropped.
pub(crate) async fn presence_lost(
    presence: &mut Option<watch::Receiver<PeerPresence>>,
) -> PeerPresence {
    if let Some(rx) = presence {
        loop {
            let current = *rx.borrow_and_update();
            if current != PeerPresence::Present {
                return current;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
    std::future::pending().await
}
