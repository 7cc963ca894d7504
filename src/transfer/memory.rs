//! In-process peer channel.
//!
//! Two connected endpoints sharing one state block. A frame counts toward the
//! sender's buffered amount until the other side receives it, which makes the
//! flow-control behaviour observable without a network. The buffered amount
//! can also be pinned to simulate a stalled path.

use crate::transfer::channel::PeerChannel;
use crate::transfer::error::{TransferError, TransferResult};
use crate::transfer::types::ChannelMessage;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Default)]
struct Pipe {
    queue: VecDeque<ChannelMessage>,
    queued_bytes: usize,
    pinned: Option<usize>,
    frames_sent: usize,
}

struct Inner {
    open: bool,
    /// `pipes[i]` carries frames sent by endpoint `i`
    pipes: [Pipe; 2],
}

struct Shared {
    inner: Mutex<Inner>,
    changes: watch::Sender<u64>,
}

impl Shared {
    fn notify(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }
}

#[derive(Clone)]
pub struct MemoryChannel {
    shared: Arc<Shared>,
    side: usize,
}

impl MemoryChannel {
    /// Two open, connected endpoints
    pub fn pair() -> (MemoryChannel, MemoryChannel) {
        let (changes, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                open: true,
                pipes: [Pipe::default(), Pipe::default()],
            }),
            changes,
        });

        (
            MemoryChannel {
                shared: shared.clone(),
                side: 0,
            },
            MemoryChannel { shared, side: 1 },
        )
    }

    /// Close both endpoints. Frames already queued stay readable.
    pub fn close(&self) {
        self.shared.inner.lock().open = false;
        self.shared.notify();
    }

    /// Report a fixed buffered amount for this endpoint regardless of what is
    /// queued. `None` restores the real value.
    pub fn pin_buffered_amount(&self, amount: Option<usize>) {
        self.shared.inner.lock().pipes[self.side].pinned = amount;
        self.shared.notify();
    }

    /// Frames this endpoint has sent so far
    pub fn frames_sent(&self) -> usize {
        self.shared.inner.lock().pipes[self.side].frames_sent
    }

    fn push(&self, message: ChannelMessage) -> TransferResult<()> {
        {
            let mut inner = self.shared.inner.lock();
            if !inner.open {
                return Err(TransferError::ChannelClosed);
            }
            let pipe = &mut inner.pipes[self.side];
            pipe.queued_bytes += message.len();
            pipe.frames_sent += 1;
            pipe.queue.push_back(message);
        }
        self.shared.notify();
        Ok(())
    }

    /// Pop from the peer's pipe. `Err(())` once closed and empty.
    fn try_pop(&self) -> Result<Option<ChannelMessage>, ()> {
        let popped = {
            let mut inner = self.shared.inner.lock();
            let open = inner.open;
            let pipe = &mut inner.pipes[1 - self.side];
            match pipe.queue.pop_front() {
                Some(message) => {
                    pipe.queued_bytes -= message.len();
                    Some(message)
                }
                None if !open => return Err(()),
                None => None,
            }
        };
        if popped.is_some() {
            self.shared.notify();
        }
        Ok(popped)
    }
}

impl PeerChannel for MemoryChannel {
    fn is_open(&self) -> bool {
        self.shared.inner.lock().open
    }

    async fn send_text(&self, text: String) -> TransferResult<()> {
        self.push(ChannelMessage::Text(text))
    }

    async fn send_binary(&self, data: Bytes) -> TransferResult<()> {
        self.push(ChannelMessage::Binary(data))
    }

    fn buffered_amount(&self) -> usize {
        let inner = self.shared.inner.lock();
        let pipe = &inner.pipes[self.side];
        pipe.pinned.unwrap_or(pipe.queued_bytes)
    }

    async fn wait_buffered_at_most(&self, threshold: usize) {
        let mut changes = self.shared.changes.subscribe();
        while self.buffered_amount() > threshold {
            if changes.changed().await.is_err() {
                return;
            }
        }
    }

    async fn closed(&self) {
        let mut changes = self.shared.changes.subscribe();
        while self.is_open() {
            if changes.changed().await.is_err() {
                return;
            }
        }
    }

    async fn recv(&self) -> Option<ChannelMessage> {
        let mut changes = self.shared.changes.subscribe();
        loop {
            match self.try_pop() {
                Ok(Some(message)) => return Some(message),
                Ok(None) => {}
                Err(()) => return None,
            }
            if changes.changed().await.is_err() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_frames_arrive_in_order() {
        let (a, b) = MemoryChannel::pair();

        a.send_text("first".into()).await.unwrap();
        a.send_binary(Bytes::from_static(b"second")).await.unwrap();

        assert_eq!(b.recv().await, Some(ChannelMessage::Text("first".into())));
        assert_eq!(
            b.recv().await,
            Some(ChannelMessage::Binary(Bytes::from_static(b"second")))
        );
        assert_eq!(a.frames_sent(), 2);
        assert_eq!(b.frames_sent(), 0);
    }

    #[tokio::test]
    async fn test_buffered_amount_tracks_unread_bytes() {
        let (a, b) = MemoryChannel::pair();

        a.send_binary(Bytes::from(vec![0u8; 100])).await.unwrap();
        a.send_binary(Bytes::from(vec![0u8; 50])).await.unwrap();
        assert_eq!(a.buffered_amount(), 150);
        assert_eq!(b.buffered_amount(), 0);

        b.recv().await.unwrap();
        assert_eq!(a.buffered_amount(), 50);
    }

    #[tokio::test]
    async fn test_wait_buffered_wakes_on_drain() {
        let (a, b) = MemoryChannel::pair();
        a.send_binary(Bytes::from(vec![0u8; 64])).await.unwrap();

        let reader = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            b.recv().await
        });

        tokio::time::timeout(Duration::from_secs(1), a.wait_buffered_at_most(0))
            .await
            .unwrap();
        assert!(reader.await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_pinned_buffered_amount() {
        let (a, _b) = MemoryChannel::pair();
        a.pin_buffered_amount(Some(1_000));
        assert_eq!(a.buffered_amount(), 1_000);

        let waiter = a.clone();
        let wait = tokio::spawn(async move { waiter.wait_buffered_at_most(10).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!wait.is_finished());

        a.pin_buffered_amount(None);
        tokio::time::timeout(Duration::from_secs(1), wait)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let (a, b) = MemoryChannel::pair();
        a.send_text("last words".into()).await.unwrap();
        a.close();

        assert!(!b.is_open());
        assert!(matches!(
            a.send_text("too late".into()).await,
            Err(TransferError::ChannelClosed)
        ));
        assert_eq!(b.recv().await, Some(ChannelMessage::Text("last words".into())));
        assert_eq!(b.recv().await, None);
    }

    #[tokio::test]
    async fn test_closed_resolves() {
        let (a, b) = MemoryChannel::pair();
        let watcher = tokio::spawn(async move { b.closed().await });

        a.close();
        tokio::time::timeout(Duration::from_secs(1), watcher)
            .await
            .unwrap()
            .unwrap();
    }
}
