use crate::config::TransferConfig;
use crate::metrics::{record_bytes_received, TransferMetrics};
use crate::transfer::channel::{presence_lost, PeerChannel};
use crate::transfer::error::{TransferError, TransferResult};
use crate::transfer::types::{
    ChannelMessage, CompletionKind, ControlFrame, PeerPresence, ReceivedFile, ReceiverState,
    TransferMetadata,
};
use bytes::{Bytes, BytesMut};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// A transfer in progress: what was declared and what has arrived so far
struct Incoming {
    metadata: TransferMetadata,
    buffer: BytesMut,
}

impl Incoming {
    fn new(metadata: TransferMetadata) -> Self {
        // Declared sizes come from the peer; cap the up-front reservation
        let capacity = metadata.size.min(64 * 1024 * 1024) as usize;
        Self {
            metadata,
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    fn received(&self) -> u64 {
        self.buffer.len() as u64
    }

    fn is_whole(&self) -> bool {
        self.received() == self.metadata.size
    }
}

enum Event {
    Message(Option<ChannelMessage>),
    PeerGone(PeerPresence),
}

/// Assembles one file from the peer channel and acknowledges it.
pub struct ReceiverSession<C: PeerChannel> {
    channel: C,
    config: TransferConfig,
    presence: Option<watch::Receiver<PeerPresence>>,
    state: RwLock<ReceiverState>,
    bytes_received: AtomicU64,
    assembled: watch::Sender<Option<ReceivedFile>>,
}

impl<C: PeerChannel> ReceiverSession<C> {
    pub fn new(channel: C, config: TransferConfig) -> Self {
        Self {
            channel,
            config,
            presence: None,
            state: RwLock::new(ReceiverState::AwaitingMetadata),
            bytes_received: AtomicU64::new(0),
            assembled: watch::channel(None).0,
        }
    }

    /// Treat a coordinator-reported departure like a channel close
    pub fn with_presence(mut self, presence: watch::Receiver<PeerPresence>) -> Self {
        self.presence = Some(presence);
        self
    }

    pub fn state(&self) -> ReceiverState {
        *self.state.read()
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// The assembled file, published as soon as completion is detected and
    /// before `complete-ack` is flushed. Its `ack_delivered` is always
    /// `false`; the value returned by [`run`](Self::run) carries the outcome.
    pub fn assembled(&self) -> watch::Receiver<Option<ReceivedFile>> {
        self.assembled.subscribe()
    }

    /// Receive until the transfer completes, explicitly or by byte count.
    ///
    /// Returns only after the acknowledgement has been flushed, which can
    /// take up to the ack timeout on a stalled channel. Use
    /// [`assembled`](Self::assembled) to get at the file earlier.
    pub async fn run(&self) -> TransferResult<ReceivedFile> {
        let metrics = TransferMetrics::start("receiver");

        match self.receive().await {
            Ok(file) => {
                tracing::info!(
                    name = %file.metadata.name,
                    size = file.metadata.size,
                    completion = ?file.completion,
                    ack_delivered = file.ack_delivered,
                    checksum = %file.checksum,
                    "transfer received"
                );
                metrics.complete();
                Ok(file)
            }
            Err(e) => {
                self.set_state(ReceiverState::Failed);
                tracing::warn!(bytes_received = self.bytes_received(), "receive failed: {}", e);
                metrics.fail(e.reason());
                Err(e)
            }
        }
    }

    async fn receive(&self) -> TransferResult<ReceivedFile> {
        let mut presence = self.presence.clone();
        let mut incoming: Option<Incoming> = None;

        loop {
            // Frames already delivered take priority over a departure notice
            let event = tokio::select! {
                biased;
                message = self.channel.recv() => Event::Message(message),
                gone = presence_lost(&mut presence) => Event::PeerGone(gone),
            };

            match event {
                Event::Message(Some(ChannelMessage::Text(text))) => {
                    match ControlFrame::decode(&text) {
                        Ok(ControlFrame::Metadata(metadata)) => {
                            if let Some(previous) = &incoming {
                                tracing::warn!(
                                    previous = %previous.metadata.name,
                                    received = previous.received(),
                                    "metadata mid-transfer, starting over"
                                );
                            }
                            tracing::info!(
                                name = %metadata.name,
                                size = metadata.size,
                                "receiving"
                            );
                            self.bytes_received.store(0, Ordering::Relaxed);
                            self.set_state(ReceiverState::Receiving);
                            incoming = Some(Incoming::new(metadata));
                        }
                        Ok(ControlFrame::Complete) => {
                            let current = incoming.take().ok_or_else(|| {
                                TransferError::Protocol("complete before metadata".into())
                            })?;
                            if !current.is_whole() {
                                return Err(TransferError::SizeMismatch {
                                    expected: current.metadata.size,
                                    received: current.received(),
                                });
                            }
                            self.set_state(ReceiverState::CompletionSeen);
                            return Ok(self.finish(current, CompletionKind::Explicit).await);
                        }
                        Ok(ControlFrame::CompleteAck) => {
                            tracing::debug!("ignoring stray complete-ack");
                        }
                        Err(e) => {
                            tracing::warn!(
                                len = text.len(),
                                "ignoring undecodable control frame: {}",
                                e
                            );
                        }
                    }
                }
                Event::Message(Some(ChannelMessage::Binary(data))) => match incoming.as_mut() {
                    Some(current) => self.append(current, data)?,
                    None => {
                        tracing::warn!(len = data.len(), "binary frame before metadata, dropped")
                    }
                },
                Event::Message(None) => {
                    return self.on_departure(incoming, TransferError::ChannelClosed).await;
                }
                Event::PeerGone(gone) => {
                    return self.on_departure(incoming, TransferError::PeerGone(gone)).await;
                }
            }
        }
    }

    fn append(&self, current: &mut Incoming, data: Bytes) -> TransferResult<()> {
        let received = current.received() + data.len() as u64;
        if received > current.metadata.size {
            return Err(TransferError::SizeMismatch {
                expected: current.metadata.size,
                received,
            });
        }

        current.buffer.extend_from_slice(&data);
        self.bytes_received.store(received, Ordering::Relaxed);
        record_bytes_received(data.len());
        Ok(())
    }

    /// The channel closed or the peer left before `complete` arrived. A full
    /// byte count still counts as a finished transfer.
    async fn on_departure(
        &self,
        incoming: Option<Incoming>,
        error: TransferError,
    ) -> TransferResult<ReceivedFile> {
        match incoming {
            Some(current) if current.is_whole() => {
                tracing::info!(
                    name = %current.metadata.name,
                    "all bytes arrived before teardown ({}), completing",
                    error
                );
                self.set_state(ReceiverState::InferredComplete);
                Ok(self.finish(current, CompletionKind::Inferred).await)
            }
            _ => Err(error),
        }
    }

    async fn finish(&self, current: Incoming, completion: CompletionKind) -> ReceivedFile {
        let data = current.buffer.freeze();
        let checksum = blake3::hash(&data).to_hex().to_string();
        let mut file = ReceivedFile {
            metadata: current.metadata,
            data,
            checksum,
            completion,
            ack_delivered: false,
        };
        self.assembled.send_replace(Some(file.clone()));

        file.ack_delivered = self.acknowledge().await;
        self.set_state(ReceiverState::Acknowledged);
        file
    }

    /// Send `complete-ack` and wait for it to leave the local buffer. Best
    /// effort: the channel may already be gone.
    async fn acknowledge(&self) -> bool {
        if !self.channel.is_open() {
            return false;
        }

        let frame = match ControlFrame::CompleteAck.encode() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("failed to encode ack: {}", e);
                return false;
            }
        };
        if let Err(e) = self.channel.send_text(frame).await {
            tracing::debug!("ack not sent: {}", e);
            return false;
        }

        let flushed = tokio::time::timeout(self.config.ack_timeout(), async {
            tokio::select! {
                biased;
                _ = self.channel.wait_buffered_at_most(0) => true,
                _ = self.channel.closed() => false,
            }
        })
        .await;

        matches!(flushed, Ok(true))
    }

    fn set_state(&self, state: ReceiverState) {
        *self.state.write() = state;
    }
}
