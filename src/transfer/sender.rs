use crate::config::TransferConfig;
use crate::metrics::{record_backpressure_pause, record_bytes_sent, TransferMetrics};
use crate::transfer::channel::{presence_lost, PeerChannel};
use crate::transfer::error::{TransferError, TransferResult};
use crate::transfer::types::{
    ChannelMessage, ControlFrame, PeerPresence, SendReport, SenderState, TransferMetadata,
};
use bytes::BytesMut;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;

/// Streams one file over an open peer channel and waits for the receiver to
/// confirm it.
pub struct SenderSession<C: PeerChannel> {
    channel: C,
    config: TransferConfig,
    presence: Option<watch::Receiver<PeerPresence>>,
    state: RwLock<SenderState>,
    bytes_sent: AtomicU64,
}

impl<C: PeerChannel> SenderSession<C> {
    pub fn new(channel: C, config: TransferConfig) -> Self {
        Self {
            channel,
            config,
            presence: None,
            state: RwLock::new(SenderState::Idle),
            bytes_sent: AtomicU64::new(0),
        }
    }

    /// Abort pending waits once the coordinator reports the receiver gone
    pub fn with_presence(mut self, presence: watch::Receiver<PeerPresence>) -> Self {
        self.presence = Some(presence);
        self
    }

    pub fn state(&self) -> SenderState {
        *self.state.read()
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Send `metadata`, then exactly `metadata.size` bytes read from `source`,
    /// then the completion frame, and wait for `complete-ack`. A session that
    /// has reached a terminal state refuses to run again.
    pub async fn run<R>(&self, source: R, metadata: TransferMetadata) -> TransferResult<SendReport>
    where
        R: AsyncRead + Unpin + Send,
    {
        if self.state().is_terminal() {
            return Err(TransferError::Protocol(format!(
                "session already finished ({:?})",
                self.state()
            )));
        }

        let metrics = TransferMetrics::start("sender");
        tracing::info!(name = %metadata.name, size = metadata.size, "starting transfer");

        match self.stream(source, &metadata).await {
            Ok(report) => {
                self.set_state(SenderState::Acked);
                tracing::info!(
                    name = %metadata.name,
                    bytes = report.bytes_sent,
                    chunks = report.chunks_sent,
                    pauses = report.backpressure_pauses,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "transfer acknowledged"
                );
                metrics.complete();
                Ok(report)
            }
            Err(e) => {
                let terminal = match e {
                    TransferError::AckTimeout(_) => SenderState::TimedOut,
                    TransferError::ChannelClosed | TransferError::PeerGone(_) => {
                        SenderState::ChannelClosed
                    }
                    _ => SenderState::Failed,
                };
                self.set_state(terminal);
                tracing::warn!(
                    name = %metadata.name,
                    bytes_sent = self.bytes_sent(),
                    state = ?terminal,
                    "transfer failed: {}",
                    e
                );
                metrics.fail(e.reason());
                Err(e)
            }
        }
    }

    async fn stream<R>(
        &self,
        mut source: R,
        metadata: &TransferMetadata,
    ) -> TransferResult<SendReport>
    where
        R: AsyncRead + Unpin + Send,
    {
        // A zero chunk size would never advance
        self.config.validate()?;
        if !self.channel.is_open() {
            return Err(TransferError::ChannelNotOpen);
        }

        let started = Instant::now();
        let mut presence = self.presence.clone();
        let chunk_size = self.config.chunk_size;
        let mut chunks_sent = 0u64;
        let mut pauses = 0u64;

        self.channel
            .send_text(ControlFrame::Metadata(metadata.clone()).encode()?)
            .await?;
        self.set_state(SenderState::MetadataSent);

        self.set_state(SenderState::Streaming);
        let mut sent = 0u64;
        while sent < metadata.size {
            let len = (metadata.size - sent).min(chunk_size as u64) as usize;
            let mut chunk = BytesMut::zeroed(len);

            let mut filled = 0;
            while filled < len {
                let n = source.read(&mut chunk[filled..]).await?;
                if n == 0 {
                    return Err(TransferError::SourceTruncated {
                        expected: metadata.size,
                        read: sent + filled as u64,
                    });
                }
                filled += n;
            }

            self.channel.send_binary(chunk.freeze()).await?;
            sent += len as u64;
            chunks_sent += 1;
            self.bytes_sent.store(sent, Ordering::Relaxed);
            record_bytes_sent(len);

            if self.channel.buffered_amount() > self.config.high_water_mark {
                pauses += 1;
                record_backpressure_pause();
                tracing::debug!(
                    buffered = self.channel.buffered_amount(),
                    sent,
                    "pausing until buffer drains"
                );
                self.drain_to(self.config.low_water_mark, &mut presence).await?;
                tracing::debug!(sent, "resuming");
            }
        }
        self.set_state(SenderState::AllChunksSent);

        self.drain_to(0, &mut presence).await?;
        self.channel.send_text(ControlFrame::Complete.encode()?).await?;
        self.drain_to(0, &mut presence).await?;

        self.set_state(SenderState::AwaitingAck);
        let ack_timeout = self.config.ack_timeout();
        match tokio::time::timeout(ack_timeout, self.await_ack(&mut presence)).await {
            Ok(result) => result?,
            Err(_) => return Err(TransferError::AckTimeout(ack_timeout)),
        }

        Ok(SendReport {
            bytes_sent: sent,
            chunks_sent,
            backpressure_pauses: pauses,
            elapsed: started.elapsed(),
        })
    }

    /// Suspend until the buffered amount is at most `threshold`, or fail as
    /// soon as the channel closes or the peer is reported gone.
    async fn drain_to(
        &self,
        threshold: usize,
        presence: &mut Option<watch::Receiver<PeerPresence>>,
    ) -> TransferResult<()> {
        tokio::select! {
            biased;
            _ = self.channel.wait_buffered_at_most(threshold) => Ok(()),
            _ = self.channel.closed() => Err(TransferError::ChannelClosed),
            gone = presence_lost(presence) => Err(TransferError::PeerGone(gone)),
        }
    }

    async fn await_ack(
        &self,
        presence: &mut Option<watch::Receiver<PeerPresence>>,
    ) -> TransferResult<()> {
        loop {
            let message = tokio::select! {
                biased;
                message = self.channel.recv() => message,
                gone = presence_lost(presence) => return Err(TransferError::PeerGone(gone)),
            };

            match message {
                None => return Err(TransferError::ChannelClosed),
                Some(ChannelMessage::Text(text)) => match ControlFrame::decode(&text) {
                    Ok(ControlFrame::CompleteAck) => return Ok(()),
                    Ok(other) => {
                        tracing::debug!(frame = ?other, "ignoring control frame while awaiting ack")
                    }
                    Err(e) => tracing::warn!("undecodable control frame: {}", e),
                },
                Some(ChannelMessage::Binary(data)) => {
                    tracing::debug!(len = data.len(), "ignoring binary frame while awaiting ack")
                }
            }
        }
    }

    fn set_state(&self, state: SenderState) {
        *self.state.write() = state;
    }
}
