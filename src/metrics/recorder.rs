//! Metrics recorder for coordinator and transfer operations
//!
//! All calls are no-ops until a recorder is installed (see `exporter`).

use crate::signaling::Role;
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize metric descriptions (call once at startup)
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    // Coordinator
    describe_counter!("handoff_rooms_created_total", "Total number of rooms created");
    describe_gauge!("handoff_active_rooms", "Number of rooms currently registered");
    describe_histogram!(
        "handoff_room_lifetime_seconds",
        "Time between room creation and removal"
    );
    describe_gauge!(
        "handoff_open_connections",
        "Number of open signaling connections"
    );
    describe_counter!(
        "handoff_messages_relayed_total",
        "Signaling payloads relayed between peers"
    );
    describe_counter!(
        "handoff_signaling_errors_total",
        "Error replies sent to signaling clients"
    );
    describe_counter!(
        "handoff_peer_disconnects_total",
        "Occupants that left a room by disconnecting"
    );

    // Transfers
    describe_counter!("handoff_bytes_sent_total", "Payload bytes sent over peer channels");
    describe_counter!(
        "handoff_bytes_received_total",
        "Payload bytes received over peer channels"
    );
    describe_counter!(
        "handoff_backpressure_pauses_total",
        "Times the sender paused on the high-water mark"
    );
    describe_counter!(
        "handoff_transfers_completed_total",
        "Transfers that finished the completion handshake"
    );
    describe_counter!("handoff_transfers_failed_total", "Transfers that failed");
    describe_histogram!(
        "handoff_transfer_duration_seconds",
        "Total transfer duration"
    );
}

// ============== Coordinator ==============

pub fn record_room_created() {
    counter!("handoff_rooms_created_total").increment(1);
    gauge!("handoff_active_rooms").increment(1.0);
}

pub fn record_room_removed(created_at: DateTime<Utc>) {
    gauge!("handoff_active_rooms").decrement(1.0);
    let lifetime = (Utc::now() - created_at).num_milliseconds().max(0) as f64 / 1000.0;
    histogram!("handoff_room_lifetime_seconds").record(lifetime);
}

pub fn record_connection_opened() {
    gauge!("handoff_open_connections").increment(1.0);
}

pub fn record_connection_closed() {
    gauge!("handoff_open_connections").decrement(1.0);
}

pub fn record_message_relayed(kind: &'static str) {
    counter!("handoff_messages_relayed_total", "kind" => kind).increment(1);
}

pub fn record_signaling_error(code: &'static str) {
    counter!("handoff_signaling_errors_total", "code" => code).increment(1);
}

pub fn record_peer_disconnected(role: Role) {
    counter!("handoff_peer_disconnects_total", "role" => role.as_str()).increment(1);
}

// ============== Transfers ==============

pub fn record_bytes_sent(bytes: usize) {
    counter!("handoff_bytes_sent_total").increment(bytes as u64);
}

pub fn record_bytes_received(bytes: usize) {
    counter!("handoff_bytes_received_total").increment(bytes as u64);
}

pub fn record_backpressure_pause() {
    counter!("handoff_backpressure_pauses_total").increment(1);
}

/// Times one transfer session and records its outcome
pub struct TransferMetrics {
    role: &'static str,
    start_time: Instant,
}

impl TransferMetrics {
    pub fn start(role: &'static str) -> Self {
        Self {
            role,
            start_time: Instant::now(),
        }
    }

    pub fn complete(self) {
        counter!("handoff_transfers_completed_total", "role" => self.role).increment(1);
        histogram!("handoff_transfer_duration_seconds", "role" => self.role)
            .record(self.elapsed().as_secs_f64());
    }

    pub fn fail(self, reason: &'static str) {
        counter!("handoff_transfers_failed_total", "role" => self.role, "reason" => reason)
            .increment(1);
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}
