//! Metrics and observability module
//!
//! Prometheus-compatible metrics for the coordinator and transfer sessions:
//! - Room lifecycle (created, active, lifetime)
//! - Signaling traffic (relayed payloads, error replies, disconnects)
//! - Transfer throughput, backpressure pauses and outcomes

pub mod exporter;
pub mod recorder;

pub use exporter::{render_metrics, start_metrics_server, MetricsError};
pub use recorder::{
    init_metrics, record_backpressure_pause, record_bytes_received, record_bytes_sent,
    record_connection_closed, record_connection_opened, record_message_relayed,
    record_peer_disconnected, record_room_created, record_room_removed, record_signaling_error,
    TransferMetrics,
};
