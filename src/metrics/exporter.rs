//! Prometheus metrics exporter
//!
//! Exposes metrics via HTTP for Prometheus scraping.

use crate::metrics::recorder::init_metrics;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to setup metrics: {0}")]
    SetupFailed(String),
}

/// Install the Prometheus recorder and serve it over HTTP on `listen_addr`.
///
/// Must run inside a tokio runtime. Subsequent calls return the already-installed handle.
pub fn start_metrics_server(
    listen_addr: SocketAddr,
) -> Result<&'static PrometheusHandle, MetricsError> {
    init_metrics();

    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }

    // Binding the listener needs a running tokio runtime
    let (recorder, exporter) = PrometheusBuilder::new()
        .with_http_listener(listen_addr)
        .build()
        .map_err(|e| MetricsError::SetupFailed(e.to_string()))?;
    let handle = recorder.handle();
    ::metrics::set_global_recorder(recorder)
        .map_err(|e| MetricsError::SetupFailed(e.to_string()))?;

    tokio::spawn(async move {
        if exporter.await.is_err() {
            tracing::warn!("metrics exporter stopped");
        }
    });
    tracing::info!(%listen_addr, "prometheus exporter listening");

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

/// Render metrics as a string, if the exporter is running
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}
