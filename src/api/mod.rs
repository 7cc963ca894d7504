//! Coordinator HTTP surface: the signaling websocket plus a couple of
//! read-only JSON routes.

mod error;
mod rest;
mod types;
mod websocket;

pub use error::{ApiError, ApiResult};
pub use types::*;
pub use websocket::websocket_handler;

use crate::config::CoordinatorConfig;
use crate::signaling::RoomRegistry;
use axum::{routing::get, Router};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    open_connections: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self {
            registry,
            open_connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::Relaxed)
    }
}

/// Build the coordinator router around an existing registry
pub fn create_coordinator_server(
    registry: Arc<RoomRegistry>,
    config: &CoordinatorConfig,
) -> Router {
    let state = AppState::new(registry);

    // Browsers open the websocket from whatever origin serves the client
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(rest::router())
        .route(&config.ws_path, get(websocket_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
