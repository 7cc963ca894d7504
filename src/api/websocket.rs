use crate::api::AppState;
use crate::metrics::{record_connection_closed, record_connection_opened};
use crate::signaling::{Outbound, PeerHandle, SignalingSession};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Counts a connection as open for as long as it lives
struct ConnectionGuard(Arc<AtomicUsize>);

impl ConnectionGuard {
    fn open(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        record_connection_opened();
        Self(counter)
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
        record_connection_closed();
    }
}

async fn handle_websocket(socket: WebSocket, state: AppState) {
    let _guard = ConnectionGuard::open(state.open_connections.clone());
    let (handle, mut outbound) = PeerHandle::channel();
    let conn = handle.id();
    let mut session = SignalingSession::new(handle, state.registry.clone());
    tracing::debug!(%conn, "signaling connection opened");

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Everything addressed to this connection goes through its queue
    let mut writer = tokio::spawn(async move {
        while let Some(item) = outbound.recv().await {
            match item {
                Outbound::Message(message) => {
                    let json = match serde_json::to_string(&message) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::warn!(%conn, "failed to encode message: {}", e);
                            continue;
                        }
                    };
                    if ws_tx.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut writer => break,
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => session.handle_text(&text),
                    Some(Ok(Message::Binary(data))) => session.handle_binary(data.len()),
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(%conn, "websocket error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    if let Some(tag) = session.tag() {
        tracing::info!(
            %conn,
            share_id = %tag.share_id,
            role = %tag.role,
            "signaling connection closed"
        );
    }
    session.close();
    writer.abort();
}
