use crate::api::error::{ApiError, ApiResult};
use crate::api::types::*;
use crate::api::AppState;
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/stats", get(get_stats))
        .route("/api/v1/rooms/:share_id", get(get_room))
}

async fn health_check() -> &'static str {
    "OK"
}

async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        active_rooms: state.registry.room_count(),
        open_connections: state.open_connections(),
    })
}

async fn get_room(
    State(state): State<AppState>,
    Path(share_id): Path<String>,
) -> ApiResult<Json<RoomResponse>> {
    let snapshot = state
        .registry
        .snapshot(&share_id)
        .ok_or_else(|| ApiError::NotFound(share_id.clone()))?;

    Ok(Json(RoomResponse {
        share_id,
        has_sender: snapshot.sender.is_some(),
        has_receiver: snapshot.receiver.is_some(),
        created_at: snapshot.created_at,
    }))
}
