//! Announcement fan-out route.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use serde::Deserialize;

use super::parse_event_id;
use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::notification::{Announcement, FanoutReport};

#[derive(Debug, Deserialize)]
pub struct AnnounceRequest {
    #[serde(default)]
    pub event_name: String,
    pub message: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/{event_id}/announcements", post(announce))
}

async fn announce(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Json(request): Json<AnnounceRequest>,
) -> ApiResult<Json<FanoutReport>> {
    let event_id = parse_event_id(&event_id)?;
    let fanout = state
        .fanout
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Push gateway is not configured"))?;

    if request.message.trim().is_empty() {
        return Err(ApiError::validation("message is required"));
    }

    let announcement = Announcement {
        event_id,
        event_name: request.event_name,
        message: request.message,
    };
    let report = fanout.announce(&announcement).await?;
    Ok(Json(report))
}
