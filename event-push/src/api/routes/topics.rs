//! Topic binding routes.
//!
//! `POST` is idempotent: re-binding answers 200 with `already_bound`.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, post},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::parse_event_id;
use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::binder::BindOutcome;
use crate::utils::redact_token;

#[derive(Debug, Deserialize)]
pub struct BindRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct BindResponse {
    pub outcome: BindOutcome,
    pub topic: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{event_id}/bindings", post(bind_token))
        .route("/{event_id}/bindings/{token}", delete(unbind_token))
}

async fn bind_token(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Json(request): Json<BindRequest>,
) -> ApiResult<(StatusCode, Json<BindResponse>)> {
    let event_id = parse_event_id(&event_id)?;
    let token = request.token.trim();
    if token.is_empty() {
        return Err(ApiError::validation("token is required"));
    }

    let outcome = state.bindings.bind(token, &event_id).await?;
    let status = match outcome {
        BindOutcome::Created => {
            info!(event_id = %event_id, token = %redact_token(token), "Token bound to topic");
            StatusCode::CREATED
        }
        BindOutcome::AlreadyBound => StatusCode::OK,
    };

    Ok((
        status,
        Json(BindResponse {
            outcome,
            topic: event_id.topic(),
        }),
    ))
}

async fn unbind_token(
    State(state): State<AppState>,
    Path((event_id, token)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let event_id = parse_event_id(&event_id)?;
    if state.bindings.unbind(&token, &event_id).await? {
        info!(event_id = %event_id, token = %redact_token(&token), "Token unbound from topic");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!(
            "No binding for this token on topic '{}'",
            event_id.topic()
        )))
    }
}
