//! API route modules.

pub mod announcements;
pub mod health;
pub mod logging;
pub mod topics;

use axum::Router;

use crate::api::error::ApiError;
use crate::api::server::AppState;
use crate::domain::EventId;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/health", health::router())
        .nest("/api/topics", topics::router())
        .nest("/api/events", announcements::router())
        .nest("/api/logging", logging::router())
        .with_state(state)
}

pub(crate) fn parse_event_id(raw: &str) -> Result<EventId, ApiError> {
    EventId::new(raw).map_err(|e| ApiError::validation(e.to_string()))
}
