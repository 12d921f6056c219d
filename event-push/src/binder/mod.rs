//! Topic binder: binds a device push token to an event's broadcast topic.
//!
//! The binder is idempotent on the server side, so callers treat the call as
//! at-least-once and retry transient failures with [`bind_with_retry`].

mod http;
mod memory;

pub use http::HttpTopicBinder;
pub use memory::InMemoryTopicBinder;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::{EventId, RetryPolicy};
use crate::utils::redact_token;

/// Result of a successful bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindOutcome {
    Created,
    AlreadyBound,
}

/// Binder failures, split by whether a retry could help.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BinderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("binder unavailable (status {status}): {message}")]
    Unavailable { status: u16, message: String },

    #[error("binding rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },
}

impl BinderError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

#[async_trait]
pub trait TopicBinder: Send + Sync {
    /// Bind `token` to the topic of `event_id`. Re-binding is a success.
    async fn bind(&self, token: &str, event_id: &EventId) -> Result<BindOutcome, BinderError>;
}

/// Call the binder until it succeeds, fails permanently, or the policy runs out.
pub async fn bind_with_retry(
    binder: &dyn TopicBinder,
    policy: &RetryPolicy,
    token: &str,
    event_id: &EventId,
) -> Result<BindOutcome, BinderError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match binder.bind(token, event_id).await {
            Ok(outcome) => {
                debug!(
                    event_id = %event_id,
                    token = %redact_token(token),
                    ?outcome,
                    attempt,
                    "Token bound to event topic"
                );
                return Ok(outcome);
            }
            Err(err) => {
                if !err.is_retryable() || !policy.should_retry(attempt) {
                    warn!(
                        event_id = %event_id,
                        error = %err,
                        attempt,
                        "Topic binding failed"
                    );
                    return Err(err);
                }

                let delay = policy.delay_after_attempt(attempt);
                debug!(
                    event_id = %event_id,
                    error = %err,
                    "Topic binding failed, retrying in {:?} (attempt {}/{})",
                    delay,
                    attempt,
                    policy.max_attempts
                );
                sleep(delay).await;
            }
        }
    }
}
