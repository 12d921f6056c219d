//! Best-effort fan-out of an announcement to every device bound to the
//! event's topic.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::payload::{DEFAULT_TITLE, MAX_PAYLOAD_BYTES, NotificationPayload};
use super::sender::{PushSender, SendError};
use crate::Result;
use crate::database::TopicBindingRepository;
use crate::domain::EventId;
use crate::utils::redact_token;

pub const DEFAULT_FANOUT_CONCURRENCY: usize = 16;

/// A newly posted announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub event_id: EventId,
    pub event_name: String,
    pub message: String,
}

impl Announcement {
    pub fn deep_link(&self) -> String {
        format!("/event/{}", self.event_id)
    }

    pub fn to_payload(&self) -> NotificationPayload {
        let title = match self.event_name.trim() {
            "" => DEFAULT_TITLE.to_string(),
            name => name.to_string(),
        };
        NotificationPayload {
            title,
            body: self.message.clone(),
            deep_link_url: self.deep_link(),
            event_id: Some(self.event_id.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanoutReport {
    pub sent: usize,
    pub failed: usize,
    /// Tokens dropped from the store because the gateway reported them gone.
    pub removed: usize,
}

enum Delivery {
    Sent,
    Failed,
    Removed,
}

pub struct FanoutService {
    bindings: Arc<dyn TopicBindingRepository>,
    sender: Arc<dyn PushSender>,
    concurrency: usize,
}

impl FanoutService {
    pub fn new(bindings: Arc<dyn TopicBindingRepository>, sender: Arc<dyn PushSender>) -> Self {
        Self {
            bindings,
            sender,
            concurrency: DEFAULT_FANOUT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Send the announcement to every bound token. No acknowledgement is
    /// collected; individual send failures only show up in the report.
    pub async fn announce(&self, announcement: &Announcement) -> Result<FanoutReport> {
        let tokens = self.bindings.tokens_for_topic(&announcement.event_id).await?;
        if tokens.is_empty() {
            debug!(event_id = %announcement.event_id, "No devices bound, nothing to send");
            return Ok(FanoutReport::default());
        }

        let bytes = announcement.to_payload().into_bytes_capped(MAX_PAYLOAD_BYTES)?;
        let data: Value = serde_json::from_slice(&bytes)?;

        let outcomes: Vec<Delivery> = stream::iter(tokens)
            .map(|token| {
                let data = &data;
                async move { self.deliver(&token, data).await }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = FanoutReport::default();
        for outcome in outcomes {
            match outcome {
                Delivery::Sent => report.sent += 1,
                Delivery::Failed => report.failed += 1,
                Delivery::Removed => report.removed += 1,
            }
        }

        info!(
            event_id = %announcement.event_id,
            sent = report.sent,
            failed = report.failed,
            removed = report.removed,
            "Announcement fan-out finished"
        );
        Ok(report)
    }

    async fn deliver(&self, token: &str, data: &Value) -> Delivery {
        match self.sender.send(token, data).await {
            Ok(()) => Delivery::Sent,
            Err(SendError::Unregistered) => {
                match self.bindings.remove_token(token).await {
                    Ok(count) => info!(
                        token = %redact_token(token),
                        bindings = count,
                        "Removed unregistered push token"
                    ),
                    Err(e) => warn!(
                        token = %redact_token(token),
                        error = %e,
                        "Failed to remove unregistered push token"
                    ),
                }
                Delivery::Removed
            }
            Err(e) => {
                warn!(token = %redact_token(token), error = %e, "Push delivery failed");
                Delivery::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_announcement_payload() {
        let announcement = Announcement {
            event_id: EventId::new("gala").unwrap(),
            event_name: "Spring Gala".to_string(),
            message: "Doors open at 7".to_string(),
        };
        let payload = announcement.to_payload();
        assert_eq!(payload.title, "Spring Gala");
        assert_eq!(payload.body, "Doors open at 7");
        assert_eq!(payload.deep_link_url, "/event/gala");
        assert_eq!(payload.event_id.as_deref(), Some("gala"));
    }

    #[test]
    fn test_blank_event_name_uses_default_title() {
        let announcement = Announcement {
            event_id: EventId::new("gala").unwrap(),
            event_name: "  ".to_string(),
            message: "hi".to_string(),
        };
        assert_eq!(announcement.to_payload().title, DEFAULT_TITLE);
    }
}
