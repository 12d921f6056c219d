use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::truncate_string;
use crate::{Error, Result};

pub const DEFAULT_TITLE: &str = "Event Update";
pub const DEFAULT_BODY: &str = "You have a new announcement";
pub const DEFAULT_DEEP_LINK: &str = "/";

/// Upper bound on an encoded payload; push services reject larger messages.
pub const MAX_PAYLOAD_BYTES: usize = 3500;

const MAX_TITLE_CHARS: usize = 120;
const MAX_BODY_CHARS: usize = 600;
const FALLBACK_TITLE_CHARS: usize = 80;
const FALLBACK_BODY: &str = "Open the event page to read the full announcement.";

/// What a fan-out send carries to a device.
///
/// Every field has a documented default so a malformed message still renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    #[serde(alias = "url")]
    pub deep_link_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl Default for NotificationPayload {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            body: DEFAULT_BODY.to_string(),
            deep_link_url: DEFAULT_DEEP_LINK.to_string(),
            event_id: None,
        }
    }
}

impl NotificationPayload {
    /// Parse a received message, substituting defaults for anything missing.
    ///
    /// Accepts the flat shape `{title, body, deepLinkUrl | url, eventId}` and
    /// the nested messaging shape `{notification: {title, body}, data: {...}}`.
    /// Blank strings count as absent. Never fails.
    pub fn from_value(value: &Value) -> Self {
        let sections = [
            Some(value),
            value.get("notification"),
            value.get("data"),
        ];
        let pick = |keys: &[&str]| -> Option<String> {
            sections.iter().flatten().find_map(|section| {
                keys.iter().find_map(|key| {
                    section
                        .get(key)
                        .and_then(Value::as_str)
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                })
            })
        };

        Self {
            title: pick(&["title"]).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            body: pick(&["body"]).unwrap_or_else(|| DEFAULT_BODY.to_string()),
            deep_link_url: pick(&["deepLinkUrl", "url"])
                .unwrap_or_else(|| DEFAULT_DEEP_LINK.to_string()),
            event_id: pick(&["eventId"]),
        }
    }

    /// Parse raw message bytes; undecodable input yields the default payload.
    pub fn from_slice(bytes: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(value) => Self::from_value(&value),
            Err(e) => {
                tracing::warn!(error = %e, "Undecodable notification payload, using defaults");
                Self::default()
            }
        }
    }

    /// Encode within `max_bytes`, shortening the text when needed.
    pub fn into_bytes_capped(mut self, max_bytes: usize) -> Result<Vec<u8>> {
        self.title = truncate_string(&self.title, MAX_TITLE_CHARS);
        self.body = truncate_string(&self.body, MAX_BODY_CHARS);

        let bytes = serde_json::to_vec(&self)?;
        if bytes.len() <= max_bytes {
            return Ok(bytes);
        }

        let minimal = NotificationPayload {
            title: truncate_string(&self.title, FALLBACK_TITLE_CHARS),
            body: FALLBACK_BODY.to_string(),
            deep_link_url: self.deep_link_url,
            event_id: self.event_id,
        };
        let bytes = serde_json::to_vec(&minimal)?;
        if bytes.len() > max_bytes {
            return Err(Error::validation(format!(
                "Notification payload exceeds {} bytes",
                max_bytes
            )));
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_payload_uses_defaults() {
        let payload = NotificationPayload::from_value(&json!({}));
        assert_eq!(payload.title, "Event Update");
        assert_eq!(payload.body, "You have a new announcement");
        assert_eq!(payload.deep_link_url, "/");
        assert_eq!(payload.event_id, None);
    }

    #[test]
    fn test_non_object_and_garbage_use_defaults() {
        assert_eq!(
            NotificationPayload::from_value(&json!("hello")),
            NotificationPayload::default()
        );
        assert_eq!(
            NotificationPayload::from_slice(b"\xff not json"),
            NotificationPayload::default()
        );
    }

    #[test]
    fn test_nested_messaging_shape() {
        let payload = NotificationPayload::from_value(&json!({
            "notification": { "title": "Gala", "body": "Doors open at 7" },
            "data": { "url": "/event/gala", "eventId": "gala" }
        }));
        assert_eq!(payload.title, "Gala");
        assert_eq!(payload.body, "Doors open at 7");
        assert_eq!(payload.deep_link_url, "/event/gala");
        assert_eq!(payload.event_id.as_deref(), Some("gala"));
    }

    #[test]
    fn test_blank_and_wrong_typed_fields_fall_back() {
        let payload = NotificationPayload::from_value(&json!({
            "title": "   ",
            "body": 42,
            "deepLinkUrl": "/event/fair"
        }));
        assert_eq!(payload.title, DEFAULT_TITLE);
        assert_eq!(payload.body, DEFAULT_BODY);
        assert_eq!(payload.deep_link_url, "/event/fair");
    }

    #[test]
    fn test_capping_shortens_long_text() {
        let payload = NotificationPayload {
            title: "t".repeat(500),
            body: "b".repeat(5000),
            deep_link_url: "/event/gala".to_string(),
            event_id: Some("gala".to_string()),
        };
        let bytes = payload.into_bytes_capped(MAX_PAYLOAD_BYTES).unwrap();
        assert!(bytes.len() <= MAX_PAYLOAD_BYTES);

        let decoded: NotificationPayload = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded.title.chars().count(), MAX_TITLE_CHARS + 1);
        assert_eq!(decoded.deep_link_url, "/event/gala");
    }

    #[test]
    fn test_capping_falls_back_to_minimal_body() {
        let payload = NotificationPayload {
            title: "Gala".to_string(),
            body: "b".repeat(600),
            deep_link_url: "/event/gala".to_string(),
            event_id: None,
        };
        let bytes = payload.into_bytes_capped(300).unwrap();
        let decoded: NotificationPayload = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded.body, FALLBACK_BODY);
    }
}
