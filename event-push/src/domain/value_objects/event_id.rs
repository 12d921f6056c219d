//! Event identifier value object.

use crate::Error;
use serde::{Deserialize, Serialize};

/// Maximum accepted identifier length.
const MAX_LEN: usize = 128;

/// Prefix of every event broadcast topic.
const TOPIC_PREFIX: &str = "event_";

/// A validated event identifier.
///
/// Identifiers end up inside broadcast topic names and ledger keys, so only
/// `[A-Za-z0-9_-]` is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventId(String);

impl EventId {
    /// Create a new EventId, validating it.
    pub fn new(id: impl Into<String>) -> Result<Self, Error> {
        let id = id.into();
        let trimmed = id.trim();

        if trimmed.is_empty() {
            return Err(Error::validation("Event id cannot be empty"));
        }
        if trimmed.len() > MAX_LEN {
            return Err(Error::validation(format!(
                "Event id cannot exceed {} characters",
                MAX_LEN
            )));
        }
        if let Some(c) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(Error::validation(format!(
                "Event id contains invalid character '{}'",
                c
            )));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the broadcast topic every device subscribed to this event is bound to.
    pub fn topic(&self) -> String {
        format!("{}{}", TOPIC_PREFIX, self.0)
    }

    /// Recover the event id from a topic name produced by [`EventId::topic`].
    pub fn from_topic(topic: &str) -> Option<Self> {
        topic
            .strip_prefix(TOPIC_PREFIX)
            .and_then(|id| Self::new(id).ok())
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for EventId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for EventId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EventId> for String {
    fn from(value: EventId) -> Self {
        value.0
    }
}
