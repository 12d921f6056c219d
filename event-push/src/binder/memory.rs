use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{BindOutcome, BinderError, TopicBinder};
use crate::domain::EventId;

/// In-process binder holding the `(token, topic) -> bound_at` relation.
///
/// Used by tests and local simulations; behaves like the real service with
/// respect to idempotency.
#[derive(Debug, Default)]
pub struct InMemoryTopicBinder {
    bindings: RwLock<HashMap<(String, String), DateTime<Utc>>>,
    calls: AtomicU64,
}

impl InMemoryTopicBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `bind` calls received, successful or not.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn is_bound(&self, token: &str, event_id: &EventId) -> bool {
        self.bindings
            .read()
            .contains_key(&(token.to_string(), event_id.topic()))
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.read().len()
    }

    /// Tokens bound to the topic of `event_id`, in no particular order.
    pub fn tokens_for(&self, event_id: &EventId) -> Vec<String> {
        let topic = event_id.topic();
        self.bindings
            .read()
            .keys()
            .filter(|(_, t)| *t == topic)
            .map(|(token, _)| token.clone())
            .collect()
    }
}

#[async_trait]
impl TopicBinder for InMemoryTopicBinder {
    async fn bind(&self, token: &str, event_id: &EventId) -> Result<BindOutcome, BinderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if token.trim().is_empty() {
            return Err(BinderError::Rejected {
                status: 400,
                message: "token is required".to_string(),
            });
        }

        let key = (token.to_string(), event_id.topic());
        let mut bindings = self.bindings.write();
        if bindings.contains_key(&key) {
            return Ok(BindOutcome::AlreadyBound);
        }
        bindings.insert(key, Utc::now());
        Ok(BindOutcome::Created)
    }
}
