//! Local subscription ledger.
//!
//! A per-device record of "am I subscribed to this event, with which token,
//! since when". Entries are keyed by [`EventId`] and never synced across
//! devices.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::Result;
use crate::domain::EventId;

/// Device-local subscription state for one event.
///
/// `token` is present exactly when `is_subscribed` is true; the constructors
/// are the only way to build a value, and deserialisation normalises records
/// that break this rule to [`DeviceSubscription::unsubscribed`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "StoredSubscription", rename_all = "camelCase")]
pub struct DeviceSubscription {
    is_subscribed: bool,
    token: Option<String>,
    subscribed_at_epoch_millis: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSubscription {
    #[serde(default)]
    is_subscribed: bool,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    subscribed_at_epoch_millis: Option<i64>,
}

impl From<StoredSubscription> for DeviceSubscription {
    fn from(stored: StoredSubscription) -> Self {
        match (stored.is_subscribed, stored.token) {
            (true, Some(token)) if !token.is_empty() => Self {
                is_subscribed: true,
                token: Some(token),
                subscribed_at_epoch_millis: stored.subscribed_at_epoch_millis,
            },
            _ => Self::unsubscribed(),
        }
    }
}

impl DeviceSubscription {
    pub fn unsubscribed() -> Self {
        Self::default()
    }

    pub fn subscribed(token: impl Into<String>, subscribed_at_epoch_millis: i64) -> Self {
        Self {
            is_subscribed: true,
            token: Some(token.into()),
            subscribed_at_epoch_millis: Some(subscribed_at_epoch_millis),
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.is_subscribed
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn subscribed_at_epoch_millis(&self) -> Option<i64> {
        self.subscribed_at_epoch_millis
    }

    /// Milliseconds since the subscription was committed, if subscribed.
    pub fn age_millis(&self, now_ms: i64) -> Option<i64> {
        if !self.is_subscribed {
            return None;
        }
        self.subscribed_at_epoch_millis
            .map(|at| now_ms.saturating_sub(at))
    }
}

/// Persistent key-value store of [`DeviceSubscription`]s.
#[async_trait]
pub trait SubscriptionLedger: Send + Sync {
    /// Current entry; an absent entry reads as unsubscribed.
    async fn get(&self, event_id: &EventId) -> Result<DeviceSubscription>;

    async fn set(&self, event_id: &EventId, subscription: DeviceSubscription) -> Result<()>;

    async fn clear(&self, event_id: &EventId) -> Result<()>;
}

/// In-process ledger for tests and ephemeral profiles.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: RwLock<HashMap<EventId, DeviceSubscription>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionLedger for MemoryLedger {
    async fn get(&self, event_id: &EventId) -> Result<DeviceSubscription> {
        Ok(self
            .entries
            .read()
            .get(event_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set(&self, event_id: &EventId, subscription: DeviceSubscription) -> Result<()> {
        self.entries.write().insert(event_id.clone(), subscription);
        Ok(())
    }

    async fn clear(&self, event_id: &EventId) -> Result<()> {
        self.entries.write().remove(event_id);
        Ok(())
    }
}

/// Ledger persisted as one JSON document on disk.
///
/// Writes go to a sibling temp file that is renamed over the original, so a
/// crash mid-write leaves either the old or the new document.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    // Serialises read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<HashMap<String, DeviceSubscription>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&bytes) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                // A corrupt ledger must read as "not subscribed", never as an error loop.
                warn!(path = %self.path.display(), error = %e, "Discarding unreadable subscription ledger");
                Ok(HashMap::new())
            }
        }
    }

    async fn store(&self, entries: &HashMap<String, DeviceSubscription>) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec_pretty(entries)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        debug!(path = %self.path.display(), entries = entries.len(), "Subscription ledger written");
        Ok(())
    }
}

#[async_trait]
impl SubscriptionLedger for FileLedger {
    async fn get(&self, event_id: &EventId) -> Result<DeviceSubscription> {
        let _guard = self.lock.lock().await;
        let entries = self.load().await?;
        Ok(entries.get(event_id.as_str()).cloned().unwrap_or_default())
    }

    async fn set(&self, event_id: &EventId, subscription: DeviceSubscription) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(event_id.to_string(), subscription);
        self.store(&entries).await
    }

    async fn clear(&self, event_id: &EventId) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        if entries.remove(event_id.as_str()).is_some() {
            self.store(&entries).await?;
        }
        Ok(())
    }
}
