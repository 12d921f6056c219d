//! Browser push platform boundary.
//!
//! Everything the subscribe protocol needs from the runtime (permission
//! prompt, worker registration, token mint) goes through [`PushPlatform`], so
//! the protocol can run against fakes in tests.

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use super::capability::PermissionState;
use crate::config::MessagingConfig;

/// Failures raised by the platform glue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("platform API unavailable: {0}")]
    Unavailable(String),

    #[error("worker registration failed: {0}")]
    Registration(String),

    #[error("token request failed: {0}")]
    Token(String),

    #[error("{0}")]
    Other(String),
}

/// Worker script location and scope.
///
/// The messaging configuration travels as query parameters so the same
/// worker file serves any backend project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerScript {
    pub url: String,
    pub scope: String,
}

impl WorkerScript {
    /// Build the worker URL relative to `origin`.
    pub fn from_config(origin: &Url, config: &MessagingConfig) -> Result<Self, PlatformError> {
        let mut url = origin
            .join(&config.worker_path)
            .map_err(|e| PlatformError::Registration(format!("invalid worker path: {}", e)))?;

        url.query_pairs_mut()
            .clear()
            .append_pair("apiKey", &config.api_key)
            .append_pair("projectId", &config.project_id)
            .append_pair("messagingSenderId", &config.sender_id)
            .append_pair("appId", &config.app_id);

        Ok(Self {
            url: url.to_string(),
            scope: config.worker_scope.clone(),
        })
    }
}

/// Handle to an activated worker registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRegistration {
    pub scope: String,
    pub script_url: String,
}

#[async_trait]
pub trait PushPlatform: Send + Sync {
    /// Show the permission dialog (or return the remembered answer).
    async fn request_permission(&self) -> Result<PermissionState, PlatformError>;

    /// Install and activate the background worker.
    async fn register_worker(
        &self,
        script: &WorkerScript,
    ) -> Result<WorkerRegistration, PlatformError>;

    /// Obtain a push token scoped to `registration`.
    ///
    /// `Ok(None)` means the platform answered without a token.
    async fn mint_token(
        &self,
        registration: &WorkerRegistration,
        vapid_public_key: &str,
    ) -> Result<Option<String>, PlatformError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MessagingConfig {
        MessagingConfig {
            api_key: "key".to_string(),
            project_id: "proj".to_string(),
            sender_id: "42".to_string(),
            app_id: "1:42:web:abc".to_string(),
            vapid_public_key: "vapid".to_string(),
            worker_path: "/push-worker.js".to_string(),
            worker_scope: "/".to_string(),
        }
    }

    #[test]
    fn test_worker_script_carries_config() {
        let origin = Url::parse("https://events.example/event/gala").unwrap();
        let script = WorkerScript::from_config(&origin, &config()).unwrap();

        let url = Url::parse(&script.url).unwrap();
        assert_eq!(url.path(), "/push-worker.js");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("projectId".to_string(), "proj".to_string())));
        assert!(pairs.contains(&("appId".to_string(), "1:42:web:abc".to_string())));
        assert_eq!(script.scope, "/");
    }
}
