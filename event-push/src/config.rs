//! Environment-driven configuration.
//!
//! Every loader has a `from_env` entry point and a `from_lookup` variant that
//! takes the variable source as a closure, so tests never touch the process
//! environment.

use std::time::Duration;

use crate::domain::RetryPolicy;
use crate::{Error, Result};

/// Default worker script path served by the web app.
pub const DEFAULT_WORKER_PATH: &str = "/push-worker.js";

/// Default worker scope.
pub const DEFAULT_WORKER_SCOPE: &str = "/";

/// Default age after which a subscription is considered possibly stale.
pub const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(3 * 24 * 60 * 60);

/// Default delay before the staleness banner decision is made.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(2000);

fn read(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match read(lookup, key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::config(format!("Invalid value for {}: {}", key, raw))),
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Messaging backend parameters handed to the background worker and token mint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagingConfig {
    pub api_key: String,
    pub project_id: String,
    pub sender_id: String,
    pub app_id: String,
    /// Public application server key used when minting tokens.
    pub vapid_public_key: String,
    pub worker_path: String,
    pub worker_scope: String,
}

impl MessagingConfig {
    /// Load from `PUSH_*` variables.
    ///
    /// Returns `Ok(None)` when push is not configured at all and an error when
    /// it is only partially configured.
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>> {
        const REQUIRED: [&str; 5] = [
            "PUSH_API_KEY",
            "PUSH_PROJECT_ID",
            "PUSH_SENDER_ID",
            "PUSH_APP_ID",
            "PUSH_VAPID_PUBLIC_KEY",
        ];

        let values: Vec<Option<String>> = REQUIRED.iter().map(|k| read(&lookup, k)).collect();
        if values.iter().all(Option::is_none) {
            return Ok(None);
        }

        let missing: Vec<&str> = REQUIRED
            .iter()
            .zip(&values)
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| *k)
            .collect();
        if !missing.is_empty() {
            return Err(Error::config(format!(
                "Incomplete push configuration, missing: {}",
                missing.join(", ")
            )));
        }

        let mut values = values.into_iter().flatten();
        let mut next = || values.next().unwrap_or_default();

        Ok(Some(Self {
            api_key: next(),
            project_id: next(),
            sender_id: next(),
            app_id: next(),
            vapid_public_key: next(),
            worker_path: read(&lookup, "PUSH_WORKER_PATH")
                .unwrap_or_else(|| DEFAULT_WORKER_PATH.to_string()),
            worker_scope: read(&lookup, "PUSH_WORKER_SCOPE")
                .unwrap_or_else(|| DEFAULT_WORKER_SCOPE.to_string()),
        }))
    }
}

/// Tunable heuristics of the subscription lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub struct PushPolicy {
    /// Subscriptions older than this prompt a refresh banner.
    pub stale_threshold: Duration,
    /// Delay before deciding whether to show the banner on a page view.
    pub settle_delay: Duration,
    /// Retry bound for topic binder calls.
    pub binder_retry: RetryPolicy,
}

impl Default for PushPolicy {
    fn default() -> Self {
        Self {
            stale_threshold: DEFAULT_STALE_THRESHOLD,
            settle_delay: DEFAULT_SETTLE_DELAY,
            binder_retry: RetryPolicy::default(),
        }
    }
}

impl PushPolicy {
    /// Load overrides from the environment, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `PUSH_STALE_THRESHOLD_HOURS`
    /// - `PUSH_BANNER_SETTLE_MS`
    /// - `PUSH_BINDER_MAX_ATTEMPTS`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut policy = Self::default();

        if let Some(hours) = read_parsed::<u64>(&lookup, "PUSH_STALE_THRESHOLD_HOURS")? {
            policy.stale_threshold = Duration::from_secs(hours.saturating_mul(60 * 60));
        }
        if let Some(ms) = read_parsed::<u64>(&lookup, "PUSH_BANNER_SETTLE_MS")? {
            policy.settle_delay = Duration::from_millis(ms);
        }
        if let Some(attempts) = read_parsed::<u32>(&lookup, "PUSH_BINDER_MAX_ATTEMPTS")? {
            if attempts == 0 {
                return Err(Error::config("PUSH_BINDER_MAX_ATTEMPTS must be at least 1"));
            }
            policy.binder_retry.max_attempts = attempts;
        }

        Ok(policy)
    }
}

/// Push gateway used by the fan-out sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub url: String,
    pub server_key: String,
}

/// Binder/fan-out service configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub database_url: String,
    pub log_dir: Option<String>,
    pub gateway: Option<GatewayConfig>,
    pub fanout_concurrency: usize,
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 12580,
            database_url: "sqlite:event-push.db?mode=rwc".to_string(),
            log_dir: None,
            gateway: None,
            fanout_concurrency: 16,
            enable_cors: true,
        }
    }
}

impl ServerConfig {
    /// Load server config from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `API_BIND_ADDRESS`, `API_PORT`
    /// - `DATABASE_URL`
    /// - `LOG_DIR`
    /// - `PUSH_GATEWAY_URL` + `PUSH_GATEWAY_KEY`
    /// - `PUSH_FANOUT_CONCURRENCY`
    pub fn from_env_or_default() -> Result<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(bind_address) = read(&lookup, "API_BIND_ADDRESS") {
            config.bind_address = bind_address;
        }
        if let Some(port) = read_parsed::<u16>(&lookup, "API_PORT")? {
            config.port = port;
        }
        if let Some(url) = read(&lookup, "DATABASE_URL") {
            config.database_url = url;
        }
        config.log_dir = read(&lookup, "LOG_DIR");

        config.gateway = match (
            read(&lookup, "PUSH_GATEWAY_URL"),
            read(&lookup, "PUSH_GATEWAY_KEY"),
        ) {
            (None, None) => None,
            (Some(url), Some(server_key)) => {
                url::Url::parse(&url)
                    .map_err(|e| Error::config(format!("Invalid PUSH_GATEWAY_URL: {}", e)))?;
                Some(GatewayConfig { url, server_key })
            }
            _ => {
                return Err(Error::config(
                    "Both PUSH_GATEWAY_URL and PUSH_GATEWAY_KEY must be set",
                ));
            }
        };

        if let Some(concurrency) = read_parsed::<usize>(&lookup, "PUSH_FANOUT_CONCURRENCY")? {
            config.fanout_concurrency = concurrency.max(1);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_messaging_config_absent() {
        assert!(MessagingConfig::from_lookup(lookup(&[])).unwrap().is_none());
    }

    #[test]
    fn test_messaging_config_partial_is_error() {
        let err = MessagingConfig::from_lookup(lookup(&[("PUSH_API_KEY", "k")])).unwrap_err();
        assert!(err.to_string().contains("PUSH_PROJECT_ID"));
    }

    #[test]
    fn test_messaging_config_full() {
        let config = MessagingConfig::from_lookup(lookup(&[
            ("PUSH_API_KEY", "key"),
            ("PUSH_PROJECT_ID", "proj"),
            ("PUSH_SENDER_ID", "123"),
            ("PUSH_APP_ID", "app"),
            ("PUSH_VAPID_PUBLIC_KEY", "vapid"),
            ("PUSH_WORKER_PATH", "/sw.js"),
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(config.project_id, "proj");
        assert_eq!(config.vapid_public_key, "vapid");
        assert_eq!(config.worker_path, "/sw.js");
        assert_eq!(config.worker_scope, DEFAULT_WORKER_SCOPE);
    }

    #[test]
    fn test_policy_defaults_and_overrides() {
        let policy = PushPolicy::from_lookup(lookup(&[])).unwrap();
        assert_eq!(policy.stale_threshold, DEFAULT_STALE_THRESHOLD);
        assert_eq!(policy.binder_retry.max_attempts, 3);

        let policy = PushPolicy::from_lookup(lookup(&[
            ("PUSH_STALE_THRESHOLD_HOURS", "12"),
            ("PUSH_BINDER_MAX_ATTEMPTS", "5"),
        ]))
        .unwrap();
        assert_eq!(policy.stale_threshold, Duration::from_secs(12 * 3600));
        assert_eq!(policy.binder_retry.max_attempts, 5);

        assert!(PushPolicy::from_lookup(lookup(&[("PUSH_BINDER_MAX_ATTEMPTS", "0")])).is_err());
        assert!(PushPolicy::from_lookup(lookup(&[("PUSH_BANNER_SETTLE_MS", "soon")])).is_err());
    }

    #[test]
    fn test_server_config_gateway_pair() {
        let config = ServerConfig::from_lookup(lookup(&[("API_PORT", "9000")])).unwrap();
        assert_eq!(config.port, 9000);
        assert!(config.gateway.is_none());

        assert!(
            ServerConfig::from_lookup(lookup(&[("PUSH_GATEWAY_URL", "https://push.example")]))
                .is_err()
        );

        let config = ServerConfig::from_lookup(lookup(&[
            ("PUSH_GATEWAY_URL", "https://push.example/send"),
            ("PUSH_GATEWAY_KEY", "secret"),
        ]))
        .unwrap();
        assert_eq!(config.gateway.unwrap().server_key, "secret");
    }
}
