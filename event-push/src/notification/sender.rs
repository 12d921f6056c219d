use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::config::GatewayConfig;
use crate::utils::http_client::{DEFAULT_REQUEST_TIMEOUT, build_http_client};
use crate::utils::truncate_string;
use crate::{Error, Result};

/// Longest `Retry-After` the sender is willing to wait out inline.
const MAX_INLINE_RETRY_AFTER: Duration = Duration::from_secs(30);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The token is gone for good; remove its bindings.
    #[error("push token is no longer registered")]
    Unregistered,

    #[error("push gateway throttled the request")]
    Throttled { retry_after: Option<Duration> },

    #[error("push gateway rejected the request: status {status} body {body}")]
    Rejected { status: u16, body: String },

    #[error("push gateway request failed: {0}")]
    Transport(String),
}

/// Delivers one message to one device token.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, token: &str, data: &Value) -> std::result::Result<(), SendError>;
}

#[derive(Debug, Serialize)]
struct GatewayMessage<'a> {
    to: &'a str,
    data: &'a Value,
}

/// Sends through an HTTP push gateway (`POST {url}` with `{to, data}`).
#[derive(Debug, Clone)]
pub struct HttpPushSender {
    client: reqwest::Client,
    url: Url,
    server_key: String,
}

impl HttpPushSender {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let url = Url::parse(&config.url)
            .map_err(|e| Error::config(format!("Invalid PUSH_GATEWAY_URL: {}", e)))?;
        Ok(Self {
            client: build_http_client(DEFAULT_REQUEST_TIMEOUT)?,
            url,
            server_key: config.server_key.clone(),
        })
    }

    async fn post(
        &self,
        message: &GatewayMessage<'_>,
    ) -> std::result::Result<reqwest::Response, SendError> {
        self.client
            .post(self.url.clone())
            .header("Authorization", format!("key={}", self.server_key))
            .json(message)
            .send()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))
    }
}

#[async_trait]
impl PushSender for HttpPushSender {
    async fn send(&self, token: &str, data: &Value) -> std::result::Result<(), SendError> {
        let message = GatewayMessage { to: token, data };

        let mut response = self.post(&message).await?;
        if response.status().is_success() {
            return Ok(());
        }

        if response.status() == StatusCode::TOO_MANY_REQUESTS
            && let Some(delay) = retry_after_delay(&response)
            && delay <= MAX_INLINE_RETRY_AFTER
        {
            tokio::time::sleep(delay).await;
            response = self.post(&message).await?;
        }

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(SendError::Unregistered);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SendError::Throttled {
                retry_after: retry_after_delay(&response),
            });
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read response body>".to_string());
        Err(SendError::Rejected {
            status: status.as_u16(),
            body: truncate_string(&body, 500),
        })
    }
}

fn retry_after_delay(response: &reqwest::Response) -> Option<Duration> {
    let header = response.headers().get(reqwest::header::RETRY_AFTER)?;
    parse_retry_after(header.to_str().ok()?)
}

/// Only the delta-seconds form is understood.
fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    value.parse::<u64>().ok().map(Duration::from_secs)
}
