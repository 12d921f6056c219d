use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{BindOutcome, BinderError, TopicBinder};
use crate::domain::EventId;
use crate::utils::http_client::{DEFAULT_REQUEST_TIMEOUT, build_http_client};
use crate::utils::truncate_string;
use crate::{Error, Result};

#[derive(Debug, Serialize)]
struct BindRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct BindResponse {
    outcome: BindOutcome,
}

/// Topic binder reached over HTTP (`POST /api/topics/{event_id}/bindings`).
#[derive(Debug, Clone)]
pub struct HttpTopicBinder {
    client: reqwest::Client,
    base_url: Url,
    bearer_token: Option<String>,
}

impl HttpTopicBinder {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::config(format!("Invalid binder URL: {}", e)))?;
        Ok(Self {
            client: build_http_client(DEFAULT_REQUEST_TIMEOUT)?,
            base_url,
            bearer_token: None,
        })
    }

    /// Attach the session token of a signed-in user; anonymous devices omit it.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    fn bindings_url(&self, event_id: &EventId) -> std::result::Result<Url, BinderError> {
        let path = format!("api/topics/{}/bindings", event_id.as_str());
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(&path).map_err(|e| BinderError::Rejected {
            status: 0,
            message: format!("invalid binder URL: {}", e),
        })
    }
}

#[async_trait]
impl TopicBinder for HttpTopicBinder {
    async fn bind(
        &self,
        token: &str,
        event_id: &EventId,
    ) -> std::result::Result<BindOutcome, BinderError> {
        let url = self.bindings_url(event_id)?;

        let mut request = self.client.post(url).json(&BindRequest { token });
        if let Some(bearer) = &self.bearer_token {
            request = request.bearer_auth(bearer);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BinderError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let fallback = if status == StatusCode::CREATED {
                BindOutcome::Created
            } else {
                BindOutcome::AlreadyBound
            };
            let outcome = response
                .json::<BindResponse>()
                .await
                .map(|body| body.outcome)
                .unwrap_or(fallback);
            return Ok(outcome);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read response body>".to_string());
        let message = truncate_string(&body, 300);
        let code = status.as_u16();

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Err(BinderError::Unavailable {
                status: code,
                message,
            })
        } else {
            Err(BinderError::Rejected {
                status: code,
                message,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bindings_url_respects_base_path() {
        let id = EventId::new("gala").unwrap();

        let binder = HttpTopicBinder::new("https://push.example").unwrap();
        assert_eq!(
            binder.bindings_url(&id).unwrap().as_str(),
            "https://push.example/api/topics/gala/bindings"
        );

        let binder = HttpTopicBinder::new("https://push.example/functions").unwrap();
        assert_eq!(
            binder.bindings_url(&id).unwrap().as_str(),
            "https://push.example/functions/api/topics/gala/bindings"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(HttpTopicBinder::new("not a url").is_err());
    }
}
