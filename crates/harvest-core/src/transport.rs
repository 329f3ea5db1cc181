//! HTTP transport for the remote API.
//!
//! [`Transport`] performs exactly one attempt of one request. Retrying is the
//! job of [`crate::retry::RetryExecutor`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::redirect::Policy;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::error::{HarvestError, Result};
use crate::registry::{ApiRequest, Method};

/// Outcome of a single failed attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("HTTP {status}: {body}")]
    Status {
        status: u16,
        /// Seconds from a `Retry-After` header, when the server sent one.
        retry_after: Option<u64>,
        body: String,
    },
    #[error("invalid response body: {0}")]
    Decode(String),
    #[error("{0}")]
    Other(String),
}

impl CallError {
    pub fn status(status: u16) -> Self {
        Self::Status {
            status,
            retry_after: None,
            body: String::new(),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Status { status: 429, .. })
    }

    /// Timeouts, dropped connections and 5xx are transient. 429 is transient
    /// only when the caller opts in.
    pub fn is_transient(&self, retry_rate_limited: bool) -> bool {
        match self {
            Self::Timeout | Self::Connect(_) => true,
            Self::Status { status, .. } if *status >= 500 => true,
            Self::Status { status: 429, .. } => retry_rate_limited,
            _ => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status {
                retry_after: Some(secs),
                ..
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

/// One request, one attempt.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> std::result::Result<serde_json::Value, CallError>;
}

/// Token-authenticated JSON-over-HTTPS transport.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        Url::parse(base_url)
            .map_err(|e| HarvestError::Config(format!("invalid base_url {base_url}: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(Policy::limited(5))
            .build()
            .map_err(|e| HarvestError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url_for(&self, request: &ApiRequest) -> std::result::Result<Url, CallError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, request.path))
            .map_err(|e| CallError::Other(format!("invalid url: {e}")))?;
        if !request.query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(request.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> std::result::Result<serde_json::Value, CallError> {
        let url = self.url_for(request)?;
        debug!(endpoint = %request.endpoint, method = request.method.as_str(), %url, "sending request");

        let builder = match request.method {
            Method::Get => self.client.get(url),
        };
        let response = builder
            .header("x-auth-token", &self.token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(CallError::Status {
                status: status.as_u16(),
                retry_after,
                body,
            });
        }

        let bytes = response.bytes().await.map_err(classify_reqwest_error)?;
        if bytes.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| CallError::Decode(e.to_string()))
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> CallError {
    if err.is_timeout() {
        CallError::Timeout
    } else if err.is_builder() {
        CallError::Other(err.to_string())
    } else if err.is_decode() {
        CallError::Decode(err.to_string())
    } else {
        // connect refused, reset by peer, truncated body
        CallError::Connect(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(CallError::Timeout.is_transient(false));
        assert!(CallError::Connect("reset".into()).is_transient(false));
        assert!(CallError::status(503).is_transient(false));
        assert!(!CallError::status(404).is_transient(true));
        assert!(!CallError::status(401).is_transient(true));
        assert!(!CallError::Decode("eof".into()).is_transient(true));
    }

    #[test]
    fn test_rate_limit_is_opt_in() {
        let limited = CallError::Status {
            status: 429,
            retry_after: Some(3),
            body: String::new(),
        };
        assert!(limited.is_transient(true));
        assert!(!limited.is_transient(false));
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        assert!(HttpTransport::new("not a url", "t", Duration::from_secs(1)).is_err());
    }
}
