//! HTTP side of the bridge.
//!
//! [`Upstream`] is the seam between request routing and the network: the
//! forwarder only ever sees a JSON body or a classified [`BridgeError`].

use crate::config::BridgeConfig;
use crate::errors::{BridgeError, BridgeResult};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use std::error::Error as _;
use std::time::Duration;
use tracing::{debug, warn};

/// Longest slice of a non-JSON error body carried into an error message.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// One HTTP call against the remote base URL.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamCall {
    Get { path: String },
    Post { path: String, body: Value },
}

impl UpstreamCall {
    pub fn path(&self) -> &str {
        match self {
            UpstreamCall::Get { path } | UpstreamCall::Post { path, .. } => path,
        }
    }
}

#[async_trait]
pub trait Upstream: Send + Sync {
    /// Perform a single attempt. Retrying is the caller's concern.
    async fn send(&self, call: &UpstreamCall) -> BridgeResult<Value>;
}

/// reqwest-backed upstream shared by all in-flight requests.
pub struct HttpUpstream {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpUpstream {
    pub fn new(config: &BridgeConfig) -> BridgeResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = &config.auth_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
                BridgeError::Configuration("Auth token contains invalid header characters".into())
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BridgeError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.remote_url.clone(),
            timeout: config.request_timeout,
        })
    }

    fn classify_error(&self, error: reqwest::Error) -> BridgeError {
        if error.is_timeout() {
            BridgeError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }
        } else if error.is_builder() {
            BridgeError::Internal(format!("Failed to build request: {}", error))
        } else if error.is_decode() {
            BridgeError::MalformedResponse(error.to_string())
        } else {
            // Refused, reset, aborted and closed connections all end up here.
            BridgeError::Transport {
                reason: error_chain(&error),
            }
        }
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn send(&self, call: &UpstreamCall) -> BridgeResult<Value> {
        let url = format!("{}{}", self.base_url, call.path());
        let request = match call {
            UpstreamCall::Get { .. } => self.client.get(&url),
            UpstreamCall::Post { body, .. } => self.client.post(&url).json(body),
        };

        debug!(url = %url, "Calling remote");
        let response = request.send().await.map_err(|e| self.classify_error(e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.classify_error(e))?;

        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "Remote returned error status");
            return Err(BridgeError::Upstream {
                status: status.as_u16(),
                message: error_message(&body, status),
            });
        }

        serde_json::from_str(&body).map_err(|e| BridgeError::MalformedResponse(e.to_string()))
    }
}

/// Pull a human-readable message out of an error body.
pub(crate) fn error_message(body: &str, status: reqwest::StatusCode) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["detail", "message", "error"] {
            match value.get(key) {
                Some(Value::String(msg)) => return msg.clone(),
                Some(Value::Object(obj)) => {
                    if let Some(Value::String(msg)) = obj.get("message") {
                        return msg.clone();
                    }
                }
                _ => {}
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        status.canonical_reason().unwrap_or("no response body").to_string()
    } else {
        trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect()
    }
}

fn error_chain(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
