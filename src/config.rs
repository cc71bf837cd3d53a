// Bridge Configuration
use crate::cli::Cli;
use crate::errors::{BridgeError, BridgeResult};
use crate::forwarder::RetryPolicy;
use crate::mcp::framing::MAX_LINE_BYTES;
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_CONCURRENCY: usize = 16;
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;

/// Startup configuration of the stdio bridge. Immutable once built.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Absolute http(s) base URL, without trailing slash.
    pub remote_url: String,
    pub auth_token: Option<String>,
    pub debug: bool,
    /// Deadline for a single HTTP attempt.
    pub request_timeout: Duration,
    pub max_concurrency: usize,
    pub shutdown_grace: Duration,
    pub retry: RetryPolicy,
    /// Input lines longer than this are skipped as malformed.
    pub max_line_bytes: usize,
}

impl BridgeConfig {
    pub fn new(remote_url: &str, auth_token: Option<String>) -> BridgeResult<Self> {
        let url = reqwest::Url::parse(remote_url).map_err(|e| {
            BridgeError::Configuration(format!("Invalid remote URL '{}': {}", remote_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(BridgeError::Configuration(format!(
                "Remote URL must use http or https, got '{}'",
                url.scheme()
            )));
        }

        Ok(Self {
            remote_url: remote_url.trim_end_matches('/').to_string(),
            auth_token: auth_token.filter(|t| !t.trim().is_empty()),
            debug: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            retry: RetryPolicy::default(),
            max_line_bytes: MAX_LINE_BYTES,
        })
    }

    pub fn from_cli(cli: &Cli) -> BridgeResult<Self> {
        let remote_url = cli.remote_url.as_deref().ok_or_else(|| {
            BridgeError::Configuration(
                "Remote URL is required (--remote-url or MCP_REMOTE_URL)".to_string(),
            )
        })?;

        if cli.timeout_secs == 0 {
            return Err(BridgeError::Configuration("--timeout-secs must be positive".into()));
        }
        if cli.max_concurrency == 0 {
            return Err(BridgeError::Configuration("--max-concurrency must be positive".into()));
        }

        let mut config = Self::new(remote_url, cli.auth_token.clone())?;
        config.debug = cli.debug;
        config.request_timeout = Duration::from_secs(cli.timeout_secs);
        config.max_concurrency = cli.max_concurrency;
        config.shutdown_grace = Duration::from_secs(cli.shutdown_grace_secs);
        config.retry.max_delay = Duration::from_millis(cli.max_retry_delay_ms)
            .max(config.retry.initial_delay);
        Ok(config)
    }
}

/// Settings for the OpenAI-compatible embedding endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingConfig {
    pub api_url: String,
    pub model: String,
    pub dimension: usize,
}

impl EmbeddingConfig {
    /// Reads `EMBEDDINGS_API_URL`, `EMBEDDING_MODEL` and `EMBEDDING_DIMENSION`.
    ///
    /// Returns `Ok(None)` when the URL or the model is missing: the custom
    /// embedding provider is then simply not offered.
    pub fn from_env() -> BridgeResult<Option<Self>> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> BridgeResult<Option<Self>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let (api_url, model) = match (non_empty("EMBEDDINGS_API_URL"), non_empty("EMBEDDING_MODEL")) {
            (Some(url), Some(model)) => (url, model),
            _ => return Ok(None),
        };

        let dimension = match non_empty("EMBEDDING_DIMENSION") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|d| *d > 0)
                .ok_or_else(|| {
                    BridgeError::Configuration(format!(
                        "EMBEDDING_DIMENSION must be a positive integer, got '{}'",
                        raw
                    ))
                })?,
            None => DEFAULT_EMBEDDING_DIMENSION,
        };

        Ok(Some(Self { api_url, model, dimension }))
    }
}
