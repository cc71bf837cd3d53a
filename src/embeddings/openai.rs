//! OpenAI-compatible embeddings adapter.
//!
//! Calls `POST {api_url}/embeddings` once per [`EmbeddingFunction::embed`]
//! call and validates the payload before handing vectors back: entries are
//! reordered by `index`, every input must be covered exactly once, and every
//! vector must have the configured dimension. Any violation fails the whole
//! call.

use super::{EmbeddingError, EmbeddingFunction, EmbeddingVector};
use crate::config::EmbeddingConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| EmbeddingError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: embeddings_endpoint(&config.api_url),
            model: config.model.clone(),
            dimension: config.dimension,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl EmbeddingFunction for OpenAiEmbedder {
    fn name(&self) -> &'static str {
        "custom"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(endpoint = %self.endpoint, model = %self.model, count = texts.len(), "Requesting embeddings");
        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmbeddingsRequest {
                model: &self.model,
                input: texts,
                encoding_format: "float",
            })
            .send()
            .await
            .map_err(|e| EmbeddingError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| EmbeddingError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(EmbeddingError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        parse_embeddings(&body, texts.len(), self.dimension)
    }
}

/// Append `/embeddings` to the configured base URL unless already present.
pub fn embeddings_endpoint(api_url: &str) -> String {
    let trimmed = api_url.trim_end_matches('/');
    if trimmed.ends_with("/embeddings") {
        trimmed.to_string()
    } else {
        format!("{}/embeddings", trimmed)
    }
}

fn parse_embeddings(
    body: &[u8],
    expected_count: usize,
    dimension: usize,
) -> Result<Vec<EmbeddingVector>, EmbeddingError> {
    let mut response: EmbeddingsResponse =
        serde_json::from_slice(body).map_err(|e| EmbeddingError::InvalidPayload(e.to_string()))?;

    if response.data.len() != expected_count {
        return Err(EmbeddingError::InvalidPayload(format!(
            "expected {} embeddings, got {}",
            expected_count,
            response.data.len()
        )));
    }

    response.data.sort_by_key(|item| item.index);
    for (position, item) in response.data.iter().enumerate() {
        if item.index != position {
            return Err(EmbeddingError::InvalidPayload(format!(
                "embedding indices must cover 0..{} exactly once",
                expected_count
            )));
        }
        if item.embedding.len() != dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimension,
                actual: item.embedding.len(),
                index: position,
            });
        }
    }

    Ok(response.data.into_iter().map(|item| item.embedding).collect())
}
