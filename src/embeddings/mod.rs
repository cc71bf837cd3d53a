// Embedding capability consumed by the vector-store client
pub mod openai;
pub mod provider;

pub use openai::OpenAiEmbedder;
pub use provider::{EmbeddingProvider, EmbeddingProviders};

use async_trait::async_trait;
use thiserror::Error;

pub type EmbeddingVector = Vec<f32>;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Failed to connect to embedding API: {0}")]
    Transport(String),

    #[error("Embedding API returned error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response format from embedding API: {0}")]
    InvalidPayload(String),

    #[error("Expected embedding dimension {expected}, got {actual} for input {index}")]
    DimensionMismatch {
        expected: usize,
        actual: usize,
        index: usize,
    },

    #[error("Embedding function '{name}' is not available: {reason}")]
    ProviderUnavailable { name: String, reason: String },

    #[error("Unknown embedding function '{name}'. Available options: {available:?}")]
    UnknownProvider { name: String, available: Vec<String> },
}

/// Turns texts into vectors, one per text, in input order.
#[async_trait]
pub trait EmbeddingFunction: Send + Sync {
    fn name(&self) -> &'static str;

    /// Length of every vector returned by [`EmbeddingFunction::embed`].
    fn dimension(&self) -> usize;

    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbeddingError>;
}
