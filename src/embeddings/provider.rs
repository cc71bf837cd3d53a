// Embedding provider selection
use super::{EmbeddingError, EmbeddingFunction, OpenAiEmbedder};
use crate::config::EmbeddingConfig;
use serde_json::{json, Value};
use std::sync::Arc;

/// Provider names understood by the vector store. `custom` is only offered
/// when the embedding endpoint is configured.
const STORE_PROVIDERS: [&str; 6] = ["default", "cohere", "openai", "jina", "voyageai", "roboflow"];

/// Closed set of embedding providers a collection can be created with.
///
/// Only [`EmbeddingProvider::Custom`] embeds inside this process; the other
/// variants are computed by the vector store's own client machinery and are
/// recorded by name.
#[derive(Clone)]
pub enum EmbeddingProvider {
    Default,
    Cohere,
    OpenAi,
    Jina,
    VoyageAi,
    Roboflow,
    Custom(Arc<OpenAiEmbedder>),
}

impl std::fmt::Debug for EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl EmbeddingProvider {
    pub fn name(&self) -> &'static str {
        match self {
            EmbeddingProvider::Default => "default",
            EmbeddingProvider::Cohere => "cohere",
            EmbeddingProvider::OpenAi => "openai",
            EmbeddingProvider::Jina => "jina",
            EmbeddingProvider::VoyageAi => "voyageai",
            EmbeddingProvider::Roboflow => "roboflow",
            EmbeddingProvider::Custom(_) => "custom",
        }
    }

    /// The in-process embedding function, if this provider has one.
    pub fn function(&self) -> Option<Arc<dyn EmbeddingFunction>> {
        match self {
            EmbeddingProvider::Custom(embedder) => Some(embedder.clone() as Arc<dyn EmbeddingFunction>),
            _ => None,
        }
    }

    /// Collection configuration entry describing this provider.
    pub fn configuration(&self) -> Value {
        match self {
            EmbeddingProvider::Custom(embedder) => json!({
                "type": "known",
                "name": "custom",
                "config": {
                    "api_url": embedder.endpoint(),
                    "model": embedder.model(),
                    "dimension": embedder.dimension(),
                }
            }),
            other => json!({ "type": "known", "name": other.name() }),
        }
    }
}

/// Providers offered in this process, resolved once at startup.
#[derive(Clone, Default)]
pub struct EmbeddingProviders {
    custom: Option<Arc<OpenAiEmbedder>>,
}

impl EmbeddingProviders {
    pub fn from_config(config: Option<&EmbeddingConfig>) -> Result<Self, EmbeddingError> {
        let custom = config
            .map(OpenAiEmbedder::new)
            .transpose()?
            .map(Arc::new);
        Ok(Self { custom })
    }

    pub fn has_custom(&self) -> bool {
        self.custom.is_some()
    }

    pub fn available(&self) -> Vec<&'static str> {
        let mut names = STORE_PROVIDERS.to_vec();
        if self.custom.is_some() {
            names.push("custom");
        }
        names
    }

    /// Pick a provider: explicit request, else `custom` when configured,
    /// else `default`.
    pub fn select(&self, requested: Option<&str>) -> Result<EmbeddingProvider, EmbeddingError> {
        let Some(name) = requested else {
            return Ok(match &self.custom {
                Some(embedder) => EmbeddingProvider::Custom(embedder.clone()),
                None => EmbeddingProvider::Default,
            });
        };

        match name {
            "default" => Ok(EmbeddingProvider::Default),
            "cohere" => Ok(EmbeddingProvider::Cohere),
            "openai" => Ok(EmbeddingProvider::OpenAi),
            "jina" => Ok(EmbeddingProvider::Jina),
            "voyageai" => Ok(EmbeddingProvider::VoyageAi),
            "roboflow" => Ok(EmbeddingProvider::Roboflow),
            "custom" => self
                .custom
                .clone()
                .map(EmbeddingProvider::Custom)
                .ok_or_else(|| EmbeddingError::ProviderUnavailable {
                    name: "custom".to_string(),
                    reason: "EMBEDDINGS_API_URL and EMBEDDING_MODEL must both be set".to_string(),
                }),
            other => Err(EmbeddingError::UnknownProvider {
                name: other.to_string(),
                available: self.available().into_iter().map(String::from).collect(),
            }),
        }
    }
}
