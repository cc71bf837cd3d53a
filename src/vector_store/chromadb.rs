//! Chroma v2 HTTP client for collection management.
//!
//! Collections record the embedding provider chosen at creation time. When
//! that provider is `custom`, documents and query texts are embedded in this
//! process before they are sent to Chroma.

use crate::{
    embeddings::{EmbeddingError, EmbeddingFunction, EmbeddingProviders, EmbeddingVector},
    errors::{BridgeError, BridgeResult},
    forwarder::upstream::error_message,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_TENANT: &str = "default_tenant";
pub const DEFAULT_DATABASE: &str = "default_database";

pub struct ChromaClient {
    client: reqwest::Client,
    base_url: String,
    tenant: String,
    database: String,
    api_key: Option<String>,
    providers: EmbeddingProviders,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub configuration_json: Option<Value>,
}

impl CollectionInfo {
    /// Name of the embedding function recorded in the collection configuration.
    pub fn embedding_function(&self) -> Option<&str> {
        self.configuration_json
            .as_ref()?
            .get("embedding_function")?
            .get("name")?
            .as_str()
    }
}

#[derive(Debug, Serialize)]
struct ChromaAddRequest<'a> {
    ids: &'a [String],
    embeddings: Vec<EmbeddingVector>,
    documents: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    metadatas: Option<&'a [Value]>,
}

#[derive(Debug, Serialize)]
struct ChromaQueryRequest<'a> {
    query_embeddings: Vec<EmbeddingVector>,
    n_results: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    r#where: Option<&'a Value>,
    include: Vec<&'static str>,
}

/// Chroma returns one nested list per query text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub ids: Vec<Vec<String>>,
    #[serde(default)]
    pub distances: Option<Vec<Vec<f32>>>,
    #[serde(default)]
    pub documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    pub metadatas: Option<Vec<Vec<Option<HashMap<String, Value>>>>>,
}

impl ChromaClient {
    pub fn new(base_url: &str, providers: EmbeddingProviders) -> BridgeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BridgeError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tenant: DEFAULT_TENANT.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            api_key: None,
            providers,
        })
    }

    pub fn with_tenant(mut self, tenant: &str, database: &str) -> Self {
        self.tenant = tenant.to_string();
        self.database = database.to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }

    fn collections_url(&self) -> String {
        format!(
            "{}/api/v2/tenants/{}/databases/{}/collections",
            self.base_url, self.tenant, self.database
        )
    }

    /// Create a collection, choosing its embedding provider once.
    pub async fn create_collection(
        &self,
        name: &str,
        embedding_function: Option<&str>,
        metadata: Option<Value>,
    ) -> BridgeResult<CollectionInfo> {
        let provider = self.providers.select(embedding_function)?;
        info!(collection = name, provider = provider.name(), "Creating collection");

        let body = json!({
            "name": name,
            "metadata": metadata,
            "configuration": { "embedding_function": provider.configuration() },
            "get_or_create": false,
        });
        self.send(self.client.post(self.collections_url()).json(&body)).await
    }

    pub async fn get_collection(&self, name: &str) -> BridgeResult<CollectionInfo> {
        let url = format!("{}/{}", self.collections_url(), name);
        self.send(self.client.get(url)).await
    }

    /// Add documents, embedding them with the collection's provider.
    /// Returns the number of documents added.
    pub async fn add_documents(
        &self,
        collection: &str,
        ids: &[String],
        documents: &[String],
        metadatas: Option<&[Value]>,
    ) -> BridgeResult<usize> {
        if documents.is_empty() {
            return Err(BridgeError::InvalidParams("The 'documents' list cannot be empty.".into()));
        }
        if ids.is_empty() {
            return Err(BridgeError::InvalidParams("The 'ids' list is required and cannot be empty.".into()));
        }
        if ids.iter().any(|id| id.trim().is_empty()) {
            return Err(BridgeError::InvalidParams("IDs cannot be empty strings.".into()));
        }
        if ids.len() != documents.len() {
            return Err(BridgeError::InvalidParams(format!(
                "Number of ids ({}) must match number of documents ({}).",
                ids.len(),
                documents.len()
            )));
        }
        if let Some(metadatas) = metadatas {
            if metadatas.len() != documents.len() {
                return Err(BridgeError::InvalidParams(format!(
                    "Number of metadatas ({}) must match number of documents ({}).",
                    metadatas.len(),
                    documents.len()
                )));
            }
        }

        let info = self.get_collection(collection).await?;
        let embeddings = self.embedder_for(&info)?.embed(documents).await?;

        let url = format!("{}/{}/add", self.collections_url(), info.id);
        let request = ChromaAddRequest {
            ids,
            embeddings,
            documents,
            metadatas,
        };
        let _: Value = self.send(self.client.post(url).json(&request)).await?;
        debug!(collection, count = ids.len(), "Added documents");
        Ok(ids.len())
    }

    pub async fn query_documents(
        &self,
        collection: &str,
        query_texts: &[String],
        n_results: usize,
        r#where: Option<&Value>,
    ) -> BridgeResult<QueryResult> {
        if query_texts.is_empty() {
            return Err(BridgeError::InvalidParams("The 'query_texts' list cannot be empty.".into()));
        }

        let info = self.get_collection(collection).await?;
        let query_embeddings = self.embedder_for(&info)?.embed(query_texts).await?;

        let url = format!("{}/{}/query", self.collections_url(), info.id);
        let request = ChromaQueryRequest {
            query_embeddings,
            n_results,
            r#where,
            include: vec!["documents", "metadatas", "distances"],
        };
        self.send(self.client.post(url).json(&request)).await
    }

    /// Only collections created with `custom` can be embedded here; a
    /// collection without a recorded provider uses the same selection rule
    /// as creation.
    fn embedder_for(&self, info: &CollectionInfo) -> BridgeResult<Arc<dyn EmbeddingFunction>> {
        let provider = self.providers.select(info.embedding_function())?;
        provider.function().ok_or_else(|| {
            BridgeError::from(EmbeddingError::ProviderUnavailable {
                name: provider.name().to_string(),
                reason: format!(
                    "collection '{}' is embedded by the vector store client, not by this process",
                    info.name
                ),
            })
        })
    }

    async fn send<T>(&self, request: reqwest::RequestBuilder) -> BridgeResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let request = match &self.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        };

        let response = request.send().await.map_err(|e| BridgeError::Transport {
            reason: e.to_string(),
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|e| BridgeError::Transport {
            reason: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(BridgeError::Upstream {
                status: status.as_u16(),
                message: error_message(&body, status),
            });
        }

        serde_json::from_str(&body).map_err(|e| BridgeError::MalformedResponse(e.to_string()))
    }
}
