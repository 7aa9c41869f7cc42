//! Pinecone vector store using the REST data plane.
//!
//! This module is only available when the `pinecone` feature is enabled.
//! Document content is stored in the `content` metadata field next to the
//! document's own metadata.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::document::Document;
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

const BACKEND: &str = "Pinecone";
const API_VERSION: &str = "2024-07";
const CONTENT_FIELD: &str = "content";

/// Connection settings for one Pinecone index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PineconeConfig {
    #[serde(skip)]
    pub api_key: String,
    /// Data-plane host of the index, e.g.
    /// `https://archiefutrecht-abc123.svc.eu-west1-gcp.pinecone.io`.
    pub index_host: String,
    pub namespace: Option<String>,
    /// Request timeout in seconds. No timeout when unset.
    pub timeout_secs: Option<u64>,
}

impl PineconeConfig {
    pub fn new(api_key: impl Into<String>, index_host: impl Into<String>) -> Self {
        Self { api_key: api_key.into(), index_host: index_host.into(), ..Default::default() }
    }

    /// Read `PINECONE_API_KEY`, `PINECONE_INDEX_HOST` and, if set,
    /// `PINECONE_NAMESPACE`.
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| {
            std::env::var(name).map_err(|_| {
                RagError::ConfigError(format!("{name} environment variable not set"))
            })
        };
        Ok(Self {
            namespace: std::env::var("PINECONE_NAMESPACE").ok(),
            ..Self::new(var("PINECONE_API_KEY")?, var("PINECONE_INDEX_HOST")?)
        })
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    fn base_url(&self) -> String {
        let host = self.index_host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{host}")
        }
    }
}

/// A [`VectorStore`] backed by a hosted Pinecone index.
///
/// # Example
///
/// ```rust,ignore
/// use archief_rag::pinecone::{PineconeConfig, PineconeVectorStore};
///
/// let store = PineconeVectorStore::new(PineconeConfig::from_env()?)?;
/// let hits = store.search(&embedding, 10).await?;
/// ```
pub struct PineconeVectorStore {
    client: reqwest::Client,
    config: PineconeConfig,
}

impl PineconeVectorStore {
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the API key or index host is
    /// empty.
    pub fn new(config: PineconeConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(RagError::ConfigError("Pinecone API key must not be empty".to_string()));
        }
        if config.index_host.is_empty() {
            return Err(RagError::ConfigError("Pinecone index host must not be empty".to_string()));
        }
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| RagError::ConfigError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn error(message: String) -> RagError {
        RagError::VectorStoreError { backend: BACKEND.into(), message }
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let url = format!("{}/{path}", self.config.base_url());
        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.config.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(backend = BACKEND, error = %e, "request failed");
                Self::error(format!("request to {path} failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(backend = BACKEND, %status, path, "API error");
            return Err(Self::error(format!("{path} returned {status}: {body}")));
        }
        Ok(response)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<Match>,
}

#[derive(Deserialize)]
struct Match {
    id: String,
    score: Option<f32>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    upserted_count: Option<usize>,
}

impl From<Match> for Document {
    fn from(hit: Match) -> Self {
        let mut metadata: HashMap<String, Value> = hit.metadata.into_iter().collect();
        let content = match metadata.remove(CONTENT_FIELD) {
            Some(Value::String(content)) => content,
            _ => String::new(),
        };
        Document { id: hit.id, content, metadata, embedding: None, score: hit.score }
    }
}

/// Pinecone rejects null metadata values, so they are dropped.
fn stored_metadata(document: &Document) -> Map<String, Value> {
    let mut metadata: Map<String, Value> = document
        .metadata
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    metadata.insert(CONTENT_FIELD.to_string(), Value::String(document.content.clone()));
    metadata
}

#[async_trait]
impl VectorStore for PineconeVectorStore {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn upsert(&self, documents: &[Document]) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        let vectors = documents
            .iter()
            .map(|document| match document.embedding.as_deref() {
                Some(values) => {
                    Ok(UpsertVector { id: &document.id, values, metadata: stored_metadata(document) })
                }
                None => Err(Self::error(format!("document '{}' has no embedding", document.id))),
            })
            .collect::<Result<Vec<_>>>()?;

        let request = UpsertRequest { vectors, namespace: self.config.namespace.as_deref() };
        let response = self.post("vectors/upsert", &request).await?;
        let upserted: UpsertResponse = response
            .json()
            .await
            .map_err(|e| Self::error(format!("failed to parse upsert response: {e}")))?;

        let count = upserted.upserted_count.unwrap_or(documents.len());
        info!(backend = BACKEND, count, "upserted documents");
        Ok(count)
    }

    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<Document>> {
        let request = QueryRequest {
            vector: embedding,
            top_k,
            include_metadata: true,
            include_values: false,
            namespace: self.config.namespace.as_deref(),
        };
        let response = self.post("query", &request).await?;
        let result: QueryResponse = response
            .json()
            .await
            .map_err(|e| Self::error(format!("failed to parse query response: {e}")))?;

        debug!(backend = BACKEND, matches = result.matches.len(), top_k, "query completed");
        Ok(result.matches.into_iter().map(Document::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn match_moves_content_out_of_metadata() {
        let response: QueryResponse = serde_json::from_value(json!({
            "matches": [{
                "id": "doc-1",
                "score": 0.87,
                "metadata": {
                    "content": "Godard van Reede, heer van Amerongen",
                    "invnr": "INV-42",
                    "file_path": "brieven/1690.pdf"
                }
            }],
            "namespace": ""
        }))
        .unwrap();

        let document = response.matches.into_iter().map(Document::from).next().unwrap();
        assert_eq!(document.content, "Godard van Reede, heer van Amerongen");
        assert_eq!(document.score, Some(0.87));
        assert_eq!(document.meta_str("invnr").as_deref(), Some("INV-42"));
        assert!(!document.metadata.contains_key("content"));
    }

    #[test]
    fn stored_metadata_drops_nulls_and_adds_content() {
        let document = Document::new("a", "tekst")
            .with_meta("representatieve\nafbeelding", Value::Null)
            .with_meta("invnr", "INV-1");
        let metadata = stored_metadata(&document);
        assert_eq!(metadata.get("content"), Some(&json!("tekst")));
        assert!(!metadata.contains_key("representatieve\nafbeelding"));
        assert_eq!(metadata.len(), 2);
    }

    #[test]
    fn query_request_uses_camel_case() {
        let body = serde_json::to_value(QueryRequest {
            vector: &[0.1, 0.2],
            top_k: 10,
            include_metadata: true,
            include_values: false,
            namespace: None,
        })
        .unwrap();
        assert_eq!(body["topK"], 10);
        assert_eq!(body["includeMetadata"], true);
        assert!(body.get("namespace").is_none());
    }

    #[test]
    fn bare_host_gets_https_scheme() {
        let config = PineconeConfig::new("key", "archief-abc.svc.pinecone.io/");
        assert_eq!(config.base_url(), "https://archief-abc.svc.pinecone.io");
    }

    #[test]
    fn empty_host_is_rejected() {
        let err = PineconeVectorStore::new(PineconeConfig::new("key", "")).err().unwrap();
        assert!(err.is_config());
    }
}
