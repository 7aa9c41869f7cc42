//! In-memory vector index using cosine similarity.
//!
//! [`InMemoryVectorStore`] keeps documents in a `HashMap` behind a
//! `tokio::sync::RwLock`. It backs tests and offline runs of the pipeline.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::Document;
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

const BACKEND: &str = "InMemory";

/// An in-memory vector store using cosine similarity for search.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    documents: RwLock<HashMap<String, Document>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    /// Fetch a stored document by id.
    pub async fn get(&self, id: &str) -> Option<Document> {
        self.documents.read().await.get(id).cloned()
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn upsert(&self, documents: &[Document]) -> Result<usize> {
        if let Some(missing) = documents.iter().find(|d| d.embedding.is_none()) {
            return Err(RagError::VectorStoreError {
                backend: BACKEND.to_string(),
                message: format!("document '{}' has no embedding", missing.id),
            });
        }

        let mut store = self.documents.write().await;
        for document in documents {
            store.insert(document.id.clone(), document.clone());
        }
        Ok(documents.len())
    }

    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<Document>> {
        let store = self.documents.read().await;

        let mut scored: Vec<Document> = store
            .values()
            .filter_map(|document| {
                let stored = document.embedding.as_deref()?;
                let mut hit = document.clone();
                hit.score = Some(cosine_similarity(stored, embedding));
                hit.embedding = None;
                Some(hit)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}
