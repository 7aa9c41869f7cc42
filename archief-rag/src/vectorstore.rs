//! Vector index trait for storing and searching document embeddings.

use async_trait::async_trait;

use crate::document::Document;
use crate::error::Result;

/// A document store searchable by embedding similarity.
///
/// The index identity (hosted index, namespace) is fixed when the store is
/// constructed; the query core only reads from it.
///
/// # Example
///
/// ```rust,ignore
/// use archief_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.upsert(&documents).await?;
/// let hits = store.search(&query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend name used in logs and errors.
    fn name(&self) -> &str;

    /// Write documents, overwriting any stored document with the same id.
    ///
    /// Every document must carry an embedding.
    async fn upsert(&self, documents: &[Document]) -> Result<usize>;

    /// Return at most `top_k` documents ordered by descending similarity,
    /// each with its score set.
    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<Document>>;
}
