//! Write path: embed documents and store them in the vector index.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::document::Document;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// Default number of documents embedded per provider call.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Embeds document contents and upserts them, overwriting documents that
/// share an id.
pub struct DocumentWriter {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    batch_size: usize,
}

impl DocumentWriter {
    pub fn new(embedding_provider: Arc<dyn EmbeddingProvider>, vector_store: Arc<dyn VectorStore>) -> Self {
        Self { embedding_provider, vector_store, batch_size: DEFAULT_BATCH_SIZE }
    }

    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `batch_size` is zero.
    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(RagError::ConfigError("batch_size must be greater than zero".to_string()));
        }
        self.batch_size = batch_size;
        Ok(self)
    }

    /// Embed and store `documents`, returning how many were written.
    ///
    /// Batches are written as they are embedded, so a failure part-way leaves
    /// earlier batches stored.
    ///
    /// # Errors
    ///
    /// Returns the first embedding or vector store error, naming the first
    /// document id of the failing batch.
    pub async fn write(&self, documents: Vec<Document>) -> Result<usize> {
        if documents.is_empty() {
            info!(written = 0, "nothing to write");
            return Ok(0);
        }

        let mut written = 0;
        for batch in documents.chunks(self.batch_size) {
            let first_id = batch.first().map(|d| d.id.as_str()).unwrap_or_default();
            let texts: Vec<&str> = batch.iter().map(|d| d.content.as_str()).collect();

            let embeddings = self.embedding_provider.embed_batch(&texts).await.map_err(|e| {
                error!(document.id = first_id, error = %e, "embedding failed during write");
                e
            })?;
            if embeddings.len() != batch.len() {
                return Err(RagError::EmbeddingError {
                    provider: self.embedding_provider.name().to_string(),
                    message: format!(
                        "returned {} embeddings for {} documents",
                        embeddings.len(),
                        batch.len()
                    ),
                });
            }

            let embedded: Vec<Document> = batch
                .iter()
                .cloned()
                .zip(embeddings)
                .map(|(document, embedding)| document.with_embedding(embedding))
                .collect();

            written += self.vector_store.upsert(&embedded).await.map_err(|e| {
                error!(document.id = first_id, error = %e, "upsert failed during write");
                e
            })?;
            debug!(batch_len = embedded.len(), written, "wrote batch");
        }

        info!(written, backend = self.vector_store.name(), "documents written");
        Ok(written)
    }
}
