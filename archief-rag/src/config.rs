//! Configuration for the query pipeline and the response presentation.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Default number of documents returned by one retrieval.
pub const DEFAULT_TOP_K: usize = 10;

/// Dimensionality of `text-embedding-3-small`.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;

/// Configuration parameters for the query pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum number of documents returned by one retrieval.
    pub top_k: usize,
    /// Length every query embedding must have.
    pub embedding_dimensions: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self { top_k: DEFAULT_TOP_K, embedding_dimensions: DEFAULT_EMBEDDING_DIMENSIONS }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check the invariants enforced by [`RagConfigBuilder::build`].
    ///
    /// Useful for configurations that were deserialized rather than built.
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if self.embedding_dimensions == 0 {
            return Err(RagError::ConfigError(
                "embedding_dimensions must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the number of top results to return from vector search.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the expected embedding dimensionality.
    pub fn embedding_dimensions(mut self, dims: usize) -> Self {
        self.config.embedding_dimensions = dims;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `top_k == 0`
    /// - `embedding_dimensions == 0`
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// How extracted image paths and archive numbers are collected across the
/// retrieved documents of one turn.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MetadataDiscipline {
    /// Each list is deduplicated on its own, keeping first-seen order.
    #[default]
    Deduplicated,
    /// One entry per document in `source_paths` and `archive_numbers`.
    /// Documents without an image add nothing to `image_paths`, so that list
    /// can be shorter and is not index-aligned with the others; use
    /// `ResponseState::attributions` for the per-document pairing.
    Positional,
}

impl std::str::FromStr for MetadataDiscipline {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deduplicated" | "dedup" | "set" => Ok(Self::Deduplicated),
            "positional" | "paired" => Ok(Self::Positional),
            other => Err(RagError::ConfigError(format!(
                "unknown metadata discipline '{other}', expected 'deduplicated' or 'positional'"
            ))),
        }
    }
}

/// Metadata keys read from retrieved documents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MetadataKeys {
    /// Key holding the representative image URL.
    pub image: String,
    /// Key holding the archive inventory number.
    pub archive_number: String,
    /// Key holding the source file path.
    pub file_path: String,
}

impl Default for MetadataKeys {
    fn default() -> Self {
        // The image key contains a newline; that is how the collection was indexed.
        Self {
            image: "representatieve\nafbeelding".to_string(),
            archive_number: "invnr".to_string(),
            file_path: "file_path".to_string(),
        }
    }
}

/// Presentation settings for the response assembler.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PresentationConfig {
    pub discipline: MetadataDiscipline,
    pub keys: MetadataKeys,
}
