//! Error types for the `archief-rag` crate.

use std::fmt;

use thiserror::Error;

/// The pipeline stage that produced a [`RagError::StageFailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Rendering the rephrase prompt or calling the rephrase model.
    Rephrase,
    /// Embedding the rephrased query.
    Embed,
    /// Searching the vector index.
    Retrieve,
    /// Rendering the answer prompt.
    RenderAnswer,
    /// Generating the answer.
    Generate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Rephrase => "rephrase",
            Stage::Embed => "embed",
            Stage::Retrieve => "retrieve",
            Stage::RenderAnswer => "render_answer",
            Stage::Generate => "generate",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in RAG operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The language model call failed.
    #[error("Model error ({provider}): {message}")]
    ModelError {
        /// The chat model provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A prompt template failed to compile or render.
    #[error("Prompt error: {0}")]
    PromptError(String),

    /// A configuration validation error. Raised before any network call.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A pipeline stage failed and the run was aborted.
    #[error("{stage} stage failed: {source}")]
    StageFailed {
        /// The stage that failed.
        stage: Stage,
        /// The underlying failure.
        #[source]
        source: Box<RagError>,
    },
}

impl RagError {
    /// Wrap this error as the failure of a pipeline stage.
    pub fn in_stage(self, stage: Stage) -> Self {
        RagError::StageFailed { stage, source: Box::new(self) }
    }

    /// Returns `true` for invalid configuration, including when it surfaced
    /// through a pipeline stage.
    pub fn is_config(&self) -> bool {
        match self {
            RagError::ConfigError(_) => true,
            RagError::StageFailed { source, .. } => source.is_config(),
            _ => false,
        }
    }

    /// The stage that failed, if this error came out of the pipeline.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            RagError::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
