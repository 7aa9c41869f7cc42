//! # archief-rag
//!
//! Conversational retrieval-augmented generation over an archival document
//! collection.
//!
//! ## Overview
//!
//! One user turn flows through the [`QueryPipeline`]:
//!
//! 1. **Rephrase** the question into a standalone query using the
//!    conversation history (skipped when the history is empty)
//! 2. **Embed** the rephrased query with an [`EmbeddingProvider`]
//! 3. **Retrieve** the nearest documents from a [`VectorStore`]
//! 4. **Render** the answer prompt from the history, documents and the
//!    original question
//! 5. **Generate** the answer, streamed chunk by chunk or in one call
//!
//! A [`ChatSession`] owns the history and folds the pipeline output into a
//! [`ResponseState`] (answer text, source paths, images, archive numbers)
//! through the [`ResponseAssembler`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use archief_rag::{ChatSession, InMemoryVectorStore, QueryPipeline, RagConfig};
//! use archief_rag::openai::{OpenAIChatModel, OpenAIEmbeddingProvider};
//!
//! let pipeline = QueryPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(OpenAIEmbeddingProvider::from_env()?))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .chat_model(Arc::new(OpenAIChatModel::from_env()?))
//!     .build()?;
//!
//! let mut session = ChatSession::default();
//! let reply = session.ask(&pipeline, "Wie was Godard van Reede?", |state| {
//!     print!("\r{}", state.text);
//! }).await;
//! ```
//!
//! ## Features
//!
//! - `openai` - OpenAI embeddings and chat completions
//! - `pinecone` - Pinecone vector index
//! - `full` - everything

pub mod assembler;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generator;
pub mod indexing;
pub mod inmemory;
pub mod llm;
pub mod mock;
pub mod pipeline;
pub mod prompt;
pub mod session;
pub mod vectorstore;

#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "pinecone")]
pub mod pinecone;

pub use assembler::{Attribution, ResponseAssembler, ResponseState, StreamEvent, UNKNOWN};
pub use config::{MetadataDiscipline, MetadataKeys, PresentationConfig, RagConfig, RagConfigBuilder};
pub use document::{
    ChatTurn, ConversationHistory, Document, RetrievalResult, Role, TurnAttachments,
};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result, Stage};
pub use generator::{ChunkCallback, Generation, Generator, Reply, ReplyMeta};
pub use indexing::DocumentWriter;
pub use inmemory::InMemoryVectorStore;
pub use llm::{
    ChatCompletion, ChatMessage, ChatModel, ChatRequest, Choice, ChunkMeta, ChunkStream,
    FinishReason, GenerationOptions, StreamingChunk, Usage,
};
pub use mock::{MockChatModel, MockEmbeddingProvider};
pub use pipeline::{PipelineRunResult, QueryPipeline, QueryPipelineBuilder};
pub use prompt::{PromptSet, PromptTemplate};
pub use session::{AssistantReply, ChatSession};
pub use vectorstore::VectorStore;
