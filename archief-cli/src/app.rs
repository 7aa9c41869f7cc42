//! Wiring of the hosted services into a pipeline and a document writer.

use std::sync::Arc;

use anyhow::{Context, Result};
use archief_rag::config::DEFAULT_EMBEDDING_DIMENSIONS;
use archief_rag::openai::{OpenAIChatModel, OpenAIEmbeddingProvider};
use archief_rag::pinecone::PineconeVectorStore;
use archief_rag::{
    ChatModel, ChatSession, DocumentWriter, EmbeddingProvider, PromptSet, QueryPipeline,
    VectorStore,
};
use tracing::info;

use crate::settings::Settings;

/// Clients for the embedding, vector index and chat services.
#[derive(Clone)]
pub struct Services {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub store: Arc<dyn VectorStore>,
    pub chat: Arc<dyn ChatModel>,
}

impl Services {
    /// Connect to OpenAI and Pinecone with `settings`.
    pub fn connect(settings: &Settings) -> Result<Self> {
        let mut embedder = OpenAIEmbeddingProvider::new(settings.openai.clone())
            .context("cannot create the embedding client (is OPENAI_API_KEY set?)")?;
        if settings.rag.embedding_dimensions != DEFAULT_EMBEDDING_DIMENSIONS {
            embedder = embedder.with_dimensions(settings.rag.embedding_dimensions);
        }
        let store = PineconeVectorStore::new(settings.pinecone.clone())
            .context("cannot create the Pinecone client (are PINECONE_API_KEY and PINECONE_INDEX_HOST set?)")?;
        let chat = OpenAIChatModel::new(settings.openai.clone())
            .context("cannot create the chat client")?;

        info!(
            chat_model = %settings.openai.model,
            embedding_model = %settings.openai.embedding_model,
            index_host = %settings.pinecone.index_host,
            "connected services"
        );
        Ok(Self { embedder: Arc::new(embedder), store: Arc::new(store), chat: Arc::new(chat) })
    }
}

/// Prompts from `settings.prompts_dir`, or the built-in set.
pub fn prompts(settings: &Settings) -> Result<PromptSet> {
    match &settings.prompts_dir {
        Some(dir) => PromptSet::from_dir(dir)
            .with_context(|| format!("cannot load prompts from {}", dir.display())),
        None => Ok(PromptSet::default()),
    }
}

pub fn build_pipeline(settings: &Settings, services: &Services) -> Result<QueryPipeline> {
    QueryPipeline::builder()
        .config(settings.rag.clone())
        .embedding_provider(services.embedder.clone())
        .vector_store(services.store.clone())
        .chat_model(services.chat.clone())
        .prompts(prompts(settings)?)
        .build()
        .context("invalid pipeline configuration")
}

pub fn build_writer(settings: &Settings, services: &Services) -> Result<DocumentWriter> {
    DocumentWriter::new(services.embedder.clone(), services.store.clone())
        .with_batch_size(settings.batch_size)
        .context("invalid ingest configuration")
}

/// A fresh conversation with the configured presentation.
pub fn new_session(settings: &Settings) -> ChatSession {
    ChatSession::new(settings.presentation.clone()).with_streaming(settings.streaming)
}
