//! Query-answer pipeline.
//!
//! The [`QueryPipeline`] runs one user turn through five stages in order:
//! rephrase → embed → retrieve → render answer prompt → generate. It keeps no
//! state between turns; the caller passes the conversation history in.
//!
//! # Example
//!
//! ```rust,ignore
//! use archief_rag::{QueryPipeline, RagConfig, InMemoryVectorStore, ConversationHistory};
//!
//! let pipeline = QueryPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(embedder))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .chat_model(Arc::new(model))
//!     .build()?;
//!
//! let result = pipeline.run("Wie was Godard van Reede?", &ConversationHistory::new(), None).await?;
//! println!("{}", result.answer_text);
//! ```

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::config::RagConfig;
use crate::document::{ConversationHistory, Document, RetrievalResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result, Stage};
use crate::generator::{ChunkCallback, Generator, Reply, ReplyMeta};
use crate::llm::{ChatModel, GenerationOptions};
use crate::prompt::{PromptSet, PromptTemplate};
use crate::vectorstore::VectorStore;

/// Outcome of one [`QueryPipeline::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRunResult {
    /// The standalone query that was embedded. Equals the input when the
    /// history was empty.
    pub rephrased_query: String,
    /// Retrieved documents in relevance order.
    pub documents: RetrievalResult,
    pub answer_text: String,
    pub answer_meta: ReplyMeta,
    /// The answer was cut short (length limit or content filter).
    pub degraded: bool,
}

/// The query-answer pipeline. Construct one via [`QueryPipeline::builder()`].
pub struct QueryPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    rephraser: Generator,
    answerer: Generator,
    rephrase_template: PromptTemplate,
    answer_template: PromptTemplate,
}

impl QueryPipeline {
    /// Create a new [`QueryPipelineBuilder`].
    pub fn builder() -> QueryPipelineBuilder {
        QueryPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Run one turn.
    ///
    /// When `on_chunk` is set the answer is streamed through it chunk by
    /// chunk; otherwise a single blocking call is made.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::StageFailed`] naming the first stage that failed.
    /// No partial result is produced.
    pub async fn run(
        &self,
        query: &str,
        history: &ConversationHistory,
        on_chunk: Option<&mut ChunkCallback<'_>>,
    ) -> Result<PipelineRunResult> {
        let history_view = history.template_view();

        // 1. Rephrase
        let rephrased_query = self.rephrase(query, history, &history_view).await.map_err(|e| {
            error!(error = %e, "rephrase failed");
            e.in_stage(Stage::Rephrase)
        })?;

        // 2. Embed
        let embedding = self.embed(&rephrased_query).await.map_err(|e| {
            error!(error = %e, "query embedding failed");
            e.in_stage(Stage::Embed)
        })?;

        // 3. Retrieve
        let mut documents =
            self.vector_store.search(&embedding, self.config.top_k).await.map_err(|e| {
                error!(backend = self.vector_store.name(), error = %e, "vector search failed");
                e.in_stage(Stage::Retrieve)
            })?;
        documents.truncate(self.config.top_k);
        info!(document_count = documents.len(), top_k = self.config.top_k, "retrieved documents");

        // 4. Render answer prompt with the original query
        let prompt = self.render_answer(query, &history_view, &documents).map_err(|e| {
            error!(error = %e, "answer prompt rendering failed");
            e.in_stage(Stage::RenderAnswer)
        })?;

        // 5. Generate
        let reply = self.answer(&prompt, on_chunk).await.map_err(|e| {
            error!(error = %e, "answer generation failed");
            e.in_stage(Stage::Generate)
        })?;

        info!(
            answer_len = reply.text.len(),
            degraded = reply.degraded,
            rephrased = rephrased_query != query,
            "query completed"
        );

        Ok(PipelineRunResult {
            rephrased_query,
            documents,
            answer_text: reply.text,
            answer_meta: reply.meta,
            degraded: reply.degraded,
        })
    }

    async fn rephrase(
        &self,
        query: &str,
        history: &ConversationHistory,
        history_view: &Value,
    ) -> Result<String> {
        if history.is_empty() {
            debug!("empty history, using the query as is");
            return Ok(query.to_string());
        }

        let mut variables = Map::new();
        variables.insert("query".to_string(), Value::String(query.to_string()));
        variables.insert("history".to_string(), history_view.clone());
        let prompt = self.rephrase_template.render(&variables)?;

        let single = GenerationOptions::default().with_n(1);
        let reply = first_reply(
            &self.rephraser,
            self.rephraser.generate(&prompt, None, None, Some(&single)).await?.into_first(),
        )?;

        let rephrased = reply.text.trim();
        if rephrased.is_empty() {
            warn!(query, "rephrase returned no text, using the original query");
            return Ok(query.to_string());
        }
        info!(turns = history.len(), rephrased, "rephrased query");
        Ok(rephrased.to_string())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = self.embedding_provider.embed(text).await?;
        if embedding.len() != self.config.embedding_dimensions {
            return Err(RagError::EmbeddingError {
                provider: self.embedding_provider.name().to_string(),
                message: format!(
                    "expected {} dimensions, got {}",
                    self.config.embedding_dimensions,
                    embedding.len()
                ),
            });
        }
        debug!(dimensions = embedding.len(), "embedded query");
        Ok(embedding)
    }

    fn render_answer(&self, query: &str, history_view: &Value, documents: &[Document]) -> Result<String> {
        let mut variables = Map::new();
        variables.insert("query".to_string(), Value::String(query.to_string()));
        variables.insert("history".to_string(), history_view.clone());
        variables.insert(
            "documents".to_string(),
            Value::Array(documents.iter().map(Document::template_view).collect()),
        );
        self.answer_template.render(&variables)
    }

    async fn answer(&self, prompt: &str, on_chunk: Option<&mut ChunkCallback<'_>>) -> Result<Reply> {
        let generation = self.answerer.generate(prompt, None, on_chunk, None).await?;
        first_reply(&self.answerer, generation.into_first())
    }
}

fn first_reply(generator: &Generator, reply: Option<Reply>) -> Result<Reply> {
    reply.ok_or_else(|| RagError::ModelError {
        provider: generator.model_name().to_string(),
        message: "generation produced no reply".to_string(),
    })
}

/// Builder for constructing a [`QueryPipeline`].
///
/// `embedding_provider`, `vector_store` and `chat_model` are required.
/// `rephrase_model` defaults to the chat model, `prompts` to the built-in
/// [`PromptSet`] and `config` to [`RagConfig::default()`].
#[derive(Default)]
pub struct QueryPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chat_model: Option<Arc<dyn ChatModel>>,
    rephrase_model: Option<Arc<dyn ChatModel>>,
    prompts: Option<PromptSet>,
    answer_options: GenerationOptions,
}

impl QueryPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Set the model that answers, and rephrases unless
    /// [`rephrase_model`](Self::rephrase_model) is set.
    pub fn chat_model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.chat_model = Some(model);
        self
    }

    /// Use a separate model for the rephrase stage.
    pub fn rephrase_model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.rephrase_model = Some(model);
        self
    }

    pub fn prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = Some(prompts);
        self
    }

    /// Sampling options for the answer stage.
    pub fn answer_options(mut self, options: GenerationOptions) -> Self {
        self.answer_options = options;
        self
    }

    /// Build the [`QueryPipeline`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing, the
    /// configuration is invalid, or the embedding provider's dimensionality
    /// disagrees with the configuration. Returns [`RagError::PromptError`] if
    /// a template does not compile.
    pub fn build(self) -> Result<QueryPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;
        let chat_model = self
            .chat_model
            .ok_or_else(|| RagError::ConfigError("chat_model is required".to_string()))?;

        if embedding_provider.dimensions() != config.embedding_dimensions {
            return Err(RagError::ConfigError(format!(
                "embedding provider '{}' produces {} dimensions but embedding_dimensions is {}",
                embedding_provider.name(),
                embedding_provider.dimensions(),
                config.embedding_dimensions
            )));
        }

        let prompts = self.prompts.unwrap_or_default();
        let (rephrase_template, answer_template) = prompts.compile()?;

        let rephraser = Generator::new(self.rephrase_model.unwrap_or_else(|| chat_model.clone()));
        let answerer = Generator::new(chat_model)
            .with_system_prompt(prompts.system_prompt)
            .with_options(self.answer_options);

        Ok(QueryPipeline {
            config,
            embedding_provider,
            vector_store,
            rephraser,
            answerer,
            rephrase_template,
            answer_template,
        })
    }
}
