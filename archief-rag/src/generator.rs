//! Text generation on top of a [`ChatModel`], with an optional per-call
//! streaming callback and a per-call system prompt override.
//!
//! A call produces either a streamed reply delivered chunk by chunk through
//! the callback, or a blocking result with one reply per candidate. Never
//! both.
//!
//! # Example
//!
//! ```rust,ignore
//! use archief_rag::Generator;
//!
//! let generator = Generator::new(model).with_system_prompt("Je bent een archiefgids.");
//! let mut print = |chunk: &StreamingChunk| print!("{}", chunk.content);
//! let generation = generator.generate(&prompt, None, Some(&mut print), None).await?;
//! ```

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::error::{RagError, Result};
use crate::llm::{
    ChatMessage, ChatModel, ChatRequest, FinishReason, GenerationOptions, StreamingChunk, Usage,
};

/// Callback invoked once per streamed chunk that carries text or a finish
/// reason, in arrival order.
pub type ChunkCallback<'a> = dyn FnMut(&StreamingChunk) + Send + 'a;

/// Metadata describing one reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyMeta {
    pub model: String,
    pub index: u32,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<Usage>,
}

/// One generated reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub meta: ReplyMeta,
    /// The model stopped for an abnormal reason (truncation, content
    /// filter). The text is still usable.
    pub degraded: bool,
}

/// All replies produced by one [`Generator::generate`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub replies: Vec<Reply>,
}

impl Generation {
    pub fn first(&self) -> Option<&Reply> {
        self.replies.first()
    }

    pub fn into_first(self) -> Option<Reply> {
        self.replies.into_iter().next()
    }
}

/// Wraps a [`ChatModel`] with a default system prompt and default options.
#[derive(Clone)]
pub struct Generator {
    model: Arc<dyn ChatModel>,
    system_prompt: Option<String>,
    options: GenerationOptions,
}

impl Generator {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model, system_prompt: None, options: GenerationOptions::default() }
    }

    /// System prompt used when a call does not supply its own.
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Options every call starts from.
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Generate a reply for `prompt`.
    ///
    /// `system_prompt` overrides the construction-time prompt for this call.
    /// `options` are merged over the construction-time options.
    ///
    /// # Errors
    ///
    /// - [`RagError::ConfigError`] if `on_chunk` is set and more than one
    ///   candidate is requested. No model call is made.
    /// - Whatever the underlying [`ChatModel`] returns.
    pub async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        on_chunk: Option<&mut ChunkCallback<'_>>,
        options: Option<&GenerationOptions>,
    ) -> Result<Generation> {
        let options = match options {
            Some(overrides) => self.options.merged(overrides),
            None => self.options.clone(),
        };

        if on_chunk.is_some() && options.candidate_count() > 1 {
            return Err(RagError::ConfigError(format!(
                "cannot stream {} candidate completions, set n=1",
                options.candidate_count()
            )));
        }

        let request = ChatRequest { messages: self.messages(prompt, system_prompt), options };
        let streamed = on_chunk.is_some();

        let replies = match on_chunk {
            Some(callback) => vec![self.stream_reply(&request, callback).await?],
            None => self.blocking_replies(&request).await?,
        };
        let replies: Vec<Reply> = replies.into_iter().map(flag_abnormal_finish).collect();

        info!(
            model = self.model.name(),
            streamed,
            replies = replies.len(),
            degraded = replies.iter().any(|r| r.degraded),
            "generation completed"
        );

        Ok(Generation { replies })
    }

    /// `[system?, user(prompt)]`. History must already be inside `prompt`.
    fn messages(&self, prompt: &str, system_prompt: Option<&str>) -> Vec<ChatMessage> {
        let system = system_prompt.or(self.system_prompt.as_deref());
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(prompt));
        messages
    }

    async fn blocking_replies(&self, request: &ChatRequest) -> Result<Vec<Reply>> {
        let completion = self.model.complete(request).await?;
        if completion.choices.is_empty() {
            return Err(RagError::ModelError {
                provider: self.model.name().to_string(),
                message: "completion contained no choices".to_string(),
            });
        }

        Ok(completion
            .choices
            .into_iter()
            .map(|choice| Reply {
                text: choice.content,
                meta: ReplyMeta {
                    model: completion.model.clone(),
                    index: choice.index,
                    finish_reason: choice.finish_reason,
                    usage: completion.usage,
                },
                degraded: false,
            })
            .collect())
    }

    async fn stream_reply(
        &self,
        request: &ChatRequest,
        on_chunk: &mut ChunkCallback<'_>,
    ) -> Result<Reply> {
        let mut stream = self.model.complete_stream(request).await?;

        let mut text = String::new();
        let mut chunk_count = 0usize;
        let mut model = None;
        let mut index = 0;
        let mut finish_reason = None;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            // Usage-only chunks carry neither text nor a finish reason.
            if !chunk.content.is_empty() || chunk.meta.finish_reason.is_some() {
                on_chunk(&chunk);
            }

            text.push_str(&chunk.content);
            index = chunk.meta.index;
            if chunk.meta.model.is_some() {
                model = chunk.meta.model;
            }
            if chunk.meta.finish_reason.is_some() {
                finish_reason = chunk.meta.finish_reason;
            }
            chunk_count += 1;
        }

        if chunk_count == 0 {
            return Err(RagError::ModelError {
                provider: self.model.name().to_string(),
                message: "stream ended without any chunk".to_string(),
            });
        }
        debug!(chunk_count, text_len = text.len(), "stream assembled");

        Ok(Reply {
            text,
            meta: ReplyMeta {
                model: model.unwrap_or_else(|| self.model.name().to_string()),
                index,
                finish_reason,
                usage: None,
            },
            degraded: false,
        })
    }
}

fn flag_abnormal_finish(mut reply: Reply) -> Reply {
    if let Some(reason) = reply.meta.finish_reason.as_ref().filter(|r| r.is_abnormal()) {
        warn!(
            model = %reply.meta.model,
            index = reply.meta.index,
            finish_reason = %reason,
            "completion stopped early, returning the partial text"
        );
        reply.degraded = true;
    }
    reply
}
