//! Chat model seam: request/response types and the [`ChatModel`] trait.
//!
//! A [`ChatModel`] is a thin client for a hosted chat-completion endpoint.
//! It knows nothing about prompts or callbacks; [`Generator`](crate::Generator)
//! layers those on top.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::document::Role;
use crate::error::Result;

/// One message sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// Sampling options. Unset fields are left to the provider's defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationOptions {
    /// Number of candidate completions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

impl GenerationOptions {
    pub fn with_n(mut self, n: u32) -> Self {
        self.n = Some(n);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Field-wise merge where values set in `overrides` win.
    pub fn merged(&self, overrides: &GenerationOptions) -> GenerationOptions {
        GenerationOptions {
            n: overrides.n.or(self.n),
            temperature: overrides.temperature.or(self.temperature),
            top_p: overrides.top_p.or(self.top_p),
            max_tokens: overrides.max_tokens.or(self.max_tokens),
            stop: overrides.stop.clone().or_else(|| self.stop.clone()),
        }
    }

    /// Requested candidate count, defaulting to one.
    pub fn candidate_count(&self) -> u32 {
        self.n.unwrap_or(1)
    }
}

/// A full request to a [`ChatModel`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub options: GenerationOptions,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    Other(String),
}

impl FinishReason {
    /// Truncated or filtered output: surfaced to the user but flagged.
    pub fn is_abnormal(&self) -> bool {
        matches!(self, FinishReason::Length | FinishReason::ContentFilter)
    }

    pub fn as_str(&self) -> &str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::ToolCalls => "tool_calls",
            FinishReason::Other(other) => other,
        }
    }
}

impl From<String> for FinishReason {
    fn from(value: String) -> Self {
        match value.as_str() {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "content_filter" => FinishReason::ContentFilter,
            "tool_calls" | "function_call" => FinishReason::ToolCalls,
            _ => FinishReason::Other(value),
        }
    }
}

impl From<&str> for FinishReason {
    fn from(value: &str) -> Self {
        FinishReason::from(value.to_string())
    }
}

impl From<FinishReason> for String {
    fn from(value: FinishReason) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One candidate of a blocking completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub index: u32,
    pub content: String,
    pub finish_reason: Option<FinishReason>,
}

/// Result of a blocking completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletion {
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

/// Metadata carried by a streamed chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkMeta {
    pub index: u32,
    pub model: Option<String>,
    pub finish_reason: Option<FinishReason>,
}

/// An incremental fragment of generated text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamingChunk {
    pub content: String,
    pub meta: ChunkMeta,
}

impl StreamingChunk {
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into(), meta: ChunkMeta::default() }
    }

    pub fn finished(mut self, reason: FinishReason) -> Self {
        self.meta.finish_reason = Some(reason);
        self
    }
}

/// Chunks in arrival order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamingChunk>> + Send>>;

/// A hosted chat-completion model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier, used in logs and reply metadata.
    fn name(&self) -> &str;

    /// Run one blocking completion.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion>;

    /// Start a streamed completion with a single candidate.
    async fn complete_stream(&self, request: &ChatRequest) -> Result<ChunkStream>;
}
