//! Deterministic test doubles for the hosted services.
//!
//! [`MockChatModel`] replays scripted replies and records every request it
//! receives; [`MockEmbeddingProvider`] derives normalised vectors from a hash
//! of the input text. Neither touches the network.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::llm::{
    ChatCompletion, ChatModel, ChatRequest, Choice, ChunkMeta, ChunkStream, FinishReason,
    StreamingChunk, Usage,
};

#[derive(Debug, Clone)]
enum Scripted {
    Text { text: String, finish_reason: FinishReason },
    Chunks(Vec<StreamingChunk>),
    Fail(String),
}

/// A [`ChatModel`] that answers from a queue of scripted replies.
///
/// Blocking calls return the scripted text (one choice per requested
/// candidate); streaming calls split it on word boundaries. When the queue
/// is empty the model fails, so an unexpected call shows up as an error.
#[derive(Debug)]
pub struct MockChatModel {
    name: String,
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockChatModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), script: Mutex::default(), requests: Mutex::default() }
    }

    /// Queue a reply that finishes normally.
    pub fn with_reply(self, text: impl Into<String>) -> Self {
        self.with_reply_finishing(text, FinishReason::Stop)
    }

    /// Queue a reply with an explicit finish reason.
    pub fn with_reply_finishing(self, text: impl Into<String>, reason: FinishReason) -> Self {
        self.push(Scripted::Text { text: text.into(), finish_reason: reason })
    }

    /// Queue an exact chunk sequence.
    pub fn with_chunks(self, chunks: Vec<StreamingChunk>) -> Self {
        self.push(Scripted::Chunks(chunks))
    }

    /// Queue an upstream failure.
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.push(Scripted::Fail(message.into()))
    }

    /// Number of calls received, streaming or blocking.
    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    /// Every request received, oldest first.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn push(self, entry: Scripted) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(entry);
        }
        self
    }

    fn next(&self, request: &ChatRequest) -> Result<Scripted> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let entry = self.script.lock().ok().and_then(|mut script| script.pop_front());
        match entry {
            Some(Scripted::Fail(message)) => Err(self.error(message)),
            Some(entry) => Ok(entry),
            None => Err(self.error("no scripted reply left".to_string())),
        }
    }

    fn error(&self, message: String) -> RagError {
        RagError::ModelError { provider: self.name.clone(), message }
    }
}

fn word_chunks(text: &str, finish_reason: FinishReason, model: &str) -> Vec<StreamingChunk> {
    let mut chunks: Vec<StreamingChunk> = text
        .split_inclusive(' ')
        .map(|piece| StreamingChunk {
            content: piece.to_string(),
            meta: ChunkMeta { index: 0, model: Some(model.to_string()), finish_reason: None },
        })
        .collect();
    // Providers close a stream with an empty delta carrying the finish reason.
    chunks.push(StreamingChunk {
        content: String::new(),
        meta: ChunkMeta { index: 0, model: Some(model.to_string()), finish_reason: Some(finish_reason) },
    });
    chunks
}

#[async_trait]
impl ChatModel for MockChatModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion> {
        let (text, finish_reason) = match self.next(request)? {
            Scripted::Text { text, finish_reason } => (text, Some(finish_reason)),
            Scripted::Chunks(chunks) => {
                let finish = chunks.iter().rev().find_map(|c| c.meta.finish_reason.clone());
                (chunks.into_iter().map(|c| c.content).collect(), finish)
            }
            Scripted::Fail(message) => return Err(self.error(message)),
        };

        let choices = (0..request.options.candidate_count())
            .map(|index| Choice { index, content: text.clone(), finish_reason: finish_reason.clone() })
            .collect();
        let completion_tokens = text.split_whitespace().count() as u32;

        Ok(ChatCompletion {
            model: self.name.clone(),
            choices,
            usage: Some(Usage { prompt_tokens: 0, completion_tokens, total_tokens: completion_tokens }),
        })
    }

    async fn complete_stream(&self, request: &ChatRequest) -> Result<ChunkStream> {
        let chunks = match self.next(request)? {
            Scripted::Text { text, finish_reason } => word_chunks(&text, finish_reason, &self.name),
            Scripted::Chunks(chunks) => chunks,
            Scripted::Fail(message) => return Err(self.error(message)),
        };
        Ok(Box::pin(futures::stream::iter(chunks.into_iter().map(Ok))))
    }
}

/// Deterministic hash-based embeddings for tests and offline demos.
#[derive(Debug)]
pub struct MockEmbeddingProvider {
    dimensions: usize,
    calls: AtomicUsize,
    fail_with: Option<String>,
}

impl MockEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions, calls: AtomicUsize::new(0), fail_with: None }
    }

    /// A provider whose every call fails with `message`.
    pub fn failing(dimensions: usize, message: impl Into<String>) -> Self {
        Self { fail_with: Some(message.into()), ..Self::new(dimensions) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn name(&self) -> &str {
        "Mock"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fail_with {
            return Err(RagError::EmbeddingError { provider: "Mock".into(), message: message.clone() });
        }

        let hash = text.bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        let mut embedding = vec![0.0f32; self.dimensions];
        for (i, v) in embedding.iter_mut().enumerate() {
            *v = (hash.wrapping_add(i as u64) as f32).sin();
        }
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            embedding.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::llm::{ChatMessage, GenerationOptions};

    fn request() -> ChatRequest {
        ChatRequest { messages: vec![ChatMessage::user("hoi")], options: GenerationOptions::default() }
    }

    #[tokio::test]
    async fn streamed_words_concatenate_to_the_script() {
        let model = MockChatModel::new("mock").with_reply("Het kasteel ligt in Amerongen.");
        let chunks: Vec<_> = model.complete_stream(&request()).await.unwrap().collect().await;
        let text: String = chunks.into_iter().map(|c| c.unwrap().content).collect();
        assert_eq!(text, "Het kasteel ligt in Amerongen.");
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn empty_script_fails() {
        let model = MockChatModel::new("mock");
        assert!(model.complete(&request()).await.is_err());
    }

    #[tokio::test]
    async fn embeddings_are_deterministic_and_normalised() {
        let provider = MockEmbeddingProvider::new(8);
        let a = provider.embed("kasteel").await.unwrap();
        let b = provider.embed("kasteel").await.unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }
}
