//! Per-conversation state owned by a presenter.
//!
//! A [`ChatSession`] holds the conversation history and runs one turn at a
//! time through a [`QueryPipeline`], folding the output into a
//! [`ResponseState`] that the presenter redraws on every update.

use tracing::{error, info};

use crate::assembler::{ResponseAssembler, ResponseState, StreamEvent};
use crate::config::PresentationConfig;
use crate::document::{ChatTurn, ConversationHistory};
use crate::error::RagError;
use crate::generator::ChunkCallback;
use crate::llm::StreamingChunk;
use crate::pipeline::QueryPipeline;

/// The presenter-facing result of one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantReply {
    pub state: ResponseState,
    /// The answer was cut short by the model.
    pub degraded: bool,
    /// The run failed and `state.text` holds the error placeholder.
    pub failed: bool,
}

/// Conversation history plus presentation settings for one user.
#[derive(Debug, Clone)]
pub struct ChatSession {
    history: ConversationHistory,
    assembler: ResponseAssembler,
    streaming: bool,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new(PresentationConfig::default())
    }
}

impl ChatSession {
    pub fn new(presentation: PresentationConfig) -> Self {
        Self {
            history: ConversationHistory::new(),
            assembler: ResponseAssembler::new(presentation),
            streaming: true,
        }
    }

    /// Use blocking generation and replay the answer as a single event.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Answer `query`.
    ///
    /// `on_update` is called with the partial state after every streamed
    /// chunk and once more with the final state. The user and assistant turns
    /// are appended to the history only after the final state is known.
    ///
    /// A failed run never returns an error: the reply carries the
    /// `An error occurred: …` placeholder with empty source lists.
    pub async fn ask<F>(&mut self, pipeline: &QueryPipeline, query: &str, mut on_update: F) -> AssistantReply
    where
        F: FnMut(&ResponseState) + Send,
    {
        let assembler = &self.assembler;
        let mut state = ResponseState::default();

        let outcome = if self.streaming {
            let mut on_chunk = |chunk: &StreamingChunk| {
                state = assembler.fold(std::mem::take(&mut state), StreamEvent::chunk(&chunk.content));
                on_update(&state);
            };
            let callback: &mut ChunkCallback<'_> = &mut on_chunk;
            pipeline.run(query, &self.history, Some(callback)).await
        } else {
            pipeline.run(query, &self.history, None).await
        };

        let reply = match outcome {
            Ok(result) => {
                let event = if self.streaming {
                    StreamEvent::documents(&result.documents)
                } else {
                    StreamEvent::complete(&result.answer_text, &result.documents)
                };
                state = assembler.fold(state, event);
                AssistantReply { state, degraded: result.degraded, failed: false }
            }
            Err(e) => {
                error!(stage = ?e.stage(), error = %e, "turn failed");
                AssistantReply { state: placeholder(&e), degraded: false, failed: true }
            }
        };
        on_update(&reply.state);

        self.history.push(ChatTurn::user(query));
        self.history
            .push(ChatTurn::assistant(reply.state.text.clone()).with_attachments(reply.state.attachments()));
        info!(turns = self.history.len(), failed = reply.failed, "turn recorded");

        reply
    }
}

/// The state shown when a run fails: nothing from the partial stream or an
/// earlier turn survives.
fn placeholder(e: &RagError) -> ResponseState {
    ResponseState { text: format!("An error occurred: {e}"), ..Default::default() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_has_empty_lists() {
        let state = placeholder(&RagError::ConfigError("bad".into()));
        assert_eq!(state.text, "An error occurred: Configuration error: bad");
        assert!(state.source_paths.is_empty());
        assert!(state.image_paths.is_empty());
        assert!(state.archive_numbers.is_empty());
    }

    #[test]
    fn sessions_stream_by_default() {
        let session = ChatSession::default();
        assert!(session.is_streaming());
        assert!(session.history().is_empty());
        assert!(!session.with_streaming(false).is_streaming());
    }
}
