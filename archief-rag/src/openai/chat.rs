//! OpenAI chat-completion client with server-sent-event streaming.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{StreamExt, future};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{OpenAIConfig, PROVIDER, error_detail};
use crate::error::{RagError, Result};
use crate::llm::{
    ChatCompletion, ChatMessage, ChatModel, ChatRequest, Choice, ChunkMeta, ChunkStream,
    FinishReason, GenerationOptions, StreamingChunk, Usage,
};

const DONE_MARKER: &str = "[DONE]";

/// A [`ChatModel`] backed by `POST {base_url}/chat/completions`.
///
/// Works with any OpenAI-compatible endpoint through
/// [`OpenAIConfig::base_url`].
pub struct OpenAIChatModel {
    client: reqwest::Client,
    config: OpenAIConfig,
}

impl OpenAIChatModel {
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the API key is empty.
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        Ok(Self { client: config.http_client()?, config })
    }

    /// Create a client from `OPENAI_API_KEY` for the default model.
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAIConfig::from_env()?)
    }

    fn error(message: String) -> RagError {
        RagError::ModelError { provider: PROVIDER.into(), message }
    }

    async fn send(&self, request: &ChatRequest, stream: bool) -> Result<reqwest::Response> {
        let body = CompletionRequest {
            model: &self.config.model,
            messages: &request.messages,
            stream,
            options: &request.options,
        };
        debug!(
            provider = PROVIDER,
            model = %self.config.model,
            messages = request.messages.len(),
            stream,
            "sending chat completion"
        );

        let http = self.client.post(self.config.endpoint("chat/completions")).json(&body);
        let response = self.config.authorize(http).send().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "request failed");
            Self::error(format!("request failed: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = error_detail(response.text().await.unwrap_or_default());
            error!(provider = PROVIDER, %status, "API error");
            return Err(Self::error(format!("API returned {status}: {detail}")));
        }
        Ok(response)
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(flatten)]
    options: &'a GenerationOptions,
}

#[derive(Deserialize)]
struct CompletionResponse {
    model: String,
    choices: Vec<ResponseChoice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ResponseChoice {
    index: u32,
    message: ResponseMessage,
    finish_reason: Option<FinishReason>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct CompletionChunk {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    index: u32,
    #[serde(default)]
    delta: Delta,
    finish_reason: Option<FinishReason>,
}

#[derive(Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

impl From<CompletionResponse> for ChatCompletion {
    fn from(response: CompletionResponse) -> Self {
        ChatCompletion {
            model: response.model,
            choices: response
                .choices
                .into_iter()
                .map(|c| Choice {
                    index: c.index,
                    content: c.message.content.unwrap_or_default(),
                    finish_reason: c.finish_reason,
                })
                .collect(),
            usage: response.usage,
        }
    }
}

impl From<CompletionChunk> for StreamingChunk {
    /// Only the first choice is kept; streams carry a single candidate.
    fn from(chunk: CompletionChunk) -> Self {
        let choice = chunk.choices.into_iter().next();
        let (index, content, finish_reason) = match choice {
            Some(c) => (c.index, c.delta.content.unwrap_or_default(), c.finish_reason),
            None => (0, String::new(), None),
        };
        StreamingChunk { content, meta: ChunkMeta { index, model: chunk.model, finish_reason } }
    }
}

fn parse_chunk(data: &str) -> Result<StreamingChunk> {
    serde_json::from_str::<CompletionChunk>(data)
        .map(StreamingChunk::from)
        .map_err(|e| OpenAIChatModel::error(format!("malformed stream chunk: {e}")))
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion> {
        let response = self.send(request, false).await?;
        let completion: CompletionResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            Self::error(format!("failed to parse response: {e}"))
        })?;
        Ok(completion.into())
    }

    async fn complete_stream(&self, request: &ChatRequest) -> Result<ChunkStream> {
        let response = self.send(request, true).await?;

        let stream = response
            .bytes_stream()
            .eventsource()
            .take_while(|event| {
                future::ready(!matches!(event, Ok(event) if event.data.trim() == DONE_MARKER))
            })
            .map(|event| match event {
                Ok(event) => parse_chunk(&event.data),
                Err(e) => {
                    error!(provider = PROVIDER, error = %e, "stream interrupted");
                    Err(Self::error(format!("stream interrupted: {e}")))
                }
            });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn blocking_response_maps_every_choice() {
        let response: CompletionResponse = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini-2024-07-18",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "Godard van Reede."}, "finish_reason": "stop"},
                {"index": 1, "message": {"role": "assistant", "content": "Een edelman."}, "finish_reason": "length"}
            ],
            "usage": {"prompt_tokens": 120, "completion_tokens": 8, "total_tokens": 128}
        }))
        .unwrap();

        let completion = ChatCompletion::from(response);
        assert_eq!(completion.choices.len(), 2);
        assert_eq!(completion.choices[1].finish_reason, Some(FinishReason::Length));
        assert_eq!(completion.usage.unwrap().total_tokens, 128);
    }

    #[test]
    fn stream_chunk_takes_the_first_delta() {
        let chunk = parse_chunk(
            r#"{"id":"c","model":"gpt-4o-mini","choices":[{"index":0,"delta":{"content":"Kasteel "},"finish_reason":null}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.content, "Kasteel ");
        assert_eq!(chunk.meta.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(chunk.meta.finish_reason, None);
    }

    #[test]
    fn final_stream_chunk_carries_finish_reason() {
        let chunk = parse_chunk(
            r#"{"model":"gpt-4o-mini","choices":[{"index":0,"delta":{},"finish_reason":"content_filter"}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.content, "");
        assert_eq!(chunk.meta.finish_reason, Some(FinishReason::ContentFilter));
    }

    #[test]
    fn chunk_without_choices_is_empty() {
        let chunk = parse_chunk(r#"{"model":"gpt-4o-mini","choices":[]}"#).unwrap();
        assert!(chunk.content.is_empty());
    }

    #[test]
    fn malformed_chunk_is_a_model_error() {
        assert!(matches!(parse_chunk("not json"), Err(RagError::ModelError { .. })));
    }

    #[test]
    fn request_flattens_options() {
        let messages = [ChatMessage::system("Je bent een archiefgids."), ChatMessage::user("Hoi")];
        let options = GenerationOptions::default().with_temperature(0.0);
        let body = serde_json::to_value(CompletionRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            stream: true,
            options: &options,
        })
        .unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["temperature"], 0.0);
        assert!(body.get("n").is_none());
        assert_eq!(body["stream"], true);
    }
}
