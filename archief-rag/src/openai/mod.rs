//! OpenAI-compatible embedding and chat-completion clients.
//!
//! This module is only available when the `openai` feature is enabled.

mod chat;
mod embedding;

pub use chat::OpenAIChatModel;
pub use embedding::OpenAIEmbeddingProvider;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// The default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// The default chat model.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// The default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

const PROVIDER: &str = "OpenAI";

/// Connection settings shared by the OpenAI clients.
///
/// The API key is never serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAIConfig {
    #[serde(skip)]
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
    pub organization: Option<String>,
    /// Request timeout in seconds. No timeout when unset.
    pub timeout_secs: Option<u64>,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            organization: None,
            timeout_secs: None,
        }
    }
}

impl OpenAIConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { api_key: api_key.into(), ..Default::default() }
    }

    /// Read the key from `OPENAI_API_KEY` and, if set, the organization from
    /// `OPENAI_ORG_ID`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            RagError::ConfigError("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        Ok(Self { organization: std::env::var("OPENAI_ORG_ID").ok(), ..Self::new(api_key) })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs());
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }

    fn http_client(&self) -> Result<reqwest::Client> {
        if self.api_key.is_empty() {
            return Err(RagError::ConfigError("OpenAI API key must not be empty".to_string()));
        }
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = self.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        builder
            .build()
            .map_err(|e| RagError::ConfigError(format!("failed to build HTTP client: {e}")))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.bearer_auth(&self.api_key);
        match &self.organization {
            Some(org) => request.header("OpenAI-Organization", org),
            None => request,
        }
    }
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Pull the human-readable message out of an error body, or return it whole.
fn error_detail(body: String) -> String {
    serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body)
}
