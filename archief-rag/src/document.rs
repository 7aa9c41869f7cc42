//! Data types for documents and conversation turns.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An archival document with free-form metadata.
///
/// Documents come back from the vector index relevance-ranked and are never
/// mutated by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The text content of the document.
    pub content: String,
    /// Key-value metadata; values may be `null`.
    #[serde(default, alias = "meta")]
    pub metadata: HashMap<String, Value>,
    /// The vector embedding, set on the write path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Similarity score assigned by the vector index (higher is more relevant).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl Document {
    /// Create a document with no metadata.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { id: id.into(), content: content.into(), ..Default::default() }
    }

    /// Add a metadata entry.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach an embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Return a metadata value as a string.
    ///
    /// `null`, missing and non-scalar values yield `None`; numbers and
    /// booleans are rendered as text since inventory numbers are sometimes
    /// indexed as integers.
    pub fn meta_str(&self, key: &str) -> Option<String> {
        match self.metadata.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// The view of this document handed to prompt templates. Null metadata
    /// is left out.
    pub(crate) fn template_view(&self) -> Value {
        let metadata: serde_json::Map<String, Value> = self
            .metadata
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        serde_json::json!({
            "id": self.id,
            "content": self.content,
            "metadata": metadata,
        })
    }
}

/// Relevance-ranked documents returned by a single retrieval.
pub type RetrievalResult = Vec<Document>;

/// The speaker of a [`ChatTurn`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// Presentation lists recorded with an assistant turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TurnAttachments {
    pub sources: Vec<String>,
    pub image_paths: Vec<String>,
    pub archive_numbers: Vec<String>,
}

/// One message of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
    /// Sources shown with an assistant answer. Never rendered into prompts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<TurnAttachments>,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), attachments: None }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into(), attachments: None }
    }

    pub fn with_attachments(mut self, attachments: TurnAttachments) -> Self {
        self.attachments = Some(attachments);
        self
    }
}

/// An append-only, ordered conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ConversationHistory {
    turns: Vec<ChatTurn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn. Turns are never removed or rewritten.
    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChatTurn> {
        self.turns.iter()
    }

    /// The view of this history handed to prompt templates.
    pub(crate) fn template_view(&self) -> Value {
        Value::Array(
            self.turns
                .iter()
                .map(|turn| serde_json::json!({ "role": turn.role.as_str(), "content": turn.content }))
                .collect(),
        )
    }
}

impl From<Vec<ChatTurn>> for ConversationHistory {
    fn from(turns: Vec<ChatTurn>) -> Self {
        Self { turns }
    }
}

impl<'a> IntoIterator for &'a ConversationHistory {
    type Item = &'a ChatTurn;
    type IntoIter = std::slice::Iter<'a, ChatTurn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}
