//! `archief ingest`: read documents from JSON or JSON Lines and write them to
//! the vector index.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use archief_rag::{Document, DocumentWriter};
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct IngestRecord {
    id: Option<String>,
    content: String,
    #[serde(default, alias = "metadata")]
    meta: HashMap<String, Value>,
}

impl From<IngestRecord> for Document {
    fn from(record: IngestRecord) -> Self {
        let id = record.id.unwrap_or_else(|| content_id(&record.content));
        Document { id, content: record.content, metadata: record.meta, embedding: None, score: None }
    }
}

/// Stable id for a document without one, so re-ingesting overwrites.
pub fn content_id(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    format!("doc-{}", &hash[..16])
}

/// Parse a JSON array of records, or one record per line.
pub fn parse_documents(input: &str) -> Result<Vec<Document>> {
    let records: Vec<IngestRecord> = if input.trim_start().starts_with('[') {
        serde_json::from_str(input).context("invalid JSON array of documents")?
    } else {
        input
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str(line).with_context(|| format!("invalid document on line {}", n + 1))
            })
            .collect::<Result<_>>()?
    };

    let total = records.len();
    let documents: Vec<Document> = records
        .into_iter()
        .filter(|record| !record.content.trim().is_empty())
        .map(Document::from)
        .collect();
    if documents.len() < total {
        warn!(skipped = total - documents.len(), "skipped documents without content");
    }
    Ok(documents)
}

pub fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let input = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_documents(&input).with_context(|| format!("failed to parse {}", path.display()))
}

/// Load `path` and write every document through `writer`.
pub async fn run(path: &Path, writer: &DocumentWriter) -> Result<usize> {
    let documents = load_documents(path)?;
    info!(path = %path.display(), count = documents.len(), "ingesting documents");
    let written = writer.write(documents).await.context("failed to write documents")?;
    Ok(written)
}
