//! Folds a turn's streamed chunks and retrieved documents into the state a
//! presenter draws.
//!
//! A streamed turn produces N chunk events followed by one documents event; a
//! blocking turn produces one event carrying both the full text and the
//! documents. Both fold to the same [`ResponseState`].

use serde::{Deserialize, Serialize};

use crate::config::{MetadataDiscipline, MetadataKeys, PresentationConfig};
use crate::document::{Document, TurnAttachments};

/// Placeholder for a missing archive number or source path.
pub const UNKNOWN: &str = "unknown";

/// One input to [`ResponseAssembler::fold`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamEvent<'a> {
    pub chunk: Option<&'a str>,
    pub documents: Option<&'a [Document]>,
}

impl<'a> StreamEvent<'a> {
    pub fn chunk(text: &'a str) -> Self {
        Self { chunk: Some(text), documents: None }
    }

    pub fn documents(documents: &'a [Document]) -> Self {
        Self { chunk: None, documents: Some(documents) }
    }

    /// The single event a blocking run produces.
    pub fn complete(text: &'a str, documents: &'a [Document]) -> Self {
        Self { chunk: Some(text), documents: Some(documents) }
    }
}

/// What one retrieved document contributed to a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    pub source_path: String,
    pub image_path: Option<String>,
    pub archive_number: String,
}

/// Everything a presenter shows for one turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseState {
    pub text: String,
    pub source_paths: Vec<String>,
    pub image_paths: Vec<String>,
    pub archive_numbers: Vec<String>,
    /// One entry per document in retrieval order, whatever the discipline.
    pub attributions: Vec<Attribution>,
}

impl ResponseState {
    /// The presentation lists stored with the assistant turn.
    pub fn attachments(&self) -> TurnAttachments {
        TurnAttachments {
            sources: self.source_paths.clone(),
            image_paths: self.image_paths.clone(),
            archive_numbers: self.archive_numbers.clone(),
        }
    }
}

/// Pure left fold over [`StreamEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct ResponseAssembler {
    keys: MetadataKeys,
    discipline: MetadataDiscipline,
}

impl ResponseAssembler {
    pub fn new(config: PresentationConfig) -> Self {
        Self { keys: config.keys, discipline: config.discipline }
    }

    pub fn discipline(&self) -> MetadataDiscipline {
        self.discipline
    }

    /// Apply one event. Text is appended before documents are extracted.
    pub fn fold(&self, mut state: ResponseState, event: StreamEvent<'_>) -> ResponseState {
        if let Some(chunk) = event.chunk {
            state.text.push_str(chunk);
        }
        for document in event.documents.unwrap_or_default() {
            let attribution = self.extract(document);
            self.record(&mut state.source_paths, Some(&attribution.source_path));
            self.record(&mut state.image_paths, attribution.image_path.as_ref());
            self.record(&mut state.archive_numbers, Some(&attribution.archive_number));
            state.attributions.push(attribution);
        }
        state
    }

    /// Fold a whole event sequence from the empty state.
    pub fn fold_all<'a>(&self, events: impl IntoIterator<Item = StreamEvent<'a>>) -> ResponseState {
        events.into_iter().fold(ResponseState::default(), |state, event| self.fold(state, event))
    }

    /// Read the presentation fields of one document.
    pub fn extract(&self, document: &Document) -> Attribution {
        Attribution {
            source_path: document
                .meta_str(&self.keys.file_path)
                .unwrap_or_else(|| UNKNOWN.to_string()),
            image_path: document
                .metadata
                .get(&self.keys.image)
                .and_then(|v| v.as_str())
                .map(str::to_string),
            archive_number: document
                .meta_str(&self.keys.archive_number)
                .unwrap_or_else(|| UNKNOWN.to_string()),
        }
    }

    fn record(&self, list: &mut Vec<String>, value: Option<&String>) {
        let Some(value) = value else { return };
        if self.discipline == MetadataDiscipline::Deduplicated && list.contains(value) {
            return;
        }
        list.push(value.clone());
    }
}
