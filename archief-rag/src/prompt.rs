//! Prompt templates and the prompt set used by the pipeline.
//!
//! Templates use Handlebars syntax: `{{query}}` substitutes a variable and
//! `{{#each history}} … {{this.content}} … {{/each}}` iterates a sequence.
//! Inside a loop the current item is reached through `this`, or through a
//! block parameter (`{{#each documents as |doc|}} … {{doc.content}}`). Every
//! other bare name outside a comment is a top-level variable. Output is not
//! HTML-escaped.
//!
//! A top-level variable that is absent from the mapping is an error; an empty
//! sequence simply renders zero iterations.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use handlebars::Handlebars;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{RagError, Result};

const DEFAULT_SYSTEM_PROMPT: &str = include_str!("../prompts/system.txt");
const DEFAULT_REPHRASE_TEMPLATE: &str = include_str!("../prompts/rephrase.hbs");
const DEFAULT_ANSWER_TEMPLATE: &str = include_str!("../prompts/answer.hbs");

/// File names looked up by [`PromptSet::from_dir`].
pub const SYSTEM_PROMPT_FILE: &str = "system.txt";
pub const REPHRASE_TEMPLATE_FILE: &str = "rephrase.hbs";
pub const ANSWER_TEMPLATE_FILE: &str = "answer.hbs";

static VARIABLE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\{?~?\s*(?:#(?:each|if|unless|with)\s+)?([A-Za-z_][A-Za-z0-9_]*)")
        .unwrap_or_else(|e| panic!("invalid variable pattern: {e}"))
});

static COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\{\{~?!--.*?--~?\}\}|\{\{~?![^}]*\}\}")
        .unwrap_or_else(|e| panic!("invalid comment pattern: {e}"))
});

static BLOCK_PARAMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bas\s+\|([^|]*)\|").unwrap_or_else(|e| panic!("invalid block parameter pattern: {e}"))
});

const NON_VARIABLES: &[&str] = &["this", "else"];

/// Top-level names `source` reads. Comments are ignored, and so are names
/// bound by `as |…|` block parameters.
fn referenced_variables(source: &str) -> BTreeSet<String> {
    let source = COMMENT.replace_all(source, "");
    let bound: BTreeSet<&str> = BLOCK_PARAMS
        .captures_iter(&source)
        .filter_map(|caps| caps.get(1))
        .flat_map(|m| m.as_str().split_whitespace())
        .collect();

    VARIABLE_REF
        .captures_iter(&source)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|name| !NON_VARIABLES.contains(name) && !bound.contains(name))
        .map(str::to_string)
        .collect()
}

/// A compiled template that knows which top-level variables it needs.
pub struct PromptTemplate {
    name: String,
    registry: Handlebars<'static>,
    variables: BTreeSet<String>,
}

impl std::fmt::Debug for PromptTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptTemplate")
            .field("name", &self.name)
            .field("variables", &self.variables)
            .finish()
    }
}

impl PromptTemplate {
    /// Compile `source` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PromptError`] if the template does not parse.
    pub fn new(name: impl Into<String>, source: &str) -> Result<Self> {
        let name = name.into();
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(handlebars::no_escape);
        registry.register_template_string(&name, source).map_err(|e| {
            RagError::PromptError(format!("template '{name}' does not compile: {e}"))
        })?;

        let variables = referenced_variables(source);
        Ok(Self { name, registry, variables })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Top-level variables the template references, sorted.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(String::as_str)
    }

    /// Render with `variables`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PromptError`] naming every referenced variable that
    /// is missing from `variables`, or if rendering itself fails.
    pub fn render(&self, variables: &Map<String, Value>) -> Result<String> {
        let missing: Vec<&str> =
            self.variables().filter(|name| !variables.contains_key(*name)).collect();
        if !missing.is_empty() {
            return Err(RagError::PromptError(format!(
                "template '{}' references missing variable(s): {}",
                self.name,
                missing.join(", ")
            )));
        }

        let rendered = self.registry.render(&self.name, variables).map_err(|e| {
            RagError::PromptError(format!("failed to render template '{}': {e}", self.name))
        })?;
        debug!(template = %self.name, rendered_len = rendered.len(), "rendered prompt");
        Ok(rendered)
    }
}

/// The system prompt and the two templates, treated as configuration data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSet {
    pub system_prompt: String,
    pub rephrase_template: String,
    pub answer_template: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.trim().to_string(),
            rephrase_template: DEFAULT_REPHRASE_TEMPLATE.to_string(),
            answer_template: DEFAULT_ANSWER_TEMPLATE.to_string(),
        }
    }
}

impl PromptSet {
    /// Load prompts from `dir`, falling back to the built-in text for any of
    /// [`SYSTEM_PROMPT_FILE`], [`REPHRASE_TEMPLATE_FILE`] and
    /// [`ANSWER_TEMPLATE_FILE`] that does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `dir` is not a directory or a file
    /// cannot be read, and [`RagError::PromptError`] if a template does not
    /// compile.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(RagError::ConfigError(format!(
                "prompt directory '{}' does not exist",
                dir.display()
            )));
        }

        let defaults = Self::default();
        let read = |file: &str, fallback: String| -> Result<String> {
            let path = dir.join(file);
            if !path.exists() {
                return Ok(fallback);
            }
            debug!(path = %path.display(), "loading prompt override");
            std::fs::read_to_string(&path).map_err(|e| {
                RagError::ConfigError(format!("failed to read '{}': {e}", path.display()))
            })
        };

        let prompts = Self {
            system_prompt: read(SYSTEM_PROMPT_FILE, defaults.system_prompt)?.trim().to_string(),
            rephrase_template: read(REPHRASE_TEMPLATE_FILE, defaults.rephrase_template)?,
            answer_template: read(ANSWER_TEMPLATE_FILE, defaults.answer_template)?,
        };
        prompts.compile()?;
        Ok(prompts)
    }

    /// Compile both templates.
    pub fn compile(&self) -> Result<(PromptTemplate, PromptTemplate)> {
        Ok((
            PromptTemplate::new("rephrase", &self.rephrase_template)?,
            PromptTemplate::new("answer", &self.answer_template)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn vars(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test variables must be an object"),
        }
    }

    #[test]
    fn substitutes_and_iterates() {
        let template = PromptTemplate::new(
            "t",
            "{{#each history}}- {{this.role}}: {{this.content}}\n{{/each}}Vraag: {{query}}",
        )
        .unwrap();
        let out = template
            .render(&vars(json!({
                "history": [{"role": "user", "content": "Wie?"}, {"role": "assistant", "content": "Godard."}],
                "query": "En zijn vrouw?"
            })))
            .unwrap();
        assert!(out.contains("- user: Wie?"));
        assert!(out.contains("- assistant: Godard."));
        assert!(out.ends_with("Vraag: En zijn vrouw?"));
    }

    #[test]
    fn empty_sequence_renders_zero_iterations() {
        let template = PromptTemplate::new("t", "[{{#each documents}}x{{/each}}]{{query}}").unwrap();
        let out = template.render(&vars(json!({"documents": [], "query": "q"}))).unwrap();
        assert_eq!(out, "[]q");
    }

    #[test]
    fn missing_variable_fails_loudly() {
        let template = PromptTemplate::new("t", "{{#each history}}{{this}}{{/each}}{{query}}").unwrap();
        let err = template.render(&vars(json!({"query": "q"}))).unwrap_err();
        assert!(matches!(err, RagError::PromptError(_)));
        assert!(err.to_string().contains("history"));
    }

    #[test]
    fn block_parameters_are_not_top_level_variables() {
        let template =
            PromptTemplate::new("t", "{{#each documents as |doc|}}- {{doc.content}}\n{{/each}}{{query}}").unwrap();
        assert_eq!(template.variables().collect::<Vec<_>>(), vec!["documents", "query"]);

        let out = template
            .render(&vars(json!({"documents": [{"content": "Brief"}], "query": "q"})))
            .unwrap();
        assert_eq!(out, "- Brief\nq");
    }

    #[test]
    fn names_inside_comments_are_ignored() {
        let template =
            PromptTemplate::new("t", "{{!-- use {{foo}} later --}}{{! bar }}{{query}}").unwrap();
        assert_eq!(template.variables().collect::<Vec<_>>(), vec!["query"]);
        assert_eq!(template.render(&vars(json!({"query": "q"}))).unwrap(), "q");
    }

    #[test]
    fn does_not_escape_html() {
        let template = PromptTemplate::new("t", "{{query}}").unwrap();
        let out = template.render(&vars(json!({"query": "<b>kasteel & tuin</b>"}))).unwrap();
        assert_eq!(out, "<b>kasteel & tuin</b>");
    }

    #[test]
    fn default_templates_declare_expected_variables() {
        let (rephrase, answer) = PromptSet::default().compile().unwrap();
        assert_eq!(rephrase.variables().collect::<Vec<_>>(), vec!["history", "query"]);
        assert_eq!(answer.variables().collect::<Vec<_>>(), vec!["documents", "history", "query"]);
    }

    #[test]
    fn broken_template_is_rejected() {
        assert!(PromptTemplate::new("t", "{{#each history}}unterminated").is_err());
    }

    #[test]
    fn from_dir_overrides_only_present_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SYSTEM_PROMPT_FILE), "  Wees kort.\n").unwrap();

        let prompts = PromptSet::from_dir(dir.path()).unwrap();
        assert_eq!(prompts.system_prompt, "Wees kort.");
        assert_eq!(prompts.answer_template, PromptSet::default().answer_template);
    }

    #[test]
    fn from_dir_requires_a_directory() {
        let err = PromptSet::from_dir("/definitely/not/here").unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
    }
}
