//! Runtime settings: an optional TOML file, then environment overrides.
//!
//! API keys are read from the environment only and never from the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use archief_rag::indexing::DEFAULT_BATCH_SIZE;
use archief_rag::openai::OpenAIConfig;
use archief_rag::pinecone::PineconeConfig;
use archief_rag::{PresentationConfig, RagConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Files tried, in order, when no `--config` is given.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["archief.toml", "config/archief.toml"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub rag: RagConfig,
    pub presentation: PresentationConfig,
    pub openai: OpenAIConfig,
    pub pinecone: PineconeConfig,
    /// Directory with `system.txt`, `rephrase.hbs` and `answer.hbs`
    /// overrides.
    pub prompts_dir: Option<PathBuf>,
    /// Stream answers as they are generated.
    pub streaming: bool,
    /// Documents embedded per request by `archief ingest`.
    pub batch_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rag: RagConfig::default(),
            presentation: PresentationConfig::default(),
            openai: OpenAIConfig::default(),
            pinecone: PineconeConfig::default(),
            prompts_dir: None,
            streaming: true,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl Settings {
    /// Load from `path`, or from the first of [`DEFAULT_CONFIG_PATHS`] that
    /// exists, then apply the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => DEFAULT_CONFIG_PATHS
                .iter()
                .map(Path::new)
                .find(|p| p.is_file())
                .map(Self::from_file)
                .transpose()?
                .unwrap_or_default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let settings = toml::from_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    /// Apply overrides from `var`, which maps an environment variable name to
    /// its value.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(top_k) = var("ARCHIEF_TOP_K") {
            self.rag.top_k =
                top_k.trim().parse().with_context(|| format!("ARCHIEF_TOP_K is not a number: {top_k}"))?;
        }
        if let Some(model) = var("ARCHIEF_CHAT_MODEL") {
            self.openai.model = model;
        }
        if let Some(model) = var("ARCHIEF_EMBEDDING_MODEL") {
            self.openai.embedding_model = model;
        }
        if let Some(base_url) = var("OPENAI_BASE_URL") {
            self.openai.base_url = base_url;
        }
        if let Some(org) = var("OPENAI_ORG_ID") {
            self.openai.organization = Some(org);
        }
        if let Some(host) = var("PINECONE_INDEX_HOST") {
            self.pinecone.index_host = host;
        }
        if let Some(namespace) = var("PINECONE_NAMESPACE") {
            self.pinecone.namespace = Some(namespace);
        }
        self.openai.api_key = var("OPENAI_API_KEY").unwrap_or_default();
        self.pinecone.api_key = var("PINECONE_API_KEY").unwrap_or_default();
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.rag.validate().context("invalid [rag] settings")?;
        anyhow::ensure!(self.batch_size > 0, "batch_size must be greater than zero");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use archief_rag::MetadataDiscipline;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_the_collection() {
        let settings = Settings::default();
        assert_eq!(settings.rag.top_k, 10);
        assert_eq!(settings.openai.model, "gpt-4o-mini");
        assert_eq!(settings.openai.embedding_model, "text-embedding-3-small");
        assert!(settings.streaming);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            streaming = false

            [rag]
            top_k = 5

            [presentation]
            discipline = "positional"

            [pinecone]
            index_host = "archiefutrecht-abc.svc.pinecone.io"
            "#,
        )
        .unwrap();

        assert!(!settings.streaming);
        assert_eq!(settings.rag.top_k, 5);
        assert_eq!(settings.rag.embedding_dimensions, 1536);
        assert_eq!(settings.presentation.discipline, MetadataDiscipline::Positional);
        assert_eq!(settings.presentation.keys.archive_number, "invnr");
        assert_eq!(settings.pinecone.index_host, "archiefutrecht-abc.svc.pinecone.io");
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut settings = Settings::default();
        settings
            .apply_env(env(&[
                ("ARCHIEF_TOP_K", "3"),
                ("ARCHIEF_CHAT_MODEL", "gpt-4o"),
                ("PINECONE_NAMESPACE", "brieven"),
                ("OPENAI_API_KEY", "sk-test"),
            ]))
            .unwrap();

        assert_eq!(settings.rag.top_k, 3);
        assert_eq!(settings.openai.model, "gpt-4o");
        assert_eq!(settings.pinecone.namespace.as_deref(), Some("brieven"));
        assert_eq!(settings.openai.api_key, "sk-test");
        assert!(settings.pinecone.api_key.is_empty());
    }

    #[test]
    fn bad_top_k_is_reported() {
        let err = Settings::default().apply_env(env(&[("ARCHIEF_TOP_K", "tien")])).unwrap_err();
        assert!(err.to_string().contains("ARCHIEF_TOP_K"));
    }

    #[test]
    fn api_keys_in_the_file_are_ignored() {
        let settings: Settings = toml::from_str(
            r#"
            [openai]
            api_key = "sk-from-file"
            "#,
        )
        .unwrap();
        assert!(settings.openai.api_key.is_empty());
    }

    #[test]
    fn explicit_path_must_exist() {
        assert!(Settings::load(Some(Path::new("/no/such/archief.toml"))).is_err());
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archief.toml");
        std::fs::write(&path, "batch_size = 8\n[rag]\ntop_k = 4\n").unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.batch_size, 8);
        assert_eq!(settings.rag.top_k, 4);
    }

    #[test]
    fn zero_top_k_fails_validation() {
        let mut settings = Settings::default();
        settings.rag.top_k = 0;
        assert!(settings.validate().is_err());
    }
}
