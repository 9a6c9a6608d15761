//! Typed configuration for the RAG core.
//!
//! Every section carries defaults that match the behavior of the reference
//! deployment, so `AppConfig::default()` is a working configuration apart
//! from the API credential, which is always read from the environment.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{RagError, Result};

use super::paths::AppPaths;

/// Environment variable holding the API credential for the model endpoint.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub chunking: ChunkingConfig,
    pub store: StoreConfig,
    pub chat: ChatConfig,
}

/// Model endpoint configuration (OpenAI-compatible API).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible endpoint.
    pub base_url: String,
    /// Chat-completion model used for grouping decisions and answers.
    pub chat_model: String,
    /// Embedding model.
    pub embed_model: String,
    /// Sampling temperature for answer generation.
    pub temperature: f64,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Bounded retry attempts for transient failures.
    pub max_retries: u32,
    /// Outbound request budget per minute, shared across chat and embedding
    /// calls.
    pub requests_per_minute: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            embed_model: "text-embedding-3-small".to_string(),
            temperature: 0.7,
            timeout_secs: 60,
            max_retries: 2,
            requests_per_minute: 120,
        }
    }
}

/// Proposition extraction and agentic grouping configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target proposition size in characters.
    pub proposition_size: usize,
    /// Overlap between consecutive propositions in characters.
    pub proposition_overlap: usize,
    /// Cap on how many propositions the grouper processes; `None` processes
    /// the full corpus.
    pub max_propositions: Option<usize>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            proposition_size: 1000,
            proposition_overlap: 200,
            max_propositions: None,
        }
    }
}

/// Vector store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the persisted SQLite vector store. Empty means "use the
    /// default location under the data directory".
    pub path: PathBuf,
    /// Expected embedding dimensionality (1536 for text-embedding-3-small).
    pub dimensions: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            dimensions: 1536,
        }
    }
}

impl StoreConfig {
    /// Resolve the store path, falling back to the default location.
    pub fn resolved_path(&self, paths: &AppPaths) -> PathBuf {
        if self.path.as_os_str().is_empty() {
            paths.store_path.clone()
        } else {
            self.path.clone()
        }
    }
}

/// Conversational retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Number of chunks retrieved per question.
    pub top_k: usize,
    /// Number of trailing conversation turns fed into question condensation.
    pub history_window: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            history_window: 6,
        }
    }
}

impl AppConfig {
    /// Load configuration from the standard location.
    ///
    /// `TAXCHAT_CONFIG_PATH` overrides the search; otherwise `config.yml`
    /// under the data directory is used when present, and defaults apply
    /// when no file exists at all.
    pub fn load(paths: &AppPaths) -> Result<Self> {
        let path = match env::var("TAXCHAT_CONFIG_PATH") {
            Ok(p) => PathBuf::from(p),
            Err(_) => paths.data_dir.join("config.yml"),
        };

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            RagError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_yaml::from_str(&contents).map_err(|e| {
            RagError::configuration(format!("invalid config {}: {}", path.display(), e))
        })
    }

    /// Resolve the API credential from the environment.
    pub fn api_key() -> Result<String> {
        env::var(API_KEY_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| RagError::configuration(format!("{API_KEY_ENV} is not set")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let config = AppConfig::default();
        assert_eq!(config.store.dimensions, 1536);
        assert_eq!(config.chunking.proposition_size, 1000);
        assert!(config.chunking.max_propositions.is_none());
        assert!(config.chat.top_k > 0);
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let parsed: AppConfig = serde_yaml::from_str(
            "llm:\n  chat_model: test-model\nchunking:\n  max_propositions: 10\n",
        )
        .unwrap();
        assert_eq!(parsed.llm.chat_model, "test-model");
        assert_eq!(parsed.chunking.max_propositions, Some(10));
        // Untouched sections keep their defaults.
        assert_eq!(parsed.llm.embed_model, "text-embedding-3-small");
        assert_eq!(parsed.store.dimensions, 1536);
    }

    #[test]
    fn empty_store_path_resolves_to_data_dir() {
        let paths = AppPaths {
            data_dir: PathBuf::from("/tmp/taxchat-test"),
            log_dir: PathBuf::from("/tmp/taxchat-test/logs"),
            store_path: PathBuf::from("/tmp/taxchat-test/vector_store.db"),
        };
        let store = StoreConfig::default();
        assert_eq!(store.resolved_path(&paths), paths.store_path);

        let explicit = StoreConfig {
            path: PathBuf::from("/elsewhere/db.sqlite"),
            ..Default::default()
        };
        assert_eq!(
            explicit.resolved_path(&paths),
            PathBuf::from("/elsewhere/db.sqlite")
        );
    }
}
