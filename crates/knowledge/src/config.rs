//! Collection configuration and on-disk layout.
//!
//! Every collection lives under `.ragline/collections/<name>/`:
//! `config.yaml`, `documents.json`, `index.json` and `stats.json`.

use crate::chunk::{Chunker, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::context::DEFAULT_SOURCE_KEY;
use crate::embeddings::EmbeddingConfig;
use crate::error::{KnowledgeError, KnowledgeResult};
use crate::index::IndexConfig;
use crate::retriever::DEFAULT_TOP_K;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Per-collection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBaseConfig {
    /// Collection name (always the directory name)
    pub name: String,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Upper bound on assembled context length, in characters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_context_chars: Option<usize>,

    /// Metadata key used to de-duplicate sources
    #[serde(default = "default_source_key")]
    pub source_key: String,

    /// Documents embedded per provider call during ingestion
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Longest document stored, in characters; longer items are split
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared by neighbouring pieces of a split item
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed_timeout_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_timeout_secs: Option<u64>,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_source_key() -> String {
    DEFAULT_SOURCE_KEY.to_string()
}

fn default_batch_size() -> usize {
    32
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            embedding: EmbeddingConfig::default(),
            index: IndexConfig::default(),
            default_top_k: default_top_k(),
            max_context_chars: None,
            source_key: default_source_key(),
            batch_size: default_batch_size(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            embed_timeout_secs: None,
            generate_timeout_secs: None,
        }
    }
}

impl KnowledgeBaseConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn embed_timeout(&self) -> Option<Duration> {
        self.embed_timeout_secs.map(Duration::from_secs)
    }

    pub fn generate_timeout(&self) -> Option<Duration> {
        self.generate_timeout_secs.map(Duration::from_secs)
    }

    pub fn chunker(&self) -> KnowledgeResult<Chunker> {
        Chunker::new(self.chunk_size, self.chunk_overlap)
    }

    /// Reject settings no component could run with.
    pub fn validate(&self) -> KnowledgeResult<()> {
        validate_name(&self.name)?;
        if self.default_top_k == 0 {
            return Err(KnowledgeError::Validation(
                "default_top_k must be greater than zero".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(KnowledgeError::Validation(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        self.chunker()?;
        if self.index.n_lists == 0 {
            return Err(KnowledgeError::Validation(
                "index.n_lists must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Collection names become directory names.
pub fn validate_name(name: &str) -> KnowledgeResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && name != "."
        && name != "..";

    if valid {
        Ok(())
    } else {
        Err(KnowledgeError::Validation(format!(
            "Invalid collection name '{}': use letters, digits, '-', '_' or '.'",
            name
        )))
    }
}

/// Load a collection's configuration.
///
/// Reads `.ragline/collections/<name>/config.yaml` if it exists, otherwise
/// returns the defaults for `name`.
pub fn load_config(workspace: &Path, name: &str) -> KnowledgeResult<KnowledgeBaseConfig> {
    validate_name(name)?;
    let config_path = get_config_path(workspace, name);

    if !config_path.exists() {
        tracing::debug!(
            "Using default config for collection '{}' (no config file found)",
            name
        );
        return Ok(KnowledgeBaseConfig::named(name));
    }

    let content = fs::read_to_string(&config_path).map_err(|e| {
        KnowledgeError::Storage(format!("Failed to read config at {:?}: {}", config_path, e))
    })?;
    let mut config: KnowledgeBaseConfig = serde_yaml::from_str(&content).map_err(|e| {
        KnowledgeError::Storage(format!("Failed to parse config at {:?}: {}", config_path, e))
    })?;

    config.name = name.to_string();
    config.validate()?;

    tracing::debug!("Loaded config for collection '{}'", name);
    Ok(config)
}

/// Save a collection's configuration.
pub fn save_config(workspace: &Path, config: &KnowledgeBaseConfig) -> KnowledgeResult<()> {
    config.validate()?;
    let config_path = get_config_path(workspace, &config.name);

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&config_path, serde_yaml::to_string(config)?)?;

    tracing::debug!("Saved config for collection '{}'", config.name);
    Ok(())
}

/// Directory holding all collections.
pub fn get_collections_dir(workspace: &Path) -> PathBuf {
    workspace.join(".ragline").join("collections")
}

pub fn get_base_dir(workspace: &Path, name: &str) -> PathBuf {
    get_collections_dir(workspace).join(name)
}

pub fn get_config_path(workspace: &Path, name: &str) -> PathBuf {
    get_base_dir(workspace, name).join("config.yaml")
}

/// Document store snapshot.
pub fn get_documents_path(workspace: &Path, name: &str) -> PathBuf {
    get_base_dir(workspace, name).join("documents.json")
}

/// Embedding index snapshot.
pub fn get_index_path(workspace: &Path, name: &str) -> PathBuf {
    get_base_dir(workspace, name).join("index.json")
}

pub fn get_stats_path(workspace: &Path, name: &str) -> PathBuf {
    get_base_dir(workspace, name).join("stats.json")
}
