//! Configuration management for the Ragline CLI.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Environment variables
//! - Command-line flags
//! - Config files (.ragline/config.yaml)
//!
//! The configuration is workspace-centric, with all collection state stored in `.ragline/`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Generation providers the workspace knows how to construct.
pub const KNOWN_PROVIDERS: [&str; 2] = ["ollama", "gemini"];

/// Key variable read for Gemini when its provider config names none.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Main application configuration.
///
/// This struct holds all global configuration options that affect
/// CLI behavior across commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .ragline/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Generation provider (e.g., "ollama", "gemini")
    pub provider: String,

    /// Generation model identifier
    pub model: String,

    /// Explicit provider endpoint, overrides the provider config
    pub endpoint: Option<String>,

    /// Explicit API key for hosted providers (from `RAGLINE_API_KEY`)
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Emit logs as JSON lines
    pub log_json: bool,

    /// LLM provider configurations
    pub llm: Option<LlmConfig>,
}

/// LLM configuration from config.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(rename = "activeProvider")]
    pub active_provider: String,

    pub providers: HashMap<String, ProviderConfig>,
}

/// Provider-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    pub endpoint: Option<String>,
    pub model: String,
    #[serde(rename = "embeddingModel")]
    pub embedding_model: Option<String>,
    /// Request timeout in seconds
    pub timeout: Option<u64>,
    /// Environment variable holding the provider's API key
    #[serde(rename = "apiKeyEnv", default)]
    pub api_key_env: Option<String>,
}

/// Full configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmConfig>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    json: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "ollama".to_string(), // Local-first default
            model: "llama3.2".to_string(),
            endpoint: None,
            api_key: None,
            log_level: None,
            verbose: false,
            no_color: false,
            log_json: false,
            llm: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and defaults.
    ///
    /// Environment variables:
    /// - `RAGLINE_WORKSPACE`: Override workspace path
    /// - `RAGLINE_CONFIG`: Path to config file
    /// - `RAGLINE_PROVIDER`: Generation provider
    /// - `RAGLINE_MODEL`: Generation model
    /// - `RAGLINE_ENDPOINT`: Provider endpoint
    /// - `RAGLINE_API_KEY`: API key for hosted providers
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use ragline_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("RAGLINE_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("RAGLINE_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.workspace.join(".ragline/config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("RAGLINE_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("RAGLINE_MODEL") {
            config.model = model;
        }

        if let Ok(endpoint) = std::env::var("RAGLINE_ENDPOINT") {
            config.endpoint = Some(endpoint);
        }

        config.api_key = std::env::var("RAGLINE_API_KEY").ok();

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        self.merge_yaml_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config file {:?}: {}", path, e)))
    }

    fn merge_yaml_str(&self, contents: &str) -> AppResult<Self> {
        let config_file: ConfigFile = serde_yaml::from_str(contents)?;

        let mut result = self.clone();

        if let Some(path) = config_file.workspace.and_then(|ws| ws.path) {
            result.workspace = PathBuf::from(path);
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(json) = logging.json {
                result.log_json = json;
            }
        }

        if let Some(llm) = config_file.llm {
            result.provider = llm.active_provider.clone();

            if let Some(provider_config) = llm.providers.get(&llm.active_provider) {
                result.model = provider_config.model.clone();
            }

            result.llm = Some(llm);
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and the config file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
        log_json: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        if log_json {
            self.log_json = true;
        }

        self
    }

    /// Get the path to the .ragline directory.
    pub fn ragline_dir(&self) -> PathBuf {
        self.workspace.join(".ragline")
    }

    /// Ensure the .ragline directory exists.
    pub fn ensure_ragline_dir(&self) -> AppResult<()> {
        let dir = self.ragline_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create .ragline directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Get the configuration for a provider, if the config file declares one.
    pub fn get_provider_config(&self, provider: &str) -> Option<&ProviderConfig> {
        self.llm.as_ref().and_then(|llm| llm.providers.get(provider))
    }

    /// Resolve the endpoint for a provider: explicit override first, then provider config.
    pub fn resolve_endpoint(&self, provider: &str) -> Option<String> {
        self.endpoint.clone().or_else(|| {
            self.get_provider_config(provider)
                .and_then(|pc| pc.endpoint.clone())
        })
    }

    /// Resolve the request timeout for a provider.
    pub fn resolve_timeout(&self, provider: &str) -> Option<u64> {
        self.get_provider_config(provider).and_then(|pc| pc.timeout)
    }

    /// Name of the environment variable holding `provider`'s API key, if
    /// it uses one.
    pub fn api_key_env(&self, provider: &str) -> Option<String> {
        self.get_provider_config(provider)
            .and_then(|pc| pc.api_key_env.clone())
            .or_else(|| (provider == "gemini").then(|| GEMINI_API_KEY_ENV.to_string()))
    }

    /// Resolve the API key for a provider: explicit key first, then the
    /// provider's key variable.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        self.resolve_api_key_with(provider, |name| std::env::var(name).ok())
    }

    fn resolve_api_key_with(
        &self,
        provider: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }
        self.api_key_env(provider)
            .and_then(|name| lookup(&name))
            .filter(|key| !key.trim().is_empty())
    }

    /// Validate configuration for the active provider.
    pub fn validate(&self) -> AppResult<()> {
        if !KNOWN_PROVIDERS.contains(&self.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        if self.model.trim().is_empty() {
            return Err(AppError::Config("Model cannot be empty".to_string()));
        }

        self.validate_api_key(|name| std::env::var(name).ok())
    }

    fn validate_api_key(&self, lookup: impl Fn(&str) -> Option<String>) -> AppResult<()> {
        if self.provider != "gemini" || self.resolve_api_key_with(&self.provider, &lookup).is_some() {
            return Ok(());
        }
        let env_var = self
            .api_key_env(&self.provider)
            .unwrap_or_else(|| GEMINI_API_KEY_ENV.to_string());
        Err(AppError::Config(format!(
            "Provider '{}' needs an API key: set {} or RAGLINE_API_KEY",
            self.provider, env_var
        )))
    }
}
