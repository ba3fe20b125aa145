//! Generation client factory.
//!
//! Callers construct one client here and pass it into the RAG pipeline; the
//! pipeline never reaches for a process-wide handle.

use crate::client::LlmClient;
use crate::providers::gemini::{GeminiClient, DEFAULT_GEMINI_URL};
use crate::providers::ollama::{OllamaClient, DEFAULT_OLLAMA_URL};
use ragline_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// Provider type enum for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    Ollama,
    Gemini,
}

impl ProviderType {
    /// Parse provider type from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            "gemini" => Some(Self::Gemini),
            _ => None,
        }
    }

    /// Get the canonical provider name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::Gemini => "gemini",
        }
    }

    /// Whether the provider refuses requests without an API key.
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::Gemini)
    }
}

/// Create a generation client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama", "gemini")
/// * `endpoint` - Optional custom endpoint URL
/// * `timeout_secs` - Optional transport timeout
/// * `api_key` - API key for hosted providers; ignored by Ollama
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown or needs a missing
/// API key, or `AppError::Llm` if the HTTP client cannot be built.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    timeout_secs: Option<u64>,
    api_key: Option<&str>,
) -> AppResult<Arc<dyn LlmClient>> {
    let provider_type = ProviderType::parse(provider)
        .ok_or_else(|| AppError::Config(format!("Unknown provider: {}", provider)))?;

    match provider_type {
        ProviderType::Ollama => {
            let base_url = endpoint.unwrap_or(DEFAULT_OLLAMA_URL);
            let client = match timeout_secs {
                Some(secs) => OllamaClient::with_timeout(base_url, Duration::from_secs(secs))?,
                None => OllamaClient::with_base_url(base_url),
            };
            tracing::debug!("Created {} client at {}", provider_type.as_str(), base_url);
            Ok(Arc::new(client))
        }
        ProviderType::Gemini => {
            let api_key = api_key.filter(|k| !k.trim().is_empty()).ok_or_else(|| {
                AppError::Config("Provider 'gemini' requires an API key".to_string())
            })?;
            let base_url = endpoint.unwrap_or(DEFAULT_GEMINI_URL);
            let client = match timeout_secs {
                Some(secs) => {
                    GeminiClient::with_timeout(base_url, api_key, Duration::from_secs(secs))?
                }
                None => GeminiClient::with_base_url(base_url, api_key),
            };
            tracing::debug!("Created {} client at {}", provider_type.as_str(), base_url);
            Ok(Arc::new(client))
        }
    }
}
