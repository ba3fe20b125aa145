//! Embedding configuration for a collection.

use crate::error::{KnowledgeError, KnowledgeResult};
use serde::{Deserialize, Serialize};

/// Which embedding model a collection uses.
///
/// Stored in the collection's `config.yaml`. Every vector in the collection's
/// index must come from the same provider, model and dimension.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    /// Provider name: "trigram" or "ollama"
    pub provider: String,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Embedding vector dimensions
    pub dimensions: usize,

    /// Provider endpoint override (Ollama base URL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "trigram".to_string(),
            model: "trigram-v1".to_string(),
            dimensions: 384,
            endpoint: None,
        }
    }
}

impl EmbeddingConfig {
    /// Config for an Ollama-served embedding model.
    pub fn ollama(model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            provider: "ollama".to_string(),
            model: model.into(),
            dimensions,
            endpoint: None,
        }
    }

    /// Validate that another config is consistent with this one.
    ///
    /// Used when reopening a collection whose index was built with `self`.
    pub fn validate_consistency(&self, other: &Self) -> KnowledgeResult<()> {
        if self.provider != other.provider {
            return Err(KnowledgeError::Validation(format!(
                "Provider mismatch: expected '{}', got '{}'",
                self.provider, other.provider
            )));
        }

        if self.model != other.model {
            return Err(KnowledgeError::Validation(format!(
                "Model mismatch: expected '{}', got '{}'",
                self.model, other.model
            )));
        }

        if self.dimensions != other.dimensions {
            return Err(KnowledgeError::DimensionMismatch {
                expected: self.dimensions,
                actual: other.dimensions,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.provider, "trigram");
        assert_eq!(config.model, "trigram-v1");
        assert_eq!(config.dimensions, 384);
        assert!(config.endpoint.is_none());
    }

    #[test]
    fn test_yaml_round_trip_omits_endpoint() {
        let yaml = serde_yaml::to_string(&EmbeddingConfig::default()).unwrap();
        assert!(!yaml.contains("endpoint"));

        let parsed: EmbeddingConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, EmbeddingConfig::default());
    }

    #[test]
    fn test_validate_consistency_success() {
        let config = EmbeddingConfig::ollama("nomic-embed-text", 768);
        assert!(config.validate_consistency(&config.clone()).is_ok());
    }

    #[test]
    fn test_validate_consistency_provider_mismatch() {
        let config1 = EmbeddingConfig::default();
        let config2 = EmbeddingConfig {
            provider: "ollama".to_string(),
            ..config1.clone()
        };

        let result = config1.validate_consistency(&config2);
        assert!(result.unwrap_err().to_string().contains("Provider mismatch"));
    }

    #[test]
    fn test_validate_consistency_dimension_mismatch() {
        let config1 = EmbeddingConfig::default();
        let config2 = EmbeddingConfig {
            dimensions: 768,
            ..config1.clone()
        };

        assert!(matches!(
            config1.validate_consistency(&config2),
            Err(KnowledgeError::DimensionMismatch {
                expected: 384,
                actual: 768
            })
        ));
    }
}
