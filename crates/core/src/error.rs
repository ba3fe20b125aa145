//! Error types for the Ragline workspace.
//!
//! This module defines the application-level error enum. Library crates keep
//! their own, more specific error types and convert into `AppError` at the
//! boundary with the CLI.

use thiserror::Error;

/// Unified error type for the Ragline CLI and its collaborators.
///
/// Collaborator clients (LLM, prompt rendering) return `Result<T, AppError>`.
/// We never panic; errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors (generation and embedding transports)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Knowledge base, retrieval and pipeline errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_error_converts_to_serialization() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let app: AppError = err.into();
        assert!(matches!(app, AppError::Serialization(_)));
    }

    #[test]
    fn test_display_includes_category() {
        let err = AppError::Llm("connection refused".to_string());
        assert_eq!(err.to_string(), "LLM error: connection refused");
    }
}
