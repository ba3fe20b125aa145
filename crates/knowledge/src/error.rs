//! Error types for the knowledge crate.
//!
//! Lower components raise the most specific variant they can; the RAG
//! pipeline wraps whatever reached it in [`KnowledgeError::Pipeline`] tagged
//! with the stage that failed.

use crate::document::DocumentId;
use crate::pipeline::PipelineStage;
use ragline_core::AppError;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the document store, index, retriever and pipeline.
#[derive(Error, Debug)]
pub enum KnowledgeError {
    /// Malformed input: non-scalar metadata, `top_k == 0`, non-finite vectors
    #[error("Validation error: {0}")]
    Validation(String),

    /// A vector's length differs from the index dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Zero-norm vector under the cosine metric
    #[error("Degenerate vector: {0}")]
    DegenerateVector(String),

    #[error("Document {0} not found")]
    NotFound(DocumentId),

    /// The index returned an id the document store does not hold
    #[error("Index returned document {0}, which is missing from the document store")]
    Consistency(DocumentId),

    /// The embedding collaborator failed at query time
    #[error("Retrieval failed: {0}")]
    Retrieval(#[source] AppError),

    /// The embedding collaborator failed during ingestion or setup
    #[error("Embedding failed: {0}")]
    Embedding(#[source] AppError),

    /// The generation collaborator failed
    #[error("Generation failed: {0}")]
    Generation(#[source] AppError),

    /// Prompt templates could not be rendered
    #[error("Prompt rendering failed: {0}")]
    Prompt(#[source] AppError),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Terminal failure of a pipeline run, tagged with the failing stage
    #[error("Pipeline failed while {stage}: {source}")]
    Pipeline {
        stage: PipelineStage,
        #[source]
        source: Box<KnowledgeError>,
    },

    /// Persistence and on-disk layout errors
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl KnowledgeError {
    /// Tag an error with the pipeline stage it escaped from.
    pub fn at_stage(self, stage: PipelineStage) -> Self {
        KnowledgeError::Pipeline {
            stage,
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through pipeline stage tags.
    pub fn root(&self) -> &KnowledgeError {
        match self {
            KnowledgeError::Pipeline { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<serde_yaml::Error> for KnowledgeError {
    fn from(err: serde_yaml::Error) -> Self {
        KnowledgeError::Storage(format!("Invalid YAML: {}", err))
    }
}

impl From<KnowledgeError> for AppError {
    fn from(err: KnowledgeError) -> Self {
        match err {
            KnowledgeError::Io(e) => AppError::Io(e),
            KnowledgeError::Serialization(e) => AppError::Serialization(e.to_string()),
            other => AppError::Knowledge(other.to_string()),
        }
    }
}

/// Convenience type alias for Results with KnowledgeError.
pub type KnowledgeResult<T> = Result<T, KnowledgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_names_stage() {
        let err = KnowledgeError::Consistency(DocumentId(7)).at_stage(PipelineStage::Retrieving);
        let message = err.to_string();
        assert!(message.contains("retrieving"));
        assert!(message.contains("document 7"));
        assert!(matches!(err.root(), KnowledgeError::Consistency(DocumentId(7))));
    }

    #[test]
    fn test_converts_into_app_error() {
        let app: AppError = KnowledgeError::DimensionMismatch {
            expected: 3,
            actual: 4,
        }
        .into();
        assert!(matches!(app, AppError::Knowledge(_)));
        assert!(app.to_string().contains("expected 3, got 4"));
    }

    #[test]
    fn test_timeout_display() {
        let err = KnowledgeError::Timeout {
            operation: "embedding",
            after: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "embedding timed out after 250ms");
    }
}
