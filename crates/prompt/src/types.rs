//! Prompt types.

use serde::{Deserialize, Serialize};

/// A prompt definition loaded from YAML.
///
/// ```yaml
/// id: rag.grounded
/// title: Sailing official
/// apiVersion: "1.0"
/// template: |
///   You are a race official assistant.
///   Context: {{context}}
///
///   Question: {{question}}
///   Answer:
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptDefinition {
    /// Unique prompt identifier
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Creator identifier
    #[serde(rename = "createdBy", default)]
    pub created_by: String,

    /// Template string with Handlebars syntax
    pub template: String,
}
