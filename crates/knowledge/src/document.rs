//! Documents, their ids and metadata.

use crate::error::{KnowledgeError, KnowledgeResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable document identifier, assigned by the store's counter or by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for DocumentId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::str::FromStr for DocumentId {
    type Err = KnowledgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(DocumentId)
            .map_err(|_| KnowledgeError::Validation(format!("Invalid document id: '{}'", s)))
    }
}

/// Flat key/value metadata. Values must be scalars (string, number, boolean).
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Whether a metadata value is allowed: strings, numbers and booleans only.
pub fn is_scalar(value: &serde_json::Value) -> bool {
    matches!(
        value,
        serde_json::Value::String(_) | serde_json::Value::Number(_) | serde_json::Value::Bool(_)
    )
}

/// Reject nested objects, arrays and nulls.
pub fn validate_metadata(metadata: &Metadata) -> KnowledgeResult<()> {
    for (key, value) in metadata {
        if !is_scalar(value) {
            return Err(KnowledgeError::Validation(format!(
                "Metadata field '{}' must be a string, number or boolean, got {}",
                key, value
            )));
        }
    }
    Ok(())
}

/// Render a scalar metadata value for display (strings without quotes).
pub fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A unit of text that is embedded and returned as context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,

    /// Text embedded and injected into prompts
    pub text: String,

    /// Used for filtering and citations, never for ranking
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    pub fn new(id: DocumentId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    /// Add one metadata field.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Metadata field rendered as text, if present.
    pub fn metadata_str(&self, key: &str) -> Option<String> {
        self.metadata.get(key).map(display_value)
    }
}

/// A retrieved document with its score under the index metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

/// One document to ingest; the id is assigned by the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestItem {
    #[serde(alias = "document", alias = "content")]
    pub text: String,

    #[serde(default)]
    pub metadata: Metadata,
}

impl IngestItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_metadata_accepted() {
        let doc = Document::new(DocumentId(1), "text")
            .with_metadata("source_type", "rules")
            .with_metadata("year", 2026)
            .with_metadata("official", true);
        assert!(validate_metadata(&doc.metadata).is_ok());
    }

    #[test]
    fn test_nested_metadata_rejected() {
        for value in [json!({"a": 1}), json!([1, 2]), json!(null)] {
            let doc = Document::new(DocumentId(1), "text").with_metadata("bad", value);
            let err = validate_metadata(&doc.metadata).unwrap_err();
            assert!(matches!(err, KnowledgeError::Validation(_)));
        }
    }

    #[test]
    fn test_document_id_parse() {
        assert_eq!("42".parse::<DocumentId>().unwrap(), DocumentId(42));
        assert!("forty-two".parse::<DocumentId>().is_err());
    }

    #[test]
    fn test_ingest_item_accepts_document_alias() {
        let item: IngestItem =
            serde_json::from_value(json!({"document": "hello", "metadata": {"source": "a"}})).unwrap();
        assert_eq!(item.text, "hello");
        assert_eq!(item.metadata["source"], json!("a"));
    }

    #[test]
    fn test_display_value_strips_quotes() {
        assert_eq!(display_value(&json!("Sailing Rules")), "Sailing Rules");
        assert_eq!(display_value(&json!(3)), "3");
    }
}
