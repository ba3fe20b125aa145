//! Metadata filters applied inside the index before top-k truncation.

use crate::document::{is_scalar, Metadata};
use crate::error::{KnowledgeError, KnowledgeResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Conjunction of metadata equality constraints.
///
/// Numbers compare by value (`2026` matches `2026.0`); other values compare
/// as JSON values, so `"1"` and `1` are different.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataFilter {
    equals: BTreeMap<String, serde_json::Value>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key` to equal `value`.
    pub fn eq(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.equals.insert(key.into(), value.into());
        self
    }

    /// Parse CLI-style `key=value` pairs.
    ///
    /// Values that read as JSON numbers or booleans keep that type, anything
    /// else is a string.
    pub fn from_pairs<S: AsRef<str>>(pairs: &[S]) -> KnowledgeResult<Self> {
        let mut filter = Self::new();

        for pair in pairs {
            let pair = pair.as_ref();
            let (key, raw) = pair.split_once('=').ok_or_else(|| {
                KnowledgeError::Validation(format!("Filter '{}' must look like key=value", pair))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(KnowledgeError::Validation(format!(
                    "Filter '{}' has an empty key",
                    pair
                )));
            }

            let value = match serde_json::from_str::<serde_json::Value>(raw.trim()) {
                Ok(v @ (serde_json::Value::Number(_) | serde_json::Value::Bool(_))) => v,
                _ => serde_json::Value::String(raw.trim().to_string()),
            };
            filter.equals.insert(key.to_string(), value);
        }

        Ok(filter)
    }

    pub fn is_empty(&self) -> bool {
        self.equals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.equals.len()
    }

    /// Filter values must be scalars, like metadata values.
    pub fn validate(&self) -> KnowledgeResult<()> {
        for (key, value) in &self.equals {
            if !is_scalar(value) {
                return Err(KnowledgeError::Validation(format!(
                    "Filter value for '{}' must be a string, number or boolean, got {}",
                    key, value
                )));
            }
        }
        Ok(())
    }

    /// True when every constraint holds; the empty filter matches everything.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.equals
            .iter()
            .all(|(key, expected)| metadata.get(key).is_some_and(|v| scalar_eq(v, expected)))
    }
}

fn scalar_eq(stored: &serde_json::Value, expected: &serde_json::Value) -> bool {
    use serde_json::Value;

    match (stored, expected) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
                return x == y;
            }
            if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
                return x == y;
            }
            a.as_f64() == b.as_f64()
        }
        _ => stored == expected,
    }
}

/// Apply an optional filter.
pub(crate) fn passes(filter: Option<&MetadataFilter>, metadata: &Metadata) -> bool {
    filter.map_or(true, |f| f.matches(metadata))
}
