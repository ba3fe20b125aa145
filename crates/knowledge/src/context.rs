//! Context assembly: retrieved documents to a prompt-ready text block.

use crate::document::{display_value, DocumentId, Metadata, ScoredDocument};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Metadata key used to de-duplicate sources unless configured otherwise.
pub const DEFAULT_SOURCE_KEY: &str = "source_url";

const BLOCK_SEPARATOR: &str = "\n\n";

/// Assembled context plus what went into it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    /// Document blocks joined by a blank line
    pub text: String,

    /// Metadata of the used documents, de-duplicated, first-seen order
    pub sources: Vec<Metadata>,

    /// Ids of the documents included, in ranked order
    pub documents: Vec<DocumentId>,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Joins ranked documents into one context block.
///
/// A document carrying `source`, `source_title` or `source_url` metadata is
/// followed by a citation line such as
/// `[Source: Race Rules, Flags — https://example.org/rules]`.
/// With `max_chars` set, whole documents are dropped from the tail until the
/// text fits; a document is never cut in half.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextAssembler {
    max_chars: Option<usize>,
    source_key: String,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self {
            max_chars: None,
            source_key: DEFAULT_SOURCE_KEY.to_string(),
        }
    }
}

impl ContextAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_chars(mut self, max_chars: Option<usize>) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn with_source_key(mut self, source_key: impl Into<String>) -> Self {
        self.source_key = source_key.into();
        self
    }

    pub fn max_chars(&self) -> Option<usize> {
        self.max_chars
    }

    pub fn source_key(&self) -> &str {
        &self.source_key
    }

    pub fn assemble(&self, documents: &[ScoredDocument]) -> AssembledContext {
        let mut context = AssembledContext::default();
        let mut seen_sources = HashSet::new();
        let mut used_chars = 0usize;

        for scored in documents {
            let document = &scored.document;
            let block = match citation(&document.metadata) {
                Some(line) => format!("{}\n{}", document.text, line),
                None => document.text.clone(),
            };

            let separator = if context.text.is_empty() { 0 } else { BLOCK_SEPARATOR.len() };
            let block_chars = block.chars().count();
            if let Some(max) = self.max_chars {
                if used_chars + separator + block_chars > max {
                    tracing::debug!(
                        "Context limit of {} chars reached, dropping {} trailing documents",
                        max,
                        documents.len() - context.documents.len()
                    );
                    break;
                }
            }

            if separator > 0 {
                context.text.push_str(BLOCK_SEPARATOR);
            }
            context.text.push_str(&block);
            used_chars += separator + block_chars;
            context.documents.push(document.id);

            if document.metadata.is_empty() {
                continue;
            }
            let key = document
                .metadata
                .get(&self.source_key)
                .map(display_value)
                .unwrap_or_else(|| format!("id:{}", document.id));
            if seen_sources.insert(key) {
                context.sources.push(document.metadata.clone());
            }
        }

        context
    }
}

/// `[Source: <title>[, <section>] — <url>]`, omitting whichever half is missing.
fn citation(metadata: &Metadata) -> Option<String> {
    let title = metadata
        .get("source_title")
        .or_else(|| metadata.get("source"))
        .map(display_value);
    let section = metadata.get("section").map(display_value);
    let url = metadata.get("source_url").map(display_value);

    let title = match (title, section) {
        (Some(title), Some(section)) => Some(format!("{}, {}", title, section)),
        (title, _) => title,
    };

    match (title, url) {
        (Some(title), Some(url)) => Some(format!("[Source: {} — {}]", title, url)),
        (Some(title), None) => Some(format!("[Source: {}]", title)),
        (None, Some(url)) => Some(format!("[Source: {}]", url)),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    fn scored(document: Document) -> ScoredDocument {
        ScoredDocument {
            document,
            score: 1.0,
        }
    }

    fn rules_doc(id: u64, text: &str) -> Document {
        Document::new(DocumentId(id), text)
            .with_metadata("source_title", "Emerald Bay Sailing Instructions")
            .with_metadata("section", "Flags")
            .with_metadata("source_url", "https://example.org/si")
    }

    #[test]
    fn test_plain_documents_joined_by_blank_line() {
        let docs = vec![
            scored(Document::new(DocumentId(0), "First.")),
            scored(Document::new(DocumentId(1), "Second.")),
        ];

        let context = ContextAssembler::new().assemble(&docs);
        assert_eq!(context.text, "First.\n\nSecond.");
        assert!(context.sources.is_empty());
        assert_eq!(context.documents, vec![DocumentId(0), DocumentId(1)]);
    }

    #[test]
    fn test_citation_line_with_section() {
        let docs = vec![scored(rules_doc(0, "A purple checkered flag signals a shark sighting."))];
        let context = ContextAssembler::new().assemble(&docs);

        assert_eq!(
            context.text,
            "A purple checkered flag signals a shark sighting.\n\
             [Source: Emerald Bay Sailing Instructions, Flags — https://example.org/si]"
        );
    }

    #[test]
    fn test_citation_falls_back_to_source() {
        let doc = Document::new(DocumentId(0), "Text").with_metadata("source", "data.txt");
        let context = ContextAssembler::new().assemble(&[scored(doc)]);
        assert_eq!(context.text, "Text\n[Source: data.txt]");
    }

    #[test]
    fn test_citation_url_only() {
        let doc = Document::new(DocumentId(0), "Text").with_metadata("source_url", "https://x.org");
        let context = ContextAssembler::new().assemble(&[scored(doc)]);
        assert_eq!(context.text, "Text\n[Source: https://x.org]");
    }

    #[test]
    fn test_sources_deduplicated_by_key() {
        let docs = vec![
            scored(rules_doc(0, "One.")),
            scored(Document::new(DocumentId(1), "Two.").with_metadata("source", "notes")),
            scored(rules_doc(2, "Three.")),
        ];

        let context = ContextAssembler::new().assemble(&docs);
        assert_eq!(context.sources.len(), 2);
        assert_eq!(context.sources[0]["source_url"], "https://example.org/si");
        assert_eq!(context.sources[1]["source"], "notes");
        assert_eq!(context.documents.len(), 3);
    }

    #[test]
    fn test_custom_source_key() {
        let docs = vec![
            scored(Document::new(DocumentId(0), "A").with_metadata("source", "same")),
            scored(Document::new(DocumentId(1), "B").with_metadata("source", "same")),
        ];

        let by_url = ContextAssembler::new().assemble(&docs);
        assert_eq!(by_url.sources.len(), 2);

        let by_source = ContextAssembler::new().with_source_key("source").assemble(&docs);
        assert_eq!(by_source.sources.len(), 1);
    }

    #[test]
    fn test_max_chars_drops_whole_documents() {
        let docs = vec![
            scored(Document::new(DocumentId(0), "12345")),
            scored(Document::new(DocumentId(1), "67890")),
            scored(Document::new(DocumentId(2), "abcde")),
        ];

        // "12345\n\n67890" is 12 chars; the third block would need 19.
        let context = ContextAssembler::new().with_max_chars(Some(15)).assemble(&docs);
        assert_eq!(context.text, "12345\n\n67890");
        assert_eq!(context.documents, vec![DocumentId(0), DocumentId(1)]);
    }

    #[test]
    fn test_first_document_too_long_gives_empty_context() {
        let docs = vec![scored(Document::new(DocumentId(0), "far too long"))];
        let context = ContextAssembler::new().with_max_chars(Some(4)).assemble(&docs);
        assert!(context.is_empty());
        assert_eq!(context.text, "");
    }
}
