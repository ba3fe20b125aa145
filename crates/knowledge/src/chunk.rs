//! Size/overlap chunking of ingest items.
//!
//! Long texts are cut into pieces of at most `chunk_size` characters with up
//! to `chunk_overlap` characters shared between neighbours, preferring
//! paragraph, sentence and word boundaries. Each piece keeps the item's
//! metadata plus its position (`chunk`) and the piece count (`chunks`).

use crate::document::IngestItem;
use crate::error::{KnowledgeError, KnowledgeResult};
use text_splitter::{ChunkConfig, TextSplitter};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Metadata key holding a piece's 0-based position in its source text.
pub const CHUNK_KEY: &str = "chunk";

/// Metadata key holding how many pieces the source text produced.
pub const CHUNK_COUNT_KEY: &str = "chunks";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl Chunker {
    /// `chunk_overlap` must be smaller than a non-zero `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> KnowledgeResult<Self> {
        if chunk_size == 0 {
            return Err(KnowledgeError::Validation(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(KnowledgeError::Validation(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split one item. Texts that already fit come back unchanged.
    pub fn split(&self, item: IngestItem) -> KnowledgeResult<Vec<IngestItem>> {
        if item.text.chars().count() <= self.chunk_size {
            return Ok(vec![item]);
        }

        let config = ChunkConfig::new(self.chunk_size)
            .with_overlap(self.chunk_overlap)
            .map_err(|e| KnowledgeError::Validation(e.to_string()))?;
        let splitter = TextSplitter::new(config);

        let pieces: Vec<&str> = splitter
            .chunks(&item.text)
            .filter(|piece| !piece.trim().is_empty())
            .collect();
        let total = pieces.len();

        Ok(pieces
            .into_iter()
            .enumerate()
            .map(|(position, piece)| {
                let mut metadata = item.metadata.clone();
                metadata.insert(CHUNK_KEY.to_string(), position.into());
                metadata.insert(CHUNK_COUNT_KEY.to_string(), total.into());
                IngestItem {
                    text: piece.to_string(),
                    metadata,
                }
            })
            .collect())
    }

    /// Split every item, keeping input order.
    pub fn split_all(&self, items: Vec<IngestItem>) -> KnowledgeResult<Vec<IngestItem>> {
        let before = items.len();
        let mut pieces = Vec::with_capacity(before);
        for item in items {
            pieces.extend(self.split(item)?);
        }

        if pieces.len() != before {
            tracing::debug!(
                "Chunked {} items into {} pieces (size {}, overlap {})",
                before,
                pieces.len(),
                self.chunk_size,
                self.chunk_overlap
            );
        }
        Ok(pieces)
    }
}
