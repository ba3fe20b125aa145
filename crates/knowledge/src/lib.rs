//! Retrieval-augmented generation over local document collections.
//!
//! Documents live in a [`DocumentStore`]; their embeddings live in a
//! [`VectorIndex`] (exact flat search or IVF). A [`Retriever`] embeds a
//! query and ranks documents, the [`ContextAssembler`] turns them into a
//! context block with citations, and the [`RagPipeline`] renders the prompt
//! and calls the generator. Long texts are split by the [`Chunker`] before
//! they are embedded. [`KnowledgeBase`] ties one named collection
//! together and persists it under `.ragline/collections/<name>/`.

pub mod base;
pub mod chunk;
pub mod config;
pub mod context;
pub mod document;
pub mod embeddings;
pub mod error;
pub mod filter;
pub mod index;
pub mod loader;
pub mod pipeline;
pub mod retriever;
pub mod store;

#[cfg(test)]
mod tests;

pub use base::{clean, BaseStats, IngestPolicy, IngestReport, KnowledgeBase};
pub use chunk::Chunker;
pub use config::KnowledgeBaseConfig;
pub use context::{AssembledContext, ContextAssembler};
pub use document::{Document, DocumentId, IngestItem, Metadata, ScoredDocument};
pub use embeddings::{create_provider, EmbeddingConfig, EmbeddingProvider};
pub use error::{KnowledgeError, KnowledgeResult};
pub use filter::MetadataFilter;
pub use index::{
    create_index, load_index, EmbeddingRecord, FlatIndex, IndexConfig, IndexKind, IvfIndex, Metric,
    SearchHit, VectorIndex,
};
pub use pipeline::{PipelineConfig, PipelineStage, RagAnswer, RagPipeline, StreamingAnswer};
pub use retriever::{CollectionLock, Retriever, RetrieverConfig};
pub use store::{DocumentStore, MemoryDocumentStore};
