//! Embedding collaborators.
//!
//! The retriever and knowledge base only see [`EmbeddingProvider`]; which
//! provider backs a collection is chosen by its [`EmbeddingConfig`].

pub mod config;
pub mod provider;
pub mod providers;

pub use config::EmbeddingConfig;
pub use provider::{create_provider, EmbeddingProvider};
