//! Generation client crate for Ragline.
//!
//! This crate provides a provider-agnostic abstraction over the text generation
//! collaborator used by the RAG pipeline. Callers build one client up front and
//! inject it wherever answers are generated.
//!
//! # Providers
//! - **Ollama**: Local LLM runtime (default)
//! - **Gemini**: Google's hosted models, authenticated with an API key
//!
//! # Example
//! ```no_run
//! use ragline_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("Context: ...\n\nQuestion: Who won?\nAnswer:", "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;

// Re-export main types
pub use client::{
    collect_stream, LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage,
};
pub use factory::{create_client, ProviderType};
pub use providers::{GeminiClient, OllamaClient};
