//! Ollama embedding provider.
//!
//! Calls `POST /api/embeddings` on a local or remote Ollama server. One
//! request per text; batches run a few requests concurrently and keep input
//! order. Transport failures and 5xx answers are retried with exponential
//! backoff, anything else fails immediately.
//!
//! # Example
//! ```no_run
//! use ragline_knowledge::embeddings::{EmbeddingConfig, EmbeddingProvider};
//! use ragline_knowledge::embeddings::providers::OllamaProvider;
//!
//! # async fn example() -> ragline_core::AppResult<()> {
//! let provider = OllamaProvider::new(EmbeddingConfig::ollama("nomic-embed-text", 768)).await?;
//! let vector = provider.embed("A purple checkered flag signals a shark sighting.").await?;
//! assert_eq!(vector.len(), 768);
//! # Ok(())
//! # }
//! ```

use crate::embeddings::{EmbeddingConfig, EmbeddingProvider};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use ragline_core::{AppError, AppResult};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const EMBEDDINGS_PATH: &str = "/api/embeddings";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Requests in flight per batch.
const BATCH_CONCURRENCY: usize = 4;

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct OllamaErrorBody {
    error: String,
}

/// Why one request failed, and whether another attempt could help.
#[derive(Debug)]
enum RequestFailure {
    Transport(String),
    Status(StatusCode, String),
    Malformed(String),
}

impl RequestFailure {
    fn is_retryable(&self) -> bool {
        match self {
            RequestFailure::Transport(_) => true,
            RequestFailure::Status(status, _) => status.is_server_error(),
            RequestFailure::Malformed(_) => false,
        }
    }

    fn into_app_error(self, base_url: &str) -> AppError {
        match self {
            RequestFailure::Transport(e) => {
                AppError::Llm(format!("Ollama unreachable at {}: {}", base_url, e))
            }
            RequestFailure::Status(status, message) => {
                AppError::Llm(format!("Ollama embeddings error ({}): {}", status, message))
            }
            RequestFailure::Malformed(message) => AppError::Llm(message),
        }
    }
}

/// Attempts and backoff for one embedding request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): doubles each time.
    pub fn backoff(&self, retry: u32) -> Duration {
        self.initial_backoff * 2u32.saturating_pow(retry.saturating_sub(1))
    }
}

/// Embeddings served by an Ollama model.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    dimensions: usize,
    retry: RetryPolicy,
}

/// Config endpoint, then `OLLAMA_URL`, then the local default.
fn resolve_base_url(config: &EmbeddingConfig) -> String {
    config
        .endpoint
        .clone()
        .or_else(|| std::env::var("OLLAMA_URL").ok())
        .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string())
        .trim_end_matches('/')
        .to_string()
}

impl OllamaProvider {
    /// Build the provider and check the model returns vectors of the
    /// configured dimension.
    pub async fn new(config: EmbeddingConfig) -> AppResult<Self> {
        let provider = Self::unverified(config)?;
        provider.probe().await?;
        Ok(provider)
    }

    /// Build the provider without contacting the server.
    pub fn unverified(config: EmbeddingConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Llm(format!("Failed to build Ollama HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: resolve_base_url(&config),
            model: config.model,
            dimensions: config.dimensions,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[instrument(skip(self), fields(model = %self.model, url = %self.base_url))]
    async fn probe(&self) -> AppResult<()> {
        self.embed_one("dimension probe").await.map_err(|e| {
            tracing::error!("Ollama embedding model check failed: {}", e);
            AppError::Llm(format!(
                "{}. Is Ollama running and is '{}' pulled? Try: ollama pull {}",
                e, self.model, self.model
            ))
        })?;
        tracing::debug!("Ollama embedding model '{}' ready", self.model);
        Ok(())
    }

    /// One text, retried per the policy.
    async fn embed_one(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut retry = 0;
        loop {
            match self.request(text).await {
                Ok(vector) => return Ok(vector),
                Err(failure) if failure.is_retryable() && retry + 1 < self.retry.attempts => {
                    retry += 1;
                    let delay = self.retry.backoff(retry);
                    tracing::warn!(
                        "Embedding request failed ({:?}), retry {}/{} in {:?}",
                        failure,
                        retry,
                        self.retry.attempts - 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(failure) => return Err(failure.into_app_error(&self.base_url)),
            }
        }
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>, RequestFailure> {
        let url = format!("{}{}", self.base_url, EMBEDDINGS_PATH);
        let response = self
            .client
            .post(&url)
            .json(&EmbeddingsRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| RequestFailure::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OllamaErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or(body);
            return Err(RequestFailure::Status(status, message));
        }

        let body: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| RequestFailure::Malformed(format!("Unreadable Ollama response: {}", e)))?;

        if body.embedding.len() != self.dimensions {
            return Err(RequestFailure::Malformed(format!(
                "Model '{}' returned {} dimensions, collection expects {}",
                self.model,
                body.embedding.len(),
                self.dimensions
            )));
        }
        Ok(body.embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[instrument(skip(self, texts), fields(batch = texts.len(), model = %self.model))]
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if let Some(blank) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(AppError::Llm(format!("Text {} of the batch is empty", blank)));
        }

        // Built eagerly so the async-trait future does not capture a lazy
        // borrowing closure.
        let calls: Vec<_> = texts.iter().map(|text| self.embed_one(text.as_str())).collect();
        futures::stream::iter(calls)
            .buffered(BATCH_CONCURRENCY)
            .try_collect()
            .await
    }
}
