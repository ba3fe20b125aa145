//! Ollama generation provider.
//!
//! This module provides integration with Ollama, a local LLM runtime.
//! Ollama API: https://github.com/ollama/ollama/blob/main/docs/api.md

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
use futures::StreamExt;
use ragline_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

const GENERATE_ENDPOINT: &str = "/api/generate";

/// Ollama API request format.
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "OllamaOptions::is_empty")]
    options: OllamaOptions,
    stream: bool,
}

/// Sampling options nested under `options` in the Ollama API.
#[derive(Debug, Default, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

impl OllamaOptions {
    fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.num_predict.is_none()
    }
}

/// Ollama API response format (one object, or one line per streamed chunk).
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    model: String,
    response: String,
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

impl OllamaResponse {
    fn usage(&self) -> LlmUsage {
        LlmUsage::new(
            self.prompt_eval_count.unwrap_or(0),
            self.eval_count.unwrap_or(0),
        )
    }
}

/// Ollama generation client.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    /// Create a new Ollama client against `http://localhost:11434`.
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_OLLAMA_URL)
    }

    /// Create a new Ollama client with a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Create a client whose HTTP transport gives up after `timeout`.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Llm(format!("Failed to create HTTP client for Ollama: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn to_ollama_request(&self, request: &LlmRequest, stream: bool) -> OllamaRequest {
        OllamaRequest {
            model: request.model.clone(),
            prompt: request.prompt.clone(),
            system: request.system.clone(),
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
            stream,
        }
    }

    async fn send(&self, request: &OllamaRequest) -> AppResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, GENERATE_ENDPOINT);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to send request to Ollama: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Llm(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Split complete newline-delimited JSON lines out of `buffer`, leaving any partial tail.
fn drain_lines(buffer: &mut String) -> Vec<AppResult<LlmStreamChunk>> {
    let mut chunks = Vec::new();

    while let Some(pos) = buffer.find('\n') {
        let line: String = buffer.drain(..=pos).collect();
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        chunks.push(
            serde_json::from_str::<OllamaResponse>(line)
                .map_err(|e| AppError::Llm(format!("Failed to parse chunk: {}", e)))
                .map(|parsed| LlmStreamChunk {
                    usage: parsed.done.then(|| parsed.usage()),
                    content: parsed.response,
                    model: parsed.model,
                    done: parsed.done,
                }),
        );
    }

    chunks
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::debug!(model = %request.model, prompt_len = request.prompt.len(), "Sending completion request to Ollama");

        let ollama_request = self.to_ollama_request(request, false);
        let response = self.send(&ollama_request).await?;

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Ollama response: {}", e)))?;

        tracing::debug!(
            model = %ollama_response.model,
            eval_count = ollama_response.eval_count.unwrap_or(0),
            "Received completion from Ollama"
        );

        Ok(LlmResponse {
            usage: ollama_response.usage(),
            content: ollama_response.response,
            model: ollama_response.model,
            done: ollama_response.done,
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        tracing::debug!(model = %request.model, "Starting streaming request to Ollama");

        let ollama_request = self.to_ollama_request(request, true);
        let response = self.send(&ollama_request).await?;

        // Byte chunks do not align with lines, so carry the partial tail between polls.
        let stream = response
            .bytes_stream()
            .scan(String::new(), |buffer, result| {
                let items = match result {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        drain_lines(buffer)
                    }
                    Err(e) => vec![Err(AppError::Llm(format!("Stream error: {}", e)))],
                };
                futures::future::ready(Some(futures::stream::iter(items)))
            })
            .flatten();

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_client_creation() {
        let client = OllamaClient::new();
        assert_eq!(client.provider_name(), "ollama");
        assert_eq!(client.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let client = OllamaClient::with_base_url("http://gpu-box:11434/");
        assert_eq!(client.base_url, "http://gpu-box:11434");
    }

    #[test]
    fn test_ollama_request_conversion() {
        let client = OllamaClient::new();
        let request = LlmRequest::new("Hello", "llama3")
            .with_temperature(0.7)
            .with_max_tokens(100);

        let ollama_req = client.to_ollama_request(&request, false);
        assert_eq!(ollama_req.model, "llama3");
        assert_eq!(ollama_req.prompt, "Hello");
        assert_eq!(ollama_req.options.temperature, Some(0.7));
        assert_eq!(ollama_req.options.num_predict, Some(100));
        assert!(!ollama_req.stream);
    }

    #[test]
    fn test_empty_options_are_omitted() {
        let client = OllamaClient::new();
        let request = LlmRequest::new("Hello", "llama3");

        let json = serde_json::to_value(client.to_ollama_request(&request, true)).unwrap();
        assert!(json.get("options").is_none());
        assert_eq!(json["stream"], serde_json::json!(true));
    }

    #[test]
    fn test_drain_lines_keeps_partial_tail() {
        let mut buffer = String::from(
            "{\"model\":\"m\",\"response\":\"Hel\",\"done\":false}\n{\"model\":\"m\",\"resp",
        );

        let chunks = drain_lines(&mut buffer);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap().content, "Hel");
        assert_eq!(buffer, "{\"model\":\"m\",\"resp");

        buffer.push_str("onse\":\"lo\",\"done\":true,\"eval_count\":2}\n");
        let chunks = drain_lines(&mut buffer);
        let last = chunks[0].as_ref().unwrap();
        assert!(last.done);
        assert_eq!(last.usage.as_ref().map(|u| u.completion_tokens), Some(2));
        assert!(buffer.is_empty());
    }
}
