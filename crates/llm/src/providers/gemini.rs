//! Gemini generation provider.
//!
//! Talks to the Generative Language REST API with an API key. Completions use
//! `generateContent`; streaming uses `streamGenerateContent?alt=sse`, where each
//! server-sent event carries one partial response.

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
use eventsource_stream::Eventsource;
use futures::StreamExt;
use ragline_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Environment variable consulted for the key when nothing else is configured.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(text: &str, role: Option<&str>) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

impl GenerationConfig {
    fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.max_output_tokens.is_none()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "GenerationConfig::is_empty")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

/// One `generateContent` answer, or one streamed event.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

impl GeminiResponse {
    /// Concatenated text of the first candidate.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| content.parts.iter().map(|p| p.text.as_str()).collect())
            .unwrap_or_default()
    }

    fn finished(&self) -> bool {
        self.candidates
            .first()
            .is_some_and(|c| c.finish_reason.is_some())
    }

    fn usage(&self) -> LlmUsage {
        self.usage_metadata
            .as_ref()
            .map(|u| LlmUsage::new(u.prompt_token_count, u.candidates_token_count))
            .unwrap_or_default()
    }

    fn model_or(&self, requested: &str) -> String {
        self.model_version
            .clone()
            .unwrap_or_else(|| requested.to_string())
    }
}

/// Parse the payload of one server-sent event.
fn parse_event(data: &str, model: &str) -> AppResult<LlmStreamChunk> {
    let parsed: GeminiResponse = serde_json::from_str(data)
        .map_err(|e| AppError::Llm(format!("Failed to parse Gemini event: {}", e)))?;
    let done = parsed.finished();

    Ok(LlmStreamChunk {
        content: parsed.text(),
        model: parsed.model_or(model),
        usage: done.then(|| parsed.usage()),
        done,
    })
}

/// Gemini generation client.
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Create a client against the public endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_GEMINI_URL, api_key)
    }

    /// Create a client with a custom base URL (a proxy or a test server).
    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Create a client whose HTTP transport gives up after `timeout`.
    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Llm(format!("Failed to create HTTP client for Gemini: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    fn to_gemini_request(&self, request: &LlmRequest) -> GeminiRequest {
        GeminiRequest {
            contents: vec![Content::text(&request.prompt, Some("user"))],
            system_instruction: request.system.as_deref().map(|s| Content::text(s, None)),
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        }
    }

    fn url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    async fn send(&self, url: &str, request: &GeminiRequest) -> AppResult<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to send request to Gemini: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Llm(format!(
                "Gemini API error ({}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl LlmClient for GeminiClient {
    fn provider_name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::debug!(model = %request.model, prompt_len = request.prompt.len(), "Sending completion request to Gemini");

        let url = self.url(&request.model, "generateContent");
        let response = self.send(&url, &self.to_gemini_request(request)).await?;

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Gemini response: {}", e)))?;
        if parsed.candidates.is_empty() {
            return Err(AppError::Llm("Gemini returned no candidates".to_string()));
        }

        let usage = parsed.usage();
        tracing::debug!(
            model = %request.model,
            completion_tokens = usage.completion_tokens,
            "Received completion from Gemini"
        );

        Ok(LlmResponse {
            content: parsed.text(),
            model: parsed.model_or(&request.model),
            usage,
            done: true,
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        tracing::debug!(model = %request.model, "Starting streaming request to Gemini");

        let url = format!("{}?alt=sse", self.url(&request.model, "streamGenerateContent"));
        let response = self.send(&url, &self.to_gemini_request(request)).await?;

        let model = request.model.clone();
        let stream = response.bytes_stream().eventsource().map(move |event| match event {
            Ok(event) => parse_event(&event.data, &model),
            Err(e) => Err(AppError::Llm(format!("Stream error: {}", e))),
        });

        Ok(Box::pin(stream))
    }
}
