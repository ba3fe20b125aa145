//! Shared fixtures: the flag documents, fake generators and vector data.

use crate::context::ContextAssembler;
use crate::document::{Document, DocumentId};
use crate::embeddings::providers::TrigramProvider;
use crate::embeddings::EmbeddingProvider;
use crate::index::{EmbeddingRecord, FlatIndex, Metric, VectorIndex};
use crate::pipeline::{PipelineConfig, RagPipeline};
use crate::retriever::{Retriever, RetrieverConfig};
use crate::store::{DocumentStore, MemoryDocumentStore};
use ragline_core::{AppError, AppResult};
use ragline_llm::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
use ragline_prompt::PromptTemplates;
use std::sync::Arc;
use std::time::Duration;

pub(crate) const FLAG_TEXT: &str = "A purple checkered flag signals a shark sighting.";
pub(crate) const RACE_TEXT: &str = "The race starts at 10:00.";
pub(crate) const FLAG_QUESTION: &str = "What does a purple flag mean?";

pub(crate) const DIMENSIONS: usize = 384;

/// Documents 0 and 1 of the end-to-end scenario.
pub(crate) fn flag_documents() -> Vec<Document> {
    vec![
        Document::new(DocumentId(0), FLAG_TEXT)
            .with_metadata("source_type", "rules")
            .with_metadata("source_title", "Sailing Instructions"),
        Document::new(DocumentId(1), RACE_TEXT).with_metadata("source_type", "notice"),
    ]
}

/// Embed `documents` with `embedder` into a fresh store and flat index.
pub(crate) async fn index_documents(
    embedder: &dyn EmbeddingProvider,
    documents: Vec<Document>,
) -> (Arc<MemoryDocumentStore>, Arc<FlatIndex>) {
    let store = Arc::new(MemoryDocumentStore::new());
    let index = Arc::new(FlatIndex::new(embedder.dimensions(), Metric::Cosine));

    for document in documents {
        let vector = embedder.embed(&document.text).await.unwrap();
        index
            .insert(EmbeddingRecord::new(document.id, vector).with_metadata(document.metadata.clone()))
            .unwrap();
        store.put(document).unwrap();
    }

    (store, index)
}

pub(crate) async fn flag_retriever() -> Retriever {
    let embedder = Arc::new(TrigramProvider::new(DIMENSIONS));
    let (store, index) = index_documents(embedder.as_ref(), flag_documents()).await;
    Retriever::new(embedder, index, store, RetrieverConfig::default())
}

pub(crate) async fn flag_pipeline(
    llm: Arc<dyn LlmClient>,
    generate_timeout: Option<Duration>,
) -> RagPipeline {
    RagPipeline::new(
        flag_retriever().await,
        ContextAssembler::new(),
        PromptTemplates::default(),
        llm,
        PipelineConfig::new("echo").with_generate_timeout(generate_timeout),
    )
}

/// Generator that answers with its prompt.
pub(crate) struct EchoLlm;

fn echo(request: &LlmRequest) -> LlmResponse {
    LlmResponse {
        content: request.prompt.clone(),
        model: request.model.clone(),
        usage: LlmUsage::default(),
        done: true,
    }
}

#[async_trait::async_trait]
impl LlmClient for EchoLlm {
    fn provider_name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        Ok(echo(request))
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        let model = request.model.clone();
        let mut chunks: Vec<AppResult<LlmStreamChunk>> = request
            .prompt
            .split_inclusive(' ')
            .map(|piece| {
                Ok(LlmStreamChunk {
                    content: piece.to_string(),
                    model: model.clone(),
                    done: false,
                    usage: None,
                })
            })
            .collect();
        chunks.push(Ok(LlmStreamChunk {
            content: String::new(),
            model,
            done: true,
            usage: Some(LlmUsage::default()),
        }));
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

/// Generator whose backend is down.
pub(crate) struct FailingLlm;

#[async_trait::async_trait]
impl LlmClient for FailingLlm {
    fn provider_name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: &LlmRequest) -> AppResult<LlmResponse> {
        Err(AppError::Llm("model unavailable".to_string()))
    }

    async fn stream(&self, _request: &LlmRequest) -> AppResult<LlmStream> {
        Err(AppError::Llm("model unavailable".to_string()))
    }
}

/// Generator that takes far longer than any test timeout.
pub(crate) struct SlowLlm;

#[async_trait::async_trait]
impl LlmClient for SlowLlm {
    fn provider_name(&self) -> &str {
        "slow"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(echo(request))
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        EchoLlm.stream(request).await
    }
}

/// Deterministic pseudo-random numbers in `[-1, 1)`.
pub(crate) struct Lcg(u64);

impl Lcg {
    pub(crate) fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub(crate) fn next_f32(&mut self) -> f32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
    }

    pub(crate) fn vector(&mut self, dimension: usize) -> Vec<f32> {
        (0..dimension).map(|_| self.next_f32()).collect()
    }
}

/// `n` random records tagged with `group = id % 3`.
pub(crate) fn random_records(n: u64, dimension: usize, seed: u64) -> Vec<EmbeddingRecord> {
    let mut rng = Lcg::new(seed);
    (0..n)
        .map(|id| {
            let mut metadata = crate::document::Metadata::new();
            metadata.insert("group".to_string(), serde_json::json!(id % 3));
            EmbeddingRecord::new(DocumentId(id), rng.vector(dimension)).with_metadata(metadata)
        })
        .collect()
}

/// Records in four tight, well separated clusters.
pub(crate) fn clustered_records(per_cluster: u64, seed: u64) -> Vec<EmbeddingRecord> {
    let centers = [[10.0, 10.0], [-10.0, 10.0], [-10.0, -10.0], [10.0, -10.0]];
    let mut rng = Lcg::new(seed);
    let mut records = Vec::new();

    for i in 0..per_cluster {
        for (c, center) in centers.iter().enumerate() {
            let id = i * centers.len() as u64 + c as u64;
            let vector = vec![center[0] + rng.next_f32(), center[1] + rng.next_f32()];
            records.push(EmbeddingRecord::new(DocumentId(id), vector));
        }
    }
    records
}
