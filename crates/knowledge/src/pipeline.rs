//! RAG pipeline: question to retrieval, context, prompt and answer.
//!
//! A run moves through
//! `Start → Retrieving → ContextReady → Generating → Done`, or
//! `Start → NoContext → Generating → Done` for the baseline without
//! retrieval. Any failure ends the run; the error is tagged with the stage
//! it escaped from and no partial answer is returned.

use crate::context::{AssembledContext, ContextAssembler};
use crate::document::{Metadata, ScoredDocument};
use crate::error::{KnowledgeError, KnowledgeResult};
use crate::filter::MetadataFilter;
use crate::retriever::Retriever;
use ragline_llm::{LlmClient, LlmRequest, LlmStream};
use ragline_prompt::PromptTemplates;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Start,
    Retrieving,
    ContextReady,
    Generating,
    Done,
    NoContext,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PipelineStage::Start => "starting",
            PipelineStage::Retrieving => "retrieving",
            PipelineStage::ContextReady => "building the prompt",
            PipelineStage::Generating => "generating",
            PipelineStage::Done => "done",
            PipelineStage::NoContext => "building the no-context prompt",
        };
        f.write_str(label)
    }
}

/// Generation settings for a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Generation model identifier
    pub model: String,

    /// Bound on the generation call (or on opening the stream)
    pub generate_timeout: Option<Duration>,

    pub temperature: Option<f32>,

    pub max_tokens: Option<u32>,
}

impl PipelineConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            generate_timeout: None,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_generate_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.generate_timeout = timeout;
        self
    }
}

/// Final result of one grounded or baseline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagAnswer {
    pub question: String,
    pub answer: String,

    /// Citation metadata of the documents used, de-duplicated
    pub sources: Vec<Metadata>,

    /// Exact prompt sent to the generator
    pub prompt: String,

    /// Retrieved documents in ranked order (empty without context)
    pub retrieved: Vec<ScoredDocument>,
}

/// Grounded run whose answer arrives as a stream of chunks.
///
/// The stream is finite and cannot be restarted.
pub struct StreamingAnswer {
    pub question: String,
    pub sources: Vec<Metadata>,
    pub prompt: String,
    pub retrieved: Vec<ScoredDocument>,
    pub stream: LlmStream,
}

impl fmt::Debug for StreamingAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingAnswer")
            .field("question", &self.question)
            .field("sources", &self.sources)
            .field("prompt", &self.prompt)
            .field("retrieved", &self.retrieved.len())
            .finish_non_exhaustive()
    }
}

/// Transient state of one run; never shared between runs.
#[derive(Debug)]
pub struct PipelineRun {
    pub question: String,
    pub stage: PipelineStage,
    pub retrieved: Vec<ScoredDocument>,
    pub context: AssembledContext,
    pub prompt: String,
    pub answer: String,
}

impl PipelineRun {
    fn new(question: &str) -> Self {
        Self {
            question: question.to_string(),
            stage: PipelineStage::Start,
            retrieved: Vec::new(),
            context: AssembledContext::default(),
            prompt: String::new(),
            answer: String::new(),
        }
    }

    fn advance(&mut self, next: PipelineStage) {
        tracing::debug!("Pipeline stage: {:?} -> {:?}", self.stage, next);
        self.stage = next;
    }

    fn fail(&self, err: KnowledgeError) -> KnowledgeError {
        tracing::warn!("Pipeline failed while {}: {}", self.stage, err);
        err.at_stage(self.stage)
    }

    fn into_answer(self) -> RagAnswer {
        RagAnswer {
            question: self.question,
            answer: self.answer,
            sources: self.context.sources,
            prompt: self.prompt,
            retrieved: self.retrieved,
        }
    }
}

/// Retrieve, assemble, prompt and generate.
///
/// Collaborators are injected; a pipeline holds no per-query state, so one
/// instance serves concurrent questions.
pub struct RagPipeline {
    retriever: Retriever,
    assembler: ContextAssembler,
    templates: PromptTemplates,
    llm: Arc<dyn LlmClient>,
    config: PipelineConfig,
}

impl RagPipeline {
    pub fn new(
        retriever: Retriever,
        assembler: ContextAssembler,
        templates: PromptTemplates,
        llm: Arc<dyn LlmClient>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            retriever,
            assembler,
            templates,
            llm,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Answer `question` grounded in retrieved context.
    pub async fn answer(
        &self,
        question: &str,
        top_k: Option<usize>,
        filter: Option<&MetadataFilter>,
    ) -> KnowledgeResult<RagAnswer> {
        let mut run = PipelineRun::new(question);
        self.prepare_grounded(&mut run, top_k, filter).await?;

        run.advance(PipelineStage::Generating);
        run.answer = self.generate(&run.prompt).await.map_err(|e| run.fail(e))?;
        run.advance(PipelineStage::Done);

        tracing::info!(
            "Answered with {} retrieved documents ({} sources)",
            run.retrieved.len(),
            run.context.sources.len()
        );
        Ok(run.into_answer())
    }

    /// Baseline: answer without retrieval or context.
    pub async fn answer_without_context(&self, question: &str) -> KnowledgeResult<RagAnswer> {
        let mut run = PipelineRun::new(question);
        check_question(&run)?;

        run.advance(PipelineStage::NoContext);
        run.prompt = self
            .templates
            .render_no_context(&run.question)
            .map_err(|e| run.fail(KnowledgeError::Prompt(e)))?;

        run.advance(PipelineStage::Generating);
        run.answer = self.generate(&run.prompt).await.map_err(|e| run.fail(e))?;
        run.advance(PipelineStage::Done);

        tracing::info!("Answered without context");
        Ok(run.into_answer())
    }

    /// Same retrieval and assembly as [`RagPipeline::answer`], then stream
    /// the generation.
    pub async fn answer_stream(
        &self,
        question: &str,
        top_k: Option<usize>,
        filter: Option<&MetadataFilter>,
    ) -> KnowledgeResult<StreamingAnswer> {
        let mut run = PipelineRun::new(question);
        self.prepare_grounded(&mut run, top_k, filter).await?;

        run.advance(PipelineStage::Generating);
        let request = self.request(&run.prompt).with_streaming();
        let stream = self
            .bounded("generation", self.llm.stream(&request))
            .await
            .map_err(|e| run.fail(e))?;
        run.advance(PipelineStage::Done);

        Ok(StreamingAnswer {
            question: run.question,
            sources: run.context.sources,
            prompt: run.prompt,
            retrieved: run.retrieved,
            stream,
        })
    }

    async fn prepare_grounded(
        &self,
        run: &mut PipelineRun,
        top_k: Option<usize>,
        filter: Option<&MetadataFilter>,
    ) -> KnowledgeResult<()> {
        check_question(run)?;

        run.advance(PipelineStage::Retrieving);
        run.retrieved = self
            .retriever
            .retrieve(&run.question, top_k, filter)
            .await
            .map_err(|e| run.fail(e))?;

        run.context = self.assembler.assemble(&run.retrieved);
        run.advance(PipelineStage::ContextReady);
        tracing::debug!(
            "Context ready: {} documents, {} chars",
            run.context.documents.len(),
            run.context.text.len()
        );

        run.prompt = self
            .templates
            .render_grounded(&run.context.text, &run.question)
            .map_err(|e| run.fail(KnowledgeError::Prompt(e)))?;
        Ok(())
    }

    fn request(&self, prompt: &str) -> LlmRequest {
        let mut request = LlmRequest::new(prompt, &self.config.model);
        request.temperature = self.config.temperature;
        request.max_tokens = self.config.max_tokens;
        request
    }

    async fn generate(&self, prompt: &str) -> KnowledgeResult<String> {
        let request = self.request(prompt);
        let response = self.bounded("generation", self.llm.complete(&request)).await?;
        Ok(response.content)
    }

    /// Await a collaborator call under `generate_timeout`.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = ragline_core::AppResult<T>>,
    ) -> KnowledgeResult<T> {
        let result = match self.config.generate_timeout {
            Some(after) => tokio::time::timeout(after, call)
                .await
                .map_err(|_| KnowledgeError::Timeout { operation, after })?,
            None => call.await,
        };
        result.map_err(KnowledgeError::Generation)
    }
}

fn check_question(run: &PipelineRun) -> KnowledgeResult<()> {
    if run.question.trim().is_empty() {
        return Err(run.fail(KnowledgeError::Validation(
            "Question cannot be empty".to_string(),
        )));
    }
    Ok(())
}
