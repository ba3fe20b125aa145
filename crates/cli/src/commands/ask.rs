//! Ask command handler.
//!
//! Answers a question with the RAG pipeline, grounded in a collection or,
//! with `--no-context`, as the plain baseline.

use super::{open_collection, parse_filter, print_json};
use clap::Args;
use futures::StreamExt;
use ragline_core::{config::AppConfig, AppResult};
use ragline_knowledge::{document::display_value, Metadata, RagAnswer, StreamingAnswer};
use ragline_llm::create_client;
use ragline_prompt::PromptTemplates;
use std::io::Write;

/// Answer a question grounded in a collection
#[derive(Args, Debug)]
pub struct AskCommand {
    /// Collection name
    pub collection: String,

    /// The question to ask
    pub question: String,

    /// Number of documents to retrieve (default: the collection's default_top_k)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Metadata constraint, key=value (repeatable, all must match)
    #[arg(long)]
    pub filter: Vec<String>,

    /// Skip retrieval and ask the model directly
    #[arg(long, conflicts_with_all = ["filter", "top_k"])]
    pub no_context: bool,

    /// Print the answer as it is generated
    #[arg(long, conflicts_with = "no_context")]
    pub stream: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command for collection '{}'", self.collection);
        tracing::debug!("Ask command options: {:?}", self);

        let filter = parse_filter(&self.filter)?;
        let base = open_collection(config, &self.collection).await?;

        let llm = create_client(
            &config.provider,
            config.resolve_endpoint(&config.provider).as_deref(),
            config.resolve_timeout(&config.provider),
            config.resolve_api_key(&config.provider).as_deref(),
        )?;
        let templates = PromptTemplates::from_workspace(&config.workspace)?;
        let pipeline = base.pipeline(llm, templates, &config.model);

        if self.no_context {
            let answer = pipeline.answer_without_context(&self.question).await?;
            return self.print_answer(&answer, config);
        }

        if self.stream {
            let streaming = pipeline
                .answer_stream(&self.question, self.top_k, filter.as_ref())
                .await?;
            let answer = self.consume_stream(streaming).await?;
            if self.json {
                return self.print_answer(&answer, config);
            }
            print_sources(&answer.sources);
            return Ok(());
        }

        let answer = pipeline
            .answer(&self.question, self.top_k, filter.as_ref())
            .await?;
        self.print_answer(&answer, config)
    }

    /// Drain the stream, echoing chunks to stdout unless JSON was requested.
    async fn consume_stream(&self, streaming: StreamingAnswer) -> AppResult<RagAnswer> {
        let StreamingAnswer {
            question,
            sources,
            prompt,
            retrieved,
            mut stream,
        } = streaming;

        tracing::info!("Streaming answer");
        let mut answer = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if !chunk.content.is_empty() {
                answer.push_str(&chunk.content);
                if !self.json {
                    print!("{}", chunk.content);
                    std::io::stdout().flush().ok();
                }
            }
            if chunk.done {
                break;
            }
        }
        if !self.json {
            println!();
        }

        Ok(RagAnswer {
            question,
            answer,
            sources,
            prompt,
            retrieved,
        })
    }

    fn print_answer(&self, answer: &RagAnswer, config: &AppConfig) -> AppResult<()> {
        if self.json {
            let mut output = serde_json::to_value(answer)?;
            output["collection"] = serde_json::json!(self.collection);
            output["model"] = serde_json::json!(config.model);
            output["provider"] = serde_json::json!(config.provider);
            return print_json(&output);
        }

        println!("{}", answer.answer.trim_end());
        print_sources(&answer.sources);
        Ok(())
    }
}

fn print_sources(sources: &[Metadata]) {
    if sources.is_empty() {
        return;
    }

    println!();
    println!("Sources:");
    for source in sources {
        println!("- {}", describe_source(source));
    }
}

/// One-line label: title (or source) plus URL when known.
fn describe_source(source: &Metadata) -> String {
    let title = source
        .get("source_title")
        .or_else(|| source.get("source"))
        .map(display_value);
    let url = source.get("source_url").map(display_value);

    match (title, url) {
        (Some(title), Some(url)) => format!("{} ({})", title, url),
        (Some(label), None) | (None, Some(label)) => label,
        (None, None) => source
            .iter()
            .map(|(k, v)| format!("{}={}", k, display_value(v)))
            .collect::<Vec<_>>()
            .join(", "),
    }
}
