//! Search command handler.
//!
//! Retrieval only: ranked documents, no generation.

use super::{open_collection, parse_filter, preview, print_json};
use clap::Args;
use ragline_core::{config::AppConfig, AppResult};

/// Retrieve the documents closest to a query
#[derive(Args, Debug)]
pub struct SearchCommand {
    /// Collection name
    pub collection: String,

    /// Query text
    pub query: String,

    /// Number of documents to return (default: the collection's default_top_k)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Metadata constraint, key=value (repeatable, all must match)
    #[arg(long)]
    pub filter: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing search command for collection '{}'", self.collection);

        let filter = parse_filter(&self.filter)?;
        let base = open_collection(config, &self.collection).await?;
        let results = base.search(&self.query, self.top_k, filter.as_ref()).await?;

        if self.json {
            return print_json(&serde_json::to_value(&results)?);
        }

        if results.is_empty() {
            println!("No documents found");
            return Ok(());
        }
        for (rank, scored) in results.iter().enumerate() {
            println!(
                "{}. [{}] {:.4}  {}",
                rank + 1,
                scored.document.id,
                scored.score,
                preview(&scored.document.text, 80)
            );
        }

        Ok(())
    }
}
