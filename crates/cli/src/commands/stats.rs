//! Stats command handler.

use super::{open_collection, print_json};
use clap::Args;
use ragline_core::{config::AppConfig, AppResult};

/// Show collection statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Collection name
    pub collection: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing stats command for collection '{}'", self.collection);

        let base = open_collection(config, &self.collection).await?;
        let stats = base.stats()?;

        if self.json {
            return print_json(&serde_json::to_value(&stats)?);
        }

        println!("Collection: {}", stats.name);
        println!("  Documents: {}", stats.documents);
        println!(
            "  Index: {} ({}, {} dimensions, {} records)",
            stats.index_kind, stats.metric, stats.dimensions, stats.indexed
        );
        println!(
            "  Embeddings: {} / {}",
            stats.embedding_provider, stats.embedding_model
        );
        println!("  Disk size: {} bytes", stats.disk_size_bytes);
        if let Some(last_ingest) = stats.last_ingest_at {
            println!("  Last ingest: {}", last_ingest);
        }

        Ok(())
    }
}
