//! Ingest command handler.
//!
//! Loads files or directories into a collection.

use super::{open_collection, print_json};
use clap::Args;
use ragline_core::{config::AppConfig, AppError, AppResult};
use ragline_knowledge::{loader, IngestPolicy};
use std::path::PathBuf;

/// Load documents into a collection
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// Collection name
    pub collection: String,

    /// Files or directories to load (.txt, .md, .json, .jsonl)
    #[arg(long, required = true)]
    pub path: Vec<PathBuf>,

    /// Replace existing documents once the new ones are embedded
    #[arg(long)]
    pub reset: bool,

    /// Do nothing if the collection already holds documents
    #[arg(long, conflicts_with = "reset")]
    pub if_empty: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IngestCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ingest command for collection '{}'", self.collection);

        let mut items = Vec::new();
        for path in &self.path {
            items.extend(loader::load_path(path)?);
        }
        if items.is_empty() {
            return Err(AppError::Knowledge(format!(
                "No documents found in {:?}",
                self.path
            )));
        }

        let base = open_collection(config, &self.collection).await?;
        let policy = if self.reset {
            IngestPolicy::Replace
        } else if self.if_empty {
            IngestPolicy::SkipIfPopulated
        } else {
            IngestPolicy::Always
        };
        let report = base.ingest(items, policy).await?;

        if self.json {
            print_json(&serde_json::json!({
                "collection": self.collection,
                "added": report.added,
                "skipped": report.skipped,
                "documents": base.count(),
                "durationSecs": report.duration_secs,
            }))?;
        } else if report.skipped {
            println!(
                "Collection '{}' already holds {} documents, nothing ingested",
                self.collection,
                base.count()
            );
        } else {
            println!(
                "Ingested {} documents into '{}' ({} total) in {:.2}s",
                report.added.len(),
                self.collection,
                base.count(),
                report.duration_secs
            );
        }

        Ok(())
    }
}
