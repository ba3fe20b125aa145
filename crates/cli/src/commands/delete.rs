//! Delete command handler.

use super::{open_collection, print_json};
use clap::Args;
use ragline_core::{config::AppConfig, AppResult};
use ragline_knowledge::DocumentId;

/// Remove documents by id
#[derive(Args, Debug)]
pub struct DeleteCommand {
    /// Collection name
    pub collection: String,

    /// Document ids to remove
    #[arg(required = true)]
    pub ids: Vec<u64>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl DeleteCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!(
            "Executing delete command for collection '{}' ({} ids)",
            self.collection,
            self.ids.len()
        );

        let ids: Vec<DocumentId> = self.ids.iter().copied().map(DocumentId).collect();
        let base = open_collection(config, &self.collection).await?;
        let removed = base.delete(&ids)?;

        if self.json {
            print_json(&serde_json::json!({
                "collection": self.collection,
                "requested": ids,
                "removed": removed,
                "documents": base.count(),
            }))?;
        } else {
            println!(
                "Removed {} of {} documents from '{}' ({} remaining)",
                removed,
                ids.len(),
                self.collection,
                base.count()
            );
        }

        Ok(())
    }
}
