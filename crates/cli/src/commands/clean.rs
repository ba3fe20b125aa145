//! Clean command handler.

use clap::Args;
use ragline_core::{config::AppConfig, AppResult};

/// Delete a collection and all its files
#[derive(Args, Debug)]
pub struct CleanCommand {
    /// Collection name
    pub collection: String,
}

impl CleanCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing clean command for collection '{}'", self.collection);

        ragline_knowledge::clean(&config.workspace, &self.collection)?;
        println!("Collection '{}' removed", self.collection);

        Ok(())
    }
}
