//! Command handlers for the Ragline CLI.
//!
//! One submodule per subcommand, plus the helpers they share for opening
//! collections and printing output.

pub mod ask;
pub mod clean;
pub mod delete;
pub mod ingest;
pub mod search;
pub mod stats;

pub use ask::AskCommand;
pub use clean::CleanCommand;
pub use delete::DeleteCommand;
pub use ingest::IngestCommand;
pub use search::SearchCommand;
pub use stats::StatsCommand;

use ragline_core::{config::AppConfig, AppError, AppResult};
use ragline_knowledge::{config::load_config, create_provider, KnowledgeBase, MetadataFilter};
use serde_json::Value;

/// Open a collection, pointing an Ollama embedder at the workspace endpoint
/// when the collection config does not name one.
pub async fn open_collection(config: &AppConfig, name: &str) -> AppResult<KnowledgeBase> {
    let mut kb_config = load_config(&config.workspace, name)?;
    if kb_config.embedding.provider == "ollama" && kb_config.embedding.endpoint.is_none() {
        kb_config.embedding.endpoint = config.resolve_endpoint("ollama");
    }

    let embedder = create_provider(&kb_config.embedding).await?;
    let base = KnowledgeBase::open_with(&config.workspace, kb_config, embedder).await?;
    Ok(base)
}

/// `key=value` flags to a filter; no flags means no filter.
pub fn parse_filter(pairs: &[String]) -> AppResult<Option<MetadataFilter>> {
    if pairs.is_empty() {
        return Ok(None);
    }
    Ok(Some(MetadataFilter::from_pairs(pairs)?))
}

pub fn print_json(value: &Value) -> AppResult<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::Serialization(e.to_string()))?;
    println!("{}", json);
    Ok(())
}

/// Shorten text to `max` characters for one-line display.
pub fn preview(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter() {
        assert!(parse_filter(&[]).unwrap().is_none());

        let filter = parse_filter(&["source_type=rules".to_string()]).unwrap().unwrap();
        assert_eq!(filter, MetadataFilter::new().eq("source_type", "rules"));

        assert!(parse_filter(&["missing-equals".to_string()]).is_err());
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("exactly", 7), "exactly");
        assert_eq!(preview("a longer sentence", 8), "a longer...");
    }
}
