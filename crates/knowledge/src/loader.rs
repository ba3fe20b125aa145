//! Ingestion loaders: files and directories to [`IngestItem`]s.
//!
//! - `.txt` and unknown extensions: one document per non-empty line
//! - `.md`: the whole file as one document, split later by the collection's
//!   chunker
//! - `.json`: an array of `{text, metadata}` objects
//! - `.jsonl`: one `{text, metadata}` object per line
//!
//! Every item gets a `source` metadata field holding its file path unless
//! the input already sets one.

use crate::document::IngestItem;
use crate::error::{KnowledgeError, KnowledgeResult};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Extensions picked up when walking a directory.
const DIRECTORY_EXTENSIONS: &[&str] = &["txt", "md", "json", "jsonl"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Lines,
    Document,
    JsonArray,
    JsonLines,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("md") | Some("markdown") => SourceFormat::Document,
            Some("json") => SourceFormat::JsonArray,
            Some("jsonl") | Some("ndjson") => SourceFormat::JsonLines,
            _ => SourceFormat::Lines,
        }
    }
}

/// Load items from a file, or from every supported file under a directory
/// (sorted by path).
pub fn load_path(path: &Path) -> KnowledgeResult<Vec<IngestItem>> {
    if path.is_file() {
        return load_file(path);
    }
    if !path.is_dir() {
        return Err(KnowledgeError::Storage(format!(
            "Path does not exist: {:?}",
            path
        )));
    }

    let mut items = Vec::new();
    let entries = WalkDir::new(path)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_supported(e.path()));

    for entry in entries {
        items.extend(load_file(entry.path())?);
    }

    tracing::debug!("Loaded {} items from directory {:?}", items.len(), path);
    Ok(items)
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| DIRECTORY_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

pub fn load_file(path: &Path) -> KnowledgeResult<Vec<IngestItem>> {
    let content = fs::read_to_string(path).map_err(|e| {
        KnowledgeError::Storage(format!("Failed to read {:?}: {}", path, e))
    })?;

    let format = SourceFormat::from_path(path);
    let mut items = parse(&content, format).map_err(|e| match e {
        KnowledgeError::Serialization(e) => {
            KnowledgeError::Storage(format!("Failed to parse {:?}: {}", path, e))
        }
        other => other,
    })?;

    let source = path.display().to_string();
    for item in &mut items {
        item.metadata
            .entry("source".to_string())
            .or_insert_with(|| serde_json::Value::String(source.clone()));
    }

    tracing::debug!("Loaded {} items from {:?} ({:?})", items.len(), path, format);
    Ok(items)
}

/// Parse in-memory content in the given format.
pub fn parse(content: &str, format: SourceFormat) -> KnowledgeResult<Vec<IngestItem>> {
    match format {
        SourceFormat::Lines => Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(IngestItem::new)
            .collect()),
        SourceFormat::Document => {
            let text = content.trim();
            Ok(if text.is_empty() {
                Vec::new()
            } else {
                vec![IngestItem::new(text)]
            })
        }
        SourceFormat::JsonArray => Ok(serde_json::from_str(content)?),
        SourceFormat::JsonLines => content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(KnowledgeError::from))
            .collect(),
    }
}
