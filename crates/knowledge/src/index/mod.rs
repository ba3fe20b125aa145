//! Embedding index: nearest-neighbour search over document vectors.
//!
//! One [`VectorIndex`] trait, two implementations picked at construction
//! time from [`IndexConfig`]:
//! - [`FlatIndex`]: exact brute-force search
//! - [`IvfIndex`]: inverted-file approximate search with a tunable `n_probe`
//!
//! Both rank best first and break score ties by ascending document id, so
//! results are deterministic for a given content and query.

pub mod flat;
pub mod ivf;
pub mod metric;

pub use flat::FlatIndex;
pub use ivf::IvfIndex;
pub use metric::Metric;

use crate::document::{DocumentId, Metadata};
use crate::error::{KnowledgeError, KnowledgeResult};
use crate::filter::MetadataFilter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// A document's vector plus the metadata copy used for filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub document_id: DocumentId,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl EmbeddingRecord {
    pub fn new(document_id: DocumentId, vector: Vec<f32>) -> Self {
        Self {
            document_id,
            vector,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// One search result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub document_id: DocumentId,
    pub score: f32,
}

/// Which index implementation a collection uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    #[default]
    Flat,
    Ivf,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::Flat => f.write_str("flat"),
            IndexKind::Ivf => f.write_str("ivf"),
        }
    }
}

/// Index settings stored in a collection's `config.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub kind: IndexKind,

    #[serde(default)]
    pub metric: Metric,

    /// Number of IVF lists (clusters)
    #[serde(default = "default_n_lists")]
    pub n_lists: usize,

    /// Lists probed per IVF query; `n_probe == n_lists` is exact
    #[serde(default = "default_n_probe")]
    pub n_probe: usize,
}

fn default_n_lists() -> usize {
    16
}

fn default_n_probe() -> usize {
    4
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            kind: IndexKind::default(),
            metric: Metric::default(),
            n_lists: default_n_lists(),
            n_probe: default_n_probe(),
        }
    }
}

/// Capability set shared by all index implementations.
///
/// Implementations guard their state with a readers-writer lock: any number
/// of concurrent searches, writes exclusive. The index never owns document
/// text and never cascades deletes into the document store.
pub trait VectorIndex: Send + Sync + fmt::Debug {
    fn kind(&self) -> IndexKind;

    /// Bulk-load, replacing all previous content.
    fn build(&self, records: Vec<EmbeddingRecord>) -> KnowledgeResult<()>;

    /// Add one record; an existing id is replaced and `count()` is unchanged.
    fn insert(&self, record: EmbeddingRecord) -> KnowledgeResult<()>;

    /// The `top_k` best records passing `filter`, best first.
    fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> KnowledgeResult<Vec<SearchHit>>;

    /// Remove a record. Returns whether anything was removed.
    fn delete(&self, id: DocumentId) -> KnowledgeResult<bool>;

    fn count(&self) -> usize;

    /// Copy of every record in id order.
    fn records(&self) -> Vec<EmbeddingRecord>;

    fn dimension(&self) -> usize;

    fn metric(&self) -> Metric;

    /// Remove every record.
    fn clear(&self);

    /// Re-derive any learned structure from the current records.
    fn retrain(&self) -> KnowledgeResult<()> {
        Ok(())
    }

    /// Write a JSON snapshot readable by [`load_index`].
    fn save(&self, path: &Path) -> KnowledgeResult<()>;
}

/// On-disk form of any index, tagged by kind.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum IndexSnapshot {
    Flat(flat::FlatSnapshot),
    Ivf(ivf::IvfSnapshot),
}

/// Build an empty index for `dimension`-length vectors.
pub fn create_index(config: &IndexConfig, dimension: usize) -> KnowledgeResult<Arc<dyn VectorIndex>> {
    if dimension == 0 {
        return Err(KnowledgeError::Validation(
            "Index dimension must be greater than zero".to_string(),
        ));
    }

    tracing::debug!(
        "Creating {} index (metric={}, dimension={})",
        config.kind,
        config.metric,
        dimension
    );

    match config.kind {
        IndexKind::Flat => Ok(Arc::new(FlatIndex::new(dimension, config.metric))),
        IndexKind::Ivf => Ok(Arc::new(IvfIndex::new(
            dimension,
            config.metric,
            config.n_lists,
            config.n_probe,
        )?)),
    }
}

/// Restore an index written by [`VectorIndex::save`], whatever its kind.
pub fn load_index(path: &Path) -> KnowledgeResult<Arc<dyn VectorIndex>> {
    let bytes = fs::read(path).map_err(|e| {
        KnowledgeError::Storage(format!("Failed to read index {:?}: {}", path, e))
    })?;

    let index: Arc<dyn VectorIndex> = match serde_json::from_slice(&bytes)? {
        IndexSnapshot::Flat(snapshot) => Arc::new(FlatIndex::from_snapshot(snapshot)?),
        IndexSnapshot::Ivf(snapshot) => Arc::new(IvfIndex::from_snapshot(snapshot)?),
    };

    tracing::debug!(
        "Loaded {} index with {} records from {:?}",
        index.kind(),
        index.count(),
        path
    );
    Ok(index)
}

pub(crate) fn write_snapshot(path: &Path, snapshot: &IndexSnapshot) -> KnowledgeResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec(snapshot)?)?;
    Ok(())
}

/// Validate the common search arguments.
pub(crate) fn check_query(
    metric: Metric,
    query: &[f32],
    dimension: usize,
    top_k: usize,
    filter: Option<&MetadataFilter>,
) -> KnowledgeResult<()> {
    if top_k == 0 {
        return Err(KnowledgeError::Validation(
            "top_k must be greater than zero".to_string(),
        ));
    }
    metric.check(query, dimension)?;
    if let Some(filter) = filter {
        filter.validate()?;
    }
    Ok(())
}

/// Sort best first, ties by ascending id, and keep `top_k`.
pub(crate) fn rank(mut hits: Vec<SearchHit>, metric: Metric, top_k: usize) -> Vec<SearchHit> {
    hits.sort_by(|a, b| {
        metric
            .compare(a.score, b.score)
            .then(a.document_id.cmp(&b.document_id))
    });
    hits.truncate(top_k);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rank_breaks_ties_by_id() {
        let hits = vec![
            SearchHit { document_id: DocumentId(3), score: 0.5 },
            SearchHit { document_id: DocumentId(1), score: 0.5 },
            SearchHit { document_id: DocumentId(2), score: 0.9 },
        ];

        let ranked = rank(hits, Metric::Cosine, 3);
        let ids: Vec<u64> = ranked.iter().map(|h| h.document_id.0).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn test_rank_distance_ascending() {
        let hits = vec![
            SearchHit { document_id: DocumentId(0), score: 4.0 },
            SearchHit { document_id: DocumentId(1), score: 1.0 },
        ];

        let ranked = rank(hits, Metric::SquaredEuclidean, 1);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].document_id, DocumentId(1));
    }

    #[test]
    fn test_create_index_by_kind() {
        let flat = create_index(&IndexConfig::default(), 4).unwrap();
        assert_eq!(flat.kind(), IndexKind::Flat);

        let ivf = create_index(
            &IndexConfig {
                kind: IndexKind::Ivf,
                n_lists: 2,
                n_probe: 1,
                ..Default::default()
            },
            4,
        )
        .unwrap();
        assert_eq!(ivf.kind(), IndexKind::Ivf);
        assert_eq!(ivf.dimension(), 4);
    }

    #[test]
    fn test_create_index_rejects_zero_dimension() {
        assert!(create_index(&IndexConfig::default(), 0).is_err());
    }

    #[test]
    fn test_load_index_restores_kind() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.json");

        let config = IndexConfig {
            kind: IndexKind::Ivf,
            metric: Metric::SquaredEuclidean,
            n_lists: 2,
            n_probe: 2,
        };
        let index = create_index(&config, 2).unwrap();
        index
            .build(vec![
                EmbeddingRecord::new(DocumentId(0), vec![0.0, 0.0]),
                EmbeddingRecord::new(DocumentId(1), vec![5.0, 5.0]),
            ])
            .unwrap();
        index.save(&path).unwrap();

        let loaded = load_index(&path).unwrap();
        assert_eq!(loaded.kind(), IndexKind::Ivf);
        assert_eq!(loaded.metric(), Metric::SquaredEuclidean);
        assert_eq!(loaded.count(), 2);
    }

    #[test]
    fn test_index_config_yaml_defaults() {
        let config: IndexConfig = serde_yaml::from_str("kind: ivf\n").unwrap();
        assert_eq!(config.kind, IndexKind::Ivf);
        assert_eq!(config.metric, Metric::Cosine);
        assert_eq!(config.n_lists, 16);
        assert_eq!(config.n_probe, 4);
    }
}
