//! Exact brute-force index.

use super::{check_query, rank, write_snapshot, EmbeddingRecord, IndexKind, IndexSnapshot, Metric, SearchHit, VectorIndex};
use crate::document::{validate_metadata, DocumentId};
use crate::error::KnowledgeResult;
use crate::filter::{passes, MetadataFilter};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

/// Scores every record against the query: O(n·d) per search.
#[derive(Debug)]
pub struct FlatIndex {
    dimension: usize,
    metric: Metric,
    records: RwLock<BTreeMap<DocumentId, EmbeddingRecord>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct FlatSnapshot {
    dimension: usize,
    metric: Metric,
    records: Vec<EmbeddingRecord>,
}

impl FlatIndex {
    pub fn new(dimension: usize, metric: Metric) -> Self {
        Self {
            dimension,
            metric,
            records: RwLock::new(BTreeMap::new()),
        }
    }

    fn check_record(&self, record: &EmbeddingRecord) -> KnowledgeResult<()> {
        self.metric.check(&record.vector, self.dimension)?;
        validate_metadata(&record.metadata)
    }

    pub(crate) fn from_snapshot(snapshot: FlatSnapshot) -> KnowledgeResult<Self> {
        let index = Self::new(snapshot.dimension, snapshot.metric);
        index.build(snapshot.records)?;
        Ok(index)
    }
}

impl VectorIndex for FlatIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Flat
    }

    fn build(&self, records: Vec<EmbeddingRecord>) -> KnowledgeResult<()> {
        for record in &records {
            self.check_record(record)?;
        }

        let count = records.len();
        let fresh: BTreeMap<_, _> = records.into_iter().map(|r| (r.document_id, r)).collect();
        *self.records.write().unwrap_or_else(PoisonError::into_inner) = fresh;

        tracing::debug!("Built flat index from {} records", count);
        Ok(())
    }

    fn insert(&self, record: EmbeddingRecord) -> KnowledgeResult<()> {
        self.check_record(&record)?;
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.document_id, record);
        Ok(())
    }

    fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> KnowledgeResult<Vec<SearchHit>> {
        check_query(self.metric, query, self.dimension, top_k, filter)?;

        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let hits: Vec<SearchHit> = records
            .values()
            .filter(|r| passes(filter, &r.metadata))
            .map(|r| SearchHit {
                document_id: r.document_id,
                score: self.metric.score(query, &r.vector),
            })
            .collect();

        Ok(rank(hits, self.metric, top_k))
    }

    fn delete(&self, id: DocumentId) -> KnowledgeResult<bool> {
        Ok(self
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some())
    }

    fn count(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn records(&self) -> Vec<EmbeddingRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn metric(&self) -> Metric {
        self.metric
    }

    fn clear(&self) {
        self.records.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn save(&self, path: &Path) -> KnowledgeResult<()> {
        let snapshot = FlatSnapshot {
            dimension: self.dimension,
            metric: self.metric,
            records: self.records(),
        };
        write_snapshot(path, &IndexSnapshot::Flat(snapshot))
    }
}
