//! Inverted-file (IVF) approximate index.
//!
//! Records are bucketed by their nearest centroid. A query scores the
//! centroids, then only the records in the `n_probe` closest lists. Setting
//! `n_probe == n_lists` visits every list and gives exact results.
//!
//! Training is deterministic k-means: initial centroids are spread evenly
//! over the records in id order, assignments break ties toward the lower
//! list, and iteration stops when assignments stabilise or after
//! [`MAX_ITERATIONS`].

use super::{check_query, rank, write_snapshot, EmbeddingRecord, IndexKind, IndexSnapshot, Metric, SearchHit, VectorIndex};
use crate::document::{validate_metadata, DocumentId};
use crate::error::{KnowledgeError, KnowledgeResult};
use crate::filter::{passes, MetadataFilter};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{PoisonError, RwLock};

/// Upper bound on k-means iterations per training run.
pub const MAX_ITERATIONS: usize = 25;

#[derive(Debug, Default)]
struct IvfState {
    records: BTreeMap<DocumentId, EmbeddingRecord>,
    /// Empty until trained
    centroids: Vec<Vec<f32>>,
    lists: Vec<BTreeSet<DocumentId>>,
    assignment: BTreeMap<DocumentId, usize>,
}

impl IvfState {
    fn is_trained(&self) -> bool {
        !self.centroids.is_empty()
    }

    fn unassign(&mut self, id: DocumentId) {
        if let Some(list) = self.assignment.remove(&id) {
            if let Some(members) = self.lists.get_mut(list) {
                members.remove(&id);
            }
        }
    }

    fn assign(&mut self, id: DocumentId, list: usize) {
        self.assignment.insert(id, list);
        if let Some(members) = self.lists.get_mut(list) {
            members.insert(id);
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct IvfSnapshot {
    dimension: usize,
    metric: Metric,
    n_lists: usize,
    n_probe: usize,
    records: Vec<EmbeddingRecord>,
    centroids: Vec<Vec<f32>>,
    lists: Vec<Vec<DocumentId>>,
}

/// Clustering-based approximate nearest-neighbour index.
#[derive(Debug)]
pub struct IvfIndex {
    dimension: usize,
    metric: Metric,
    n_lists: usize,
    n_probe: usize,
    max_iterations: usize,
    state: RwLock<IvfState>,
}

impl IvfIndex {
    /// `n_probe` is clamped to `1..=n_lists`.
    pub fn new(dimension: usize, metric: Metric, n_lists: usize, n_probe: usize) -> KnowledgeResult<Self> {
        if n_lists == 0 {
            return Err(KnowledgeError::Validation(
                "IVF index needs at least one list".to_string(),
            ));
        }

        Ok(Self {
            dimension,
            metric,
            n_lists,
            n_probe: n_probe.clamp(1, n_lists),
            max_iterations: MAX_ITERATIONS,
            state: RwLock::new(IvfState::default()),
        })
    }

    /// Cap k-means iterations for later training runs (at least one).
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn n_lists(&self) -> usize {
        self.n_lists
    }

    pub fn n_probe(&self) -> usize {
        self.n_probe
    }

    /// Whether centroids exist. Untrained indexes search exhaustively.
    pub fn is_trained(&self) -> bool {
        self.state.read().unwrap_or_else(PoisonError::into_inner).is_trained()
    }

    fn check_record(&self, record: &EmbeddingRecord) -> KnowledgeResult<()> {
        self.metric.check(&record.vector, self.dimension)?;
        validate_metadata(&record.metadata)
    }

    /// Centroid indices ordered closest first, ties by lower index.
    fn centroid_order(&self, centroids: &[Vec<f32>], query: &[f32]) -> Vec<usize> {
        let mut scored: Vec<(usize, f32)> = centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i, self.metric.score(query, c)))
            .collect();
        scored.sort_by(|a, b| self.metric.compare(a.1, b.1).then(a.0.cmp(&b.0)));
        scored.into_iter().map(|(i, _)| i).collect()
    }

    fn nearest_centroid(&self, centroids: &[Vec<f32>], vector: &[f32]) -> usize {
        let mut best = 0;
        let mut best_score = None;
        for (i, centroid) in centroids.iter().enumerate() {
            let score = self.metric.score(vector, centroid);
            let better = match best_score {
                None => true,
                Some(current) => self.metric.compare(score, current).is_lt(),
            };
            if better {
                best = i;
                best_score = Some(score);
            }
        }
        best
    }

    /// Point every vector at its nearest centroid. Returns whether any moved.
    fn reassign(
        &self,
        centroids: &[Vec<f32>],
        vectors: &[(DocumentId, &[f32])],
        assignment: &mut [usize],
    ) -> bool {
        let mut changed = false;
        for (slot, (_, vector)) in vectors.iter().enumerate() {
            let nearest = self.nearest_centroid(centroids, vector);
            if assignment[slot] != nearest {
                assignment[slot] = nearest;
                changed = true;
            }
        }
        changed
    }

    /// Run k-means over the current records and rebuild the lists.
    fn train(&self, state: &mut IvfState) {
        state.centroids.clear();
        state.lists.clear();
        state.assignment.clear();

        let vectors: Vec<(DocumentId, &[f32])> = state
            .records
            .values()
            .map(|r| (r.document_id, r.vector.as_slice()))
            .collect();
        let n = vectors.len();

        if n < self.n_lists {
            tracing::debug!(
                "IVF index has {} records for {} lists, searching exhaustively",
                n,
                self.n_lists
            );
            return;
        }

        let mut centroids: Vec<Vec<f32>> = (0..self.n_lists)
            .map(|i| vectors[i * n / self.n_lists].1.to_vec())
            .collect();
        let mut assignment = vec![usize::MAX; n];
        let mut iterations = 0;
        let mut settled = false;

        for _ in 0..self.max_iterations {
            iterations += 1;
            if !self.reassign(&centroids, &vectors, &mut assignment) {
                settled = true;
                break;
            }

            let mut sums = vec![vec![0.0f32; self.dimension]; self.n_lists];
            let mut counts = vec![0usize; self.n_lists];
            for (slot, (_, vector)) in vectors.iter().enumerate() {
                let list = assignment[slot];
                counts[list] += 1;
                for (sum, x) in sums[list].iter_mut().zip(vector.iter()) {
                    *sum += x;
                }
            }
            for (list, sum) in sums.into_iter().enumerate() {
                // Empty lists keep their previous centroid.
                if counts[list] > 0 {
                    let count = counts[list] as f32;
                    centroids[list] = sum.into_iter().map(|s| s / count).collect();
                }
            }
        }

        // Hitting the cap leaves centroids one update ahead of the lists.
        if !settled {
            self.reassign(&centroids, &vectors, &mut assignment);
        }

        let assigned: Vec<(DocumentId, usize)> = vectors
            .iter()
            .zip(assignment)
            .map(|((id, _), list)| (*id, list))
            .collect();

        state.centroids = centroids;
        state.lists = vec![BTreeSet::new(); self.n_lists];
        for (id, list) in assigned {
            state.assign(id, list);
        }

        tracing::debug!(
            "Trained IVF index: {} records into {} lists in {} iterations",
            n,
            self.n_lists,
            iterations
        );
    }

    pub(crate) fn from_snapshot(snapshot: IvfSnapshot) -> KnowledgeResult<Self> {
        let index = Self::new(snapshot.dimension, snapshot.metric, snapshot.n_lists, snapshot.n_probe)?;

        for record in &snapshot.records {
            index.check_record(record)?;
        }
        if !snapshot.centroids.is_empty() && snapshot.centroids.len() != snapshot.n_lists {
            return Err(KnowledgeError::Storage(format!(
                "IVF snapshot has {} centroids for {} lists",
                snapshot.centroids.len(),
                snapshot.n_lists
            )));
        }

        {
            let mut state = index.state.write().unwrap_or_else(PoisonError::into_inner);
            state.records = snapshot
                .records
                .into_iter()
                .map(|r| (r.document_id, r))
                .collect();

            if !snapshot.centroids.is_empty() {
                state.centroids = snapshot.centroids;
                state.lists = vec![BTreeSet::new(); snapshot.n_lists];
                for (list, members) in snapshot.lists.into_iter().enumerate() {
                    for id in members {
                        if !state.records.contains_key(&id) || list >= snapshot.n_lists {
                            return Err(KnowledgeError::Storage(format!(
                                "IVF snapshot lists reference unknown document {}",
                                id
                            )));
                        }
                        state.assign(id, list);
                    }
                }
                if state.assignment.len() != state.records.len() {
                    return Err(KnowledgeError::Storage(
                        "IVF snapshot leaves records without a list".to_string(),
                    ));
                }
            }
        }

        Ok(index)
    }
}

impl VectorIndex for IvfIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Ivf
    }

    fn build(&self, records: Vec<EmbeddingRecord>) -> KnowledgeResult<()> {
        for record in &records {
            self.check_record(record)?;
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.records = records.into_iter().map(|r| (r.document_id, r)).collect();
        self.train(&mut state);
        Ok(())
    }

    fn insert(&self, record: EmbeddingRecord) -> KnowledgeResult<()> {
        self.check_record(&record)?;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let id = record.document_id;
        state.unassign(id);

        if state.is_trained() {
            let list = self.nearest_centroid(&state.centroids, &record.vector);
            state.assign(id, list);
        }
        state.records.insert(id, record);
        Ok(())
    }

    fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> KnowledgeResult<Vec<SearchHit>> {
        check_query(self.metric, query, self.dimension, top_k, filter)?;

        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let score = |record: &EmbeddingRecord| SearchHit {
            document_id: record.document_id,
            score: self.metric.score(query, &record.vector),
        };

        if !state.is_trained() {
            let hits = state
                .records
                .values()
                .filter(|r| passes(filter, &r.metadata))
                .map(score)
                .collect();
            return Ok(rank(hits, self.metric, top_k));
        }

        let order = self.centroid_order(&state.centroids, query);
        let mut hits = Vec::new();
        let mut probed = 0;

        for list in order {
            // Widen past n_probe only while survivors are short of top_k.
            if probed >= self.n_probe && hits.len() >= top_k {
                break;
            }
            probed += 1;

            for id in &state.lists[list] {
                if let Some(record) = state.records.get(id) {
                    if passes(filter, &record.metadata) {
                        hits.push(score(record));
                    }
                }
            }
        }

        tracing::debug!(
            "IVF search probed {}/{} lists, {} candidates",
            probed,
            self.n_lists,
            hits.len()
        );

        Ok(rank(hits, self.metric, top_k))
    }

    fn delete(&self, id: DocumentId) -> KnowledgeResult<bool> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.unassign(id);
        Ok(state.records.remove(&id).is_some())
    }

    fn count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .len()
    }

    fn records(&self) -> Vec<EmbeddingRecord> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .records
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
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = IvfState::default();
    }

    fn retrain(&self) -> KnowledgeResult<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        self.train(&mut state);
        Ok(())
    }

    fn save(&self, path: &Path) -> KnowledgeResult<()> {
        let snapshot = {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            IvfSnapshot {
                dimension: self.dimension,
                metric: self.metric,
                n_lists: self.n_lists,
                n_probe: self.n_probe,
                records: state.records.values().cloned().collect(),
                centroids: state.centroids.clone(),
                lists: state
                    .lists
                    .iter()
                    .map(|members| members.iter().copied().collect())
                    .collect(),
            }
        };
        write_snapshot(path, &IndexSnapshot::Ivf(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::FlatIndex;
    use serde_json::json;
    use tempfile::TempDir;

    /// Two well-separated clusters on a line.
    fn clustered_records() -> Vec<EmbeddingRecord> {
        let points = [0.0, 0.5, 1.0, 10.0, 10.5, 11.0];
        points
            .iter()
            .enumerate()
            .map(|(i, x)| EmbeddingRecord::new(DocumentId(i as u64), vec![*x, 1.0]))
            .collect()
    }

    #[test]
    fn test_rejects_zero_lists() {
        assert!(IvfIndex::new(2, Metric::Cosine, 0, 1).is_err());
    }

    #[test]
    fn test_untrained_with_few_records() {
        let index = IvfIndex::new(2, Metric::SquaredEuclidean, 8, 1).unwrap();
        index.build(clustered_records()).unwrap();
        assert!(!index.is_trained());

        let hits = index.search(&[10.3, 1.0], 2, None).unwrap();
        let ids: Vec<u64> = hits.iter().map(|h| h.document_id.0).collect();
        assert_eq!(ids, vec![4, 3]);
    }

    #[test]
    fn test_training_separates_clusters() {
        let index = IvfIndex::new(2, Metric::SquaredEuclidean, 2, 1).unwrap();
        index.build(clustered_records()).unwrap();
        assert!(index.is_trained());

        let state = index.state.read().unwrap();
        let lists: Vec<Vec<u64>> = state
            .lists
            .iter()
            .map(|l| l.iter().map(|id| id.0).collect())
            .collect();
        assert_eq!(lists, vec![vec![0, 1, 2], vec![3, 4, 5]]);
    }

    #[test]
    fn test_capped_training_lists_follow_final_centroids() {
        let records: Vec<EmbeddingRecord> = [0.0, 1.0, 2.0, 3.0, 4.0, 100.0]
            .iter()
            .enumerate()
            .map(|(i, x)| EmbeddingRecord::new(DocumentId(i as u64), vec![*x, 1.0]))
            .collect();
        let index = IvfIndex::new(2, Metric::SquaredEuclidean, 2, 1)
            .unwrap()
            .with_max_iterations(1);
        index.build(records.clone()).unwrap();

        let state = index.state.read().unwrap();
        for record in &records {
            let nearest = index.nearest_centroid(&state.centroids, &record.vector);
            assert_eq!(state.assignment[&record.document_id], nearest);
        }
        let lists: Vec<Vec<u64>> = state
            .lists
            .iter()
            .map(|l| l.iter().map(|id| id.0).collect())
            .collect();
        assert_eq!(lists, vec![vec![0, 1, 2, 3, 4], vec![5]]);
    }

    #[test]
    fn test_single_probe_stays_in_nearest_list() {
        let index = IvfIndex::new(2, Metric::SquaredEuclidean, 2, 1).unwrap();
        index.build(clustered_records()).unwrap();

        let hits = index.search(&[0.2, 1.0], 3, None).unwrap();
        let ids: Vec<u64> = hits.iter().map(|h| h.document_id.0).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_probing_widens_for_top_k() {
        let index = IvfIndex::new(2, Metric::SquaredEuclidean, 2, 1).unwrap();
        index.build(clustered_records()).unwrap();

        let hits = index.search(&[0.2, 1.0], 5, None).unwrap();
        assert_eq!(hits.len(), 5);
    }

    #[test]
    fn test_probing_widens_for_filter() {
        let index = IvfIndex::new(2, Metric::SquaredEuclidean, 2, 1).unwrap();
        let mut records = clustered_records();
        records[4].metadata.insert("source_type".to_string(), json!("rules"));
        index.build(records).unwrap();

        // The only match lives in the far list.
        let filter = MetadataFilter::new().eq("source_type", "rules");
        let hits = index.search(&[0.0, 1.0], 3, Some(&filter)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, DocumentId(4));
    }

    #[test]
    fn test_full_probe_matches_flat() {
        let records = clustered_records();
        let ivf = IvfIndex::new(2, Metric::Cosine, 3, 3).unwrap();
        let flat = FlatIndex::new(2, Metric::Cosine);
        ivf.build(records.clone()).unwrap();
        flat.build(records).unwrap();

        for query in [[0.3, 1.0], [10.0, 1.0], [-1.0, 0.5]] {
            assert_eq!(
                ivf.search(&query, 4, None).unwrap(),
                flat.search(&query, 4, None).unwrap()
            );
        }
    }

    #[test]
    fn test_insert_after_training_and_replace() {
        let index = IvfIndex::new(2, Metric::SquaredEuclidean, 2, 1).unwrap();
        index.build(clustered_records()).unwrap();

        index.insert(EmbeddingRecord::new(DocumentId(6), vec![10.2, 1.0])).unwrap();
        assert_eq!(index.count(), 7);

        // Move record 6 to the other cluster.
        index.insert(EmbeddingRecord::new(DocumentId(6), vec![0.1, 1.0])).unwrap();
        assert_eq!(index.count(), 7);

        let hits = index.search(&[0.1, 1.0], 1, None).unwrap();
        assert_eq!(hits[0].document_id, DocumentId(6));
    }

    #[test]
    fn test_delete_removes_from_lists() {
        let index = IvfIndex::new(2, Metric::SquaredEuclidean, 2, 2).unwrap();
        index.build(clustered_records()).unwrap();

        assert!(index.delete(DocumentId(0)).unwrap());
        let hits = index.search(&[0.0, 1.0], 6, None).unwrap();
        assert_eq!(hits.len(), 5);
        assert!(hits.iter().all(|h| h.document_id != DocumentId(0)));
    }

    #[test]
    fn test_retrain_after_inserts() {
        let index = IvfIndex::new(2, Metric::SquaredEuclidean, 2, 1).unwrap();
        for record in clustered_records() {
            index.insert(record).unwrap();
        }
        assert!(!index.is_trained());

        index.retrain().unwrap();
        assert!(index.is_trained());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.json");

        let index = IvfIndex::new(2, Metric::Cosine, 2, 1).unwrap();
        index.build(clustered_records()).unwrap();
        index.save(&path).unwrap();

        let loaded = crate::index::load_index(&path).unwrap();
        for query in [[0.3, 1.0], [10.0, 1.0]] {
            assert_eq!(
                loaded.search(&query, 3, None).unwrap(),
                index.search(&query, 3, None).unwrap()
            );
        }
    }
}
