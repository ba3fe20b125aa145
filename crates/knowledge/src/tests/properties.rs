//! Properties every index implementation must hold.

use super::support::*;
use crate::document::DocumentId;
use crate::filter::MetadataFilter;
use crate::index::{
    create_index, load_index, IndexConfig, IndexKind, IvfIndex, Metric, SearchHit, VectorIndex,
};
use std::sync::Arc;
use tempfile::TempDir;

const DIM: usize = 8;

fn indexes(metric: Metric) -> Vec<Arc<dyn VectorIndex>> {
    let flat = IndexConfig {
        metric,
        ..Default::default()
    };
    let ivf = IndexConfig {
        kind: IndexKind::Ivf,
        metric,
        n_lists: 4,
        n_probe: 2,
    };
    vec![
        create_index(&flat, DIM).unwrap(),
        create_index(&ivf, DIM).unwrap(),
    ]
}

fn ids(hits: &[SearchHit]) -> Vec<DocumentId> {
    hits.iter().map(|h| h.document_id).collect()
}

#[test]
fn test_self_retrieval_flat() {
    for metric in [Metric::Cosine, Metric::SquaredEuclidean] {
        let records = random_records(40, DIM, 7);
        let index = create_index(&IndexConfig { metric, ..Default::default() }, DIM).unwrap();
        index.build(records.clone()).unwrap();

        for record in &records {
            let hits = index.search(&record.vector, 1, None).unwrap();
            assert_eq!(hits[0].document_id, record.document_id, "{metric}");
        }
    }
}

#[test]
fn test_self_retrieval_ivf_single_probe() {
    let records = clustered_records(10, 3);
    let index = IvfIndex::new(2, Metric::SquaredEuclidean, 4, 1).unwrap();
    index.build(records.clone()).unwrap();
    assert!(index.is_trained());

    for record in &records {
        let hits = index.search(&record.vector, 1, None).unwrap();
        assert_eq!(hits[0].document_id, record.document_id);
        assert_eq!(hits[0].score, 0.0);
    }
}

#[test]
fn test_results_bounded_and_sorted() {
    for metric in [Metric::Cosine, Metric::SquaredEuclidean] {
        for index in indexes(metric) {
            index.build(random_records(50, DIM, 11)).unwrap();
            let query = Lcg::new(99).vector(DIM);

            for k in [1, 5, 50, 80] {
                let hits = index.search(&query, k, None).unwrap();
                assert!(hits.len() <= k);
                assert!(hits
                    .windows(2)
                    .all(|w| metric.compare(w[0].score, w[1].score).is_le()));
            }
        }
    }
}

#[test]
fn test_filter_never_adds_results() {
    for index in indexes(Metric::Cosine) {
        index.build(random_records(30, DIM, 5)).unwrap();
        let query = Lcg::new(1).vector(DIM);
        let filter = MetadataFilter::new().eq("group", 1);

        for k in [1, 4, 30] {
            let unfiltered = index.search(&query, k, None).unwrap();
            let filtered = index.search(&query, k, Some(&filter)).unwrap();

            assert!(filtered.len() <= unfiltered.len());
            assert!(filtered.iter().all(|h| h.document_id.0 % 3 == 1));
        }
        assert_eq!(index.search(&query, 30, Some(&filter)).unwrap().len(), 10);
    }
}

#[test]
fn test_reinsert_keeps_count() {
    for index in indexes(Metric::Cosine) {
        let records = random_records(12, DIM, 2);
        index.build(records.clone()).unwrap();

        index.insert(records[3].clone()).unwrap();
        index.insert(records[3].clone()).unwrap();
        assert_eq!(index.count(), 12);
    }
}

#[test]
fn test_deleted_ids_never_returned() {
    for index in indexes(Metric::SquaredEuclidean) {
        let records = random_records(20, DIM, 4);
        index.build(records.clone()).unwrap();

        let deleted = [DocumentId(0), DocumentId(7), DocumentId(19)];
        for id in deleted {
            assert!(index.delete(id).unwrap());
        }
        index.retrain().unwrap();

        for record in &records {
            let hits = index.search(&record.vector, 20, None).unwrap();
            assert_eq!(hits.len(), 17);
            assert!(hits.iter().all(|h| !deleted.contains(&h.document_id)));
        }
    }
}

#[test]
fn test_save_load_reproduces_results() {
    let temp = TempDir::new().unwrap();

    for (n, index) in indexes(Metric::Cosine).into_iter().enumerate() {
        index.build(random_records(40, DIM, 13)).unwrap();
        let path = temp.path().join(format!("index-{n}.json"));
        index.save(&path).unwrap();
        let loaded = load_index(&path).unwrap();

        let mut rng = Lcg::new(21);
        for _ in 0..10 {
            let query = rng.vector(DIM);
            assert_eq!(
                index.search(&query, 5, None).unwrap(),
                loaded.search(&query, 5, None).unwrap()
            );
        }
    }
}

#[test]
fn test_full_probe_ivf_matches_flat() {
    for metric in [Metric::Cosine, Metric::SquaredEuclidean] {
        let records = random_records(60, DIM, 17);

        let flat = create_index(&IndexConfig { metric, ..Default::default() }, DIM).unwrap();
        let ivf = create_index(
            &IndexConfig {
                kind: IndexKind::Ivf,
                metric,
                n_lists: 6,
                n_probe: 6,
            },
            DIM,
        )
        .unwrap();
        flat.build(records.clone()).unwrap();
        ivf.build(records).unwrap();

        let mut rng = Lcg::new(33);
        for _ in 0..20 {
            let query = rng.vector(DIM);
            let expected = flat.search(&query, 7, None).unwrap();
            let actual = ivf.search(&query, 7, None).unwrap();
            assert_eq!(ids(&expected), ids(&actual), "{metric}");
        }
    }
}
