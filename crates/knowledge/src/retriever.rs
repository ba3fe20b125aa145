//! Retriever: query text to ranked documents.

use crate::document::ScoredDocument;
use crate::embeddings::EmbeddingProvider;
use crate::error::{KnowledgeError, KnowledgeResult};
use crate::filter::MetadataFilter;
use crate::index::VectorIndex;
use crate::store::DocumentStore;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::instrument;

/// Collection-wide readers-writer lock.
///
/// Searches hold it shared from index lookup through store resolution;
/// ingest, delete and clear hold it exclusively while they touch the store
/// and the index, so a query never sees one updated without the other.
pub type CollectionLock = Arc<RwLock<()>>;

/// Default number of documents retrieved per query.
pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct RetrieverConfig {
    /// Used when the caller does not pass `top_k`
    pub default_top_k: usize,

    /// Bound on the query embedding call
    pub embed_timeout: Option<Duration>,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            default_top_k: DEFAULT_TOP_K,
            embed_timeout: None,
        }
    }
}

/// Embeds a query, searches the index and resolves hits against the store.
///
/// Holds shared handles only; one retriever serves concurrent queries.
#[derive(Debug, Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    store: Arc<dyn DocumentStore>,
    config: RetrieverConfig,
    lock: CollectionLock,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn DocumentStore>,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            store,
            config,
            lock: CollectionLock::default(),
        }
    }

    /// Share the lock writers of the same collection take.
    pub fn with_lock(mut self, lock: CollectionLock) -> Self {
        self.lock = lock;
        self
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Embed query text, honouring `embed_timeout`.
    pub async fn embed_query(&self, query: &str) -> KnowledgeResult<Vec<f32>> {
        let embedding = self.embedder.embed(query);

        let result = match self.config.embed_timeout {
            Some(after) => tokio::time::timeout(after, embedding)
                .await
                .map_err(|_| KnowledgeError::Timeout {
                    operation: "query embedding",
                    after,
                })?,
            None => embedding.await,
        };

        result.map_err(KnowledgeError::Retrieval)
    }

    /// Retrieve up to `top_k` documents for `query`, best first.
    ///
    /// Every id returned by the index must resolve in the store; a missing
    /// document is a `Consistency` error rather than a silently shorter list.
    #[instrument(skip(self, query, filter), fields(query_len = query.len()))]
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: Option<usize>,
        filter: Option<&MetadataFilter>,
    ) -> KnowledgeResult<Vec<ScoredDocument>> {
        let top_k = top_k.unwrap_or(self.config.default_top_k);
        if top_k == 0 {
            return Err(KnowledgeError::Validation(
                "top_k must be greater than zero".to_string(),
            ));
        }

        let vector = self.embed_query(query).await?;
        let documents = self.resolve(&vector, top_k, filter)?;

        if let (Some(first), Some(last)) = (documents.first(), documents.last()) {
            tracing::debug!(
                "Retrieved {} documents (top score: {:.3}, lowest: {:.3})",
                documents.len(),
                first.score,
                last.score
            );
        } else {
            tracing::debug!("Retrieved no documents");
        }

        Ok(documents)
    }

    /// Search and resolve under one shared guard.
    fn resolve(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> KnowledgeResult<Vec<ScoredDocument>> {
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        let hits = self.index.search(vector, top_k, filter)?;

        hits.into_iter()
            .map(|hit| {
                let document = self.store.get(hit.document_id).map_err(|e| match e {
                    KnowledgeError::NotFound(id) => KnowledgeError::Consistency(id),
                    other => other,
                })?;
                Ok(ScoredDocument {
                    document,
                    score: hit.score,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, DocumentId};
    use crate::index::{EmbeddingRecord, FlatIndex, Metric};
    use crate::store::MemoryDocumentStore;
    use ragline_core::{AppError, AppResult};

    /// Embeds by looking the text up in a fixed table.
    #[derive(Debug)]
    struct TableEmbedder;

    #[async_trait::async_trait]
    impl EmbeddingProvider for TableEmbedder {
        fn provider_name(&self) -> &str {
            "table"
        }

        fn model_name(&self) -> &str {
            "table-v1"
        }

        fn dimensions(&self) -> usize {
            2
        }

        async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
            texts
                .iter()
                .map(|t| match t.as_str() {
                    "east" => Ok(vec![1.0, 0.0]),
                    "north" => Ok(vec![0.0, 1.0]),
                    other => Err(AppError::Llm(format!("no embedding for '{}'", other))),
                })
                .collect()
        }
    }

    #[derive(Debug)]
    struct SlowEmbedder;

    #[async_trait::async_trait]
    impl EmbeddingProvider for SlowEmbedder {
        fn provider_name(&self) -> &str {
            "slow"
        }

        fn model_name(&self) -> &str {
            "slow-v1"
        }

        fn dimensions(&self) -> usize {
            2
        }

        async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn fixtures() -> (Arc<FlatIndex>, Arc<MemoryDocumentStore>) {
        let index = Arc::new(FlatIndex::new(2, Metric::Cosine));
        let store = Arc::new(MemoryDocumentStore::new());
        for (id, text, vector) in [(0, "eastern doc", [1.0, 0.1]), (1, "northern doc", [0.1, 1.0])] {
            store.put(Document::new(DocumentId(id), text)).unwrap();
            index.insert(EmbeddingRecord::new(DocumentId(id), vector.to_vec())).unwrap();
        }
        (index, store)
    }

    fn retriever(embedder: Arc<dyn EmbeddingProvider>, config: RetrieverConfig) -> (Retriever, Arc<FlatIndex>, Arc<MemoryDocumentStore>) {
        let (index, store) = fixtures();
        let retriever = Retriever::new(embedder, index.clone(), store.clone(), config);
        (retriever, index, store)
    }

    #[tokio::test]
    async fn test_retrieve_ranks_and_resolves() {
        let (retriever, _, _) = retriever(Arc::new(TableEmbedder), RetrieverConfig::default());

        let results = retriever.retrieve("north", Some(2), None).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document.text, "northern doc");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn test_default_top_k_applies() {
        let config = RetrieverConfig {
            default_top_k: 1,
            ..Default::default()
        };
        let (retriever, _, _) = retriever(Arc::new(TableEmbedder), config);

        let results = retriever.retrieve("east", None, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.id, DocumentId(0));
    }

    #[tokio::test]
    async fn test_top_k_zero_is_validation_error() {
        let (retriever, _, _) = retriever(Arc::new(TableEmbedder), RetrieverConfig::default());
        assert!(matches!(
            retriever.retrieve("east", Some(0), None).await,
            Err(KnowledgeError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_embedding_failure_is_retrieval_error() {
        let (retriever, _, _) = retriever(Arc::new(TableEmbedder), RetrieverConfig::default());
        assert!(matches!(
            retriever.retrieve("south", None, None).await,
            Err(KnowledgeError::Retrieval(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_document_is_consistency_error() {
        let (retriever, _, store) = retriever(Arc::new(TableEmbedder), RetrieverConfig::default());
        store.delete(DocumentId(1)).unwrap();

        assert!(matches!(
            retriever.retrieve("north", Some(2), None).await,
            Err(KnowledgeError::Consistency(DocumentId(1)))
        ));
    }

    #[tokio::test]
    async fn test_embed_timeout() {
        let config = RetrieverConfig {
            embed_timeout: Some(Duration::from_millis(100)),
            ..Default::default()
        };
        let (retriever, _, _) = retriever(Arc::new(SlowEmbedder), config);

        assert!(matches!(
            retriever.retrieve("anything", None, None).await,
            Err(KnowledgeError::Timeout { .. })
        ));
    }
}
