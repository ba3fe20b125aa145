//! Knowledge base: one named collection with its store, index and embedder.
//!
//! The store and the index are kept in step: every document in the store has
//! exactly one embedding record in the index and vice versa. Ingestion
//! validates, chunks and embeds everything before touching either. The
//! commit then runs under the collection's write lock and is rolled back in
//! memory and on disk if any step fails, so a failed ingest leaves the
//! collection as it was. Searches hold the read lock, so they never see a
//! document that is in the index but not yet, or no longer, in the store.

use crate::config::{
    get_base_dir, get_documents_path, get_index_path, get_stats_path, load_config, save_config,
    KnowledgeBaseConfig,
};
use crate::context::ContextAssembler;
use crate::document::{validate_metadata, Document, DocumentId, IngestItem, ScoredDocument};
use crate::embeddings::{create_provider, EmbeddingConfig, EmbeddingProvider};
use crate::error::{KnowledgeError, KnowledgeResult};
use crate::filter::MetadataFilter;
use crate::index::{create_index, load_index, EmbeddingRecord, IndexKind, Metric, VectorIndex};
use crate::pipeline::{PipelineConfig, RagPipeline};
use crate::retriever::{CollectionLock, Retriever, RetrieverConfig};
use crate::store::{DocumentStore, MemoryDocumentStore};
use chrono::{DateTime, Utc};
use ragline_core::AppError;
use ragline_llm::LlmClient;
use ragline_prompt::PromptTemplates;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};
use std::time::Instant;

/// What to do when ingesting into a collection that already holds documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestPolicy {
    /// Add the new documents regardless
    #[default]
    Always,

    /// Leave a populated collection untouched
    SkipIfPopulated,

    /// Swap the collection's contents for the new documents once they are
    /// all embedded; the old documents survive any failure
    Replace,
}

/// Outcome of one ingest call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Ids assigned to the new documents, in input order
    pub added: Vec<DocumentId>,

    /// Set when `SkipIfPopulated` found existing documents
    pub skipped: bool,

    pub duration_secs: f64,
}

/// Collection statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseStats {
    pub name: String,
    pub documents: usize,
    pub indexed: usize,
    pub index_kind: IndexKind,
    pub metric: Metric,
    pub dimensions: usize,
    pub embedding_provider: String,
    pub embedding_model: String,

    /// Bytes used by the collection directory
    pub disk_size_bytes: u64,

    pub last_ingest_at: Option<DateTime<Utc>>,
}

/// Contents of `stats.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct IngestLog {
    last_ingest_at: Option<DateTime<Utc>>,
    #[serde(default)]
    total_ingested: u64,
}

pub struct KnowledgeBase {
    workspace: PathBuf,
    config: KnowledgeBaseConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<MemoryDocumentStore>,
    index: Arc<dyn VectorIndex>,
    lock: CollectionLock,
}

/// Store and index contents saved before a replacing commit.
struct Backup {
    documents: Vec<Document>,
    records: Vec<EmbeddingRecord>,
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("workspace", &self.workspace)
            .field("name", &self.config.name)
            .field("documents", &self.store.count())
            .field("index", &self.index.kind())
            .finish()
    }
}

impl KnowledgeBase {
    /// Open (or start) the collection `name`, building its embedder from the
    /// collection config.
    pub async fn open(workspace: &Path, name: &str) -> KnowledgeResult<Self> {
        let config = load_config(workspace, name)?;
        let embedder = create_provider(&config.embedding)
            .await
            .map_err(KnowledgeError::Embedding)?;
        Self::open_with(workspace, config, embedder).await
    }

    /// Open a collection with an injected embedder.
    ///
    /// Persisted state is reused when it matches the config; otherwise the
    /// index is rebuilt from the stored documents.
    pub async fn open_with(
        workspace: &Path,
        config: KnowledgeBaseConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> KnowledgeResult<Self> {
        config.validate()?;
        config.embedding.validate_consistency(&EmbeddingConfig {
            provider: embedder.provider_name().to_string(),
            model: embedder.model_name().to_string(),
            dimensions: embedder.dimensions(),
            endpoint: config.embedding.endpoint.clone(),
        })?;

        let documents_path = get_documents_path(workspace, &config.name);
        let store = if documents_path.exists() {
            MemoryDocumentStore::load(&documents_path)?
        } else {
            MemoryDocumentStore::new()
        };

        let index_path = get_index_path(workspace, &config.name);
        let loaded = if index_path.exists() {
            Some(load_index(&index_path)?)
        } else {
            None
        };

        let dimension = embedder.dimensions();
        let (index, stale) = match loaded {
            Some(index)
                if index.kind() == config.index.kind
                    && index.metric() == config.index.metric
                    && index.dimension() == dimension
                    && index.count() == store.count() =>
            {
                (index, false)
            }
            Some(index) => {
                tracing::warn!(
                    "Index for '{}' does not match its config or documents ({} {} d={} n={}), rebuilding",
                    config.name,
                    index.kind(),
                    index.metric(),
                    index.dimension(),
                    index.count()
                );
                (create_index(&config.index, dimension)?, true)
            }
            None => (create_index(&config.index, dimension)?, store.count() > 0),
        };

        let mut base = Self {
            workspace: workspace.to_path_buf(),
            config,
            embedder,
            store: Arc::new(store),
            index,
            lock: CollectionLock::default(),
        };

        if stale {
            base.reindex().await?;
        }

        tracing::info!(
            "Opened collection '{}' ({} documents, {} index)",
            base.config.name,
            base.store.count(),
            base.index.kind()
        );
        Ok(base)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &KnowledgeBaseConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn DocumentStore> {
        self.store.clone()
    }

    pub fn index(&self) -> Arc<dyn VectorIndex> {
        self.index.clone()
    }

    pub fn embedder(&self) -> Arc<dyn EmbeddingProvider> {
        self.embedder.clone()
    }

    /// Number of documents in the collection.
    pub fn count(&self) -> usize {
        self.store.count()
    }

    /// Chunk, embed, store and index `items`, then persist the collection.
    pub async fn ingest(
        &self,
        items: Vec<IngestItem>,
        policy: IngestPolicy,
    ) -> KnowledgeResult<IngestReport> {
        let start = Instant::now();

        if policy == IngestPolicy::SkipIfPopulated && self.store.count() > 0 {
            tracing::info!(
                "Collection '{}' already holds {} documents, skipping ingest",
                self.config.name,
                self.store.count()
            );
            return Ok(IngestReport {
                added: Vec::new(),
                skipped: true,
                duration_secs: start.elapsed().as_secs_f64(),
            });
        }

        for item in &items {
            if item.text.trim().is_empty() {
                return Err(KnowledgeError::Validation(
                    "Document text cannot be empty".to_string(),
                ));
            }
            validate_metadata(&item.metadata)?;
        }
        let items = self.config.chunker()?.split_all(items)?;

        tracing::info!(
            "Ingesting {} documents into '{}' (batch size {}, {:?})",
            items.len(),
            self.config.name,
            self.config.batch_size,
            policy
        );

        let mut vectors = Vec::with_capacity(items.len());
        for (n, batch) in items.chunks(self.config.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|item| item.text.clone()).collect();
            let embedded = self.embed_batch(&texts).await?;
            for vector in &embedded {
                self.index.metric().check(vector, self.index.dimension())?;
            }
            tracing::debug!("Embedded batch {} ({} documents)", n + 1, batch.len());
            vectors.extend(embedded);
        }

        let added = self.commit(items, vectors, policy == IngestPolicy::Replace)?;
        if let Err(e) = self.record_ingest(added.len()) {
            tracing::warn!("Failed to update ingest stats for '{}': {}", self.config.name, e);
        }

        let duration = start.elapsed();
        tracing::info!(
            "Ingested {} documents into '{}' in {:.2}s",
            added.len(),
            self.config.name,
            duration.as_secs_f64()
        );

        Ok(IngestReport {
            added,
            skipped: false,
            duration_secs: duration.as_secs_f64(),
        })
    }

    /// Store, index and persist embedded items under the write lock.
    ///
    /// On failure the store and index are restored to their previous
    /// contents and persisted again.
    fn commit(
        &self,
        items: Vec<IngestItem>,
        vectors: Vec<Vec<f32>>,
        replace: bool,
    ) -> KnowledgeResult<Vec<DocumentId>> {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);

        let backup = if replace {
            let backup = self.backup()?;
            self.store.clear();
            self.index.clear();
            Some(backup)
        } else {
            None
        };

        let mut added = Vec::with_capacity(items.len());
        match self.apply(items, vectors, &mut added) {
            Ok(()) => Ok(added),
            Err(e) => {
                tracing::error!(
                    "Ingest into '{}' failed after {} documents, rolling back: {}",
                    self.config.name,
                    added.len(),
                    e
                );
                self.roll_back(backup, &added);
                Err(e)
            }
        }
    }

    fn apply(
        &self,
        items: Vec<IngestItem>,
        vectors: Vec<Vec<f32>>,
        added: &mut Vec<DocumentId>,
    ) -> KnowledgeResult<()> {
        for (item, vector) in items.into_iter().zip(vectors) {
            let id = self.store.next_id();
            let record = EmbeddingRecord::new(id, vector).with_metadata(item.metadata.clone());
            self.store.put(Document {
                id,
                text: item.text,
                metadata: item.metadata,
            })?;
            added.push(id);
            self.index.insert(record)?;
        }

        self.index.retrain()?;
        self.persist()
    }

    fn backup(&self) -> KnowledgeResult<Backup> {
        let documents = self
            .store
            .ids()
            .into_iter()
            .map(|id| self.store.get(id))
            .collect::<KnowledgeResult<Vec<_>>>()?;
        Ok(Backup {
            documents,
            records: self.index.records(),
        })
    }

    /// Best effort: failures here are logged, the caller reports the
    /// original error.
    fn roll_back(&self, backup: Option<Backup>, added: &[DocumentId]) {
        let restored = match backup {
            Some(backup) => {
                self.store.clear();
                self.index.clear();
                backup
                    .documents
                    .into_iter()
                    .try_for_each(|document| self.store.put(document))
                    .and_then(|()| self.index.build(backup.records))
            }
            None => added.iter().try_for_each(|&id| {
                self.index.delete(id)?;
                self.store.delete(id)?;
                Ok::<(), KnowledgeError>(())
            }),
        };

        if let Err(e) = restored
            .and_then(|()| self.index.retrain())
            .and_then(|()| self.persist())
        {
            tracing::warn!("Rollback of '{}' incomplete: {}", self.config.name, e);
        }
    }

    /// Remove documents from both the index and the store.
    ///
    /// Returns how many ids were present; unknown ids are ignored.
    pub fn delete(&self, ids: &[DocumentId]) -> KnowledgeResult<usize> {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);

        let mut removed = 0;
        for &id in ids {
            let in_index = self.index.delete(id)?;
            let in_store = self.store.delete(id)?;
            if in_store || in_index {
                removed += 1;
            } else {
                tracing::debug!("Document {} not in collection", id);
            }
        }

        if removed > 0 {
            self.index.retrain()?;
            self.persist()?;
        }
        tracing::info!("Deleted {} documents from '{}'", removed, self.config.name);
        Ok(removed)
    }

    /// Top documents for `query`, best first.
    pub async fn search(
        &self,
        query: &str,
        top_k: Option<usize>,
        filter: Option<&MetadataFilter>,
    ) -> KnowledgeResult<Vec<ScoredDocument>> {
        self.retriever().retrieve(query, top_k, filter).await
    }

    pub fn retriever(&self) -> Retriever {
        Retriever::new(
            self.embedder.clone(),
            self.index.clone(),
            self.store.clone(),
            RetrieverConfig {
                default_top_k: self.config.default_top_k,
                embed_timeout: self.config.embed_timeout(),
            },
        )
        .with_lock(self.lock.clone())
    }

    pub fn assembler(&self) -> ContextAssembler {
        ContextAssembler::new()
            .with_max_chars(self.config.max_context_chars)
            .with_source_key(self.config.source_key.clone())
    }

    /// A pipeline over this collection generating with `llm`.
    pub fn pipeline(
        &self,
        llm: Arc<dyn LlmClient>,
        templates: PromptTemplates,
        model: impl Into<String>,
    ) -> RagPipeline {
        let config =
            PipelineConfig::new(model).with_generate_timeout(self.config.generate_timeout());
        RagPipeline::new(self.retriever(), self.assembler(), templates, llm, config)
    }

    pub fn stats(&self) -> KnowledgeResult<BaseStats> {
        let log = self.read_ingest_log()?;
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        Ok(BaseStats {
            name: self.config.name.clone(),
            documents: self.store.count(),
            indexed: self.index.count(),
            index_kind: self.index.kind(),
            metric: self.index.metric(),
            dimensions: self.index.dimension(),
            embedding_provider: self.embedder.provider_name().to_string(),
            embedding_model: self.embedder.model_name().to_string(),
            disk_size_bytes: dir_size(&get_base_dir(&self.workspace, &self.config.name)),
            last_ingest_at: log.last_ingest_at,
        })
    }

    /// Remove every document, keeping the config and id counter.
    pub fn clear(&self) -> KnowledgeResult<()> {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        self.store.clear();
        self.index.clear();
        self.persist()?;
        tracing::info!("Cleared collection '{}'", self.config.name);
        Ok(())
    }

    /// Write config, documents and index to the collection directory.
    pub fn persist(&self) -> KnowledgeResult<()> {
        save_config(&self.workspace, &self.config)?;
        self.store
            .save(&get_documents_path(&self.workspace, &self.config.name))?;
        self.index
            .save(&get_index_path(&self.workspace, &self.config.name))?;
        Ok(())
    }

    /// Re-embed every stored document into a fresh index.
    async fn reindex(&mut self) -> KnowledgeResult<()> {
        let ids = self.store.ids();
        tracing::info!(
            "Rebuilding {} index for '{}' from {} documents",
            self.config.index.kind,
            self.config.name,
            ids.len()
        );

        let mut records = Vec::with_capacity(ids.len());
        for batch in ids.chunks(self.config.batch_size) {
            let documents = batch
                .iter()
                .map(|&id| self.store.get(id))
                .collect::<KnowledgeResult<Vec<_>>>()?;
            let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
            let vectors = self.embed_batch(&texts).await?;
            records.extend(
                documents
                    .into_iter()
                    .zip(vectors)
                    .map(|(doc, vector)| EmbeddingRecord::new(doc.id, vector).with_metadata(doc.metadata)),
            );
        }

        let index = create_index(&self.config.index, self.embedder.dimensions())?;
        index.build(records)?;
        index.retrain()?;
        self.index = index;
        self.persist()
    }

    async fn embed_batch(&self, texts: &[String]) -> KnowledgeResult<Vec<Vec<f32>>> {
        let call = self.embedder.embed_batch(texts);
        let result = match self.config.embed_timeout() {
            Some(after) => tokio::time::timeout(after, call)
                .await
                .map_err(|_| KnowledgeError::Timeout {
                    operation: "document embedding",
                    after,
                })?,
            None => call.await,
        };

        let vectors = result.map_err(KnowledgeError::Embedding)?;
        if vectors.len() != texts.len() {
            return Err(KnowledgeError::Embedding(AppError::Knowledge(format!(
                "Provider returned {} embeddings for {} texts",
                vectors.len(),
                texts.len()
            ))));
        }
        Ok(vectors)
    }

    fn read_ingest_log(&self) -> KnowledgeResult<IngestLog> {
        let path = get_stats_path(&self.workspace, &self.config.name);
        if !path.exists() {
            return Ok(IngestLog::default());
        }
        Ok(serde_json::from_slice(&fs::read(&path)?)?)
    }

    fn record_ingest(&self, added: usize) -> KnowledgeResult<()> {
        let mut log = self.read_ingest_log()?;
        log.last_ingest_at = Some(Utc::now());
        log.total_ingested += added as u64;

        let path = get_stats_path(&self.workspace, &self.config.name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_vec_pretty(&log)?)?;
        Ok(())
    }
}

/// Delete a collection directory and everything in it.
pub fn clean(workspace: &Path, name: &str) -> KnowledgeResult<()> {
    crate::config::validate_name(name)?;
    let dir = get_base_dir(workspace, name);
    if !dir.exists() {
        return Err(KnowledgeError::Storage(format!(
            "Collection '{}' does not exist",
            name
        )));
    }

    fs::remove_dir_all(&dir)?;
    tracing::info!("Removed collection '{}'", name);
    Ok(())
}

fn dir_size(dir: &Path) -> u64 {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.metadata().ok())
        .filter(|m| m.is_file())
        .map(|m| m.len())
        .sum()
}
