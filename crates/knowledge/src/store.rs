//! Document store: owns document text and metadata, keyed by id.

use crate::document::{validate_metadata, Document, DocumentId};
use crate::error::{KnowledgeError, KnowledgeResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

/// Storage for documents.
///
/// `put` replaces any document with the same id. Ids handed out by
/// `next_id` are never reused, even after deletion or `clear`.
pub trait DocumentStore: Send + Sync + std::fmt::Debug {
    /// Insert or replace a document.
    fn put(&self, document: Document) -> KnowledgeResult<()>;

    /// Fetch a document, or `NotFound`.
    fn get(&self, id: DocumentId) -> KnowledgeResult<Document>;

    /// Remove a document. Returns whether anything was removed.
    fn delete(&self, id: DocumentId) -> KnowledgeResult<bool>;

    fn count(&self) -> usize;

    /// Reserve the next never-used id.
    fn next_id(&self) -> DocumentId;

    /// All ids in ascending order.
    fn ids(&self) -> Vec<DocumentId>;

    /// Remove every document, keeping the id counter.
    fn clear(&self);
}

#[derive(Debug, Default)]
struct StoreState {
    next_id: u64,
    documents: BTreeMap<DocumentId, Document>,
}

/// On-disk form of the store.
#[derive(Debug, Serialize, Deserialize)]
struct StoreSnapshot {
    next_id: u64,
    documents: Vec<Document>,
}

/// In-memory store with JSON snapshot persistence.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    state: RwLock<StoreState>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a snapshot of all documents and the id counter.
    pub fn save(&self, path: &Path) -> KnowledgeResult<()> {
        let snapshot = {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            StoreSnapshot {
                next_id: state.next_id,
                documents: state.documents.values().cloned().collect(),
            }
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec(&snapshot)?)?;

        tracing::debug!(
            "Saved {} documents to {:?}",
            snapshot.documents.len(),
            path
        );
        Ok(())
    }

    /// Restore a store written by [`MemoryDocumentStore::save`].
    pub fn load(path: &Path) -> KnowledgeResult<Self> {
        let bytes = fs::read(path).map_err(|e| {
            KnowledgeError::Storage(format!("Failed to read document store {:?}: {}", path, e))
        })?;
        let snapshot: StoreSnapshot = serde_json::from_slice(&bytes)?;

        let mut state = StoreState {
            next_id: snapshot.next_id,
            documents: BTreeMap::new(),
        };
        for document in snapshot.documents {
            validate_metadata(&document.metadata)?;
            state.next_id = state.next_id.max(document.id.0.saturating_add(1));
            state.documents.insert(document.id, document);
        }

        tracing::debug!("Loaded {} documents from {:?}", state.documents.len(), path);
        Ok(Self {
            state: RwLock::new(state),
        })
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn put(&self, document: Document) -> KnowledgeResult<()> {
        validate_metadata(&document.metadata)?;

        let id = document.id;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.next_id = state.next_id.max(id.0.saturating_add(1));
        if state.documents.insert(id, document).is_some() {
            tracing::debug!("Replaced document {}", id);
        }
        Ok(())
    }

    fn get(&self, id: DocumentId) -> KnowledgeResult<Document> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state
            .documents
            .get(&id)
            .cloned()
            .ok_or(KnowledgeError::NotFound(id))
    }

    fn delete(&self, id: DocumentId) -> KnowledgeResult<bool> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        Ok(state.documents.remove(&id).is_some())
    }

    fn count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .documents
            .len()
    }

    fn next_id(&self) -> DocumentId {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let id = DocumentId(state.next_id);
        state.next_id += 1;
        id
    }

    fn ids(&self) -> Vec<DocumentId> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .documents
            .keys()
            .copied()
            .collect()
    }

    fn clear(&self) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .documents
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_and_get() {
        let store = MemoryDocumentStore::new();
        store
            .put(Document::new(DocumentId(0), "The race starts at 10:00.").with_metadata("source", "notice"))
            .unwrap();

        let doc = store.get(DocumentId(0)).unwrap();
        assert_eq!(doc.text, "The race starts at 10:00.");
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let store = MemoryDocumentStore::new();
        assert!(matches!(
            store.get(DocumentId(9)),
            Err(KnowledgeError::NotFound(DocumentId(9)))
        ));
    }

    #[test]
    fn test_put_replaces_duplicate_id() {
        let store = MemoryDocumentStore::new();
        store.put(Document::new(DocumentId(3), "old")).unwrap();
        store.put(Document::new(DocumentId(3), "new")).unwrap();

        assert_eq!(store.count(), 1);
        assert_eq!(store.get(DocumentId(3)).unwrap().text, "new");
    }

    #[test]
    fn test_put_rejects_nested_metadata() {
        let store = MemoryDocumentStore::new();
        let doc = Document::new(DocumentId(0), "x").with_metadata("nested", serde_json::json!({"a": 1}));
        assert!(matches!(store.put(doc), Err(KnowledgeError::Validation(_))));
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = MemoryDocumentStore::new();
        store.put(Document::new(DocumentId(1), "x")).unwrap();

        assert!(store.delete(DocumentId(1)).unwrap());
        assert!(!store.delete(DocumentId(1)).unwrap());
        assert!(!store.delete(DocumentId(100)).unwrap());
    }

    #[test]
    fn test_ids_never_reused() {
        let store = MemoryDocumentStore::new();
        let first = store.next_id();
        store.put(Document::new(first, "a")).unwrap();
        store.delete(first).unwrap();

        let second = store.next_id();
        assert!(second > first);

        store.put(Document::new(DocumentId(50), "explicit")).unwrap();
        assert_eq!(store.next_id(), DocumentId(51));

        store.clear();
        assert_eq!(store.count(), 0);
        assert_eq!(store.next_id(), DocumentId(52));
    }

    #[test]
    fn test_ids_sorted() {
        let store = MemoryDocumentStore::new();
        for id in [5, 1, 3] {
            store.put(Document::new(DocumentId(id), "x")).unwrap();
        }
        assert_eq!(store.ids(), vec![DocumentId(1), DocumentId(3), DocumentId(5)]);
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("documents.json");

        let store = MemoryDocumentStore::new();
        let id = store.next_id();
        store
            .put(Document::new(id, "A purple checkered flag signals a shark sighting.")
                .with_metadata("source_url", "https://example.org/flags"))
            .unwrap();
        store.next_id();
        store.save(&path).unwrap();

        let loaded = MemoryDocumentStore::load(&path).unwrap();
        assert_eq!(loaded.get(id).unwrap(), store.get(id).unwrap());
        assert_eq!(loaded.next_id(), DocumentId(2));
    }
}
