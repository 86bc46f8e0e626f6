//! Process-wide document registry.
//!
//! Maps document names to their live index, record, and raw content. The
//! registry is the single answer to "is this document indexed?".
//!
//! Entries are `Arc`s swapped under a short write lock: a reader that has
//! fetched an entry keeps seeing that entry in full even if a re-ingest
//! replaces it a moment later. Iteration follows first-registration order;
//! re-registering a name keeps its original position.
//!
//! Rebuilds of the same name are serialized through [`DocumentRegistry::lock_document`],
//! an async per-name mutex held for the whole chunk/embed/persist cycle.
//! [`DocumentRegistry::release_document`] hands the guard back and drops the
//! mutex once no caller holds or awaits it.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::OwnedMutexGuard;

use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::models::{DocumentRecord, FileType};

#[derive(Debug)]
pub struct RegisteredDocument {
    pub record: DocumentRecord,
    pub index: Arc<VectorIndex>,
    pub content: String,
}

/// Per-document summary row returned by [`DocumentRegistry::list`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentListing {
    pub file_type: FileType,
    pub chunks: usize,
    pub content_length: usize,
    pub file_name: String,
}

#[derive(Default)]
pub struct DocumentRegistry {
    documents: RwLock<IndexMap<String, Arc<RegisteredDocument>>>,
    rebuild_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `document.record.document_name`.
    /// Returns the replaced entry, if any.
    pub fn register(&self, document: RegisteredDocument) -> Option<Arc<RegisteredDocument>> {
        let name = document.record.document_name.clone();
        let previous = self.documents.write().insert(name.clone(), Arc::new(document));
        if previous.is_some() {
            tracing::debug!(document = %name, "replaced registered document");
        }
        previous
    }

    pub fn get(&self, name: &str) -> Result<Arc<RegisteredDocument>> {
        let documents = self.documents.read();
        documents
            .get(name)
            .cloned()
            .ok_or_else(|| RagError::not_indexed(name, documents.keys().cloned().collect()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.documents.read().contains_key(name)
    }

    /// Remove `name`. Removing an unknown name is a no-op.
    pub fn remove(&self, name: &str) -> Option<Arc<RegisteredDocument>> {
        // shift_remove keeps the order of the remaining entries.
        self.documents.write().shift_remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.documents.read().keys().cloned().collect()
    }

    pub fn list(&self) -> IndexMap<String, DocumentListing> {
        self.documents
            .read()
            .iter()
            .map(|(name, doc)| {
                (
                    name.clone(),
                    DocumentListing {
                        file_type: doc.record.file_type,
                        chunks: doc.record.chunk_count,
                        content_length: doc.record.content_length,
                        file_name: doc.record.file_name.clone(),
                    },
                )
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    pub fn clear(&self) {
        self.documents.write().clear();
        self.rebuild_locks.lock().clear();
    }

    /// Acquire the rebuild lock for `name`, waiting for any in-flight
    /// rebuild of the same document to finish.
    pub async fn lock_document(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .rebuild_locks
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// Release a guard from [`lock_document`](Self::lock_document) and
    /// forget the per-name lock when nobody else holds or awaits it.
    pub fn release_document(&self, name: &str, guard: OwnedMutexGuard<()>) {
        let mut locks = self.rebuild_locks.lock();
        drop(guard);
        if locks
            .get(name)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(name);
        }
    }

    #[cfg(test)]
    pub(crate) fn rebuild_lock_count(&self) -> usize {
        self.rebuild_locks.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;
    use std::time::Duration;

    fn doc(name: &str, chunks: usize) -> RegisteredDocument {
        RegisteredDocument {
            record: DocumentRecord {
                document_name: name.to_string(),
                file_type: FileType::Text,
                file_path: format!("{}.txt", name),
                file_name: format!("{}.txt", name),
                chunk_count: chunks,
                content_length: 10,
                source_metadata: Default::default(),
                indexed: true,
                embedding_model: "m".to_string(),
                index_path: PathBuf::new(),
                ingested_at: Utc::now(),
            },
            index: Arc::new(VectorIndex::from_entries(name, "m", 2, Vec::new()).unwrap()),
            content: String::new(),
        }
    }

    #[test]
    fn test_insertion_order_survives_reregister() {
        let registry = DocumentRegistry::new();
        registry.register(doc("b", 1));
        registry.register(doc("a", 1));
        registry.register(doc("c", 1));
        assert!(registry.register(doc("b", 7)).is_some());

        assert_eq!(registry.names(), vec!["b", "a", "c"]);
        assert_eq!(registry.list()["b"].chunks, 7);
    }

    #[test]
    fn test_get_unknown_lists_available() {
        let registry = DocumentRegistry::new();
        registry.register(doc("known", 1));
        match registry.get("missing") {
            Err(RagError::DocumentNotIndexed { name, available }) => {
                assert_eq!(name, "missing");
                assert_eq!(available, vec!["known"]);
            }
            other => panic!("unexpected: {:?}", other.map(|d| d.record.clone())),
        }
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = DocumentRegistry::new();
        registry.register(doc("x", 1));
        assert!(registry.remove("x").is_some());
        assert!(registry.remove("x").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reader_keeps_old_snapshot() {
        let registry = DocumentRegistry::new();
        registry.register(doc("x", 1));
        let before = registry.get("x").unwrap();
        registry.register(doc("x", 2));
        assert_eq!(before.record.chunk_count, 1);
        assert_eq!(registry.get("x").unwrap().record.chunk_count, 2);
    }

    #[tokio::test]
    async fn test_lock_document_serializes_same_name() {
        let registry = Arc::new(DocumentRegistry::new());
        let guard = registry.lock_document("x").await;

        let r = registry.clone();
        let waiter = tokio::spawn(async move {
            let _g = r.lock_document("x").await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        // A different name is not blocked.
        let _other = registry.lock_document("y").await;

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_release_document_forgets_idle_lock() {
        let registry = Arc::new(DocumentRegistry::new());
        let guard = registry.lock_document("x").await;

        let r = registry.clone();
        let waiter = tokio::spawn(async move { r.lock_document("x").await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The waiter still references the lock, so it is kept.
        registry.release_document("x", guard);
        assert_eq!(registry.rebuild_lock_count(), 1);

        let second = waiter.await.unwrap();
        registry.release_document("x", second);
        assert_eq!(registry.rebuild_lock_count(), 0);
    }
}
