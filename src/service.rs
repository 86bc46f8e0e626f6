//! Retrieval service: the process-wide context object.
//!
//! A [`RagService`] is built once at startup from a [`Config`] and then
//! shared (`Arc<RagService>`) by the CLI, the tool server, and the
//! compliance engine. It owns the chunker, the embedding provider, the
//! on-disk [`IndexStore`], and the in-memory [`DocumentRegistry`].
//!
//! # Lifecycle
//!
//! ```text
//! RagService::new(config) ─▶ restore() ─▶ ingest / query / compare … ─▶ shutdown()
//! ```
//!
//! [`restore`](RagService::restore) re-registers every document persisted
//! under the storage root; [`shutdown`](RagService::shutdown) drops the
//! in-memory state. Persisted artifacts are untouched by shutdown.
//!
//! # Failure reporting
//!
//! File ingestion returns an [`IngestOutcome`] with `success: false` and the
//! error message instead of an `Err`, so batch callers can report each file.
//! Every other entry point returns `Result<_, RagError>`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::chunk::TextChunker;
use crate::compliance::{ComplianceEngine, ComplianceOptions, Retriever};
use crate::config::Config;
use crate::embedding::{create_provider, embed_query, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::extract::{DefaultExtractor, Extractor};
use crate::index::{similarity_from_distance, VectorIndex};
use crate::models::{preview, DocumentRecord, ExtractedDocument, FileType, QueryHit, QueryResponse};
use crate::registry::{DocumentListing, DocumentRegistry, RegisteredDocument};
use crate::store::{validate_document_name, IndexStore};

/// Top-k used for each query of a RAG report.
const REPORT_TOP_K: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub success: bool,
    pub document_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type: Option<FileType>,
    pub chunks_created: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_store_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_saved: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-document entry of a batch query.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum BatchFinding {
    Results(QueryResponse),
    Error { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchQueryReport {
    pub query: String,
    pub documents_queried: usize,
    pub results_per_document: usize,
    pub findings: IndexMap<String, BatchFinding>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub document_name: String,
    pub metadata: DocumentRecord,
    pub indexed: bool,
    pub vector_store_chunks: usize,
}

/// Tables recorded at extraction time. Each entry keeps the shape the
/// extractor produced: `{sheet, data}` for workbooks and `{index, data, text}`
/// for Word documents.
#[derive(Debug, Clone, Serialize)]
pub struct TablesReport {
    pub document_name: String,
    pub total_tables: usize,
    pub tables: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentList {
    pub total_documents: usize,
    pub documents: IndexMap<String, DocumentListing>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadOutcome {
    pub success: bool,
    pub document_name: String,
    pub store_path: PathBuf,
    pub chunks_loaded: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub success: bool,
    pub document_name: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RagReport {
    pub document_name: String,
    pub total_queries: usize,
    pub query_results: Vec<QueryResponse>,
}

pub struct RagService {
    config: Config,
    chunker: TextChunker,
    provider: Arc<dyn EmbeddingProvider>,
    extractor: Arc<dyn Extractor>,
    store: IndexStore,
    registry: DocumentRegistry,
}

impl RagService {
    /// Build a service with the configured embedding provider and the
    /// default extractor. No model is loaded until the first embed call.
    pub fn new(config: Config) -> Result<Self> {
        let provider = create_provider(&config.embedding)?;
        Self::with_components(config, provider, Arc::new(DefaultExtractor))
    }

    pub fn with_components(
        config: Config,
        provider: Arc<dyn EmbeddingProvider>,
        extractor: Arc<dyn Extractor>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| RagError::unsupported(format!("invalid configuration: {:#}", e)))?;
        let chunker = TextChunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
        let store = IndexStore::new(config.storage.root.clone());
        Ok(Self {
            config,
            chunker,
            provider,
            extractor,
            store,
            registry: DocumentRegistry::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// A compliance engine retrieving through this service, using the
    /// `[compliance]` settings.
    pub fn compliance_engine(self: &Arc<Self>) -> ComplianceEngine {
        ComplianceEngine::new(
            self.clone(),
            ComplianceOptions::from_config(&self.config.compliance),
        )
    }

    // ═══════════════════════════════════════════════════════════════════
    // Ingestion
    // ═══════════════════════════════════════════════════════════════════

    /// Ingest one file. `document_name` defaults to the file stem.
    pub async fn ingest(&self, file_path: &Path, document_name: Option<&str>) -> IngestOutcome {
        let name = document_name
            .map(str::to_string)
            .or_else(|| {
                file_path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_string)
            })
            .unwrap_or_default();

        match self.try_ingest(file_path, &name).await {
            Ok(record) => IngestOutcome {
                success: true,
                document_name: name,
                file_type: Some(record.file_type),
                chunks_created: record.chunk_count,
                vector_store_path: Some(record.index_path),
                metadata_saved: Some(self.store.metadata_path(&record.document_name)),
                error: None,
            },
            Err(e) => {
                tracing::error!(file = %file_path.display(), error = %e, "ingest failed");
                IngestOutcome {
                    success: false,
                    document_name: name,
                    file_type: None,
                    chunks_created: 0,
                    vector_store_path: None,
                    metadata_saved: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn try_ingest(&self, file_path: &Path, name: &str) -> Result<DocumentRecord> {
        validate_document_name(name)?;
        let meta = match std::fs::metadata(file_path) {
            Ok(m) if m.is_file() => m,
            _ => return Err(RagError::FileNotFound(file_path.to_path_buf())),
        };

        let size_mb = meta.len() as f64 / (1024.0 * 1024.0);
        let max_mb = self.config.ingest.max_file_size_mb;
        if size_mb > max_mb as f64 {
            return Err(RagError::unsupported(format!(
                "File size ({:.2}MB) exceeds maximum allowed size ({}MB)",
                size_mb, max_mb
            )));
        }

        let file_type = FileType::from_path(file_path)?;
        tracing::info!(document = name, file = %file_path.display(), %file_type, "processing file");

        let extractor = self.extractor.clone();
        let path = file_path.to_path_buf();
        let extracted = tokio::task::spawn_blocking(move || extractor.extract(&path, file_type))
            .await
            .map_err(|e| RagError::internal(format!("extraction task failed: {}", e)))??;

        self.ingest_extracted(name, file_path, extracted).await
    }

    /// Index already-extracted text under `document_name`, replacing any
    /// previous index of that name.
    pub async fn ingest_extracted(
        &self,
        document_name: &str,
        file_path: &Path,
        document: ExtractedDocument,
    ) -> Result<DocumentRecord> {
        validate_document_name(document_name)?;
        let rebuild = self.registry.lock_document(document_name).await;
        let indexed = self.index_document(document_name, file_path, document).await;
        self.registry.release_document(document_name, rebuild);
        indexed
    }

    async fn index_document(
        &self,
        document_name: &str,
        file_path: &Path,
        document: ExtractedDocument,
    ) -> Result<DocumentRecord> {
        let source = file_path.display().to_string();
        let chunks = self.chunker.chunk_document(document_name, &source, &document.text);
        let index = VectorIndex::build(
            document_name,
            chunks,
            self.provider.as_ref(),
            self.config.embedding.batch_size,
        )
        .await?;
        let staged_index = self.store.stage_index(&index, &document.text).await?;

        let record = DocumentRecord {
            document_name: document_name.to_string(),
            file_type: document.file_type,
            file_path: source,
            file_name: file_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string(),
            chunk_count: index.len(),
            content_length: document.text.chars().count(),
            source_metadata: document.metadata,
            indexed: true,
            embedding_model: index.model().to_string(),
            index_path: staged_index.target().to_path_buf(),
            ingested_at: Utc::now(),
        };
        let staged_metadata = self.store.stage_metadata(&record)?;
        staged_index.commit()?;
        staged_metadata.commit()?;

        self.registry.register(RegisteredDocument {
            record: record.clone(),
            index: Arc::new(index),
            content: document.text,
        });

        tracing::info!(
            document = document_name,
            chunks = record.chunk_count,
            "document indexed"
        );
        Ok(record)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Retrieval
    // ═══════════════════════════════════════════════════════════════════

    /// Top-k chunks of `document_name` for `query`. `top_k` defaults to
    /// `[retrieval].top_k`.
    pub async fn query(
        &self,
        document_name: &str,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<QueryResponse> {
        let document = self.registry.get(document_name)?;
        let k = top_k.unwrap_or(self.config.retrieval.top_k);
        let vector = embed_query(self.provider.as_ref(), query).await?;

        let results: Vec<QueryHit> = document
            .index
            .search(&vector, k)?
            .into_iter()
            .map(|n| QueryHit {
                chunk_id: n.chunk.sequence_index,
                similarity_score: similarity_from_distance(n.distance),
                content_preview: preview(&n.chunk.text, self.config.retrieval.preview_chars),
                full_content: n.chunk.text.clone(),
            })
            .collect();

        tracing::debug!(document = document_name, hits = results.len(), "query");
        Ok(QueryResponse {
            document_name: document_name.to_string(),
            query: query.to_string(),
            num_results: results.len(),
            results,
        })
    }

    /// Query several documents concurrently. Findings keep input order;
    /// a failing document gets an error entry.
    pub async fn batch_query(
        &self,
        document_names: &[String],
        query: &str,
        top_k: usize,
    ) -> BatchQueryReport {
        let concurrency = self.config.compliance.concurrency.max(1);
        let names = document_names.iter().cloned();
        let findings: IndexMap<String, BatchFinding> = stream::iter(names)
            .map(|name| async move {
                let finding = match self.query(&name, query, Some(top_k)).await {
                    Ok(response) => BatchFinding::Results(response),
                    Err(RagError::DocumentNotIndexed { .. }) => BatchFinding::Error {
                        error: "Document not indexed".to_string(),
                    },
                    Err(e) => BatchFinding::Error {
                        error: e.to_string(),
                    },
                };
                (name, finding)
            })
            .buffered(concurrency)
            .collect()
            .await;

        BatchQueryReport {
            query: query.to_string(),
            documents_queried: document_names.len(),
            results_per_document: top_k,
            findings,
        }
    }

    /// Run each query with top-k 3, keeping the successful responses.
    pub async fn rag_report(&self, document_name: &str, queries: &[String]) -> Result<RagReport> {
        self.registry.get(document_name)?;

        let mut query_results = Vec::with_capacity(queries.len());
        for q in queries {
            match self.query(document_name, q, Some(REPORT_TOP_K)).await {
                Ok(response) => query_results.push(response),
                Err(e) => tracing::warn!(document = document_name, query = %q, error = %e, "report query failed"),
            }
        }

        Ok(RagReport {
            document_name: document_name.to_string(),
            total_queries: queries.len(),
            query_results,
        })
    }

    // ═══════════════════════════════════════════════════════════════════
    // Registry management
    // ═══════════════════════════════════════════════════════════════════

    pub fn summary(&self, document_name: &str) -> Result<DocumentSummary> {
        let document = self.registry.get(document_name)?;
        Ok(DocumentSummary {
            document_name: document_name.to_string(),
            metadata: document.record.clone(),
            indexed: document.record.indexed,
            vector_store_chunks: document.index.len(),
        })
    }

    /// Tables found in `document_name`. Formats without table structure
    /// report none.
    pub fn tables(&self, document_name: &str) -> Result<TablesReport> {
        let document = self.registry.get(document_name)?;
        let tables = match document.record.source_metadata.get("tables") {
            Some(Value::Array(tables)) => tables.clone(),
            _ => Vec::new(),
        };
        Ok(TablesReport {
            document_name: document_name.to_string(),
            total_tables: tables.len(),
            tables,
        })
    }

    pub fn list(&self) -> DocumentList {
        let documents = self.registry.list();
        DocumentList {
            total_documents: documents.len(),
            documents,
        }
    }

    /// Load a persisted index artifact and register it as `document_name`.
    ///
    /// The stored metadata record is reused when one exists for this name;
    /// otherwise a record is synthesized from the artifact.
    pub async fn load_existing(&self, document_name: &str, store_path: &Path) -> Result<LoadOutcome> {
        validate_document_name(document_name)?;
        let rebuild = self.registry.lock_document(document_name).await;
        let loaded = self.load_artifact(document_name, store_path).await;
        self.registry.release_document(document_name, rebuild);
        loaded
    }

    async fn load_artifact(&self, document_name: &str, store_path: &Path) -> Result<LoadOutcome> {
        let stored = self.store.load(store_path).await?;
        self.check_compatible(&stored.index)?;

        let mut record = match self.store.read_metadata(document_name) {
            Ok(Some(record)) => record,
            Ok(None) => synthesize_record(document_name, &stored.index, &stored.content),
            Err(e) => {
                tracing::warn!(document = document_name, error = %e, "ignoring unreadable metadata");
                synthesize_record(document_name, &stored.index, &stored.content)
            }
        };
        record.document_name = document_name.to_string();
        record.chunk_count = stored.index.len();
        record.index_path = store_path.to_path_buf();
        record.indexed = true;

        let chunks_loaded = stored.index.len();
        self.registry.register(RegisteredDocument {
            record,
            index: Arc::new(stored.index),
            content: stored.content,
        });

        tracing::info!(document = document_name, path = %store_path.display(), "loaded index");
        Ok(LoadOutcome {
            success: true,
            document_name: document_name.to_string(),
            store_path: store_path.to_path_buf(),
            chunks_loaded,
        })
    }

    /// Re-register every document persisted under the storage root,
    /// oldest first. Returns how many were restored.
    pub async fn restore(&self) -> Result<usize> {
        let mut restored = 0;
        for record in self.store.list_metadata()? {
            let name = record.document_name.clone();
            let path = self.store.index_path(&name);
            let stored = match self.store.load(&path).await {
                Ok(stored) => stored,
                Err(e) => {
                    tracing::warn!(document = %name, error = %e, "skipping unrestorable index");
                    continue;
                }
            };
            if let Err(e) = self.check_compatible(&stored.index) {
                tracing::warn!(document = %name, error = %e, "skipping incompatible index");
                continue;
            }

            let mut record = record;
            record.chunk_count = stored.index.len();
            self.registry.register(RegisteredDocument {
                record,
                index: Arc::new(stored.index),
                content: stored.content,
            });
            restored += 1;
        }

        tracing::info!(documents = restored, "restored persisted indices");
        Ok(restored)
    }

    /// Forget `document_name` and remove its persisted artifacts.
    /// Deleting an unknown document succeeds.
    pub async fn delete(&self, document_name: &str) -> Result<DeleteOutcome> {
        validate_document_name(document_name)?;
        let rebuild = self.registry.lock_document(document_name).await;

        self.registry.remove(document_name);
        let removed = self.store.delete(document_name);
        self.registry.release_document(document_name, rebuild);
        removed?;

        Ok(DeleteOutcome {
            success: true,
            document_name: document_name.to_string(),
            message: format!("Index deleted for {}", document_name),
        })
    }

    /// Drop all in-memory state. Persisted artifacts are kept.
    pub fn shutdown(&self) {
        let count = self.registry.len();
        self.registry.clear();
        tracing::info!(documents = count, "retrieval service shut down");
    }

    fn check_compatible(&self, index: &VectorIndex) -> Result<()> {
        if index.dims() != self.provider.dims() {
            return Err(RagError::unsupported(format!(
                "index '{}' was built with {} ({} dims) but the active embedder is {} ({} dims)",
                index.document_name(),
                index.model(),
                index.dims(),
                self.provider.model_name(),
                self.provider.dims()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Retriever for RagService {
    async fn retrieve(&self, document_name: &str, text: &str, top_k: usize) -> Result<Vec<QueryHit>> {
        Ok(self.query(document_name, text, Some(top_k)).await?.results)
    }

    fn is_indexed(&self, document_name: &str) -> bool {
        self.registry.contains(document_name)
    }
}

fn synthesize_record(name: &str, index: &VectorIndex, content: &str) -> DocumentRecord {
    let file_path = index
        .entries()
        .first()
        .map(|e| e.chunk.source_file_path.clone())
        .unwrap_or_default();
    let path = Path::new(&file_path);

    DocumentRecord {
        document_name: name.to_string(),
        file_type: FileType::from_path(path).unwrap_or(FileType::Text),
        file_name: path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string(),
        file_path,
        chunk_count: index.len(),
        content_length: content.chars().count(),
        source_metadata: Default::default(),
        indexed: true,
        embedding_model: index.model().to_string(),
        index_path: PathBuf::new(),
        ingested_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> RagService {
        let mut config = Config::offline(dir.path());
        config.chunking.chunk_size = 80;
        config.chunking.chunk_overlap = 10;
        RagService::new(config).unwrap()
    }

    fn text_doc(text: &str) -> ExtractedDocument {
        ExtractedDocument {
            text: text.to_string(),
            file_type: FileType::Text,
            metadata: Default::default(),
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::offline(dir.path());
        config.embedding.dims = 0;
        let err = RagService::new(config).err().unwrap();
        assert!(matches!(err, RagError::UnsupportedInput(_)));

        let mut config = Config::offline(dir.path());
        config.compliance.top_k = 0;
        let err = RagService::new(config).err().unwrap();
        assert!(err.to_string().contains("compliance.top_k"));
    }

    #[tokio::test]
    async fn test_ingest_missing_file_reports_failure() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let outcome = svc.ingest(&dir.path().join("nope.txt"), None).await;
        assert!(!outcome.success);
        assert_eq!(outcome.document_name, "nope");
        assert!(outcome.error.unwrap().contains("File not found"));
    }

    #[tokio::test]
    async fn test_ingest_rejects_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"\x00\x01").unwrap();
        let outcome = svc.ingest(&path, Some("data")).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("Unsupported file type"));
    }

    #[tokio::test]
    async fn test_ingest_rejects_oversized_file() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::offline(dir.path());
        config.ingest.max_file_size_mb = 0;
        let svc = RagService::new(config).unwrap();
        let path = dir.path().join("big.txt");
        std::fs::write(&path, "some text").unwrap();
        let outcome = svc.ingest(&path, None).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("exceeds maximum allowed size"));
    }

    #[tokio::test]
    async fn test_query_preview_and_scores() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::offline(dir.path());
        config.retrieval.preview_chars = 10;
        let svc = RagService::new(config).unwrap();
        svc.ingest_extracted(
            "memo",
            Path::new("memo.txt"),
            text_doc("Quarterly revenue grew by twelve percent."),
        )
        .await
        .unwrap();

        let response = svc
            .query("memo", "Quarterly revenue grew by twelve percent.", Some(5))
            .await
            .unwrap();
        assert_eq!(response.num_results, 1);
        let hit = &response.results[0];
        assert_eq!(hit.chunk_id, 0);
        assert!((hit.similarity_score - 1.0).abs() < 1e-5);
        assert_eq!(hit.content_preview, "Quarterly ...");
        assert_eq!(hit.full_content, "Quarterly revenue grew by twelve percent.");
    }

    #[tokio::test]
    async fn test_query_unknown_document() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let err = svc.query("ghost", "anything", None).await.unwrap_err();
        assert!(matches!(err, RagError::DocumentNotIndexed { .. }));
    }

    #[tokio::test]
    async fn test_batch_query_keeps_order_and_reports_missing() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        for name in ["b", "a"] {
            svc.ingest_extracted(name, Path::new("x.txt"), text_doc("shared words here"))
                .await
                .unwrap();
        }

        let names = vec!["b".to_string(), "missing".to_string(), "a".to_string()];
        let report = svc.batch_query(&names, "shared words", 3).await;
        let keys: Vec<&String> = report.findings.keys().collect();
        assert_eq!(keys, vec!["b", "missing", "a"]);
        assert!(matches!(report.findings["missing"], BatchFinding::Error { .. }));
        assert!(matches!(report.findings["a"], BatchFinding::Results(_)));
    }

    #[tokio::test]
    async fn test_reingest_replaces_index() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        svc.ingest_extracted("doc", Path::new("v1.txt"), text_doc("first version"))
            .await
            .unwrap();
        svc.ingest_extracted("doc", Path::new("v2.txt"), text_doc("second version entirely"))
            .await
            .unwrap();

        let summary = svc.summary("doc").unwrap();
        assert_eq!(summary.metadata.file_name, "v2.txt");
        let response = svc.query("doc", "second", Some(1)).await.unwrap();
        assert_eq!(response.results[0].full_content, "second version entirely");
        assert_eq!(svc.list().total_documents, 1);
    }

    #[tokio::test]
    async fn test_restore_after_restart() {
        let dir = TempDir::new().unwrap();
        {
            let svc = service(&dir);
            svc.ingest_extracted("one", Path::new("one.txt"), text_doc("alpha beta"))
                .await
                .unwrap();
            svc.ingest_extracted("two", Path::new("two.txt"), text_doc("gamma delta"))
                .await
                .unwrap();
            svc.shutdown();
            assert!(svc.registry().is_empty());
        }

        let svc = service(&dir);
        assert_eq!(svc.restore().await.unwrap(), 2);
        assert_eq!(svc.registry().names(), vec!["one", "two"]);
        let hits = svc.query("two", "gamma delta", Some(1)).await.unwrap();
        assert_eq!(hits.results[0].full_content, "gamma delta");
    }

    #[tokio::test]
    async fn test_load_existing_under_new_name() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let record = svc
            .ingest_extracted("orig", Path::new("orig.txt"), text_doc("load me please"))
            .await
            .unwrap();

        let outcome = svc.load_existing("copy", &record.index_path).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.chunks_loaded, 1);
        let summary = svc.summary("copy").unwrap();
        assert_eq!(summary.metadata.file_name, "orig.txt");
        assert_eq!(summary.vector_store_chunks, 1);

        let err = svc
            .load_existing("none", &dir.path().join("missing.sqlite"))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_then_query_fails() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        svc.ingest_extracted("doc", Path::new("doc.txt"), text_doc("to be removed"))
            .await
            .unwrap();

        assert!(svc.delete("doc").await.unwrap().success);
        assert!(!svc.store().index_path("doc").exists());
        let err = svc.query("doc", "removed", None).await.unwrap_err();
        assert!(matches!(err, RagError::DocumentNotIndexed { .. }));
        assert!(svc.delete("doc").await.unwrap().success);
        assert_eq!(svc.registry().rebuild_lock_count(), 0);
    }

    #[tokio::test]
    async fn test_tables_come_from_extraction_metadata() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let mut sheet = text_doc("Item | Price\nPump | 120\n");
        sheet.file_type = FileType::Excel;
        sheet.metadata.insert(
            "tables".into(),
            serde_json::json!([{ "sheet": "Prices", "data": [["Item", "Price"], ["Pump", "120"]] }]),
        );
        svc.ingest_extracted("prices", Path::new("prices.xlsx"), sheet)
            .await
            .unwrap();
        svc.ingest_extracted("memo", Path::new("memo.txt"), text_doc("no tables here"))
            .await
            .unwrap();

        let report = svc.tables("prices").unwrap();
        assert_eq!(report.total_tables, 1);
        assert_eq!(report.tables[0]["sheet"], "Prices");
        assert_eq!(report.tables[0]["data"][1][0], "Pump");
        assert_eq!(svc.tables("memo").unwrap().total_tables, 0);

        svc.shutdown();
        svc.restore().await.unwrap();
        assert_eq!(svc.tables("prices").unwrap().total_tables, 1);
        assert!(matches!(
            svc.tables("ghost").unwrap_err(),
            RagError::DocumentNotIndexed { .. }
        ));
    }

    #[tokio::test]
    async fn test_rebuild_locks_do_not_accumulate() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        for i in 0..20 {
            let name = format!("doc{}", i);
            svc.ingest_extracted(&name, Path::new("x.txt"), text_doc("short lived"))
                .await
                .unwrap();
            svc.delete(&name).await.unwrap();
        }
        assert_eq!(svc.registry().rebuild_lock_count(), 0);
        assert!(svc.registry().is_empty());
    }

    #[tokio::test]
    async fn test_failed_metadata_write_keeps_previous_index() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        svc.ingest_extracted("memo", Path::new("v1.txt"), text_doc("original memo body"))
            .await
            .unwrap();

        // A directory squatting on the temp path makes the metadata write fail.
        let blocker = svc.store().metadata_path("memo").with_extension("json.tmp");
        std::fs::create_dir(&blocker).unwrap();
        let body = "replacement memo body";
        assert!(svc
            .ingest_extracted("memo", Path::new("v2.txt"), text_doc(body))
            .await
            .is_err());
        std::fs::remove_dir(&blocker).unwrap();

        let stored = svc.store().load(&svc.store().index_path("memo")).await.unwrap();
        assert_eq!(stored.content, "original memo body");
        assert_eq!(stored.index.len(), 1);
        assert!(!svc
            .store()
            .index_path("memo")
            .with_extension("sqlite.tmp")
            .exists());
        assert_eq!(svc.summary("memo").unwrap().metadata.file_name, "v1.txt");

        svc.shutdown();
        assert_eq!(svc.restore().await.unwrap(), 1);
        let hits = svc.query("memo", "original memo body", Some(1)).await.unwrap();
        assert_eq!(hits.results[0].full_content, "original memo body");
    }

    #[tokio::test]
    async fn test_rag_report_collects_successes() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        svc.ingest_extracted("doc", Path::new("doc.txt"), text_doc("termination clause"))
            .await
            .unwrap();
        let queries = vec!["termination".to_string(), "clause".to_string()];
        let report = svc.rag_report("doc", &queries).await.unwrap();
        assert_eq!(report.total_queries, 2);
        assert_eq!(report.query_results.len(), 2);
        assert!(svc.rag_report("ghost", &queries).await.is_err());
    }
}
