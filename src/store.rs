//! On-disk layout for index artifacts and metadata records.
//!
//! ```text
//! <root>/
//!   vector_stores/<name>.sqlite      one SQLite index artifact per document
//!   metadata/<name>_metadata.json    one DocumentRecord per document
//! ```
//!
//! Both files are written to a temporary sibling and renamed into place,
//! so a reader never sees a half-written artifact. [`StagedFile`] exposes
//! the two halves separately so an ingest can stage the artifact and its
//! metadata before either replaces what is on disk.

use std::path::{Path, PathBuf};

use crate::db;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::{RagError, Result};
use crate::index::{IndexEntry, VectorIndex};
use crate::migrate;
use crate::models::{Chunk, DocumentRecord};

const VECTOR_DIR: &str = "vector_stores";
const METADATA_DIR: &str = "metadata";
const MAX_NAME_CHARS: usize = 200;

/// A persisted index plus the raw document text stored with it.
#[derive(Debug)]
pub struct StoredIndex {
    pub index: VectorIndex,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
}

impl IndexStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_path(&self, name: &str) -> PathBuf {
        self.root.join(VECTOR_DIR).join(format!("{}.sqlite", name))
    }

    pub fn metadata_path(&self, name: &str) -> PathBuf {
        self.root
            .join(METADATA_DIR)
            .join(format!("{}_metadata.json", name))
    }

    /// Write `index` to its artifact path, replacing any previous artifact.
    pub async fn persist(&self, index: &VectorIndex, content: &str) -> Result<PathBuf> {
        self.stage_index(index, content).await?.commit()
    }

    /// Write `index` next to its artifact path without replacing the
    /// current artifact.
    pub async fn stage_index(&self, index: &VectorIndex, content: &str) -> Result<StagedFile> {
        let name = index.document_name();
        validate_document_name(name)?;

        let final_path = self.index_path(name);
        let tmp_path = final_path.with_extension("sqlite.tmp");
        remove_if_exists(&tmp_path)?;
        let staged = StagedFile::new(tmp_path.clone(), final_path);

        let pool = db::connect(&tmp_path, true).await?;
        migrate::run_migrations(&pool).await?;

        let mut tx = pool.begin().await?;
        for (key, value) in [
            ("document_name", name.to_string()),
            ("model", index.model().to_string()),
            ("dims", index.dims().to_string()),
            ("content", content.to_string()),
        ] {
            sqlx::query("INSERT INTO index_info (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }

        for entry in index.entries() {
            let c = &entry.chunk;
            sqlx::query(
                "INSERT INTO chunks (chunk_index, document_name, text, source_file_path, start_char, hash, embedding) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(c.sequence_index as i64)
            .bind(&c.document_name)
            .bind(&c.text)
            .bind(&c.source_file_path)
            .bind(c.start as i64)
            .bind(&c.hash)
            .bind(vec_to_blob(&entry.vector))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        pool.close().await;

        tracing::debug!(
            document = name,
            chunks = index.len(),
            path = %staged.target().display(),
            "staged index"
        );
        Ok(staged)
    }

    /// Load an index artifact.
    pub async fn load(&self, path: &Path) -> Result<StoredIndex> {
        if !path.is_file() {
            return Err(RagError::FileNotFound(path.to_path_buf()));
        }

        let pool = db::connect(path, false).await?;
        let info: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM index_info")
                .fetch_all(&pool)
                .await?;
        let lookup = |key: &str| {
            info.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| {
                    RagError::internal(format!(
                        "index artifact {} is missing '{}'",
                        path.display(),
                        key
                    ))
                })
        };

        let document_name = lookup("document_name")?;
        let model = lookup("model")?;
        let dims: usize = lookup("dims")?
            .parse()
            .map_err(|_| RagError::internal(format!("bad dims in {}", path.display())))?;
        let content = lookup("content")?;

        let rows: Vec<(i64, String, String, String, i64, String, Vec<u8>)> = sqlx::query_as(
            "SELECT chunk_index, document_name, text, source_file_path, start_char, hash, embedding \
             FROM chunks ORDER BY chunk_index",
        )
        .fetch_all(&pool)
        .await?;
        pool.close().await;

        let entries = rows
            .into_iter()
            .map(
                |(idx, doc, text, source, start, hash, blob)| IndexEntry {
                    chunk: Chunk {
                        document_name: doc,
                        sequence_index: idx as usize,
                        text,
                        source_file_path: source,
                        start: start as usize,
                        hash,
                    },
                    vector: blob_to_vec(&blob),
                },
            )
            .collect();

        let index = VectorIndex::from_entries(document_name, model, dims, entries)?;
        Ok(StoredIndex { index, content })
    }

    /// Remove the artifact and metadata for `name`. Returns whether
    /// anything was on disk.
    pub fn delete(&self, name: &str) -> Result<bool> {
        validate_document_name(name)?;
        let removed_index = remove_if_exists(&self.index_path(name))?;
        let removed_meta = remove_if_exists(&self.metadata_path(name))?;
        if removed_index || removed_meta {
            tracing::info!(document = name, "deleted persisted index");
        }
        Ok(removed_index || removed_meta)
    }

    pub fn write_metadata(&self, record: &DocumentRecord) -> Result<PathBuf> {
        self.stage_metadata(record)?.commit()
    }

    pub fn stage_metadata(&self, record: &DocumentRecord) -> Result<StagedFile> {
        validate_document_name(&record.document_name)?;
        let path = self.metadata_path(&record.document_name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        let staged = StagedFile::new(tmp.clone(), path);
        std::fs::write(&tmp, serde_json::to_vec_pretty(record)?)?;
        Ok(staged)
    }

    pub fn read_metadata(&self, name: &str) -> Result<Option<DocumentRecord>> {
        validate_document_name(name)?;
        let path = self.metadata_path(name);
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Every readable metadata record, oldest ingest first. Unparseable
    /// files are skipped.
    pub fn list_metadata(&self) -> Result<Vec<DocumentRecord>> {
        let dir = self.root.join(METADATA_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            let is_record = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with("_metadata.json"));
            if !is_record {
                continue;
            }
            match std::fs::read(&path)
                .map_err(RagError::from)
                .and_then(|b| serde_json::from_slice::<DocumentRecord>(&b).map_err(RagError::from))
            {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable metadata")
                }
            }
        }

        records.sort_by(|a, b| {
            a.ingested_at
                .cmp(&b.ingested_at)
                .then_with(|| a.document_name.cmp(&b.document_name))
        });
        Ok(records)
    }
}

/// A fully written temporary file waiting to be renamed over its target.
/// Dropping it uncommitted removes the temporary file.
#[derive(Debug)]
pub struct StagedFile {
    tmp: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedFile {
    fn new(tmp: PathBuf, target: PathBuf) -> Self {
        Self {
            tmp,
            target,
            committed: false,
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn commit(mut self) -> Result<PathBuf> {
        std::fs::rename(&self.tmp, &self.target)?;
        self.committed = true;
        tracing::debug!(path = %self.target.display(), "committed");
        Ok(self.target.clone())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.tmp);
        }
    }
}

/// Document names become file names, so they must be safe path components.
pub fn validate_document_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(RagError::unsupported("document name must not be empty"));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(RagError::unsupported(format!(
            "document name exceeds {} characters",
            MAX_NAME_CHARS
        )));
    }
    if name.contains(['/', '\\', '\0']) || name.contains("..") {
        return Err(RagError::unsupported(format!(
            "invalid document name: {:?}",
            name
        )));
    }
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
