//! Per-document vector index.
//!
//! A [`VectorIndex`] holds every chunk of one document alongside its
//! embedding. Search is an exact linear scan with cosine distance, which is
//! plenty for the few thousand chunks a single document produces.
//!
//! Distance is `1 - cosine_similarity`. Callers that report scores go
//! through [`similarity_from_distance`] so every consumer sees the same
//! scale.

use crate::embedding::{cosine_similarity, embed_batch, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::models::Chunk;

#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// One search hit, borrowed from the index.
#[derive(Debug, Clone, Copy)]
pub struct Neighbor<'a> {
    pub chunk: &'a Chunk,
    pub distance: f32,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    document_name: String,
    model: String,
    dims: usize,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Assemble an index from already-embedded entries.
    ///
    /// Entries are ordered by `sequence_index`; every vector must have
    /// `dims` components.
    pub fn from_entries(
        document_name: impl Into<String>,
        model: impl Into<String>,
        dims: usize,
        mut entries: Vec<IndexEntry>,
    ) -> Result<Self> {
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != dims) {
            return Err(RagError::internal(format!(
                "chunk {} has a {}-dim vector, index expects {}",
                bad.chunk.sequence_index,
                bad.vector.len(),
                dims
            )));
        }
        entries.sort_by_key(|e| e.chunk.sequence_index);
        Ok(Self {
            document_name: document_name.into(),
            model: model.into(),
            dims,
            entries,
        })
    }

    /// Embed `chunks` in batches of `batch_size` and build the index.
    pub async fn build(
        document_name: &str,
        chunks: Vec<Chunk>,
        provider: &dyn EmbeddingProvider,
        batch_size: usize,
    ) -> Result<Self> {
        let batch_size = batch_size.max(1);
        let mut entries = Vec::with_capacity(chunks.len());
        let mut chunks = chunks.into_iter().peekable();

        while chunks.peek().is_some() {
            let batch: Vec<Chunk> = chunks.by_ref().take(batch_size).collect();
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = embed_batch(provider, &texts).await?;
            entries.extend(
                batch
                    .into_iter()
                    .zip(vectors)
                    .map(|(chunk, vector)| IndexEntry { chunk, vector }),
            );
        }

        tracing::debug!(
            document = document_name,
            chunks = entries.len(),
            model = provider.model_name(),
            "built vector index"
        );

        Self::from_entries(document_name, provider.model_name(), provider.dims(), entries)
    }

    /// Nearest `k` chunks to `query`, nearest first. Equal distances keep
    /// chunk order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor<'_>>> {
        if query.len() != self.dims {
            return Err(RagError::internal(format!(
                "query vector has {} dims, index '{}' expects {}",
                query.len(),
                self.document_name,
                self.dims
            )));
        }

        let mut scored: Vec<Neighbor<'_>> = self
            .entries
            .iter()
            .map(|e| Neighbor {
                chunk: &e.chunk,
                distance: 1.0 - cosine_similarity(query, &e.vector),
            })
            .collect();

        scored.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.chunk.sequence_index.cmp(&b.chunk.sequence_index))
        });
        scored.truncate(k);
        Ok(scored)
    }

    pub fn document_name(&self) -> &str {
        &self.document_name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }
}

/// Convert a search distance into the similarity score shown to callers.
pub fn similarity_from_distance(distance: f32) -> f32 {
    1.0 - distance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::TextChunker;
    use crate::embedding::{embed_query, HashProvider};

    fn chunk(i: usize, text: &str) -> Chunk {
        Chunk {
            document_name: "doc".to_string(),
            sequence_index: i,
            text: text.to_string(),
            source_file_path: "doc.txt".to_string(),
            start: 0,
            hash: String::new(),
        }
    }

    fn entry(i: usize, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            chunk: chunk(i, &format!("chunk {}", i)),
            vector,
        }
    }

    #[test]
    fn test_search_orders_by_distance() {
        let index = VectorIndex::from_entries(
            "doc",
            "test",
            2,
            vec![
                entry(0, vec![0.0, 1.0]),
                entry(1, vec![1.0, 0.0]),
                entry(2, vec![1.0, 1.0]),
            ],
        )
        .unwrap();

        let hits = index.search(&[1.0, 0.0], 3).unwrap();
        let order: Vec<usize> = hits.iter().map(|h| h.chunk.sequence_index).collect();
        assert_eq!(order, vec![1, 2, 0]);
        assert!(hits[0].distance.abs() < 1e-6);
        assert!((similarity_from_distance(hits[0].distance) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_ties_break_by_sequence_index() {
        let index = VectorIndex::from_entries(
            "doc",
            "test",
            2,
            vec![
                entry(2, vec![1.0, 0.0]),
                entry(0, vec![2.0, 0.0]),
                entry(1, vec![3.0, 0.0]),
            ],
        )
        .unwrap();

        let hits = index.search(&[1.0, 0.0], 2).unwrap();
        let order: Vec<usize> = hits.iter().map(|h| h.chunk.sequence_index).collect();
        assert_eq!(order, vec![0, 1]);
    }

    #[test]
    fn test_k_larger_than_index() {
        let index =
            VectorIndex::from_entries("doc", "test", 2, vec![entry(0, vec![1.0, 0.0])]).unwrap();
        assert_eq!(index.search(&[0.5, 0.5], 10).unwrap().len(), 1);
        assert!(index.search(&[0.5, 0.5], 0).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch() {
        let index =
            VectorIndex::from_entries("doc", "test", 2, vec![entry(0, vec![1.0, 0.0])]).unwrap();
        let err = index.search(&[1.0, 0.0, 0.0], 1).unwrap_err();
        assert!(matches!(err, RagError::Internal(_)));

        assert!(VectorIndex::from_entries("doc", "test", 3, vec![entry(0, vec![1.0])]).is_err());
    }

    #[tokio::test]
    async fn test_self_retrieval() {
        let text = "The supplier shall deliver goods within ten business days.\n\n\
                    Payment is due net thirty days after invoice.\n\n\
                    Warranty covers manufacturing defects for two years.\n\n\
                    Either party may terminate with ninety days written notice.";
        let chunker = TextChunker::new(70, 10).unwrap();
        let chunks = chunker.chunk_document("contract", "contract.txt", text);
        let provider = HashProvider::new(256).unwrap();
        let index = VectorIndex::build("contract", chunks.clone(), &provider, 2)
            .await
            .unwrap();
        assert_eq!(index.len(), chunks.len());

        for c in &chunks {
            let q = embed_query(&provider, &c.text).await.unwrap();
            let hits = index.search(&q, 1).unwrap();
            assert_eq!(hits[0].chunk.text, c.text);
        }
    }

    #[tokio::test]
    async fn test_self_retrieval_with_permuted_chunks() {
        let chunker = TextChunker::new(12, 0).unwrap();
        let chunks = chunker.chunk_document("doc", "doc.txt", "alpha beta\n\nbeta alpha");
        assert_eq!(chunks.len(), 2);
        let provider = HashProvider::new(256).unwrap();
        let index = VectorIndex::build("doc", chunks.clone(), &provider, 8)
            .await
            .unwrap();

        for c in &chunks {
            let q = embed_query(&provider, &c.text).await.unwrap();
            let hits = index.search(&q, 1).unwrap();
            assert_eq!(hits[0].chunk.sequence_index, c.sequence_index);
        }
    }
}
