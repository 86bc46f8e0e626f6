//! Recursive-boundary text chunker with overlap.
//!
//! Splits normalized document text into [`Chunk`]s of at most `chunk_size`
//! characters. Inside each window the split point prefers a paragraph
//! break (`\n\n`), then a line break, then a space, and only falls back to a
//! hard character cut when the window contains none of them.
//!
//! Consecutive chunks share the last `chunk_overlap` characters of the
//! earlier chunk, so the chunks cover the text with no gaps and context
//! carries across each split. All sizes are measured in characters, never
//! bytes.

use std::iter;

use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};
use crate::models::Chunk;

/// Split boundaries in preference order. All ASCII, so a match always ends
/// on a char boundary.
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::unsupported("chunk size must be > 0"));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::unsupported(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Iterate over `(start_char, segment)` pairs for `text`.
    pub fn split<'a>(&self, text: &'a str) -> Splits<'a> {
        let bounds = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(iter::once(text.len()))
            .collect();
        Splits {
            text,
            bounds,
            start: 0,
            size: self.chunk_size,
            overlap: self.chunk_overlap,
            done: false,
        }
    }

    /// Chunk a document's text. Returns chunks with contiguous indices
    /// starting at 0; empty text yields no chunks.
    pub fn chunk_document(
        &self,
        document_name: &str,
        source_file_path: &str,
        text: &str,
    ) -> Vec<Chunk> {
        self.split(text)
            .enumerate()
            .map(|(index, (start, piece))| Chunk {
                document_name: document_name.to_string(),
                sequence_index: index,
                text: piece.to_string(),
                source_file_path: source_file_path.to_string(),
                start,
                hash: hash_text(piece),
            })
            .collect()
    }
}

/// Single-pass iterator over the segments of one text.
pub struct Splits<'a> {
    text: &'a str,
    /// Byte offset of every char, followed by `text.len()`.
    bounds: Vec<usize>,
    /// Char index where the next segment begins.
    start: usize,
    size: usize,
    overlap: usize,
    done: bool,
}

impl Splits<'_> {
    fn char_len(&self) -> usize {
        self.bounds.len() - 1
    }

    /// Pick the end (exclusive char index) of the segment starting at
    /// `start`. The cut must land past `start + overlap` so the next
    /// segment always advances.
    fn find_cut(&self, start: usize, window_end: usize) -> usize {
        let min_cut = start + self.overlap + 1;
        let window_start_byte = self.bounds[start];
        let window = &self.text[window_start_byte..self.bounds[window_end]];

        for sep in SEPARATORS {
            let Some(pos) = window.rfind(sep) else {
                continue;
            };
            let end_byte = window_start_byte + pos + sep.len();
            if let Ok(cut) = self.bounds.binary_search(&end_byte) {
                // rfind found the last occurrence; earlier ones are no better.
                if cut >= min_cut {
                    return cut;
                }
            }
        }

        window_end
    }
}

impl<'a> Iterator for Splits<'a> {
    type Item = (usize, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        let total = self.char_len();
        if self.done || self.start >= total {
            return None;
        }

        let start = self.start;
        let window_end = (start + self.size).min(total);
        if window_end == total {
            self.done = true;
            return Some((start, &self.text[self.bounds[start]..]));
        }

        let cut = self.find_cut(start, window_end);
        self.start = cut - self.overlap;
        Some((start, &self.text[self.bounds[start]..self.bounds[cut]]))
    }
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
