//! Core data models for the retrieval pipeline.
//!
//! These types flow from extraction through chunking and indexing to the
//! query responses handed back to callers. Compliance types live in
//! [`crate::compliance`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RagError;

/// Source format tag supplied by the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Excel,
    Word,
    Image,
    Text,
}

impl FileType {
    /// Detect the file type from the path's extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self, RagError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "pdf" => Ok(FileType::Pdf),
            "xlsx" | "xls" => Ok(FileType::Excel),
            "docx" | "doc" => Ok(FileType::Word),
            "png" | "jpg" | "jpeg" | "bmp" | "gif" | "tiff" => Ok(FileType::Image),
            "txt" | "md" => Ok(FileType::Text),
            _ => Err(RagError::unsupported(format!(
                "Unsupported file type: .{}",
                ext
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Excel => "excel",
            FileType::Word => "word",
            FileType::Image => "image",
            FileType::Text => "text",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pdf" => Ok(FileType::Pdf),
            "excel" => Ok(FileType::Excel),
            "word" => Ok(FileType::Word),
            "image" => Ok(FileType::Image),
            "text" => Ok(FileType::Text),
            other => Err(RagError::unsupported(format!("Unknown file type: {}", other))),
        }
    }
}

/// Normalized text handed to the core by an extractor.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub text: String,
    pub file_type: FileType,
    /// Format-specific metadata; opaque to the core.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// A bounded contiguous slice of a document's normalized text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub document_name: String,
    /// 0-based, contiguous within a document.
    pub sequence_index: usize,
    pub text: String,
    pub source_file_path: String,
    /// Character offset of `text` within the normalized document text.
    pub start: usize,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// Registry entry describing one ingested document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_name: String,
    pub file_type: FileType,
    pub file_path: String,
    pub file_name: String,
    pub chunk_count: usize,
    /// Length of the normalized text in characters.
    pub content_length: usize,
    #[serde(default)]
    pub source_metadata: serde_json::Map<String, serde_json::Value>,
    pub indexed: bool,
    pub embedding_model: String,
    pub index_path: PathBuf,
    pub ingested_at: DateTime<Utc>,
}

/// One ranked chunk in a query response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    pub chunk_id: usize,
    /// `1 - distance`; 1.0 means identical.
    pub similarity_score: f32,
    /// `full_content` truncated to the configured preview length.
    pub content_preview: String,
    pub full_content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub document_name: String,
    pub query: String,
    pub num_results: usize,
    pub results: Vec<QueryHit>,
}

/// Truncate `text` to at most `max_chars` characters, appending `...` when
/// anything was cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_file_type() {
        assert_eq!(FileType::from_path(Path::new("a/b.PDF")).unwrap(), FileType::Pdf);
        assert_eq!(FileType::from_path(Path::new("sheet.xls")).unwrap(), FileType::Excel);
        assert_eq!(FileType::from_path(Path::new("memo.docx")).unwrap(), FileType::Word);
        assert_eq!(FileType::from_path(Path::new("scan.jpeg")).unwrap(), FileType::Image);
        assert_eq!(FileType::from_path(Path::new("notes.md")).unwrap(), FileType::Text);
    }

    #[test]
    fn test_unknown_extension_unsupported() {
        let err = FileType::from_path(Path::new("archive.tar")).unwrap_err();
        assert!(matches!(err, RagError::UnsupportedInput(_)));
        assert!(FileType::from_path(Path::new("no_extension")).is_err());
    }

    #[test]
    fn test_file_type_label_round_trips_through_serde() {
        let json = serde_json::to_string(&FileType::Excel).unwrap();
        assert_eq!(json, "\"excel\"");
        assert_eq!("excel".parse::<FileType>().unwrap(), FileType::Excel);
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("short", 300), "short");
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("héllo wörld", 4), "héll...");
        assert_eq!(preview("exact", 5), "exact");
    }
}
