//! Error taxonomy shared by the retrieval pipeline and the compliance engine.
//!
//! Library entry points return [`RagError`]. Every variant maps onto one of
//! the coarse [`ErrorKind`] categories, which the tool server uses to pick
//! an HTTP status and the CLI uses for its exit message.
//!
//! | Kind | Variants |
//! |------|----------|
//! | `NotFound` | [`RagError::FileNotFound`], [`RagError::DocumentNotIndexed`] |
//! | `UnsupportedInput` | [`RagError::UnsupportedInput`] |
//! | `ModelUnavailable` | [`RagError::ModelUnavailable`] |
//! | `Cancelled` | [`RagError::Cancelled`] |
//! | `Internal` | [`RagError::Internal`], I/O, database, JSON |

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T, E = RagError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The document name is absent from the registry.
    #[error("Document '{name}' is not indexed. Available documents: {available:?}")]
    DocumentNotIndexed {
        name: String,
        available: Vec<String>,
    },

    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),

    /// The embedding backend could not be loaded or failed to answer.
    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Comparison cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index storage error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    UnsupportedInput,
    ModelUnavailable,
    Cancelled,
    Internal,
}

impl RagError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::FileNotFound(_) | RagError::DocumentNotIndexed { .. } => ErrorKind::NotFound,
            RagError::UnsupportedInput(_) => ErrorKind::UnsupportedInput,
            RagError::ModelUnavailable(_) => ErrorKind::ModelUnavailable,
            RagError::Cancelled => ErrorKind::Cancelled,
            RagError::Internal(_)
            | RagError::Io(_)
            | RagError::Database(_)
            | RagError::Json(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code (used in tool server error bodies).
    pub fn code(&self) -> &'static str {
        match self {
            RagError::FileNotFound(_) => "not_found",
            RagError::DocumentNotIndexed { .. } => "document_not_indexed",
            RagError::UnsupportedInput(_) => "unsupported_input",
            RagError::ModelUnavailable(_) => "model_unavailable",
            RagError::Cancelled => "cancelled",
            _ => "internal",
        }
    }

    pub fn not_indexed(name: &str, available: Vec<String>) -> Self {
        RagError::DocumentNotIndexed {
            name: name.to_string(),
            available,
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        RagError::UnsupportedInput(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        RagError::Internal(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_indexed_is_not_found_kind() {
        let err = RagError::not_indexed("contract", vec!["other".to_string()]);
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.code(), "document_not_indexed");
        assert!(err.to_string().contains("'contract' is not indexed"));
        assert!(err.to_string().contains("other"));
    }

    #[test]
    fn test_wrapped_errors_are_internal() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err: RagError = io.into();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.code(), "internal");
    }
}
