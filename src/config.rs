//! TOML configuration.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) yields a working configuration. [`load_config`] validates the
//! values that would otherwise fail deep inside the pipeline.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub compliance: ComplianceConfig,
    pub ingest: IngestConfig,
    pub server: ServerConfig,
}

/// Where index artifacts and metadata records live.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data"),
        }
    }
}

/// Chunk size and overlap, both in characters.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Default `top_k` for queries that do not specify one.
    pub top_k: usize,
    /// Maximum characters in a result's `content_preview`.
    pub preview_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            preview_chars: 300,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `local`, `hash`, or `ollama`.
    pub provider: String,
    pub model: String,
    pub dims: usize,
    pub batch_size: usize,
    /// Base URL for the `ollama` provider.
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            model: "all-minilm-l6-v2".to_string(),
            dims: 384,
            batch_size: 64,
            url: "http://localhost:11434".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ComplianceConfig {
    /// Similarity at or above which a requirement is compliant.
    pub threshold: f32,
    pub top_k: usize,
    pub evidence_count: usize,
    pub evidence_chars: usize,
    /// Requirements checked concurrently within one comparison.
    pub concurrency: usize,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            top_k: 5,
            evidence_count: 3,
            evidence_chars: 100,
            concurrency: 4,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestConfig {
    pub max_file_size_mb: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7331".to_string(),
        }
    }
}

impl Config {
    /// Default configuration rooted at `root`, using the offline `hash`
    /// embedder. Handy for tests and scratch runs.
    pub fn offline(root: impl Into<PathBuf>) -> Self {
        let mut config = Config::default();
        config.storage.root = root.into();
        config.embedding.provider = "hash".to_string();
        config.embedding.model = "feature-hash".to_string();
        config.embedding.dims = 256;
        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }

        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be >= 1");
        }

        if !(0.0..=1.0).contains(&self.compliance.threshold) {
            bail!("compliance.threshold must be in [0.0, 1.0]");
        }
        if self.compliance.top_k == 0 {
            bail!("compliance.top_k must be >= 1");
        }
        if self.compliance.concurrency == 0 {
            bail!("compliance.concurrency must be >= 1");
        }

        if self.embedding.dims == 0 {
            bail!("embedding.dims must be > 0");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        match self.embedding.provider.as_str() {
            "local" | "hash" | "ollama" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be local, hash, or ollama.",
                other
            ),
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.embedding.provider, "local");
        assert!((config.compliance.threshold - 0.7).abs() < f32::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str("[chunking]\nchunk_size = 400\n").unwrap();
        assert_eq!(config.chunking.chunk_size, 400);
        assert_eq!(config.chunking.chunk_overlap, 200);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let config: Config =
            toml::from_str("[chunking]\nchunk_size = 100\nchunk_overlap = 100\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let config: Config = toml::from_str("[compliance]\nthreshold = 1.5\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config: Config = toml::from_str("[embedding]\nprovider = \"magic\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_config_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ragc.toml");
        std::fs::write(&path, "[storage]\nroot = \"/tmp/ragc\"\n[embedding]\nprovider = \"hash\"\n")
            .unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.storage.root, PathBuf::from("/tmp/ragc"));
        assert_eq!(config.embedding.provider, "hash");
    }
}
