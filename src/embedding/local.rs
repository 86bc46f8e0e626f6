//! fastembed-backed local embedding provider.
//!
//! Models download from Hugging Face on first use and are cached by
//! fastembed. The ONNX session is created lazily, once per provider, and
//! shared across calls; inference runs on tokio's blocking pool.

use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;
use tokio::sync::OnceCell;

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};

pub struct LocalProvider {
    model_name: String,
    dims: usize,
    batch_size: usize,
    kind: EmbeddingModel,
    model: OnceCell<Arc<Mutex<TextEmbedding>>>,
}

impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let kind = config_to_fastembed_model(&config.model)?;
        Ok(Self {
            model_name: config.model.clone(),
            dims: config.dims,
            batch_size: config.batch_size,
            kind,
            model: OnceCell::new(),
        })
    }

    async fn session(&self) -> Result<Arc<Mutex<TextEmbedding>>> {
        let session = self
            .model
            .get_or_try_init(|| {
                let kind = self.kind.clone();
                let name = self.model_name.clone();
                async move {
                    tracing::info!(model = %name, "loading local embedding model");
                    tokio::task::spawn_blocking(move || {
                        TextEmbedding::try_new(
                            InitOptions::new(kind).with_show_download_progress(false),
                        )
                        .map(|m| Arc::new(Mutex::new(m)))
                        .map_err(|e| {
                            RagError::ModelUnavailable(format!(
                                "Failed to initialize local embedding model '{}': {}",
                                name, e
                            ))
                        })
                    })
                    .await
                    .map_err(|e| RagError::ModelUnavailable(e.to_string()))?
                }
            })
            .await?;
        Ok(session.clone())
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let session = self.session().await?;
        let texts = texts.to_vec();
        let batch_size = self.batch_size;

        tokio::task::spawn_blocking(move || {
            session
                .lock()
                .embed(texts, Some(batch_size))
                .map_err(|e| RagError::ModelUnavailable(format!("Local embedding failed: {}", e)))
        })
        .await
        .map_err(|e| RagError::ModelUnavailable(e.to_string()))?
    }
}

fn config_to_fastembed_model(name: &str) -> Result<EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        "nomic-embed-text-v1.5" => Ok(EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(EmbeddingModel::MultilingualE5Small),
        other => Err(RagError::unsupported(format!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, \
             nomic-embed-text-v1.5, multilingual-e5-small",
            other
        ))),
    }
}
