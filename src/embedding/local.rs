/// Local embedding provider using fastembed
///
/// Provides offline embedding generation (all-MiniLM-L6-v2 by default).
/// No API key required; model weights are downloaded and cached locally.
/// All CPU-bound fastembed calls are wrapped in spawn_blocking to avoid blocking async runtime.

use async_trait::async_trait;
use fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::task;

use super::{EmbeddingError, EmbeddingProvider};

/// Local embedding provider backed by fastembed.
///
/// fastembed inference is synchronous, so the model lives behind a mutex and
/// every call runs on the blocking pool.
pub struct LocalEmbeddingProvider {
    model: Arc<Mutex<TextEmbedding>>,
    name: String,
}

/// Map a configured model name onto a fastembed model.
pub fn resolve_model(name: &str) -> Result<EmbeddingModel, EmbeddingError> {
    let short = name.rsplit('/').next().unwrap_or(name).to_ascii_lowercase();
    match short.as_str() {
        "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        "nomic-embed-text-v1.5" => Ok(EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(EmbeddingModel::MultilingualE5Small),
        other => Err(EmbeddingError::ModelInit(format!("Unsupported local embedding model: {}", other))),
    }
}

/// Model cache directory: the configured path, or `<platform cache>/ragfuse/models`.
pub fn cache_dir(configured: Option<&str>) -> PathBuf {
    match configured {
        Some(path) => PathBuf::from(path),
        None => dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("ragfuse")
            .join("models"),
    }
}

impl LocalEmbeddingProvider {
    /// Create a new LocalEmbeddingProvider, downloading model weights if not cached.
    ///
    /// # Arguments
    /// * `model_name` - Model identifier, e.g. "all-MiniLM-L6-v2" or "sentence-transformers/all-MiniLM-L6-v2"
    /// * `cache_dir` - Directory to cache model weights (fastembed downloads on first use)
    pub async fn new(model_name: &str, cache_dir: PathBuf) -> Result<Self, EmbeddingError> {
        let model_kind = resolve_model(model_name)?;

        let model = task::spawn_blocking(move || {
            std::fs::create_dir_all(&cache_dir)
                .map_err(|e| EmbeddingError::ModelInit(format!("Failed to create cache dir: {}", e)))?;
            TextEmbedding::try_new(TextInitOptions::new(model_kind).with_cache_dir(cache_dir))
                .map_err(|e| EmbeddingError::ModelInit(e.to_string()))
        })
        .await
        .map_err(|e| EmbeddingError::ModelInit(e.to_string()))??;

        tracing::info!(model = %model_name, "Local embedding model loaded");

        Ok(LocalEmbeddingProvider {
            model: Arc::new(Mutex::new(model)),
            name: model_name.to_string(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Generation("fastembed returned no embeddings".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| EmbeddingError::Generation("embedding model lock poisoned".to_string()))?;
            model
                .embed(texts, None)
                .map_err(|e| EmbeddingError::Generation(e.to_string()))
        })
        .await
        .map_err(|e| EmbeddingError::Generation(e.to_string()))?
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}
