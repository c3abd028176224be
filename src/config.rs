/// Configuration management using figment
///
/// Loads configuration with this precedence (highest wins):
/// 1. Defaults (hardcoded)
/// 2. TOML file: ragfuse.toml (in working directory)
/// 3. Environment variables: prefixed RAGFUSE_, nested with `__`
///    (e.g., RAGFUSE_RETRIEVAL__TOP_K=5, RAGFUSE_EMBEDDING__API_KEY=...)

use figment::{
    Figment,
    providers::{Env, Format, Toml, Serialized},
};
use serde::{Deserialize, Serialize};
use crate::errors::RetrievalError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional file path for log output (in addition to stderr)
    #[serde(default)]
    pub log_file: Option<String>,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub reranking: RerankingConfig,
}

/// Tunables for ranked retrieval, fusion and merging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidates fetched per backend, and the global merge bound
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Candidates kept after re-ranking
    #[serde(default = "default_top_k")]
    pub top_k_reranker: usize,
    /// Minimum re-ranking score; 0.0 disables the filter
    #[serde(default)]
    pub relevance_threshold: f32,
    #[serde(default)]
    pub hybrid_search: bool,
    /// Reissue a failed hybrid task as a plain dense search
    #[serde(default = "default_true")]
    pub hybrid_fallback: bool,
    #[serde(default = "default_half")]
    pub bm25_weight: f32,
    #[serde(default = "default_half")]
    pub vector_weight: f32,
    /// Rank-fusion smoothing constant
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,
    /// Upper bound on concurrently running (collection, query) tasks
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Merge polarity: true when higher scores are better
    #[serde(default = "default_true")]
    pub sort_descending: bool,
    /// Return whole collections instead of ranked passages
    #[serde(default)]
    pub full_context: bool,
    /// Read file content straight from the file store, skipping retrieval
    #[serde(default)]
    pub bypass_embedding_and_retrieval: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: "local" (fastembed, default), "openai" or "ollama"
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Base URL for remote providers; provider default when unset
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Texts per embedding request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Model weight cache for the local provider; platform cache dir when unset
    #[serde(default)]
    pub cache_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankingConfig {
    /// "none" (embedding similarity), "local" (fastembed cross-encoder) or "http"
    #[serde(default = "default_reranking_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Endpoint for the http provider
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_top_k() -> usize {
    3
}

fn default_true() -> bool {
    true
}

fn default_half() -> f32 {
    0.5
}

fn default_rrf_k() -> f32 {
    60.0
}

fn default_max_concurrency() -> usize {
    8
}

fn default_embedding_provider() -> String {
    "local".to_string()
}

fn default_embedding_model() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_batch_size() -> usize {
    32
}

fn default_reranking_provider() -> String {
    "none".to_string()
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        RetrievalConfig {
            top_k: default_top_k(),
            top_k_reranker: default_top_k(),
            relevance_threshold: 0.0,
            hybrid_search: false,
            hybrid_fallback: true,
            bm25_weight: default_half(),
            vector_weight: default_half(),
            rrf_k: default_rrf_k(),
            max_concurrency: default_max_concurrency(),
            sort_descending: true,
            full_context: false,
            bypass_embedding_and_retrieval: false,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            base_url: None,
            api_key: None,
            batch_size: default_batch_size(),
            cache_dir: None,
        }
    }
}

impl Default for RerankingConfig {
    fn default() -> Self {
        RerankingConfig {
            provider: default_reranking_provider(),
            model: None,
            url: None,
            api_key: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: default_log_level(),
            log_file: None,
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            reranking: RerankingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, TOML file, and environment variables
    ///
    /// Environment variables override TOML file values.
    /// Example: RAGFUSE_LOG_LEVEL=debug overrides log_level in ragfuse.toml
    pub fn load() -> Result<Config, RetrievalError> {
        Self::figment()
            .extract()
            .map_err(|e| RetrievalError::Config(format!("Failed to load config: {}", e)))
    }

    fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file("ragfuse.toml"))
            .merge(Env::prefixed("RAGFUSE_").split("__"))
    }
}

impl RetrievalConfig {
    /// Normalized (bm25, vector) fusion weights.
    ///
    /// Negative weights are clamped to zero; an all-zero pair falls back to 0.5/0.5.
    pub fn hybrid_weights(&self) -> (f32, f32) {
        let bm25 = self.bm25_weight.max(0.0);
        let vector = self.vector_weight.max(0.0);
        let total = bm25 + vector;
        if total <= f32::EPSILON {
            return (0.5, 0.5);
        }
        (bm25 / total, vector / total)
    }
}
