/// Re-ranking capability: score (query, passage) pairs, higher = more relevant.
///
/// Three implementations:
/// - `EmbeddingSimilarityScorer`: cosine similarity of embeddings, the fallback
///   used when no re-ranking model is configured
/// - `LocalCrossEncoder`: fastembed cross-encoder, run on the blocking pool
/// - `HttpReranker`: a remote `/rerank` endpoint (Jina / Cohere / TEI shaped)

use async_trait::async_trait;
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::task;

use crate::embedding::{cosine_similarity, embed_in_batches, EmbeddingError, EmbeddingProvider};
use crate::errors::RetrievalError;

#[derive(Debug, Error)]
pub enum RerankError {
    #[error("Reranker initialization error: {0}")]
    ModelInit(String),

    #[error("Scoring error: {0}")]
    Scoring(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Reranker returned {got} scores for {expected} passages")]
    LengthMismatch { expected: usize, got: usize },

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

impl From<RerankError> for RetrievalError {
    fn from(e: RerankError) -> Self {
        RetrievalError::ScoringUnavailable(e.to_string())
    }
}

/// Core trait for second-pass relevance scoring.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// One score per passage, same order as the input, in a single batched call.
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>, RerankError>;

    fn model_name(&self) -> &str;
}

/// Cosine similarity between the query embedding and each passage embedding.
pub struct EmbeddingSimilarityScorer {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl EmbeddingSimilarityScorer {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        EmbeddingSimilarityScorer { provider, batch_size }
    }
}

#[async_trait]
impl Reranker for EmbeddingSimilarityScorer {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>, RerankError> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }
        let query_embedding = self.provider.embed(query).await?;
        let passage_embeddings = embed_in_batches(self.provider.as_ref(), passages, self.batch_size).await?;
        Ok(passage_embeddings
            .iter()
            .map(|p| cosine_similarity(&query_embedding, p))
            .collect())
    }

    fn model_name(&self) -> &str {
        self.provider.model_name()
    }
}

/// Map a configured cross-encoder name onto a fastembed reranker model.
pub fn resolve_reranker_model(name: &str) -> Result<RerankerModel, RerankError> {
    let short = name.rsplit('/').next().unwrap_or(name).to_ascii_lowercase();
    match short.as_str() {
        "bge-reranker-base" => Ok(RerankerModel::BGERerankerBase),
        "bge-reranker-v2-m3" => Ok(RerankerModel::BGERerankerV2M3),
        "jina-reranker-v1-turbo-en" => Ok(RerankerModel::JINARerankerV1TurboEn),
        other => Err(RerankError::ModelInit(format!("Unsupported local reranker model: {}", other))),
    }
}

/// Local cross-encoder backed by fastembed's `TextRerank`.
pub struct LocalCrossEncoder {
    model: Arc<Mutex<TextRerank>>,
    name: String,
}

impl LocalCrossEncoder {
    pub async fn new(model_name: &str, cache_dir: PathBuf) -> Result<Self, RerankError> {
        let kind = resolve_reranker_model(model_name)?;
        let model = task::spawn_blocking(move || {
            std::fs::create_dir_all(&cache_dir)
                .map_err(|e| RerankError::ModelInit(format!("Failed to create cache dir: {}", e)))?;
            TextRerank::try_new(RerankInitOptions::new(kind).with_cache_dir(cache_dir))
                .map_err(|e| RerankError::ModelInit(e.to_string()))
        })
        .await
        .map_err(|e| RerankError::ModelInit(e.to_string()))??;

        tracing::info!(model = %model_name, "Local reranker loaded");
        Ok(LocalCrossEncoder {
            model: Arc::new(Mutex::new(model)),
            name: model_name.to_string(),
        })
    }
}

#[async_trait]
impl Reranker for LocalCrossEncoder {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>, RerankError> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }
        let model = Arc::clone(&self.model);
        let query = query.to_string();
        let passages = passages.to_vec();
        let expected = passages.len();

        let results = task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| RerankError::Scoring("reranker lock poisoned".to_string()))?;
            let documents: Vec<&str> = passages.iter().map(String::as_str).collect();
            model
                .rerank(query.as_str(), documents, false, None)
                .map_err(|e| RerankError::Scoring(e.to_string()))
        })
        .await
        .map_err(|e| RerankError::Scoring(e.to_string()))??;

        // fastembed returns results sorted by score; restore input order
        scores_by_index(expected, results.iter().map(|r| (r.index, r.score)))
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

#[derive(Serialize)]
struct HttpRerankRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    query: &'a str,
    documents: &'a [String],
}

#[derive(Deserialize)]
struct HttpRerankResponse {
    results: Vec<HttpRerankResult>,
}

#[derive(Deserialize)]
struct HttpRerankResult {
    index: usize,
    relevance_score: f32,
}

/// Remote reranker speaking the common `{query, documents} -> results[{index, relevance_score}]` shape.
pub struct HttpReranker {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: Option<String>,
}

impl HttpReranker {
    pub fn new(url: String, api_key: Option<String>, model: Option<String>) -> Result<Self, RerankError> {
        if url.trim().is_empty() {
            return Err(RerankError::ModelInit(
                "reranking.url is required when the reranking provider is 'http'".to_string(),
            ));
        }
        Ok(HttpReranker {
            client: reqwest::Client::new(),
            url,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model,
        })
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>, RerankError> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }
        let request = HttpRerankRequest {
            model: self.model.as_deref(),
            query,
            documents: passages,
        };

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| RerankError::Scoring(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(RerankError::Api { status, message: body });
        }

        let parsed: HttpRerankResponse = response
            .json()
            .await
            .map_err(|e| RerankError::Scoring(format!("Failed to parse rerank response: {}", e)))?;

        scores_by_index(passages.len(), parsed.results.iter().map(|r| (r.index, r.relevance_score)))
    }

    fn model_name(&self) -> &str {
        self.model.as_deref().unwrap_or("http")
    }
}

/// Place `(index, score)` pairs back into input order; every slot must be filled.
fn scores_by_index(
    expected: usize,
    pairs: impl Iterator<Item = (usize, f32)>,
) -> Result<Vec<f32>, RerankError> {
    let mut scores: Vec<Option<f32>> = vec![None; expected];
    let mut got = 0;
    for (index, score) in pairs {
        got += 1;
        if let Some(slot) = scores.get_mut(index) {
            *slot = Some(score);
        }
    }
    scores
        .into_iter()
        .collect::<Option<Vec<f32>>>()
        .ok_or(RerankError::LengthMismatch { expected, got })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Maps text onto [count of 'a', count of 'b'].
    struct LetterEmbedder;

    #[async_trait]
    impl EmbeddingProvider for LetterEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let a = text.matches('a').count() as f32;
            let b = text.matches('b').count() as f32;
            Ok(vec![a, b])
        }

        fn model_name(&self) -> &str {
            "letters"
        }
    }

    #[tokio::test]
    async fn test_similarity_scorer_keeps_input_order() {
        let scorer = EmbeddingSimilarityScorer::new(Arc::new(LetterEmbedder), 2);
        let passages = vec!["bbb".to_string(), "aaa".to_string(), "ab".to_string()];
        let scores = scorer.score("a", &passages).await.unwrap();

        assert_eq!(scores.len(), 3);
        assert!(scores[0].abs() < 1e-6);
        assert!((scores[1] - 1.0).abs() < 1e-6);
        assert!(scores[2] > 0.0 && scores[2] < 1.0);
    }

    #[tokio::test]
    async fn test_similarity_scorer_empty_passages() {
        let scorer = EmbeddingSimilarityScorer::new(Arc::new(LetterEmbedder), 8);
        assert!(scorer.score("a", &[]).await.unwrap().is_empty());
    }

    #[test]
    fn test_scores_by_index_restores_order() {
        let scores = scores_by_index(3, vec![(2, 0.1), (0, 0.9), (1, 0.5)].into_iter()).unwrap();
        assert_eq!(scores, vec![0.9, 0.5, 0.1]);
    }

    #[test]
    fn test_scores_by_index_missing_slot_fails() {
        let result = scores_by_index(2, vec![(0, 0.9)].into_iter());
        assert!(matches!(result, Err(RerankError::LengthMismatch { expected: 2, got: 1 })));
    }

    #[test]
    fn test_http_reranker_requires_url() {
        assert!(HttpReranker::new(" ".into(), None, None).is_err());
    }

    #[test]
    fn test_rerank_error_maps_to_scoring_unavailable() {
        let err: RetrievalError = RerankError::Scoring("down".into()).into();
        assert!(matches!(err, RetrievalError::ScoringUnavailable(_)));
    }
}
