/// Single-collection hybrid retrieval: BM25 + dense pools, weighted rank
/// fusion, one batched re-ranking pass, threshold, top-N.

use serde_json::json;
use std::sync::Arc;
use tokio::task;
use tracing::{debug, info};

use super::dense::dense_search;
use super::fusion::{weighted_rrf, DEFAULT_RRF_K};
use super::lexical::LexicalRanker;
use super::rerank::Reranker;
use crate::embedding::EmbeddingProvider;
use crate::errors::RetrievalError;
use crate::types::{Candidate, GetResult, Query, MATCH_SOURCE_KEY, SCORE_KEY};
use crate::vector::VectorIndex;

/// Parameters for one (collection, query) hybrid retrieval.
#[derive(Debug, Clone)]
pub struct FusionRequest {
    pub collection: String,
    pub query: Query,
    /// Candidates fetched per backend
    pub k: usize,
    /// Candidates kept after re-ranking
    pub k_final: usize,
    /// Hard re-ranking threshold; 0.0 disables it
    pub min_score: f32,
    /// (bm25, dense) fusion weights
    pub weights: (f32, f32),
    pub rrf_k: f32,
}

impl FusionRequest {
    pub fn new(collection: impl Into<String>, query: Query, k: usize, k_final: usize) -> Self {
        FusionRequest {
            collection: collection.into(),
            query,
            k,
            k_final,
            min_score: 0.0,
            weights: (0.5, 0.5),
            rrf_k: DEFAULT_RRF_K,
        }
    }
}

pub struct HybridRetriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    lexical: Arc<dyn LexicalRanker>,
    reranker: Arc<dyn Reranker>,
}

impl HybridRetriever {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        lexical: Arc<dyn LexicalRanker>,
        reranker: Arc<dyn Reranker>,
    ) -> Self {
        HybridRetriever {
            index,
            embedder,
            lexical,
            reranker,
        }
    }

    /// Run hybrid retrieval for one collection and one query.
    ///
    /// `snapshot` is the collection's full (texts, metadatas), shared read-only
    /// across every query against the collection. Any failure of either pool,
    /// the embedding or the scoring step fails the attempt as a unit with
    /// `HybridRetrievalFailed`; one pool's results are never returned alone.
    pub async fn retrieve(
        &self,
        request: &FusionRequest,
        snapshot: Arc<GetResult>,
    ) -> Result<Vec<Candidate>, RetrievalError> {
        self.retrieve_inner(request, snapshot)
            .await
            .map_err(|e| RetrievalError::hybrid(&request.collection, e))
    }

    async fn retrieve_inner(
        &self,
        request: &FusionRequest,
        snapshot: Arc<GetResult>,
    ) -> Result<Vec<Candidate>, RetrievalError> {
        let lexical = {
            let ranker = Arc::clone(&self.lexical);
            let snapshot = Arc::clone(&snapshot);
            let query_text = request.query.text.clone();
            let k = request.k;
            async move {
                task::spawn_blocking(move || {
                    ranker.rank(&snapshot.documents, &snapshot.metadatas, &query_text, k)
                })
                .await
                .map_err(|e| RetrievalError::BackendUnavailable(format!("lexical task aborted: {}", e)))?
            }
        };

        let dense = async {
            let embedding = match &request.query.embedding {
                Some(embedding) => embedding.clone(),
                None => self.embedder.embed(&request.query.text).await?,
            };
            dense_search(self.index.as_ref(), &request.collection, &embedding, request.k).await
        };

        let (lexical_pool, dense_pool) = tokio::join!(lexical, dense);
        let (lexical_pool, dense_pool) = (lexical_pool?, dense_pool?);

        let fused = weighted_rrf(&lexical_pool, &dense_pool, request.weights, request.rrf_k);
        debug!(
            collection = %request.collection,
            bm25 = lexical_pool.len(),
            dense = dense_pool.len(),
            fused = fused.len(),
            "Candidate pools fused"
        );

        let candidates: Vec<Candidate> = fused
            .into_iter()
            .map(|f| {
                let mut candidate = f.candidate;
                candidate
                    .metadata
                    .insert(MATCH_SOURCE_KEY.to_string(), json!(f.match_source.as_str()));
                candidate
            })
            .collect();
        let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        let scores = self.reranker.score(&request.query.text, &texts).await?;
        if scores.len() != candidates.len() {
            return Err(RetrievalError::ScoringUnavailable(format!(
                "reranker returned {} scores for {} candidates",
                scores.len(),
                candidates.len()
            )));
        }

        let results = compress(candidates, &scores, request.min_score, request.k_final);
        info!(
            collection = %request.collection,
            query = %request.query.text,
            results = results.len(),
            "Hybrid retrieval complete"
        );
        Ok(results)
    }
}

/// Apply re-ranking scores: drop NaN scores, drop scores below `min_score`
/// (when nonzero), sort descending (stable), keep `top_n`, and record the
/// score on the candidate and under `SCORE_KEY` in its metadata.
pub fn compress(
    candidates: Vec<Candidate>,
    scores: &[f32],
    min_score: f32,
    top_n: usize,
) -> Vec<Candidate> {
    let mut scored: Vec<(Candidate, f32)> = candidates
        .into_iter()
        .zip(scores.iter().copied())
        .filter(|(_, score)| !score.is_nan())
        .collect();

    if min_score != 0.0 {
        scored.retain(|(_, score)| *score >= min_score);
    }

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_n);

    scored
        .into_iter()
        .map(|(mut candidate, score)| {
            candidate.metadata.insert(SCORE_KEY.to_string(), json!(score));
            candidate.score = Some(score);
            candidate
        })
        .collect()
}
