/// The fusion engine: plain and hybrid multi-collection search over one
/// vector index, one embedding provider and one re-ranking capability.
///
/// Every search runs the same pipeline: build the (collection × query) task
/// grid, fan it out with bounded concurrency, resolve the typed task outcomes
/// through the fallback policy, then merge the survivors.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::RetrievalConfig;
use crate::embedding::{embed_in_batches, EmbeddingProvider};
use crate::errors::RetrievalError;
use crate::retrieval::{
    align_scores, dense_search, Bm25Ranker, EmbeddingSimilarityScorer, FusionRequest, HybridRetriever,
    LexicalRanker, Reranker,
};
use crate::search::{
    decide, fan_out, fetch_snapshots, merge_and_sort, merge_get_results, resolve, run_bounded,
    FallbackDecision, FallbackPolicy, MergeRequest, TaskOutcome, TaskResult,
};
use crate::types::{GetResult, MergedResult, Query};
use crate::vector::{ScoreOrder, VectorIndex};

const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 32;

/// One multi-collection search call.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub collections: Vec<String>,
    pub queries: Vec<String>,
    /// Run hybrid (BM25 + dense + re-rank) retrieval instead of plain dense search
    pub hybrid: bool,
    /// Reissue a failed hybrid task as plain dense search
    pub fallback: bool,
    /// Candidates fetched per backend, and the global merge bound
    pub k: usize,
    /// Candidates kept per task after re-ranking
    pub k_reranker: usize,
    /// Re-ranking threshold; 0.0 disables it
    pub min_score: f32,
    /// (bm25, dense) fusion weights
    pub weights: (f32, f32),
    pub sort_descending: bool,
}

impl SearchRequest {
    /// A request carrying the configured retrieval defaults.
    pub fn from_config(collections: Vec<String>, queries: Vec<String>, config: &RetrievalConfig) -> Self {
        SearchRequest {
            collections,
            queries,
            hybrid: config.hybrid_search,
            fallback: config.hybrid_fallback,
            k: config.top_k,
            k_reranker: config.top_k_reranker,
            min_score: config.relevance_threshold,
            weights: config.hybrid_weights(),
            sort_descending: config.sort_descending,
        }
    }

    fn merge_request(&self) -> MergeRequest {
        MergeRequest {
            k: self.k,
            sort_descending: self.sort_descending,
        }
    }
}

pub struct FusionEngine {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    reranker: Arc<dyn Reranker>,
    lexical: Arc<dyn LexicalRanker>,
    config: RetrievalConfig,
    batch_size: usize,
}

impl FusionEngine {
    /// Build an engine. Without a reranker, candidates are scored by embedding
    /// cosine similarity.
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        reranker: Option<Arc<dyn Reranker>>,
        config: RetrievalConfig,
    ) -> Self {
        let reranker = reranker.unwrap_or_else(|| {
            Arc::new(EmbeddingSimilarityScorer::new(
                Arc::clone(&embedder),
                DEFAULT_EMBEDDING_BATCH_SIZE,
            ))
        });
        FusionEngine {
            index,
            embedder,
            reranker,
            lexical: Arc::new(Bm25Ranker),
            config,
            batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
        }
    }

    pub fn with_lexical_ranker(mut self, lexical: Arc<dyn LexicalRanker>) -> Self {
        self.lexical = lexical;
        self
    }

    /// Chunk size used when embedding queries.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Score direction of the underlying index's plain dense results.
    pub fn score_order(&self) -> ScoreOrder {
        self.index.score_order()
    }

    /// Run `request` as hybrid or plain search, depending on its `hybrid` flag.
    pub async fn search(&self, request: &SearchRequest) -> Result<MergedResult, RetrievalError> {
        if request.hybrid {
            self.query_collection_with_hybrid_search(request).await
        } else {
            self.query_collection(&request.collections, &request.queries, request.k, request.sort_descending)
                .await
        }
    }

    /// Plain dense search of every query against every collection.
    ///
    /// Queries are embedded once, in batches, before dispatch. Failed tasks are
    /// dropped from the merge; only a total failure is an error.
    pub async fn query_collection(
        &self,
        collections: &[String],
        queries: &[String],
        k: usize,
        sort_descending: bool,
    ) -> Result<MergedResult, RetrievalError> {
        let collections = non_empty(collections);
        let queries = match self.embed_queries(queries).await {
            Ok(queries) => queries,
            Err(e) => {
                let failed = collections.len() * queries.len();
                if failed == 0 {
                    return Ok(MergedResult::default());
                }
                warn!(error = %e, "Query embedding failed; no plain search task can run");
                return Err(RetrievalError::AllRetrievalFailed {
                    failed,
                    last_error: e.to_string(),
                });
            }
        };

        let report = fan_out(&collections, &queries, self.config.max_concurrency, |collection, query| {
            let index = Arc::clone(&self.index);
            let embedder = Arc::clone(&self.embedder);
            async move { plain_task(index, embedder, collection, query, k).await }
        })
        .await;

        let results = resolve(report.outcomes)?;
        let merged = merge_and_sort(&results, MergeRequest { k, sort_descending });
        info!(
            collections = collections.len(),
            queries = queries.len(),
            tasks = results.len(),
            results = merged.len(),
            "Plain search complete"
        );
        Ok(merged)
    }

    /// Hybrid search of every query against every collection.
    ///
    /// Each collection's snapshot is fetched once and shared by all of its
    /// tasks. A collection whose snapshot cannot be fetched fails all of its
    /// tasks. A task whose hybrid attempt fails is reissued as plain dense
    /// search when `request.fallback` is set, otherwise excluded.
    pub async fn query_collection_with_hybrid_search(
        &self,
        request: &SearchRequest,
    ) -> Result<MergedResult, RetrievalError> {
        let collections = non_empty(&request.collections);
        let queries = match self.embed_queries(&request.queries).await {
            Ok(queries) => queries,
            Err(e) => {
                // Each task embeds its own query and fails individually
                warn!(error = %e, "Batched query embedding failed");
                request.queries.iter().map(Query::new).collect()
            }
        };

        let snapshots = fetch_snapshots(Arc::clone(&self.index), &collections, self.config.max_concurrency).await;
        let retriever = Arc::new(HybridRetriever::new(
            Arc::clone(&self.index),
            Arc::clone(&self.embedder),
            Arc::clone(&self.lexical),
            Arc::clone(&self.reranker),
        ));
        let policy = FallbackPolicy {
            reissue_as_dense: request.fallback,
        };
        let index_order = self.index.score_order();
        let sort_descending = request.sort_descending;

        let report = fan_out(&collections, &queries, self.config.max_concurrency, |collection, query| {
            let retriever = Arc::clone(&retriever);
            let index = Arc::clone(&self.index);
            let embedder = Arc::clone(&self.embedder);
            let snapshot = snapshots.get(&collection).cloned();
            let mut fusion = FusionRequest::new(collection.clone(), query.clone(), request.k, request.k_reranker);
            fusion.min_score = request.min_score;
            fusion.weights = request.weights;
            fusion.rrf_k = self.config.rrf_k;

            async move {
                let snapshot = match snapshot {
                    Some(Ok(snapshot)) => snapshot,
                    Some(Err(e)) => return TaskOutcome::failed(&collection, &query.text, e),
                    None => {
                        let e = RetrievalError::CollectionDataUnavailable {
                            collection: collection.clone(),
                            reason: "snapshot was not fetched".to_string(),
                        };
                        return TaskOutcome::failed(&collection, &query.text, e);
                    }
                };

                match retriever.retrieve(&fusion, snapshot).await {
                    Ok(candidates) => TaskOutcome::Success(TaskResult {
                        collection,
                        query: query.text,
                        candidates,
                    }),
                    Err(cause) => {
                        warn!(collection = %collection, query = %query.text, error = %cause, "Hybrid retrieval failed");
                        match decide(&cause, policy) {
                            FallbackDecision::Exclude => TaskOutcome::failed(&collection, &query.text, cause),
                            FallbackDecision::Reissue => {
                                debug!(collection = %collection, query = %query.text, "Reissuing as dense search");
                                match plain_task(index, embedder, collection, query, fusion.k).await {
                                    TaskOutcome::Success(mut result) => {
                                        // Raw index scores into the request's polarity
                                        align_scores(&mut result.candidates, index_order, sort_descending);
                                        TaskOutcome::Degraded { result, cause }
                                    }
                                    other => other,
                                }
                            }
                        }
                    }
                }
            }
        })
        .await;

        let results = resolve(report.outcomes)?;
        let merged = merge_and_sort(&results, request.merge_request());
        info!(
            collections = collections.len(),
            queries = queries.len(),
            tasks = results.len(),
            results = merged.len(),
            "Hybrid search complete"
        );
        Ok(merged)
    }

    /// Every passage of every collection, concatenated in collection order.
    ///
    /// Collections that cannot be fetched are logged and skipped.
    pub async fn get_all_items_from_collections(
        &self,
        collections: &[String],
    ) -> Result<GetResult, RetrievalError> {
        let collections = non_empty(collections);
        let jobs: Vec<_> = collections
            .iter()
            .map(|collection| {
                let index = Arc::clone(&self.index);
                let collection = collection.clone();
                async move { index.get(&collection).await }
            })
            .collect();

        let mut snapshots = Vec::with_capacity(collections.len());
        for (collection, result) in collections.iter().zip(run_bounded(jobs, self.config.max_concurrency).await) {
            match result.and_then(|inner| inner) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => warn!(collection = %collection, error = %e, "Skipping collection"),
            }
        }
        Ok(merge_get_results(snapshots))
    }

    /// Attach batched embeddings to every query text.
    async fn embed_queries(&self, queries: &[String]) -> Result<Vec<Query>, RetrievalError> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }
        let embeddings = embed_in_batches(self.embedder.as_ref(), queries, self.batch_size).await?;
        Ok(queries
            .iter()
            .zip(embeddings)
            .map(|(text, embedding)| Query::with_embedding(text.clone(), embedding))
            .collect())
    }
}

/// One plain dense (collection, query) task.
async fn plain_task(
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    collection: String,
    query: Query,
    k: usize,
) -> TaskOutcome {
    let embedding = match query.embedding {
        Some(ref embedding) => embedding.clone(),
        None => match embedder.embed(&query.text).await {
            Ok(embedding) => embedding,
            Err(e) => return TaskOutcome::failed(&collection, &query.text, e.into()),
        },
    };

    match dense_search(index.as_ref(), &collection, &embedding, k).await {
        Ok(candidates) => TaskOutcome::Success(TaskResult {
            collection,
            query: query.text,
            candidates,
        }),
        Err(e) => {
            warn!(collection = %collection, query = %query.text, error = %e, "Dense search task failed");
            TaskOutcome::failed(&collection, &query.text, e)
        }
    }
}

fn non_empty(collections: &[String]) -> Vec<String> {
    collections.iter().filter(|c| !c.trim().is_empty()).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_request_from_config() {
        let mut config = RetrievalConfig::default();
        config.hybrid_search = true;
        config.bm25_weight = 1.0;
        config.vector_weight = 1.0;
        config.relevance_threshold = 0.25;

        let request = SearchRequest::from_config(vec!["a".into()], vec!["q".into()], &config);
        assert!(request.hybrid);
        assert!(request.fallback);
        assert_eq!(request.k, 3);
        assert_eq!(request.min_score, 0.25);
        assert_eq!(request.weights, (0.5, 0.5));
        assert_eq!(request.merge_request(), MergeRequest { k: 3, sort_descending: true });
    }

    #[test]
    fn test_blank_collection_names_are_skipped() {
        let names = non_empty(&["a".into(), " ".into(), String::new(), "a".into()]);
        assert_eq!(names, vec!["a", "a"]);
    }
}
