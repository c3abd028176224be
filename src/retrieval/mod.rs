/// Backend adapters and single-collection hybrid retrieval
///
/// Combines:
/// - Dense vector search through a `VectorIndex`
/// - BM25 lexical search over a collection snapshot
/// - Weighted Reciprocal Rank Fusion of the two pools
/// - A batched re-ranking pass with a score threshold

pub mod dense;
pub mod fusion;
pub mod hybrid;
pub mod lexical;
pub mod rerank;

pub use dense::{align_scores, dense_search, query_doc};
pub use fusion::{weighted_rrf, FusedCandidate, MatchSource, DEFAULT_RRF_K};
pub use hybrid::{compress, FusionRequest, HybridRetriever};
pub use lexical::{Bm25Ranker, LexicalRanker};
pub use rerank::{EmbeddingSimilarityScorer, HttpReranker, LocalCrossEncoder, RerankError, Reranker};
