/// Weighted Reciprocal Rank Fusion of the lexical and dense candidate pools.

use std::collections::HashMap;

use crate::types::Candidate;

/// Default RRF smoothing constant
pub const DEFAULT_RRF_K: f32 = 60.0;

/// Which pools a fused candidate appeared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSource {
    Hybrid,
    Bm25Only,
    VectorOnly,
}

impl MatchSource {
    fn from_bits(bits: u8) -> Self {
        match bits {
            1 => MatchSource::Bm25Only,
            2 => MatchSource::VectorOnly,
            _ => MatchSource::Hybrid,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchSource::Hybrid => "hybrid",
            MatchSource::Bm25Only => "bm25_only",
            MatchSource::VectorOnly => "vector_only",
        }
    }
}

/// A deduplicated candidate with its fused rank score.
#[derive(Debug, Clone)]
pub struct FusedCandidate {
    pub candidate: Candidate,
    pub rrf_score: f32,
    pub match_source: MatchSource,
}

/// Fuse BM25 and dense ranked pools via weighted Reciprocal Rank Fusion.
///
/// Each candidate scores `sum(weight_i / (k + rank_i))` over the pools it
/// appears in, with 1-based ranks. Identity is the passage text; the first
/// occurrence (lexical pool first, then dense) supplies the kept candidate.
/// Repeats of a passage inside one pool contribute only their best rank.
///
/// Returns candidates sorted by fused score descending; ties keep first-seen order.
pub fn weighted_rrf(
    bm25: &[Candidate],
    dense: &[Candidate],
    weights: (f32, f32),
    k: f32,
) -> Vec<FusedCandidate> {
    let mut order: Vec<FusedCandidate> = Vec::with_capacity(bm25.len() + dense.len());
    let mut positions: HashMap<&str, usize> = HashMap::new();
    // Bit flags per fused entry: 1=bm25, 2=vector
    let mut sources: Vec<u8> = Vec::with_capacity(bm25.len() + dense.len());

    for (pool, weight, bit) in [(bm25, weights.0, 1u8), (dense, weights.1, 2u8)] {
        for (rank, candidate) in pool.iter().enumerate() {
            let contribution = weight / (k + (rank + 1) as f32);
            match positions.get(candidate.text.as_str()) {
                Some(&pos) => {
                    if sources[pos] & bit == 0 {
                        order[pos].rrf_score += contribution;
                        sources[pos] |= bit;
                    }
                }
                None => {
                    positions.insert(candidate.text.as_str(), order.len());
                    sources.push(bit);
                    order.push(FusedCandidate {
                        candidate: candidate.clone(),
                        rrf_score: contribution,
                        match_source: MatchSource::Bm25Only,
                    });
                }
            }
        }
    }

    for (fused, bits) in order.iter_mut().zip(&sources) {
        fused.match_source = MatchSource::from_bits(*bits);
    }

    // Stable: equal fused scores keep first-seen order
    order.sort_by(|a, b| b.rrf_score.total_cmp(&a.rrf_score));
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Metadata;

    fn pool(texts: &[&str]) -> Vec<Candidate> {
        texts.iter().map(|t| Candidate::new(*t, Metadata::new())).collect()
    }

    #[test]
    fn test_candidate_in_both_pools_accumulates() {
        let bm25 = pool(&["a", "b"]);
        let dense = pool(&["b", "c"]);
        let fused = weighted_rrf(&bm25, &dense, (0.5, 0.5), DEFAULT_RRF_K);

        assert_eq!(fused.len(), 3);
        assert_eq!(fused[0].candidate.text, "b");
        assert_eq!(fused[0].match_source, MatchSource::Hybrid);
        let expected = 0.5 / 62.0 + 0.5 / 61.0;
        assert!((fused[0].rrf_score - expected).abs() < 1e-6);
    }

    #[test]
    fn test_single_pool_candidates_get_single_contribution() {
        let fused = weighted_rrf(&pool(&["a"]), &pool(&["c"]), (0.5, 0.5), DEFAULT_RRF_K);
        // Equal scores: lexical "a" was seen first
        assert_eq!(fused[0].candidate.text, "a");
        assert_eq!(fused[0].match_source, MatchSource::Bm25Only);
        assert_eq!(fused[1].match_source, MatchSource::VectorOnly);
        assert!((fused[0].rrf_score - 0.5 / 61.0).abs() < 1e-6);
    }

    #[test]
    fn test_weights_shift_ranking() {
        let fused = weighted_rrf(&pool(&["lex"]), &pool(&["vec"]), (0.2, 0.8), DEFAULT_RRF_K);
        assert_eq!(fused[0].candidate.text, "vec");
    }

    #[test]
    fn test_duplicate_within_pool_counts_once() {
        let fused = weighted_rrf(&pool(&["a", "a"]), &[], (1.0, 0.0), DEFAULT_RRF_K);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].rrf_score - 1.0 / 61.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_pools() {
        assert!(weighted_rrf(&[], &[], (0.5, 0.5), DEFAULT_RRF_K).is_empty());
    }
}
