/// Dense search adapter over a `VectorIndex`.

use tracing::{debug, error};

use crate::errors::RetrievalError;
use crate::types::{Candidate, QueryResult};
use crate::vector::{ScoreOrder, VectorIndex};

/// Run a single-vector search and return the row as candidates, best first.
///
/// Scores are passed through untouched, so they follow `index.score_order()`:
/// ascending distances for a distance index, descending similarities
/// otherwise. Use [`align_scores`] before merging them with results of the
/// other polarity.
pub async fn dense_search(
    index: &dyn VectorIndex,
    collection: &str,
    query_embedding: &[f32],
    limit: usize,
) -> Result<Vec<Candidate>, RetrievalError> {
    Ok(query_doc(index, collection, query_embedding, limit)
        .await?
        .into_candidates())
}

/// Plain vector query against one collection, returning the raw columnar row.
pub async fn query_doc(
    index: &dyn VectorIndex,
    collection: &str,
    query_embedding: &[f32],
    limit: usize,
) -> Result<QueryResult, RetrievalError> {
    if limit == 0 {
        return Ok(QueryResult::default());
    }
    match index
        .search(collection, &[query_embedding.to_vec()], limit)
        .await
    {
        Ok(rows) => {
            let row = rows.into_iter().next().unwrap_or_default();
            debug!(collection = %collection, limit, hits = row.len(), "Dense search complete");
            Ok(row)
        }
        Err(e) => {
            error!(collection = %collection, limit, error = %e, "Dense search failed");
            Err(e)
        }
    }
}

/// Rewrite `candidates` scores from `from` into the polarity `sort_descending`.
///
/// When the polarities differ every score is negated, which keeps the ranking
/// and flips its direction: a distance `d` becomes `-d`, so closer is higher.
pub fn align_scores(candidates: &mut [Candidate], from: ScoreOrder, sort_descending: bool) {
    if from.sort_descending() == sort_descending {
        return;
    }
    for candidate in candidates.iter_mut() {
        candidate.score = candidate.score.map(|score| -score);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Metadata;
    use crate::vector::{DistanceMetric, InMemoryVectorIndex, NewDocument};

    #[tokio::test]
    async fn test_dense_search_returns_best_first() {
        let index = InMemoryVectorIndex::new(DistanceMetric::CosineDistance);
        index
            .insert(
                "c",
                vec![
                    NewDocument { id: None, text: "far".into(), metadata: Metadata::new(), embedding: vec![0.0, 1.0] },
                    NewDocument { id: None, text: "near".into(), metadata: Metadata::new(), embedding: vec![1.0, 0.1] },
                ],
            )
            .await;

        let hits = dense_search(&index, "c", &[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "near");
        assert!(hits[0].id.is_some());
        assert!(hits[0].collection_id.is_none());
    }

    #[tokio::test]
    async fn test_align_scores_turns_distances_into_descending_scores() {
        let index = InMemoryVectorIndex::new(DistanceMetric::CosineDistance);
        index
            .insert(
                "c",
                vec![
                    NewDocument { id: None, text: "far".into(), metadata: Metadata::new(), embedding: vec![0.0, 1.0] },
                    NewDocument { id: None, text: "near".into(), metadata: Metadata::new(), embedding: vec![1.0, 0.1] },
                ],
            )
            .await;

        let mut hits = dense_search(&index, "c", &[1.0, 0.0], 5).await.unwrap();
        let near = hits[0].score.unwrap();
        let far = hits[1].score.unwrap();
        assert!(near < far);

        align_scores(&mut hits, index.score_order(), true);
        assert_eq!(hits[0].score, Some(-near));
        assert_eq!(hits[1].score, Some(-far));
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_align_scores_is_a_no_op_for_matching_polarity() {
        let mut hits = vec![Candidate::new("a", Metadata::new())];
        hits[0].score = Some(0.4);
        align_scores(&mut hits, ScoreOrder::Descending, true);
        assert_eq!(hits[0].score, Some(0.4));
        align_scores(&mut hits, ScoreOrder::Ascending, false);
        assert_eq!(hits[0].score, Some(0.4));
    }

    #[tokio::test]
    async fn test_zero_limit_short_circuits() {
        let index = InMemoryVectorIndex::new(DistanceMetric::CosineDistance);
        let row = query_doc(&index, "missing", &[1.0], 0).await.unwrap();
        assert!(row.is_empty());
    }
}
