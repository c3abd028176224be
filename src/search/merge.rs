/// Cross-collection result merging.
///
/// Flatten per-task results in task order, drop repeated passages by content
/// hash (first occurrence wins), stable-sort by score with a caller-supplied
/// polarity, truncate to `k`.
///
/// A passage repeated across collections keeps only its first occurrence's
/// metadata and provenance; later copies are dropped silently.

use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::types::{Candidate, GetResult, MergedResult};

/// Successful output of one (collection, query) task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult {
    pub collection: String,
    pub query: String,
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeRequest {
    /// Global bound on merged results
    pub k: usize,
    /// True when higher scores are better (similarity / re-ranking scores),
    /// false for distances
    pub sort_descending: bool,
}

/// SHA-256 of the raw passage bytes, hex encoded.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Order two optional scores; unscored candidates always sort last.
fn compare_scores(a: Option<f32>, b: Option<f32>, descending: bool) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => {
            let ord = a.total_cmp(&b);
            if descending { ord.reverse() } else { ord }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Merge task results into one globally ranked, deduplicated, bounded result.
///
/// `results` must be in a fixed task order (collection-major, query-minor),
/// never completion order: dedup and tie-breaking depend on it.
pub fn merge_and_sort(results: &[TaskResult], request: MergeRequest) -> MergedResult {
    let capacity: usize = results.iter().map(|r| r.candidates.len()).sum();
    let mut seen: HashSet<String> = HashSet::with_capacity(capacity);
    let mut combined: Vec<(&Candidate, &str)> = Vec::with_capacity(capacity);

    for result in results {
        for candidate in &result.candidates {
            if seen.insert(content_hash(&candidate.text)) {
                combined.push((candidate, result.collection.as_str()));
            }
        }
    }

    if combined.is_empty() {
        return MergedResult::default();
    }

    // Vec::sort_by is stable: ties keep first-seen order
    combined.sort_by(|a, b| compare_scores(a.0.score, b.0.score, request.sort_descending));
    combined.truncate(request.k);

    let mut merged = MergedResult::default();
    for (candidate, collection) in combined {
        merged.distances.push(candidate.score.unwrap_or(f32::NAN));
        merged.documents.push(candidate.text.clone());
        merged.metadatas.push(candidate.metadata.clone());
        merged
            .collection_ids
            .push(candidate.collection_id.clone().unwrap_or_else(|| collection.to_string()));
    }
    merged
}

/// Concatenate collection snapshots in the given order.
pub fn merge_get_results(results: Vec<GetResult>) -> GetResult {
    let mut combined = GetResult::default();
    for result in results {
        combined.ids.extend(result.ids);
        combined.documents.extend(result.documents);
        combined.metadatas.extend(result.metadatas);
    }
    combined
}
