/// Core data model shared by the retrieval, fan-out and merge layers.
///
/// Candidates are created fresh per request and only mutated to attach a score.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered string-keyed metadata carried by every passage (file id, name, source, ...).
pub type Metadata = serde_json::Map<String, Value>;

/// Metadata key the hybrid retriever writes the final re-ranking score under.
pub const SCORE_KEY: &str = "score";

/// Metadata key recording which candidate pools a hybrid result came from.
pub const MATCH_SOURCE_KEY: &str = "match_source";

/// A search query: its text plus, once computed, its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub text: String,
    pub embedding: Option<Vec<f32>>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Query { text: text.into(), embedding: None }
    }

    pub fn with_embedding(text: impl Into<String>, embedding: Vec<f32>) -> Self {
        Query { text: text.into(), embedding: Some(embedding) }
    }
}

/// A single retrieved passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Backend id, when the backend assigns one
    #[serde(default)]
    pub id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub score: Option<f32>,
    /// Set by the merger for provenance, never by a backend
    #[serde(default)]
    pub collection_id: Option<String>,
}

impl Candidate {
    pub fn new(text: impl Into<String>, metadata: Metadata) -> Self {
        Candidate {
            id: None,
            text: text.into(),
            metadata,
            score: None,
            collection_id: None,
        }
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }
}

/// One ranked row returned by a dense search: parallel columns, best match first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub metadatas: Vec<Metadata>,
    pub distances: Vec<f32>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Zip the columns into candidates, keeping the row order.
    ///
    /// Missing metadata entries become empty maps; missing ids become `None`.
    pub fn into_candidates(self) -> Vec<Candidate> {
        let mut ids = self.ids.into_iter();
        let mut metadatas = self.metadatas.into_iter();
        let mut distances = self.distances.into_iter();
        self.documents
            .into_iter()
            .map(|text| Candidate {
                id: ids.next(),
                text,
                metadata: metadatas.next().unwrap_or_default(),
                score: distances.next(),
                collection_id: None,
            })
            .collect()
    }
}

/// A full snapshot of one collection (or several, concatenated).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetResult {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub metadatas: Vec<Metadata>,
}

impl GetResult {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Output of a cross-collection merge: parallel columns, globally ranked.
///
/// Always well-formed; an empty merge has four empty columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedResult {
    pub distances: Vec<f32>,
    pub documents: Vec<String>,
    pub metadatas: Vec<Metadata>,
    pub collection_ids: Vec<String>,
}

impl MergedResult {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_into_candidates_keeps_row_order() {
        let mut meta = Metadata::new();
        meta.insert("file_id".into(), json!("f1"));
        let row = QueryResult {
            ids: vec!["a".into(), "b".into()],
            documents: vec!["first".into(), "second".into()],
            metadatas: vec![meta.clone()],
            distances: vec![0.1, 0.4],
        };

        let candidates = row.into_candidates();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].id.as_deref(), Some("a"));
        assert_eq!(candidates[0].metadata, meta);
        assert_eq!(candidates[1].text, "second");
        assert!(candidates[1].metadata.is_empty());
        assert_eq!(candidates[1].score, Some(0.4));
    }
}
