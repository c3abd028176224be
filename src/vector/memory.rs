/// Brute-force in-memory vector index.
///
/// Used by the CLI to serve a JSON corpus and by the test suite as the dense
/// backend. Collections are created on first insert.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{ScoreOrder, VectorIndex};
use crate::embedding::cosine_similarity;
use crate::errors::RetrievalError;
use crate::types::{GetResult, Metadata, QueryResult};

/// Score reported for each hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    /// `1 - cosine`, ascending (Chroma's convention)
    CosineDistance,
    /// Raw cosine similarity, descending
    CosineSimilarity,
}

#[derive(Debug, Clone)]
struct StoredDocument {
    id: String,
    text: String,
    metadata: Metadata,
    embedding: Vec<f32>,
}

/// A passage to insert, with its precomputed embedding.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub id: Option<String>,
    pub text: String,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

pub struct InMemoryVectorIndex {
    collections: RwLock<HashMap<String, Vec<StoredDocument>>>,
    metric: DistanceMetric,
}

impl InMemoryVectorIndex {
    pub fn new(metric: DistanceMetric) -> Self {
        InMemoryVectorIndex {
            collections: RwLock::new(HashMap::new()),
            metric,
        }
    }

    /// Append documents to `collection`, generating UUIDs for missing ids.
    pub async fn insert(&self, collection: &str, documents: Vec<NewDocument>) {
        let mut collections = self.collections.write().await;
        let stored = collections.entry(collection.to_string()).or_default();
        stored.extend(documents.into_iter().map(|doc| StoredDocument {
            id: doc.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            text: doc.text,
            metadata: doc.metadata,
            embedding: doc.embedding,
        }));
    }

    pub async fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    fn score(&self, query: &[f32], document: &[f32]) -> f32 {
        let similarity = cosine_similarity(query, document);
        match self.metric {
            DistanceMetric::CosineDistance => 1.0 - similarity,
            DistanceMetric::CosineSimilarity => similarity,
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn search(
        &self,
        collection: &str,
        vectors: &[Vec<f32>],
        limit: usize,
    ) -> Result<Vec<QueryResult>, RetrievalError> {
        let collections = self.collections.read().await;
        let documents = collections
            .get(collection)
            .ok_or_else(|| RetrievalError::InvalidCollection { name: collection.to_string() })?;

        let descending = self.score_order().sort_descending();
        let rows = vectors
            .iter()
            .map(|vector| {
                let mut scored: Vec<(f32, &StoredDocument)> = documents
                    .iter()
                    .map(|doc| (self.score(vector, &doc.embedding), doc))
                    .collect();
                // Stable sort: equal scores keep insertion order
                scored.sort_by(|a, b| {
                    let ord = a.0.total_cmp(&b.0);
                    if descending { ord.reverse() } else { ord }
                });
                scored.truncate(limit);

                let mut row = QueryResult::default();
                for (score, doc) in scored {
                    row.ids.push(doc.id.clone());
                    row.documents.push(doc.text.clone());
                    row.metadatas.push(doc.metadata.clone());
                    row.distances.push(score);
                }
                row
            })
            .collect();
        Ok(rows)
    }

    async fn get(&self, collection: &str) -> Result<GetResult, RetrievalError> {
        let collections = self.collections.read().await;
        let documents = collections
            .get(collection)
            .ok_or_else(|| RetrievalError::InvalidCollection { name: collection.to_string() })?;

        let mut result = GetResult::default();
        for doc in documents {
            result.ids.push(doc.id.clone());
            result.documents.push(doc.text.clone());
            result.metadatas.push(doc.metadata.clone());
        }
        Ok(result)
    }

    fn score_order(&self) -> ScoreOrder {
        match self.metric {
            DistanceMetric::CosineDistance => ScoreOrder::Ascending,
            DistanceMetric::CosineSimilarity => ScoreOrder::Descending,
        }
    }
}
