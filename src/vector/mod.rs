/// Dense vector index abstraction
///
/// The fusion engine only ever talks to a vector store through `VectorIndex`:
/// a batched similarity search and a full-collection snapshot. Retries, if
/// any, belong to the implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::RetrievalError;
use crate::types::{GetResult, QueryResult};

pub mod memory;

pub use memory::{DistanceMetric, InMemoryVectorIndex, NewDocument};

/// Which direction of the reported score means "more similar".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreOrder {
    /// Scores are distances: lower is better
    Ascending,
    /// Scores are similarities: higher is better
    Descending,
}

impl ScoreOrder {
    /// The merge polarity matching this ordering.
    pub fn sort_descending(self) -> bool {
        matches!(self, ScoreOrder::Descending)
    }
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Search `collection` with each vector, returning one row per vector,
    /// best match first, at most `limit` entries per row.
    ///
    /// # Errors
    /// `InvalidCollection` for an unknown collection, `BackendUnavailable`
    /// when the index cannot be reached.
    async fn search(
        &self,
        collection: &str,
        vectors: &[Vec<f32>],
        limit: usize,
    ) -> Result<Vec<QueryResult>, RetrievalError>;

    /// Return every passage stored in `collection`.
    async fn get(&self, collection: &str) -> Result<GetResult, RetrievalError>;

    /// How this index's reported scores order.
    fn score_order(&self) -> ScoreOrder;
}
