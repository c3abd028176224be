/// Domain-specific error types for ragfuse
///
/// Adapter-level and per-task errors are caught by the fan-out coordinator and
/// turned into failed-task markers. Only `AllRetrievalFailed` is meant to reach
/// the caller of a search.

#[derive(Debug, Clone, thiserror::Error)]
pub enum RetrievalError {
    /// The vector index or its connection could not be reached
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Collection not found: {name}")]
    InvalidCollection {
        name: String
    },

    /// Lexical search was asked to rank an empty corpus
    #[error("Cannot build a lexical index over an empty corpus")]
    EmptyCorpus,

    #[error("Scoring unavailable: {0}")]
    ScoringUnavailable(String),

    /// The per-collection snapshot needed for lexical search could not be fetched
    #[error("Collection data for {collection} is unavailable: {reason}")]
    CollectionDataUnavailable {
        collection: String,
        reason: String,
    },

    #[error("Hybrid retrieval failed for collection {collection}: {reason}")]
    HybridRetrievalFailed {
        collection: String,
        reason: String,
    },

    /// Every dispatched task failed; no partial result exists
    #[error("Retrieval failed for all {failed} task(s): {last_error}")]
    AllRetrievalFailed {
        failed: usize,
        last_error: String,
    },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<crate::embedding::EmbeddingError> for RetrievalError {
    fn from(e: crate::embedding::EmbeddingError) -> Self {
        RetrievalError::Embedding(e.to_string())
    }
}

impl RetrievalError {
    /// Wrap any failure of one hybrid attempt into the per-task composite error.
    ///
    /// Example:
    /// ```
    /// use ragfuse::errors::RetrievalError;
    /// let err = RetrievalError::hybrid("docs", RetrievalError::EmptyCorpus);
    /// assert!(err.to_string().contains("docs"));
    /// ```
    pub fn hybrid(collection: &str, cause: RetrievalError) -> Self {
        match cause {
            already @ RetrievalError::HybridRetrievalFailed { .. } => already,
            other => RetrievalError::HybridRetrievalFailed {
                collection: collection.to_string(),
                reason: other.to_string(),
            },
        }
    }

    /// True for the adapter-level errors the fallback controller may recover from.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            RetrievalError::AllRetrievalFailed { .. } | RetrievalError::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hybrid_wraps_cause_once() {
        let inner = RetrievalError::hybrid("a", RetrievalError::EmptyCorpus);
        let outer = RetrievalError::hybrid("b", inner);
        match outer {
            RetrievalError::HybridRetrievalFailed { collection, .. } => assert_eq!(collection, "a"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_total_failure_is_not_recoverable() {
        let err = RetrievalError::AllRetrievalFailed { failed: 3, last_error: "boom".into() };
        assert!(!err.is_recoverable());
        assert!(RetrievalError::BackendUnavailable("down".into()).is_recoverable());
    }
}
