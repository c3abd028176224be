/// Degradation policy for failed retrieval tasks.
///
/// Both functions here are pure: `decide` says what to do with one failed
/// hybrid attempt, `resolve` turns a full set of task outcomes into either the
/// surviving results or the single total-failure error.

use tracing::{info, warn};

use super::fanout::TaskOutcome;
use super::merge::TaskResult;
use crate::errors::RetrievalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackPolicy {
    /// Reissue a failed hybrid task as a plain dense search
    pub reissue_as_dense: bool,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        FallbackPolicy { reissue_as_dense: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackDecision {
    /// Retry this task as dense-only
    Reissue,
    /// Record the task as failed and continue with the rest
    Exclude,
}

/// Decide how to handle one failed hybrid task.
pub fn decide(error: &RetrievalError, policy: FallbackPolicy) -> FallbackDecision {
    if policy.reissue_as_dense && error.is_recoverable() {
        FallbackDecision::Reissue
    } else {
        FallbackDecision::Exclude
    }
}

/// Keep every successful or degraded result in task order.
///
/// Fails with `AllRetrievalFailed` only when at least one task ran and none
/// succeeded. Zero tasks is an empty success.
pub fn resolve(outcomes: Vec<TaskOutcome>) -> Result<Vec<TaskResult>, RetrievalError> {
    let total = outcomes.len();
    let mut results = Vec::with_capacity(total);
    let mut failed = 0usize;
    let mut last_error: Option<RetrievalError> = None;

    for outcome in outcomes {
        match outcome {
            TaskOutcome::Success(result) => results.push(result),
            TaskOutcome::Degraded { result, cause } => {
                info!(
                    collection = %result.collection,
                    query = %result.query,
                    cause = %cause,
                    "Task served by dense fallback"
                );
                results.push(result);
            }
            TaskOutcome::Failed { collection, query, error } => {
                warn!(collection = %collection, query = %query, error = %error, "Task excluded from results");
                failed += 1;
                last_error = Some(error);
            }
        }
    }

    if total > 0 && results.is_empty() {
        return Err(RetrievalError::AllRetrievalFailed {
            failed,
            last_error: last_error.map(|e| e.to_string()).unwrap_or_default(),
        });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(collection: &str) -> TaskOutcome {
        TaskOutcome::Success(TaskResult {
            collection: collection.to_string(),
            query: "q".to_string(),
            candidates: Vec::new(),
        })
    }

    fn failed(collection: &str) -> TaskOutcome {
        TaskOutcome::failed(collection, "q", RetrievalError::BackendUnavailable(collection.to_string()))
    }

    #[test]
    fn test_partial_failure_keeps_survivors_in_order() {
        let results = resolve(vec![ok("a"), failed("b"), ok("c")]).unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.collection.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn test_total_failure_is_one_error() {
        let err = resolve(vec![failed("a"), failed("b")]).unwrap_err();
        match err {
            RetrievalError::AllRetrievalFailed { failed, last_error } => {
                assert_eq!(failed, 2);
                assert!(last_error.contains('b'));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_no_tasks_is_empty_success() {
        assert!(resolve(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_degraded_counts_as_success() {
        let degraded = TaskOutcome::Degraded {
            result: TaskResult {
                collection: "a".into(),
                query: "q".into(),
                candidates: Vec::new(),
            },
            cause: RetrievalError::EmptyCorpus,
        };
        assert_eq!(resolve(vec![degraded, failed("b")]).unwrap().len(), 1);
    }

    #[test]
    fn test_decide_follows_policy() {
        let err = RetrievalError::hybrid("a", RetrievalError::EmptyCorpus);
        assert_eq!(decide(&err, FallbackPolicy { reissue_as_dense: true }), FallbackDecision::Reissue);
        assert_eq!(decide(&err, FallbackPolicy { reissue_as_dense: false }), FallbackDecision::Exclude);
    }
}
