/// Concurrent fan-out over (collection × query) tasks.
///
/// Tasks are spawned onto the tokio runtime and gated by a semaphore, so at
/// most `max_concurrency` backend calls are in flight. Results are collected
/// by awaiting the handles in dispatch order (collection-major, query-minor),
/// which keeps downstream merging independent of completion order.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, warn};

use super::merge::TaskResult;
use crate::errors::RetrievalError;
use crate::types::{GetResult, Query};
use crate::vector::VectorIndex;

/// Typed result of one (collection, query) task.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    /// The requested strategy succeeded
    Success(TaskResult),
    /// Hybrid failed and the task was reissued as a plain dense search
    Degraded {
        result: TaskResult,
        cause: RetrievalError,
    },
    Failed {
        collection: String,
        query: String,
        error: RetrievalError,
    },
}

impl TaskOutcome {
    pub fn failed(collection: &str, query: &str, error: RetrievalError) -> Self {
        TaskOutcome::Failed {
            collection: collection.to_string(),
            query: query.to_string(),
            error,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TaskOutcome::Failed { .. })
    }

    pub fn result(&self) -> Option<&TaskResult> {
        match self {
            TaskOutcome::Success(result) | TaskOutcome::Degraded { result, .. } => Some(result),
            TaskOutcome::Failed { .. } => None,
        }
    }
}

/// All task outcomes of one fan-out, in dispatch order.
#[derive(Debug, Clone, Default)]
pub struct FanOutReport {
    pub outcomes: Vec<TaskOutcome>,
}

impl FanOutReport {
    /// Successful (including degraded) task results, in dispatch order.
    pub fn successes(&self) -> Vec<TaskResult> {
        self.outcomes.iter().filter_map(|o| o.result().cloned()).collect()
    }

    pub fn any_failed(&self) -> bool {
        self.outcomes.iter().any(TaskOutcome::is_failed)
    }
}

/// The Cartesian product of collections and queries, collection-major.
pub fn task_grid(collections: &[String], queries: &[Query]) -> Vec<(String, Query)> {
    collections
        .iter()
        .flat_map(|collection| queries.iter().map(move |query| (collection.clone(), query.clone())))
        .collect()
}

/// Run `jobs` with at most `max_concurrency` in flight; results come back in job order.
///
/// A job that panics or is cancelled yields `BackendUnavailable` without
/// affecting its siblings.
pub async fn run_bounded<T, Fut>(jobs: Vec<Fut>, max_concurrency: usize) -> Vec<Result<T, RetrievalError>>
where
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let handles: Vec<_> = jobs
        .into_iter()
        .map(|job| {
            let semaphore = Arc::clone(&semaphore);
            tokio::spawn(async move {
                // Held until the job completes; a closed semaphore just runs unbounded
                let _permit = semaphore.acquire_owned().await.ok();
                job.await
            })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.map_err(|e| {
            error!(error = %e, "Retrieval task aborted");
            RetrievalError::BackendUnavailable(format!("task aborted: {}", e))
        }));
    }
    results
}

/// Dispatch `op` for every (collection, query) pair and collect typed outcomes.
pub async fn fan_out<F, Fut>(
    collections: &[String],
    queries: &[Query],
    max_concurrency: usize,
    op: F,
) -> FanOutReport
where
    F: Fn(String, Query) -> Fut,
    Fut: Future<Output = TaskOutcome> + Send + 'static,
{
    let grid = task_grid(collections, queries);
    let jobs: Vec<Fut> = grid.iter().map(|(c, q)| op(c.clone(), q.clone())).collect();
    let results = run_bounded(jobs, max_concurrency).await;

    let outcomes = grid
        .into_iter()
        .zip(results)
        .map(|((collection, query), result)| {
            result.unwrap_or_else(|e| TaskOutcome::failed(&collection, &query.text, e))
        })
        .collect();
    FanOutReport { outcomes }
}

/// Fetch each collection's full snapshot once, concurrently.
///
/// A failed fetch maps to `CollectionDataUnavailable` for that collection
/// only; callers fail every task against it.
pub async fn fetch_snapshots(
    index: Arc<dyn VectorIndex>,
    collections: &[String],
    max_concurrency: usize,
) -> HashMap<String, Result<Arc<GetResult>, RetrievalError>> {
    let mut unique: Vec<String> = Vec::with_capacity(collections.len());
    for collection in collections {
        if !unique.contains(collection) {
            unique.push(collection.clone());
        }
    }

    let jobs: Vec<_> = unique
        .iter()
        .map(|collection| {
            let index = Arc::clone(&index);
            let collection = collection.clone();
            async move { index.get(&collection).await }
        })
        .collect();
    let results = run_bounded(jobs, max_concurrency).await;

    unique
        .into_iter()
        .zip(results)
        .map(|(collection, result)| {
            let snapshot = result.and_then(|inner| inner).map(Arc::new).map_err(|e| {
                warn!(collection = %collection, error = %e, "Failed to fetch collection snapshot");
                RetrievalError::CollectionDataUnavailable {
                    collection: collection.clone(),
                    reason: e.to_string(),
                }
            });
            (collection, snapshot)
        })
        .collect()
}
