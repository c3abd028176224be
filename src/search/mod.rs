/// Multi-collection search: concurrent fan-out, per-task fallback and the
/// cross-collection merge.

pub mod fallback;
pub mod fanout;
pub mod merge;

// Re-export key types for convenience
pub use fallback::{decide, resolve, FallbackDecision, FallbackPolicy};
pub use fanout::{fan_out, fetch_snapshots, run_bounded, task_grid, FanOutReport, TaskOutcome};
pub use merge::{content_hash, merge_and_sort, merge_get_results, MergeRequest, TaskResult};
