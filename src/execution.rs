//! Execution records: one per run attempt.

use crate::agent::TaskResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle state of a single run attempt.
///
/// Transitions only forward: `Running` → `Completed` | `Failed`. A finished
/// execution is never mutated again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// The task is in flight.
    Running,
    /// The task finished with a successful result.
    Completed,
    /// The task finished with a failed result or a raised error.
    Failed,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One attempt to run a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    /// Execution id: task name, start timestamp in epoch milliseconds, and
    /// a per-process sequence number. The sequence keeps ids unique even
    /// when two runs of the same task start in the same millisecond.
    pub id: String,
    /// Name of the task that ran.
    pub task_name: String,
    /// When the run was initiated.
    pub started_at: DateTime<Utc>,
    /// When the run finished; absent while running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Current lifecycle state.
    pub status: ExecutionStatus,
    /// The task's result once finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    /// Error raised by the run itself (not just the task's internal logic).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);

impl Execution {
    /// Start a new running execution for `task_name` at `started_at`.
    pub fn begin(task_name: &str, started_at: DateTime<Utc>) -> Self {
        let seq = NEXT_SEQ.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!("{task_name}-{}-{seq}", started_at.timestamp_millis()),
            task_name: task_name.to_owned(),
            started_at,
            finished_at: None,
            status: ExecutionStatus::Running,
            result: None,
            error: None,
        }
    }
}
