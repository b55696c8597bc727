//! Bounded in-memory log of recent executions.
//!
//! Best-effort observability, not an audit trail: never persisted, oldest
//! entry evicted first once the cap is reached.

use crate::execution::Execution;
use std::collections::VecDeque;

/// Ring buffer of finished executions, appended in completion order.
#[derive(Debug)]
pub struct ExecutionHistory {
    entries: VecDeque<Execution>,
    limit: usize,
}

impl ExecutionHistory {
    /// Create a history buffer holding at most `limit` entries.
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(limit.min(1024)),
            limit: limit.max(1),
        }
    }

    /// Append an execution, evicting the oldest entry when over the cap.
    pub fn push(&mut self, execution: Execution) {
        if self.entries.len() == self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(execution);
    }

    /// Owned snapshot of the buffer, oldest first.
    pub fn snapshot(&self) -> Vec<Execution> {
        self.entries.iter().cloned().collect()
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
