//! Error types for the agent scheduler.

/// Top-level error type for the background agent system.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Configuration load/save error.
    #[error("config error: {0}")]
    Config(String),

    /// Schedule expression or timer error.
    #[error("schedule error: {0}")]
    Schedule(String),

    /// Durable task-state persistence error.
    #[error("state error: {0}")]
    State(String),

    /// A run was requested for a task name that was never registered.
    ///
    /// This is a caller programming error, not an operational condition; it is
    /// the one run-path failure surfaced as an error instead of a failed
    /// [`TaskResult`](crate::agent::TaskResult).
    #[error("unknown task: {0}")]
    UnknownTask(String),

    /// HR data-access error reported by a collaborator.
    #[error("store error: {0}")]
    Store(String),

    /// Notification delivery error reported by a collaborator.
    #[error("notify error: {0}")]
    Notify(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AgentError>;
