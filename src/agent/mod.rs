//! Task units ("agents") and their execution contract.
//!
//! An agent is a named, independently schedulable piece of background work.
//! It exposes a single async `execute` entrypoint and an immutable
//! [`AgentConfig`]; the manager owns everything else (enable state, timers,
//! history, persistence).

pub mod compliance_alert;
pub mod doc_expiry;
pub mod onboarding;
pub mod performance_review;
pub mod pto_reminder;

use crate::error::Result;
use crate::schedule::Schedule;
use crate::storage::{HrStore, Notifier};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub use compliance_alert::ComplianceAlertAgent;
pub use doc_expiry::DocExpiryAgent;
pub use onboarding::OnboardingAgent;
pub use performance_review::PerformanceReviewAgent;
pub use pto_reminder::PtoReminderAgent;

/// Informational priority label carried in status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Routine maintenance work.
    Low,
    /// Default.
    #[default]
    Normal,
    /// Time-sensitive work (compliance, expirations).
    High,
}

/// Immutable configuration owned by each agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Unique task name; the registry, state store, and timers all key on it.
    pub name: String,
    /// Human description for status reporting.
    pub description: String,
    /// Initial enabled default; persisted state wins on restart.
    pub enabled: bool,
    /// When the task fires on its own.
    pub schedule: Schedule,
    /// Informational priority.
    pub priority: Priority,
    /// Declared retry budget. Carried as metadata only; the coordinator
    /// does not retry automatically.
    pub retry_attempts: u32,
    /// Declared execution timeout. Metadata only; in-flight runs are never
    /// forcibly cut off.
    pub timeout: Duration,
}

impl AgentConfig {
    /// New enabled, manual-only config with default priority and limits.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            enabled: true,
            schedule: Schedule::Manual,
            priority: Priority::Normal,
            retry_attempts: 0,
            timeout: Duration::from_secs(300),
        }
    }

    /// Set a cron schedule. An unparsable expression degrades to
    /// [`Schedule::Invalid`] without failing construction.
    #[must_use]
    pub fn with_cron(mut self, expr: &str) -> Self {
        self.schedule = Schedule::parse(expr);
        self
    }

    /// Mark the task manual-only.
    #[must_use]
    pub fn manual_only(mut self) -> Self {
        self.schedule = Schedule::Manual;
        self
    }

    /// Start out disabled.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Set the informational priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the declared retry budget.
    #[must_use]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Set the declared timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Arbitrary key-value data supplied per run and merged over the agent's
/// own base context before `execute`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentContext {
    values: HashMap<String, serde_json::Value>,
}

impl AgentContext {
    /// Empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Insert or replace a value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Raw value lookup.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// `true` only when `key` holds JSON `true`.
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.values.get(key), Some(serde_json::Value::Bool(true)))
    }

    /// String lookup.
    pub fn str_value(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(serde_json::Value::as_str)
    }

    /// This context with `overlay`'s entries written over it.
    #[must_use]
    pub fn merged(&self, overlay: Option<&AgentContext>) -> AgentContext {
        let mut merged = self.clone();
        if let Some(overlay) = overlay {
            for (key, value) in &overlay.values {
                merged.values.insert(key.clone(), value.clone());
            }
        }
        merged
    }

    /// Whether the context carries no entries.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Outcome of one task execution.
///
/// Produced regardless of how the run went; a task never lets a fault
/// escape its own boundary as anything other than a failed result or a
/// typed error the coordinator converts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Whether the task achieved what it set out to do.
    pub success: bool,
    /// Human summary.
    pub message: String,
    /// Optional structured payload (counts, ids).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Non-fatal observations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Error details when `success` is false.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl TaskResult {
    /// Successful result with a message.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Successful result with a structured payload.
    pub fn ok_with_data(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            ..Self::ok(message)
        }
    }

    /// Failed result with a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Failed result with error details.
    pub fn failed_with_errors(message: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            errors,
            ..Self::failed(message)
        }
    }

    /// Attach warnings.
    #[must_use]
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// The task-unit contract.
///
/// `Ok` with `success = false` is a task-internal logical failure; `Err` is
/// a fault of the run itself. The coordinator converts both into failed
/// executions; neither crosses its boundary as a panic or unhandled error.
/// Implementations must be idempotency-safe: running twice in the same
/// period may repeat side effects but must not compound them.
#[async_trait]
pub trait Agent: Send + Sync {
    /// The agent's immutable configuration.
    fn config(&self) -> &AgentConfig;

    /// Context the agent contributes to every run; per-run context is
    /// merged over it.
    fn base_context(&self) -> AgentContext {
        AgentContext::new()
    }

    /// Perform the work.
    async fn execute(&self, ctx: &AgentContext) -> Result<TaskResult>;

    /// Unique task name (from config).
    fn name(&self) -> &str {
        &self.config().name
    }
}

/// The five built-in HR agents wired to the given collaborators.
pub fn builtin_agents(
    store: Arc<dyn HrStore>,
    notifier: Arc<dyn Notifier>,
) -> Vec<Arc<dyn Agent>> {
    vec![
        Arc::new(PtoReminderAgent::new(Arc::clone(&store), Arc::clone(&notifier))),
        Arc::new(PerformanceReviewAgent::new(Arc::clone(&store), Arc::clone(&notifier))),
        Arc::new(DocExpiryAgent::new(Arc::clone(&store), Arc::clone(&notifier))),
        Arc::new(OnboardingAgent::new(Arc::clone(&store), Arc::clone(&notifier))),
        Arc::new(ComplianceAlertAgent::new(store, notifier)),
    ]
}
