//! Document expiration monitoring agent.

use crate::agent::{Agent, AgentConfig, AgentContext, Priority, TaskResult};
use crate::error::Result;
use crate::storage::{HrStore, Notifier};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Default lead time for expiration warnings, in days.
const DEFAULT_WARNING_WINDOW_DAYS: i64 = 30;

/// Watches employee documents and warns owners before (and after) expiry.
pub struct DocExpiryAgent {
    config: AgentConfig,
    store: Arc<dyn HrStore>,
    notifier: Arc<dyn Notifier>,
    warning_window_days: i64,
}

impl DocExpiryAgent {
    /// Agent with the default daily schedule and 30-day warning window.
    pub fn new(store: Arc<dyn HrStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config: AgentConfig::new(
                "doc-expiry",
                "Warn about employee documents that are expiring or expired",
            )
            .with_cron("0 8 * * *")
            .with_priority(Priority::High),
            store,
            notifier,
            warning_window_days: DEFAULT_WARNING_WINDOW_DAYS,
        }
    }

    /// Override the warning window.
    #[must_use]
    pub fn with_warning_window_days(mut self, days: i64) -> Self {
        self.warning_window_days = days;
        self
    }
}

#[async_trait]
impl Agent for DocExpiryAgent {
    fn config(&self) -> &AgentConfig {
        &self.config
    }

    async fn execute(&self, ctx: &AgentContext) -> Result<TaskResult> {
        let dry_run = ctx.flag("dry_run");
        let window = ctx
            .get("window_days")
            .and_then(serde_json::Value::as_i64)
            .unwrap_or(self.warning_window_days);

        let today = Utc::now().date_naive();
        let documents = self.store.documents().await?;

        let mut expiring = 0u32;
        let mut expired = 0u32;
        let mut errors = Vec::new();

        for doc in &documents {
            let Some(expires_at) = doc.expires_at else {
                continue;
            };
            let days_left = (expires_at - today).num_days();
            let message = if days_left < 0 {
                expired += 1;
                format!(
                    "Your {} document expired on {expires_at}. Please renew it immediately.",
                    doc.kind
                )
            } else if days_left <= window {
                expiring += 1;
                format!(
                    "Your {} document expires on {expires_at} ({days_left} day(s) left).",
                    doc.kind
                )
            } else {
                continue;
            };

            debug!("document {} for {}: {days_left} day(s) left", doc.id, doc.employee_id);
            if dry_run {
                continue;
            }
            if let Err(e) = self.notifier.notify(&doc.employee_id, &message).await {
                errors.push(format!("cannot notify {} about {}: {e}", doc.employee_id, doc.id));
            }
        }

        let data = json!({ "expiring": expiring, "expired": expired, "window_days": window });
        if errors.is_empty() {
            Ok(TaskResult::ok_with_data(
                format!("{expiring} document(s) expiring, {expired} expired"),
                data,
            ))
        } else {
            Ok(TaskResult::failed_with_errors(
                format!("{} notification failure(s)", errors.len()),
                errors,
            ))
        }
    }
}
