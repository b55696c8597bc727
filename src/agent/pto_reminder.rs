//! PTO balance reminder agent.

use crate::agent::{Agent, AgentConfig, AgentContext, Priority, TaskResult};
use crate::error::Result;
use crate::storage::{HrStore, Notifier};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Default balance (in days) above which an employee gets a reminder.
const DEFAULT_THRESHOLD_DAYS: f32 = 15.0;

/// Reminds employees with a large unused PTO balance to take time off.
///
/// Sending the same reminder twice in a period is harmless (redundant mail,
/// no state compounds), which is the idempotency bar the manager expects.
pub struct PtoReminderAgent {
    config: AgentConfig,
    store: Arc<dyn HrStore>,
    notifier: Arc<dyn Notifier>,
    threshold_days: f32,
}

impl PtoReminderAgent {
    /// Agent with the default monthly schedule and threshold.
    pub fn new(store: Arc<dyn HrStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config: AgentConfig::new(
                "pto-reminder",
                "Remind employees with high PTO balances to schedule time off",
            )
            .with_cron("0 9 1 * *")
            .with_priority(Priority::Low),
            store,
            notifier,
            threshold_days: DEFAULT_THRESHOLD_DAYS,
        }
    }

    /// Override the reminder threshold.
    #[must_use]
    pub fn with_threshold_days(mut self, days: f32) -> Self {
        self.threshold_days = days;
        self
    }
}

#[async_trait]
impl Agent for PtoReminderAgent {
    fn config(&self) -> &AgentConfig {
        &self.config
    }

    async fn execute(&self, ctx: &AgentContext) -> Result<TaskResult> {
        let dry_run = ctx.flag("dry_run");
        let threshold = ctx
            .get("threshold_days")
            .and_then(serde_json::Value::as_f64)
            .map_or(self.threshold_days, |v| v as f32);

        let employees = self.store.active_employees().await?;
        let mut reminded = 0u32;
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        for employee in &employees {
            if employee.pto_balance_days <= threshold {
                continue;
            }
            let Some(email) = &employee.email else {
                warnings.push(format!(
                    "employee {} has no contact address, skipping reminder",
                    employee.id
                ));
                continue;
            };
            debug!(
                "PTO reminder for {} ({} days banked, contact {email})",
                employee.id, employee.pto_balance_days
            );
            if dry_run {
                reminded += 1;
                continue;
            }
            let message = format!(
                "You have {:.1} unused PTO days. Please schedule time off before year end.",
                employee.pto_balance_days
            );
            match self.notifier.notify(&employee.id, &message).await {
                Ok(()) => reminded += 1,
                Err(e) => errors.push(format!("cannot remind {}: {e}", employee.id)),
            }
        }

        let data = json!({ "reminded": reminded, "threshold_days": threshold });
        let result = if errors.is_empty() {
            TaskResult::ok_with_data(format!("reminded {reminded} employee(s)"), data)
        } else {
            TaskResult::failed_with_errors(
                format!("reminded {reminded} employee(s), {} delivery failure(s)", errors.len()),
                errors,
            )
        };
        Ok(result.with_warnings(warnings))
    }
}
