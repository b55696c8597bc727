//! Onboarding provisioning agent.

use crate::agent::{Agent, AgentConfig, AgentContext, TaskResult};
use crate::error::Result;
use crate::storage::{HrStore, Notifier, employees_by_id};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Provisions accounts for pending new hires and tells their managers.
///
/// Records already flagged as provisioned are filtered out by the store, so
/// a repeated run touches nothing.
pub struct OnboardingAgent {
    config: AgentConfig,
    store: Arc<dyn HrStore>,
    notifier: Arc<dyn Notifier>,
}

impl OnboardingAgent {
    /// Agent with the default weekday-morning schedule.
    pub fn new(store: Arc<dyn HrStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config: AgentConfig::new(
                "onboarding",
                "Provision accounts for pending new hires",
            )
            .with_cron("0 6 * * 1-5"),
            store,
            notifier,
        }
    }
}

#[async_trait]
impl Agent for OnboardingAgent {
    fn config(&self) -> &AgentConfig {
        &self.config
    }

    async fn execute(&self, ctx: &AgentContext) -> Result<TaskResult> {
        let dry_run = ctx.flag("dry_run");
        let pending = self.store.pending_onboarding().await?;
        let employees = self.store.active_employees().await?;
        let by_id = employees_by_id(&employees);

        let mut provisioned = 0u32;
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        for record in &pending {
            debug!(
                "provisioning onboarding for {} (starts {})",
                record.employee_id, record.start_date
            );
            if dry_run {
                provisioned += 1;
                continue;
            }
            if let Err(e) = self.store.mark_provisioned(&record.employee_id).await {
                errors.push(format!("cannot provision {}: {e}", record.employee_id));
                continue;
            }
            provisioned += 1;

            match by_id.get(record.employee_id.as_str()).and_then(|e| e.manager_id.as_deref()) {
                Some(manager_id) => {
                    if let Err(e) = self
                        .notifier
                        .notify(
                            manager_id,
                            &format!(
                                "Accounts for your new hire {} (starting {}) are provisioned.",
                                record.employee_id, record.start_date
                            ),
                        )
                        .await
                    {
                        warnings.push(format!(
                            "provisioned {} but could not notify manager: {e}",
                            record.employee_id
                        ));
                    }
                }
                None => warnings.push(format!(
                    "no manager on record for new hire {}",
                    record.employee_id
                )),
            }
        }

        let data = json!({ "provisioned": provisioned, "pending": pending.len() });
        let result = if errors.is_empty() {
            TaskResult::ok_with_data(format!("provisioned {provisioned} new hire(s)"), data)
        } else {
            TaskResult::failed_with_errors(
                format!("provisioned {provisioned}, {} failure(s)", errors.len()),
                errors,
            )
        };
        Ok(result.with_warnings(warnings))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::storage::{Employee, MemoryHrStore, MemoryNotifier, OnboardingRecord};
    use chrono::NaiveDate;

    fn setup() -> (OnboardingAgent, Arc<MemoryHrStore>, Arc<MemoryNotifier>) {
        let store = Arc::new(MemoryHrStore::new());
        store.add_employee(Employee {
            id: "hire1".to_owned(),
            name: "New Hire".to_owned(),
            email: Some("hire1@x.test".to_owned()),
            manager_id: Some("mgr1".to_owned()),
            hire_date: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            pto_balance_days: 0.0,
        });
        store.add_onboarding(OnboardingRecord {
            employee_id: "hire1".to_owned(),
            start_date: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            provisioned: false,
        });
        let notifier = Arc::new(MemoryNotifier::new());
        let agent = OnboardingAgent::new(
            Arc::clone(&store) as Arc<dyn HrStore>,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
        );
        (agent, store, notifier)
    }

    #[tokio::test]
    async fn provisions_pending_and_notifies_manager() {
        let (agent, store, notifier) = setup();

        let result = agent.execute(&AgentContext::new()).await.expect("execute");
        assert!(result.success);
        assert_eq!(result.data.unwrap()["provisioned"], 1);
        assert!(store.onboarding_records()[0].provisioned);
        assert_eq!(notifier.sent()[0].0, "mgr1");
    }

    #[tokio::test]
    async fn second_run_has_nothing_to_do() {
        let (agent, _store, notifier) = setup();

        agent.execute(&AgentContext::new()).await.expect("first");
        let result = agent.execute(&AgentContext::new()).await.expect("second");
        assert!(result.success);
        assert_eq!(result.data.unwrap()["provisioned"], 0);
        assert_eq!(notifier.sent_count(), 1);
    }

    #[tokio::test]
    async fn dry_run_leaves_records_pending() {
        let (agent, store, notifier) = setup();

        let ctx = AgentContext::new().with("dry_run", true);
        let result = agent.execute(&ctx).await.expect("execute");
        assert_eq!(result.data.unwrap()["provisioned"], 1);
        assert!(!store.onboarding_records()[0].provisioned);
        assert_eq!(notifier.sent_count(), 0);
    }

    #[tokio::test]
    async fn missing_manager_is_a_warning() {
        let store = Arc::new(MemoryHrStore::new());
        store.add_onboarding(OnboardingRecord {
            employee_id: "orphan".to_owned(),
            start_date: NaiveDate::from_ymd_opt(2026, 9, 7).unwrap(),
            provisioned: false,
        });
        let notifier = Arc::new(MemoryNotifier::new());
        let agent = OnboardingAgent::new(store, notifier);

        let result = agent.execute(&AgentContext::new()).await.expect("execute");
        assert!(result.success);
        assert_eq!(result.warnings.len(), 1);
    }
}
