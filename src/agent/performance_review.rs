//! Performance review generation agent.

use crate::agent::{Agent, AgentConfig, AgentContext, TaskResult};
use crate::error::Result;
use crate::storage::{HrStore, Notifier, PerformanceReview};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Employees hired less than this many days ago are not yet reviewed.
const MIN_TENURE_DAYS: i64 = 90;

/// Generates one review record per due employee per period.
///
/// The "already generated for this period" check is the agent's own
/// idempotency guard; the manager deliberately provides none.
pub struct PerformanceReviewAgent {
    config: AgentConfig,
    store: Arc<dyn HrStore>,
    notifier: Arc<dyn Notifier>,
}

impl PerformanceReviewAgent {
    /// Agent with the default quarterly kickoff schedule.
    pub fn new(store: Arc<dyn HrStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config: AgentConfig::new(
                "performance-review",
                "Generate performance review records for the current period",
            )
            .with_cron("0 7 1 1,4,7,10 *"),
            store,
            notifier,
        }
    }
}

/// Quarter label for a point in time, e.g. `"2026-Q3"`.
pub fn period_for(now: DateTime<Utc>) -> String {
    format!("{}-Q{}", now.year(), (now.month0() / 3) + 1)
}

#[async_trait]
impl Agent for PerformanceReviewAgent {
    fn config(&self) -> &AgentConfig {
        &self.config
    }

    async fn execute(&self, ctx: &AgentContext) -> Result<TaskResult> {
        let dry_run = ctx.flag("dry_run");
        let now = Utc::now();
        let period = ctx
            .str_value("period")
            .map_or_else(|| period_for(now), str::to_owned);

        let employees = self.store.active_employees().await?;
        let existing: HashSet<String> = self
            .store
            .reviews_for_period(&period)
            .await?
            .into_iter()
            .map(|r| r.employee_id)
            .collect();

        let mut created = 0u32;
        let mut skipped = 0u32;
        let mut errors = Vec::new();

        for employee in &employees {
            let tenure_days = (now.date_naive() - employee.hire_date).num_days();
            if tenure_days < MIN_TENURE_DAYS || existing.contains(&employee.id) {
                skipped += 1;
                continue;
            }
            debug!("generating {period} review for {}", employee.id);
            if dry_run {
                created += 1;
                continue;
            }
            let review = PerformanceReview {
                id: format!("{}-{period}", employee.id),
                employee_id: employee.id.clone(),
                period: period.clone(),
                created_at: now,
            };
            match self.store.create_review(review).await {
                Ok(()) => {
                    created += 1;
                    if let Some(manager_id) = &employee.manager_id {
                        // Best effort; a missed heads-up never fails the run.
                        let _ = self
                            .notifier
                            .notify(
                                manager_id,
                                &format!("{} review for {} is ready to fill in", period, employee.name),
                            )
                            .await;
                    }
                }
                Err(e) => errors.push(format!("cannot create review for {}: {e}", employee.id)),
            }
        }

        let data = json!({ "period": period, "created": created, "skipped": skipped });
        if errors.is_empty() {
            Ok(TaskResult::ok_with_data(
                format!("created {created} review(s) for {period}"),
                data,
            ))
        } else {
            Ok(TaskResult::failed_with_errors(
                format!("created {created} review(s), {} failure(s)", errors.len()),
                errors,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::storage::{Employee, MemoryHrStore, MemoryNotifier};
    use chrono::{NaiveDate, TimeZone};

    fn employee(id: &str, hire_date: NaiveDate, manager_id: Option<&str>) -> Employee {
        Employee {
            id: id.to_owned(),
            name: id.to_owned(),
            email: Some(format!("{id}@x.test")),
            manager_id: manager_id.map(str::to_owned),
            hire_date,
            pto_balance_days: 0.0,
        }
    }

    fn veteran(id: &str, manager_id: Option<&str>) -> Employee {
        employee(id, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), manager_id)
    }

    fn setup(employees: Vec<Employee>) -> (PerformanceReviewAgent, Arc<MemoryHrStore>, Arc<MemoryNotifier>) {
        let store = Arc::new(MemoryHrStore::new());
        for e in employees {
            store.add_employee(e);
        }
        let notifier = Arc::new(MemoryNotifier::new());
        let agent = PerformanceReviewAgent::new(
            Arc::clone(&store) as Arc<dyn HrStore>,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
        );
        (agent, store, notifier)
    }

    #[test]
    fn period_label_follows_quarter() {
        let t = Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap();
        assert_eq!(period_for(t), "2026-Q3");
        let t = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(period_for(t), "2026-Q1");
        let t = Utc.with_ymd_and_hms(2026, 12, 31, 23, 0, 0).unwrap();
        assert_eq!(period_for(t), "2026-Q4");
    }

    #[tokio::test]
    async fn creates_reviews_for_tenured_employees_only() {
        let recent_hire = Utc::now().date_naive();
        let (agent, store, _notifier) = setup(vec![
            veteran("e1", None),
            employee("e2", recent_hire, None),
        ]);

        let result = agent.execute(&AgentContext::new()).await.expect("execute");
        assert!(result.success);
        let data = result.data.unwrap();
        assert_eq!(data["created"], 1);
        assert_eq!(data["skipped"], 1);
        assert_eq!(store.reviews().len(), 1);
        assert_eq!(store.reviews()[0].employee_id, "e1");
    }

    #[tokio::test]
    async fn second_run_is_idempotent() {
        let (agent, store, _notifier) = setup(vec![veteran("e1", None)]);

        agent.execute(&AgentContext::new()).await.expect("first");
        let result = agent.execute(&AgentContext::new()).await.expect("second");
        assert!(result.success);
        assert_eq!(result.data.unwrap()["created"], 0);
        assert_eq!(store.reviews().len(), 1);
    }

    #[tokio::test]
    async fn manager_gets_a_heads_up() {
        let (agent, _store, notifier) = setup(vec![veteran("e1", Some("m1"))]);

        agent.execute(&AgentContext::new()).await.expect("execute");
        assert_eq!(notifier.sent_count(), 1);
        assert_eq!(notifier.sent()[0].0, "m1");
    }

    #[tokio::test]
    async fn dry_run_creates_nothing() {
        let (agent, store, _notifier) = setup(vec![veteran("e1", None)]);

        let ctx = AgentContext::new().with("dry_run", true);
        let result = agent.execute(&ctx).await.expect("execute");
        assert_eq!(result.data.unwrap()["created"], 1);
        assert!(store.reviews().is_empty());
    }

    #[tokio::test]
    async fn explicit_period_override() {
        let (agent, store, _notifier) = setup(vec![veteran("e1", None)]);

        let ctx = AgentContext::new().with("period", "2025-Q4");
        agent.execute(&ctx).await.expect("execute");
        assert_eq!(store.reviews()[0].period, "2025-Q4");
    }
}
