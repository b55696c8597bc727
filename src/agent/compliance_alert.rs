//! Compliance alert agent.
//!
//! Every active employee must hold a current document of each required
//! kind; anyone missing one, or holding only expired ones, produces an
//! alert to themselves and their manager.

use crate::agent::{Agent, AgentConfig, AgentContext, Priority, TaskResult};
use crate::error::Result;
use crate::storage::{HrStore, Notifier};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

fn default_required_kinds() -> Vec<String> {
    vec!["contract".to_owned(), "id".to_owned()]
}

/// Flags employees who are missing required, current documents.
pub struct ComplianceAlertAgent {
    config: AgentConfig,
    store: Arc<dyn HrStore>,
    notifier: Arc<dyn Notifier>,
    required_kinds: Vec<String>,
}

impl ComplianceAlertAgent {
    /// Agent with the default weekly schedule and required kinds.
    pub fn new(store: Arc<dyn HrStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config: AgentConfig::new(
                "compliance-alerts",
                "Alert on employees missing required current documents",
            )
            .with_cron("0 7 * * 1")
            .with_priority(Priority::High),
            store,
            notifier,
            required_kinds: default_required_kinds(),
        }
    }

    /// Override the required document kinds.
    #[must_use]
    pub fn with_required_kinds(mut self, kinds: Vec<String>) -> Self {
        self.required_kinds = kinds;
        self
    }
}

#[async_trait]
impl Agent for ComplianceAlertAgent {
    fn config(&self) -> &AgentConfig {
        &self.config
    }

    async fn execute(&self, ctx: &AgentContext) -> Result<TaskResult> {
        let dry_run = ctx.flag("dry_run");
        let today = Utc::now().date_naive();

        let employees = self.store.active_employees().await?;
        let documents = self.store.documents().await?;

        // Kinds each employee currently holds in valid (unexpired) form.
        let mut valid_kinds: HashSet<(&str, &str)> = HashSet::new();
        for doc in &documents {
            let current = doc.expires_at.is_none_or(|d| d >= today);
            if current {
                valid_kinds.insert((doc.employee_id.as_str(), doc.kind.as_str()));
            }
        }

        let mut alerts = 0u32;
        let mut errors = Vec::new();

        for employee in &employees {
            let missing: Vec<&str> = self
                .required_kinds
                .iter()
                .map(String::as_str)
                .filter(|kind| !valid_kinds.contains(&(employee.id.as_str(), kind)))
                .collect();
            if missing.is_empty() {
                continue;
            }
            alerts += 1;
            debug!("compliance gap for {}: missing {missing:?}", employee.id);
            if dry_run {
                continue;
            }
            let message = format!(
                "Compliance alert: missing or expired required document(s): {}.",
                missing.join(", ")
            );
            if let Err(e) = self.notifier.notify(&employee.id, &message).await {
                errors.push(format!("cannot alert {}: {e}", employee.id));
            }
            if let Some(manager_id) = &employee.manager_id {
                let _ = self
                    .notifier
                    .notify(
                        manager_id,
                        &format!("{} has a compliance gap: {}", employee.name, missing.join(", ")),
                    )
                    .await;
            }
        }

        let data = json!({ "alerts": alerts, "required": self.required_kinds });
        if errors.is_empty() {
            Ok(TaskResult::ok_with_data(
                format!("{alerts} compliance alert(s) raised"),
                data,
            ))
        } else {
            Ok(TaskResult::failed_with_errors(
                format!("{} alert delivery failure(s)", errors.len()),
                errors,
            ))
        }
    }
}
