//! External collaborator boundaries.
//!
//! The relational data-access layer and the notification service live
//! outside this crate; agents see them only through the [`HrStore`] and
//! [`Notifier`] traits. The in-memory implementations here back the tests
//! and the demo daemon.

use crate::error::{AgentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// An employee record as the agents see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    /// Stable employee id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Contact address; may be missing for freshly imported records.
    pub email: Option<String>,
    /// Manager's employee id, if any.
    pub manager_id: Option<String>,
    /// First day of employment.
    pub hire_date: NaiveDate,
    /// Current PTO balance in days.
    pub pto_balance_days: f32,
}

/// A document attached to an employee (contract, id, certification, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeDocument {
    /// Stable document id.
    pub id: String,
    /// Owning employee id.
    pub employee_id: String,
    /// Document kind, lowercased (e.g. `"contract"`, `"id"`, `"visa"`).
    pub kind: String,
    /// Expiration date; `None` means the document never expires.
    pub expires_at: Option<NaiveDate>,
}

/// A generated performance review record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReview {
    /// Stable review id.
    pub id: String,
    /// Reviewed employee id.
    pub employee_id: String,
    /// Review period label, e.g. `"2026-Q3"`.
    pub period: String,
    /// When the record was generated.
    pub created_at: DateTime<Utc>,
}

/// Provisioning state for a new hire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnboardingRecord {
    /// Employee id of the new hire.
    pub employee_id: String,
    /// First day of employment.
    pub start_date: NaiveDate,
    /// Whether accounts and equipment have been provisioned.
    pub provisioned: bool,
}

/// Read/write access to the HR records the built-in agents work on.
#[async_trait]
pub trait HrStore: Send + Sync {
    /// All currently employed people.
    async fn active_employees(&self) -> Result<Vec<Employee>>;

    /// All employee documents.
    async fn documents(&self) -> Result<Vec<EmployeeDocument>>;

    /// Reviews already generated for `period`.
    async fn reviews_for_period(&self, period: &str) -> Result<Vec<PerformanceReview>>;

    /// Persist a newly generated review.
    async fn create_review(&self, review: PerformanceReview) -> Result<()>;

    /// Onboarding records not yet provisioned.
    async fn pending_onboarding(&self) -> Result<Vec<OnboardingRecord>>;

    /// Flag an onboarding record as provisioned.
    async fn mark_provisioned(&self, employee_id: &str) -> Result<()>;
}

/// Delivery of "notify user X with message Y".
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send `message` to the user identified by `user_id`.
    async fn notify(&self, user_id: &str, message: &str) -> Result<()>;
}

/// In-memory [`HrStore`] used by tests and the demo daemon.
#[derive(Default)]
pub struct MemoryHrStore {
    inner: Mutex<MemoryHrData>,
}

#[derive(Default)]
struct MemoryHrData {
    employees: Vec<Employee>,
    documents: Vec<EmployeeDocument>,
    reviews: Vec<PerformanceReview>,
    onboarding: Vec<OnboardingRecord>,
}

impl MemoryHrStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an employee record.
    pub fn add_employee(&self, employee: Employee) {
        self.lock().employees.push(employee);
    }

    /// Insert a document record.
    pub fn add_document(&self, document: EmployeeDocument) {
        self.lock().documents.push(document);
    }

    /// Insert an onboarding record.
    pub fn add_onboarding(&self, record: OnboardingRecord) {
        self.lock().onboarding.push(record);
    }

    /// All reviews created so far, regardless of period.
    pub fn reviews(&self) -> Vec<PerformanceReview> {
        self.lock().reviews.clone()
    }

    /// Onboarding records, including provisioned ones.
    pub fn onboarding_records(&self) -> Vec<OnboardingRecord> {
        self.lock().onboarding.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryHrData> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl HrStore for MemoryHrStore {
    async fn active_employees(&self) -> Result<Vec<Employee>> {
        Ok(self.lock().employees.clone())
    }

    async fn documents(&self) -> Result<Vec<EmployeeDocument>> {
        Ok(self.lock().documents.clone())
    }

    async fn reviews_for_period(&self, period: &str) -> Result<Vec<PerformanceReview>> {
        Ok(self
            .lock()
            .reviews
            .iter()
            .filter(|r| r.period == period)
            .cloned()
            .collect())
    }

    async fn create_review(&self, review: PerformanceReview) -> Result<()> {
        self.lock().reviews.push(review);
        Ok(())
    }

    async fn pending_onboarding(&self) -> Result<Vec<OnboardingRecord>> {
        Ok(self
            .lock()
            .onboarding
            .iter()
            .filter(|r| !r.provisioned)
            .cloned()
            .collect())
    }

    async fn mark_provisioned(&self, employee_id: &str) -> Result<()> {
        let mut data = self.lock();
        match data
            .onboarding
            .iter_mut()
            .find(|r| r.employee_id == employee_id)
        {
            Some(record) => {
                record.provisioned = true;
                Ok(())
            }
            None => Err(AgentError::Store(format!(
                "no onboarding record for employee {employee_id}"
            ))),
        }
    }
}

/// In-memory [`Notifier`] that records every message it is asked to send.
#[derive(Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<(String, String)>>,
    fail: Mutex<bool>,
}

impl MemoryNotifier {
    /// Create a notifier that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `notify` call fail (for failure-path tests).
    pub fn fail_all(&self) {
        *self.fail.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    /// Messages sent so far as `(user_id, message)` pairs.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of messages sent so far.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, user_id: &str, message: &str) -> Result<()> {
        if *self.fail.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(AgentError::Notify(format!(
                "delivery to {user_id} refused"
            )));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((user_id.to_owned(), message.to_owned()));
        Ok(())
    }
}

/// Employee id → employee map, handy for agents that resolve managers.
pub fn employees_by_id(employees: &[Employee]) -> HashMap<&str, &Employee> {
    employees.iter().map(|e| (e.id.as_str(), e)).collect()
}
