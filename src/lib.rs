//! HRFlow background agent scheduler.
//!
//! Runs named, independently schedulable units of HR back-office work
//! (PTO reminders, performance-review generation, document-expiration
//! monitoring, onboarding provisioning, compliance alerts) on cron
//! schedules or on demand.
//!
//! # Architecture
//!
//! - **Agents**: task units implementing the [`Agent`] contract, each with
//!   its own immutable [`AgentConfig`]
//! - **Schedule engine**: cron parsing and per-task recurring timers
//! - **Manager**: the execution coordinator: registry, concurrency
//!   ceiling, outcome recording, lifecycle events
//! - **State store**: durable JSON map of enable/disable flags and
//!   last-run summaries, surviving restarts
//! - **History**: bounded in-memory log of recent executions
//!
//! Single process only: the manager coordinates work inside one running
//! service and makes no cross-node guarantees.

pub mod agent;
pub mod config;
pub mod error;
pub mod events;
pub mod execution;
pub mod history;
pub mod manager;
pub mod schedule;
pub mod state;
pub mod storage;

pub use agent::{Agent, AgentConfig, AgentContext, TaskResult, builtin_agents};
pub use config::SchedulerConfig;
pub use error::{AgentError, Result};
pub use events::{AgentEvent, AgentEventKind};
pub use execution::{Execution, ExecutionStatus};
pub use manager::{AgentManager, TaskStatus};
pub use schedule::Schedule;
pub use state::PersistedTaskState;
