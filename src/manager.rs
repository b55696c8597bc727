//! Execution coordinator: the agent manager.
//!
//! Owns the registry of task units, fires them on timer or on demand,
//! enforces the global concurrency ceiling, records outcomes in the bounded
//! history, persists per-task durable state, and emits lifecycle events.
//!
//! All runs, whether timer fires or manual invocations, funnel through
//! [`AgentManager::run_task`].

use crate::agent::{Agent, AgentContext, TaskResult};
use crate::config::SchedulerConfig;
use crate::error::{AgentError, Result};
use crate::events::{AgentEvent, EventBus};
use crate::execution::{Execution, ExecutionStatus};
use crate::history::ExecutionHistory;
use crate::schedule::{Schedule, TimerRegistry};
use crate::state::{LastRunSummary, PersistedTaskState, StateStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// One registry entry: the agent instance plus the state the coordinator
/// owns for it (live enabled flag, effective schedule).
struct RegisteredAgent {
    agent: Arc<dyn Agent>,
    enabled: AtomicBool,
    schedule: Schedule,
}

/// Read-only status projection for one task.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    /// Task name.
    pub name: String,
    /// Human description from the agent's config.
    pub description: String,
    /// Live enabled flag.
    pub enabled: bool,
    /// Schedule expression (or `manual-only` / invalid marker).
    pub schedule: String,
    /// Whether a recurring timer is currently armed.
    pub scheduled: bool,
    /// Whether a run is in flight right now.
    pub running: bool,
    /// Summary of the most recently finished run, from durable state.
    pub last_run: Option<LastRunSummary>,
    /// Computed next fire time; `None` for manual or invalid schedules.
    pub next_run: Option<DateTime<Utc>>,
}

struct ManagerInner {
    config: SchedulerConfig,
    agents: Mutex<HashMap<String, Arc<RegisteredAgent>>>,
    /// Registration order, driving `run_all` initiation order.
    order: Mutex<Vec<String>>,
    timers: TimerRegistry,
    state: StateStore,
    history: Mutex<ExecutionHistory>,
    /// In-flight executions keyed by execution id.
    running: Mutex<HashMap<String, Execution>>,
    in_flight: AtomicUsize,
    /// Gates timer fires only; manual runs ignore it.
    scheduler_active: AtomicBool,
    shut_down: AtomicBool,
    events: EventBus,
}

/// The agent manager. Cheap to clone; all clones share one coordinator.
#[derive(Clone)]
pub struct AgentManager {
    inner: Arc<ManagerInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Releases one concurrency slot on drop, so neither success, failure, nor
/// an early return can leak the ceiling.
struct SlotGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> SlotGuard<'a> {
    fn acquire(counter: &'a AtomicUsize, ceiling: usize) -> Option<Self> {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < ceiling).then_some(n + 1)
            })
            .ok()
            .map(|_| Self { counter })
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AgentManager {
    /// Create a manager, loading durable task state from the configured
    /// path (a missing file is a valid fresh install).
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        let state = StateStore::load(config.state_path.clone())?;
        let history = ExecutionHistory::new(config.history_limit);
        Ok(Self {
            inner: Arc::new(ManagerInner {
                config,
                agents: Mutex::new(HashMap::new()),
                order: Mutex::new(Vec::new()),
                timers: TimerRegistry::new(),
                state,
                history: Mutex::new(history),
                running: Mutex::new(HashMap::new()),
                in_flight: AtomicUsize::new(0),
                scheduler_active: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
                events: EventBus::new(),
            }),
        })
    }

    /// Register a task unit.
    ///
    /// Reconciles the enabled flag with persisted state (persisted wins),
    /// applies any configured schedule override, and arms the timer when
    /// the task is enabled and schedulable. Re-registration under the same
    /// name replaces the instance but keeps its persisted state and its
    /// registration-order slot.
    ///
    /// Must be called inside a tokio runtime (timer arming spawns).
    pub fn register(&self, agent: Arc<dyn Agent>) {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            warn!("ignoring registration of '{}' after shutdown", agent.name());
            return;
        }

        let config = agent.config();
        let name = config.name.clone();

        let schedule = match self.inner.config.schedule_overrides.get(&name) {
            Some(expr) => {
                debug!("schedule override for '{name}': {expr}");
                Schedule::parse(expr)
            }
            None => config.schedule.clone(),
        };

        let enabled = match self.inner.state.get(&name) {
            Some(persisted) => persisted.is_active,
            None => {
                if let Err(e) = self.inner.state.observe(&name, config.enabled) {
                    error!("cannot seed state for '{name}': {e}");
                }
                config.enabled
            }
        };

        let entry = Arc::new(RegisteredAgent {
            agent,
            enabled: AtomicBool::new(enabled),
            schedule: schedule.clone(),
        });

        let replaced = lock(&self.inner.agents)
            .insert(name.clone(), entry)
            .is_some();
        if !replaced {
            lock(&self.inner.order).push(name.clone());
        }

        info!("registered task '{name}' (enabled: {enabled}, schedule: {schedule})");

        if enabled {
            self.arm_timer(&name, schedule);
        } else {
            self.inner.timers.disarm(&name);
        }
    }

    fn arm_timer(&self, name: &str, schedule: Schedule) {
        let weak: Weak<ManagerInner> = Arc::downgrade(&self.inner);
        let task_name = name.to_owned();
        self.inner.timers.arm(name, schedule, move || {
            let weak = weak.clone();
            let task_name = task_name.clone();
            async move {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if !inner.scheduler_active.load(Ordering::SeqCst) {
                    debug!("scheduler stopped; skipping timer fire for '{task_name}'");
                    return;
                }
                let manager = AgentManager { inner };
                match manager.run_task(&task_name, None).await {
                    Ok(result) if !result.success => {
                        warn!("scheduled run of '{task_name}' failed: {}", result.message);
                    }
                    Ok(_) => {}
                    Err(e) => warn!("scheduled run of '{task_name}' rejected: {e}"),
                }
            }
        });
    }

    /// Run one task now.
    ///
    /// Operational rejections (manager globally disabled, concurrency
    /// ceiling reached) come back as failed [`TaskResult`]s without the
    /// task ever executing. An unknown task name is a caller defect and
    /// returns [`AgentError::UnknownTask`] instead.
    pub async fn run_task(
        &self,
        name: &str,
        context: Option<AgentContext>,
    ) -> Result<TaskResult> {
        let entry = lock(&self.inner.agents)
            .get(name)
            .cloned()
            .ok_or_else(|| AgentError::UnknownTask(name.to_owned()))?;

        if !self.inner.config.enabled {
            debug!("manager globally disabled; rejecting run of '{name}'");
            return Ok(TaskResult::failed(
                "task scheduler is globally disabled",
            ));
        }

        let ceiling = self.inner.config.max_concurrent;
        let Some(slot) = SlotGuard::acquire(&self.inner.in_flight, ceiling) else {
            warn!("concurrency ceiling reached; rejecting run of '{name}'");
            return Ok(TaskResult::failed(format!(
                "concurrency limit reached ({ceiling} execution(s) already in flight)"
            )));
        };

        let mut execution = Execution::begin(name, Utc::now());
        lock(&self.inner.running).insert(execution.id.clone(), execution.clone());
        self.inner.events.emit(AgentEvent::started(execution.clone()));
        debug!("executing task '{name}' ({})", execution.id);

        let ctx = entry.agent.base_context().merged(context.as_ref());
        let outcome = entry.agent.execute(&ctx).await;
        drop(slot);

        let finished_at = Utc::now();
        let (result, run_error) = match outcome {
            Ok(result) => (result, None),
            Err(e) => {
                let detail = e.to_string();
                warn!("task '{name}' raised: {detail}");
                (
                    TaskResult::failed_with_errors(
                        "task execution raised an error",
                        vec![detail.clone()],
                    ),
                    Some(detail),
                )
            }
        };

        execution.finished_at = Some(finished_at);
        execution.status = if result.success {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Failed
        };
        execution.result = Some(result.clone());
        execution.error = run_error;

        lock(&self.inner.running).remove(&execution.id);
        lock(&self.inner.history).push(execution.clone());

        let enabled_now = entry.enabled.load(Ordering::SeqCst);
        if let Err(e) = self.inner.state.record_run(
            name,
            enabled_now,
            finished_at,
            &execution.status.to_string(),
            result.success,
        ) {
            error!("cannot persist state for '{name}': {e}");
        }

        self.inner
            .events
            .emit(AgentEvent::finished(execution, result.success));

        if result.success {
            debug!("task '{name}' completed: {}", result.message);
        } else {
            info!("task '{name}' failed: {}", result.message);
        }
        Ok(result)
    }

    /// Run every enabled task sequentially, in registration order.
    ///
    /// One task's failure never stops the others; the returned map holds
    /// one result per enabled task.
    pub async fn run_all(&self, context: Option<AgentContext>) -> HashMap<String, TaskResult> {
        let names: Vec<String> = {
            let agents = lock(&self.inner.agents);
            lock(&self.inner.order)
                .iter()
                .filter(|name| {
                    agents
                        .get(*name)
                        .is_some_and(|entry| entry.enabled.load(Ordering::SeqCst))
                })
                .cloned()
                .collect()
        };

        let mut results = HashMap::with_capacity(names.len());
        for name in names {
            match self.run_task(&name, context.clone()).await {
                Ok(result) => {
                    results.insert(name, result);
                }
                // Unregistered mid-loop; nothing left to run under that name.
                Err(e) => warn!("skipping '{name}' during run_all: {e}"),
            }
        }
        results
    }

    /// Enable a task: flip the flag, persist it, re-arm its timer.
    /// Calling it twice is equivalent to calling it once.
    pub fn enable_task(&self, name: &str) -> Result<()> {
        let entry = lock(&self.inner.agents)
            .get(name)
            .cloned()
            .ok_or_else(|| AgentError::UnknownTask(name.to_owned()))?;

        if entry.enabled.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.state.set_active(name, true)?;
        self.arm_timer(name, entry.schedule.clone());
        info!("task '{name}' enabled");
        Ok(())
    }

    /// Disable a task: flip the flag, persist it, tear down its timer.
    /// Idempotent like [`AgentManager::enable_task`].
    pub fn disable_task(&self, name: &str) -> Result<()> {
        let entry = lock(&self.inner.agents)
            .get(name)
            .cloned()
            .ok_or_else(|| AgentError::UnknownTask(name.to_owned()))?;

        if !entry.enabled.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.state.set_active(name, false)?;
        self.inner.timers.disarm(name);
        info!("task '{name}' disabled");
        Ok(())
    }

    /// Allow armed timers to fire.
    pub fn start_scheduler(&self) {
        self.inner.scheduler_active.store(true, Ordering::SeqCst);
        info!("scheduler started");
    }

    /// Stop timers from firing. Armed timers stay armed; manual runs are
    /// unaffected.
    pub fn stop_scheduler(&self) {
        self.inner.scheduler_active.store(false, Ordering::SeqCst);
        info!("scheduler stopped");
    }

    /// Status projection for one task.
    pub fn task_status(&self, name: &str) -> Result<TaskStatus> {
        let entry = lock(&self.inner.agents)
            .get(name)
            .cloned()
            .ok_or_else(|| AgentError::UnknownTask(name.to_owned()))?;
        Ok(self.build_status(name, &entry))
    }

    /// Status projection for every registered task, in registration order.
    pub fn all_task_status(&self) -> Vec<TaskStatus> {
        let agents = lock(&self.inner.agents);
        lock(&self.inner.order)
            .iter()
            .filter_map(|name| {
                agents
                    .get(name)
                    .map(|entry| self.build_status(name, entry))
            })
            .collect()
    }

    fn build_status(&self, name: &str, entry: &RegisteredAgent) -> TaskStatus {
        let config = entry.agent.config();
        let running = lock(&self.inner.running)
            .values()
            .any(|e| e.task_name == name);
        TaskStatus {
            name: name.to_owned(),
            description: config.description.clone(),
            enabled: entry.enabled.load(Ordering::SeqCst),
            schedule: entry.schedule.to_string(),
            scheduled: self.inner.timers.is_armed(name),
            running,
            last_run: self.inner.state.get(name).and_then(|s| s.last_run),
            next_run: entry.schedule.next_fire(),
        }
    }

    /// Snapshot of the bounded execution history, oldest first.
    pub fn execution_history(&self) -> Vec<Execution> {
        lock(&self.inner.history).snapshot()
    }

    /// Durable state record for a task, if one exists.
    pub fn persisted_state(&self, name: &str) -> Option<PersistedTaskState> {
        self.inner.state.get(name)
    }

    /// Subscribe to lifecycle events. `None` once the manager is shut down.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<AgentEvent>> {
        self.inner.events.subscribe()
    }

    /// Tear down every timer, clear the registry and in-flight tracking,
    /// and detach all event listeners. Idempotent. Does not interrupt an
    /// in-flight `execute`.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.scheduler_active.store(false, Ordering::SeqCst);
        self.inner.timers.disarm_all();
        lock(&self.inner.agents).clear();
        lock(&self.inner.order).clear();
        lock(&self.inner.running).clear();
        self.inner.events.close();
        info!("agent manager shut down");
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::agent::AgentConfig;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct StubAgent {
        config: AgentConfig,
        calls: AtomicUsize,
        result: TaskResult,
    }

    impl StubAgent {
        fn manual(name: &str, result: TaskResult) -> Arc<Self> {
            Arc::new(Self {
                config: AgentConfig::new(name, format!("stub {name}")),
                calls: AtomicUsize::new(0),
                result,
            })
        }
    }

    #[async_trait]
    impl Agent for StubAgent {
        fn config(&self) -> &AgentConfig {
            &self.config
        }

        async fn execute(&self, _ctx: &AgentContext) -> crate::error::Result<TaskResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.result.clone())
        }
    }

    fn memory_manager() -> AgentManager {
        let config = SchedulerConfig {
            state_path: None,
            ..SchedulerConfig::default()
        };
        AgentManager::new(config).expect("manager")
    }

    #[tokio::test]
    async fn run_unknown_task_raises() {
        let manager = memory_manager();
        let err = manager.run_task("ghost", None).await.unwrap_err();
        assert!(matches!(err, AgentError::UnknownTask(_)));
    }

    #[tokio::test]
    async fn globally_disabled_manager_rejects_without_invoking() {
        let config = SchedulerConfig {
            enabled: false,
            state_path: None,
            ..SchedulerConfig::default()
        };
        let manager = AgentManager::new(config).expect("manager");
        let agent = StubAgent::manual("noop", TaskResult::ok("fine"));
        manager.register(agent.clone() as Arc<dyn Agent>);

        let result = manager.run_task("noop", None).await.expect("result");
        assert!(!result.success);
        assert!(result.message.contains("disabled"));
        assert_eq!(agent.calls.load(Ordering::SeqCst), 0);
        // Rejections never reach history or durable last-run state.
        assert!(manager.execution_history().is_empty());
    }

    #[tokio::test]
    async fn successful_run_records_everything() {
        let manager = memory_manager();
        let agent = StubAgent::manual(
            "doc-expiry",
            TaskResult::ok_with_data("ok", serde_json::json!({"expired": 2})),
        );
        manager.register(agent.clone() as Arc<dyn Agent>);

        let result = manager.run_task("doc-expiry", None).await.expect("result");
        assert_eq!(
            result,
            TaskResult::ok_with_data("ok", serde_json::json!({"expired": 2}))
        );

        let history = manager.execution_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, ExecutionStatus::Completed);
        assert!(history[0].finished_at.is_some());

        let state = manager.persisted_state("doc-expiry").expect("state");
        assert!(state.is_active);
        assert_eq!(state.last_run.expect("last run").status, "completed");
    }

    #[tokio::test]
    async fn raised_error_becomes_failed_execution() {
        struct FaultyAgent {
            config: AgentConfig,
        }

        #[async_trait]
        impl Agent for FaultyAgent {
            fn config(&self) -> &AgentConfig {
                &self.config
            }

            async fn execute(&self, _ctx: &AgentContext) -> crate::error::Result<TaskResult> {
                Err(AgentError::Store("db connection lost".to_owned()))
            }
        }

        let manager = memory_manager();
        manager.register(Arc::new(FaultyAgent {
            config: AgentConfig::new("faulty", "always raises"),
        }));

        let result = manager.run_task("faulty", None).await.expect("converted");
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);

        let history = manager.execution_history();
        assert_eq!(history[0].status, ExecutionStatus::Failed);
        assert!(history[0].error.as_deref().unwrap().contains("db connection lost"));
    }

    #[tokio::test]
    async fn reregistration_replaces_instance_keeps_state_and_order() {
        let manager = memory_manager();
        manager.register(StubAgent::manual("a", TaskResult::ok("a")) as Arc<dyn Agent>);
        manager.register(StubAgent::manual("b", TaskResult::ok("b")) as Arc<dyn Agent>);

        manager.disable_task("a").expect("disable");
        // Replacement instance defaults to enabled, persisted state must win.
        manager.register(StubAgent::manual("a", TaskResult::ok("a2")) as Arc<dyn Agent>);

        let status = manager.task_status("a").expect("status");
        assert!(!status.enabled);

        let names: Vec<String> = manager.all_task_status().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn enable_disable_are_idempotent() {
        let manager = memory_manager();
        manager.register(StubAgent::manual("t", TaskResult::ok("t")) as Arc<dyn Agent>);

        manager.disable_task("t").expect("disable");
        manager.disable_task("t").expect("disable again");
        assert!(!manager.persisted_state("t").expect("state").is_active);

        manager.enable_task("t").expect("enable");
        manager.enable_task("t").expect("enable again");
        assert!(manager.persisted_state("t").expect("state").is_active);
    }

    #[tokio::test]
    async fn run_all_skips_disabled_tasks() {
        let manager = memory_manager();
        manager.register(StubAgent::manual("on", TaskResult::ok("on")) as Arc<dyn Agent>);
        manager.register(StubAgent::manual("off", TaskResult::ok("off")) as Arc<dyn Agent>);
        manager.disable_task("off").expect("disable");

        let results = manager.run_all(None).await;
        assert_eq!(results.len(), 1);
        assert!(results.contains_key("on"));
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_clears_registry() {
        let manager = memory_manager();
        manager.register(StubAgent::manual("t", TaskResult::ok("t")) as Arc<dyn Agent>);

        manager.shutdown();
        manager.shutdown();

        assert!(manager.all_task_status().is_empty());
        assert!(manager.subscribe().is_none());
        assert!(matches!(
            manager.run_task("t", None).await.unwrap_err(),
            AgentError::UnknownTask(_)
        ));
    }

    #[tokio::test]
    async fn status_projects_schedule_fields() {
        let manager = memory_manager();
        let agent = Arc::new(StubAgent {
            config: AgentConfig::new("nightly", "nightly job").with_cron("0 2 * * *"),
            calls: AtomicUsize::new(0),
            result: TaskResult::ok("ok"),
        });
        manager.register(agent as Arc<dyn Agent>);

        let status = manager.task_status("nightly").expect("status");
        assert_eq!(status.schedule, "0 2 * * *");
        assert!(status.scheduled);
        assert!(status.next_run.is_some());
        assert!(!status.running);
        assert!(status.last_run.is_none());
    }

    #[tokio::test]
    async fn invalid_schedule_registers_without_timer() {
        let manager = memory_manager();
        let agent = Arc::new(StubAgent {
            config: AgentConfig::new("odd", "odd schedule").with_cron("whenever"),
            calls: AtomicUsize::new(0),
            result: TaskResult::ok("ok"),
        });
        manager.register(agent as Arc<dyn Agent>);

        let status = manager.task_status("odd").expect("status");
        assert!(!status.scheduled);
        assert!(status.next_run.is_none());
        // Manual runs still work.
        let result = manager.run_task("odd", None).await.expect("run");
        assert!(result.success);
    }
}
