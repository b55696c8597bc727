//! Standalone agent scheduler daemon.
//!
//! Wires the manager to in-memory collaborators and runs the built-in
//! agents on their schedules. The production deployment embeds the manager
//! in the HR API process instead; this binary exists for local operation
//! and smoke testing.

use hrflow_agents::storage::{MemoryHrStore, MemoryNotifier};
use hrflow_agents::{AgentManager, SchedulerConfig, builtin_agents};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to our own info logs; RUST_LOG overrides.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("hrflow_agents=info,hrflow_agentd=info")),
        )
        .init();

    let config_path = SchedulerConfig::default_config_path();
    let config = if config_path.exists() {
        SchedulerConfig::from_file(&config_path)?
    } else {
        SchedulerConfig::default()
    }
    .apply_env();

    info!(
        "starting agent daemon (max_concurrent: {}, state: {})",
        config.max_concurrent,
        config
            .state_path
            .as_deref()
            .map_or_else(|| "in-memory".to_owned(), |p| p.display().to_string())
    );

    let store = Arc::new(MemoryHrStore::new());
    let notifier = Arc::new(MemoryNotifier::new());

    let manager = AgentManager::new(config)?;
    for agent in builtin_agents(store, notifier) {
        manager.register(agent);
    }

    // Mirror lifecycle events into the log; this stands in for the audit
    // sink the full platform attaches.
    if let Some(mut events) = manager.subscribe() {
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                info!(
                    "event: {:?} task={} execution={}",
                    event.kind, event.execution.task_name, event.execution.id
                );
            }
        });
    }

    manager.start_scheduler();
    for status in manager.all_task_status() {
        info!(
            "task '{}' enabled={} schedule={} next_run={:?}",
            status.name, status.enabled, status.schedule, status.next_run
        );
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot wait for ctrl-c: {e}");
    }
    info!("shutting down");
    manager.shutdown();
    Ok(())
}
