//! Configuration for the agent scheduler.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Top-level scheduler configuration.
///
/// Loaded from a TOML file, with a couple of environment overrides for
/// deploy-time toggles (see [`SchedulerConfig::apply_env`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Global switch. When `false` every run request is rejected with a
    /// failed result, including manual ones.
    pub enabled: bool,
    /// Maximum number of task executions allowed in flight at once.
    /// Requests beyond the ceiling are rejected outright, never queued.
    pub max_concurrent: usize,
    /// Maximum number of execution records kept in the in-memory history.
    pub history_limit: usize,
    /// Path of the durable task-state file. `None` keeps state in memory
    /// only (used by tests).
    pub state_path: Option<PathBuf>,
    /// Per-task schedule overrides, keyed by task name. Values are cron
    /// expressions or the `"manual-only"` sentinel, replacing the task's
    /// built-in schedule at registration.
    pub schedule_overrides: HashMap<String, String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrent: 3,
            history_limit: 100,
            state_path: Self::default_state_path(),
            schedule_overrides: HashMap::new(),
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            crate::AgentError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        toml::from_str(&contents)
            .map_err(|e| crate::AgentError::Config(format!("cannot parse {}: {e}", path.display())))
    }

    /// Save configuration to a TOML file, creating parent directories.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| crate::AgentError::Config(format!("cannot serialize config: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Overlay environment variables on top of the loaded file.
    ///
    /// `HRFLOW_SCHEDULER_ENABLED` (`true`/`false`/`1`/`0`) and
    /// `HRFLOW_MAX_CONCURRENT` are recognized; anything unparsable is
    /// ignored.
    #[must_use]
    pub fn apply_env(mut self) -> Self {
        if let Ok(raw) = std::env::var("HRFLOW_SCHEDULER_ENABLED") {
            match raw.trim() {
                "true" | "1" => self.enabled = true,
                "false" | "0" => self.enabled = false,
                _ => {}
            }
        }
        if let Ok(raw) = std::env::var("HRFLOW_MAX_CONCURRENT")
            && let Ok(n) = raw.trim().parse::<usize>()
            && n > 0
        {
            self.max_concurrent = n;
        }
        self
    }

    /// Default path for the scheduler config file.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hrflow")
            .join("scheduler.toml")
    }

    /// Default path for the durable task-state file.
    pub fn default_state_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("hrflow").join("agent_state.json"))
    }
}
