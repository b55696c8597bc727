//! Durable per-task state.
//!
//! One JSON object keyed by task name, holding the enable/disable flag and
//! a summary of the last finished run. This is the entire restart-survival
//! contract: no queued work, no partial-execution checkpoints. Every
//! mutation rewrites the whole map through a temp file followed by a rename
//! so the file on disk is never partially written.

use crate::error::{AgentError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Terminal outcome recorded in the durable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// The last finished run produced a successful result.
    #[serde(rename = "SUCCESS")]
    Success,
    /// The last finished run produced a failed result.
    #[serde(rename = "FAILED")]
    Failed,
}

/// Timestamp and status of the most recently finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastRunSummary {
    /// When the run finished (RFC 3339 on the wire).
    pub timestamp: DateTime<Utc>,
    /// Execution status string, e.g. `"completed"` or `"failed"`.
    pub status: String,
}

/// Durable record for one task name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedTaskState {
    /// Whether the task is enabled.
    pub is_active: bool,
    /// Summary of the most recently finished run, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<LastRunSummary>,
    /// Outcome of the most recently finished run, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<RunStatus>,
}

impl PersistedTaskState {
    fn fresh(is_active: bool) -> Self {
        Self {
            is_active,
            last_run: None,
            last_status: None,
        }
    }
}

/// Whole-file JSON store of [`PersistedTaskState`] records.
///
/// A `None` path keeps the map purely in memory, which is how tests run.
pub struct StateStore {
    path: Option<PathBuf>,
    entries: Mutex<HashMap<String, PersistedTaskState>>,
}

impl StateStore {
    /// Load the full state map from `path`.
    ///
    /// A missing file is a valid fresh install and yields an empty map; a
    /// present but unreadable or unparsable file is an error.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let entries = match &path {
            None => HashMap::new(),
            Some(path) => match std::fs::read(path) {
                Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                    AgentError::State(format!("cannot parse {}: {e}", path.display()))
                })?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
                Err(e) => {
                    return Err(AgentError::State(format!(
                        "cannot read {}: {e}",
                        path.display()
                    )));
                }
            },
        };

        if let Some(path) = &path {
            debug!(
                "loaded {} task state records from {}",
                entries.len(),
                path.display()
            );
        }

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// In-memory store with no backing file.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Durable record for `name`, if one has been observed.
    pub fn get(&self, name: &str) -> Option<PersistedTaskState> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Owned copy of the whole map.
    pub fn snapshot(&self) -> HashMap<String, PersistedTaskState> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Seed a record for a task name seen for the first time. Existing
    /// records are left untouched.
    pub fn observe(&self, name: &str, is_active: bool) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(name) {
            return Ok(());
        }
        entries.insert(name.to_owned(), PersistedTaskState::fresh(is_active));
        self.persist(&entries)
    }

    /// Set the enabled flag for `name`, creating the record if needed.
    pub fn set_active(&self, name: &str, is_active: bool) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .entry(name.to_owned())
            .or_insert_with(|| PersistedTaskState::fresh(is_active))
            .is_active = is_active;
        self.persist(&entries)
    }

    /// Record the outcome of a finished run for `name`.
    pub fn record_run(
        &self,
        name: &str,
        is_active: bool,
        finished_at: DateTime<Utc>,
        status_label: &str,
        success: bool,
    ) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .entry(name.to_owned())
            .or_insert_with(|| PersistedTaskState::fresh(is_active));
        entry.is_active = is_active;
        entry.last_run = Some(LastRunSummary {
            timestamp: finished_at,
            status: status_label.to_owned(),
        });
        entry.last_status = Some(if success {
            RunStatus::Success
        } else {
            RunStatus::Failed
        });
        self.persist(&entries)
    }

    /// Rewrite the whole map: serialize to a sibling temp file, then rename
    /// over the target so a crash mid-write can never truncate it.
    fn persist(&self, entries: &HashMap<String, PersistedTaskState>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AgentError::State(format!("cannot create state dir: {e}"))
            })?;
        }

        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| AgentError::State(format!("cannot serialize state: {e}")))?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| AgentError::State(format!("cannot write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, path)
            .map_err(|e| AgentError::State(format!("cannot replace {}: {e}", path.display())))?;

        Ok(())
    }
}
