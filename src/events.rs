//! Lifecycle event notifications.
//!
//! The coordinator publishes start/complete/fail signals over a broadcast
//! channel so collaborators (audit log, user notifications) can react
//! without the coordinator depending on them. A send never blocks, and a
//! slow or crashed subscriber cannot affect a run's outcome.

use crate::execution::Execution;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

/// Broadcast channel capacity. Lagging subscribers lose old events rather
/// than backpressuring the coordinator.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Which lifecycle signal an event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentEventKind {
    /// A run was initiated.
    Started,
    /// A run finished with a successful result.
    Completed,
    /// A run finished with a failed result or raised error.
    Failed,
}

/// A lifecycle event carrying the execution record as of emission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    /// Signal kind.
    pub kind: AgentEventKind,
    /// Snapshot of the execution at the moment this event was emitted.
    pub execution: Execution,
}

impl AgentEvent {
    /// Event for a freshly initiated run.
    pub fn started(execution: Execution) -> Self {
        Self {
            kind: AgentEventKind::Started,
            execution,
        }
    }

    /// Event for a finished run, keyed off the result's success flag.
    pub fn finished(execution: Execution, success: bool) -> Self {
        Self {
            kind: if success {
                AgentEventKind::Completed
            } else {
                AgentEventKind::Failed
            },
            execution,
        }
    }
}

/// Publisher side of the lifecycle event channel.
///
/// After [`EventBus::close`] (called from manager shutdown) emission stops
/// and new subscriptions are refused.
pub struct EventBus {
    tx: Mutex<Option<broadcast::Sender<AgentEvent>>>,
}

impl EventBus {
    /// Create an open event bus.
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    /// Subscribe to lifecycle events. Returns `None` once the bus is closed.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<AgentEvent>> {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(broadcast::Sender::subscribe)
    }

    /// Publish an event. A missing subscriber set is not an error.
    pub fn emit(&self, event: AgentEvent) {
        if let Some(tx) = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            let _ = tx.send(event);
        }
    }

    /// Detach all listeners and stop emitting. Idempotent.
    pub fn close(&self) {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
