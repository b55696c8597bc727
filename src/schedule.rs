//! Schedule engine: cron expression parsing and per-task recurring timers.
//!
//! A [`Schedule`] answers "when does this task fire next" without waiting
//! for a fire; the [`TimerRegistry`] owns one recurring tokio timer task per
//! armed task name and invokes the coordinator's run entrypoint on each fire.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Sentinel schedule expression for tasks that only run on demand.
pub const MANUAL_ONLY: &str = "manual-only";

/// When a task fires.
#[derive(Debug, Clone)]
pub enum Schedule {
    /// Recurring cron schedule.
    Cron {
        /// The expression as given (five- or six-field).
        expr: String,
        /// Parsed schedule used for next-fire computation.
        parsed: Box<cron::Schedule>,
    },
    /// Never fires on its own; the task runs only via explicit invocation.
    Manual,
    /// An expression that failed to parse. Registration still succeeds;
    /// next-run reporting falls back to `None` and no timer is armed.
    Invalid {
        /// The rejected expression, kept for status reporting.
        expr: String,
    },
}

impl Schedule {
    /// Parse a schedule expression.
    ///
    /// Accepts the `"manual-only"` sentinel, six/seven-field cron
    /// expressions, and classic five-field expressions (normalized by
    /// prepending a zero seconds field). Never fails: an unparsable
    /// expression yields [`Schedule::Invalid`] and a warning.
    pub fn parse(expr: &str) -> Self {
        let trimmed = expr.trim();
        if trimmed.eq_ignore_ascii_case(MANUAL_ONLY) || trimmed.eq_ignore_ascii_case("manual") {
            return Self::Manual;
        }

        let normalized = if trimmed.split_whitespace().count() == 5 {
            format!("0 {trimmed}")
        } else {
            trimmed.to_owned()
        };

        match cron::Schedule::from_str(&normalized) {
            Ok(parsed) => Self::Cron {
                expr: trimmed.to_owned(),
                parsed: Box::new(parsed),
            },
            Err(e) => {
                warn!("unparsable schedule expression '{trimmed}': {e}");
                Self::Invalid {
                    expr: trimmed.to_owned(),
                }
            }
        }
    }

    /// Next fire time, or `None` for manual and invalid schedules.
    pub fn next_fire(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Cron { parsed, .. } => parsed.upcoming(Utc).next(),
            Self::Manual | Self::Invalid { .. } => None,
        }
    }

    /// Whether a timer can be armed for this schedule.
    pub fn is_schedulable(&self) -> bool {
        matches!(self, Self::Cron { .. })
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cron { expr, .. } => write!(f, "{expr}"),
            Self::Manual => write!(f, "{MANUAL_ONLY}"),
            Self::Invalid { expr } => write!(f, "invalid ({expr})"),
        }
    }
}

/// Recurring timer tasks, one per armed task name.
#[derive(Default)]
pub struct TimerRegistry {
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl TimerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a recurring timer for `name`, tearing down any previous timer
    /// under the same name first. Manual and invalid schedules arm nothing.
    ///
    /// `on_fire` is invoked at each fire time; it must carry its own error
    /// containment.
    pub fn arm<F, Fut>(&self, name: &str, schedule: Schedule, on_fire: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = timers.remove(name) {
            previous.abort();
        }

        if !schedule.is_schedulable() {
            debug!("not arming timer for '{name}': schedule is {schedule}");
            return;
        }

        let task_name = name.to_owned();
        let handle = tokio::spawn(async move {
            loop {
                let Some(next) = schedule.next_fire() else {
                    break;
                };
                let delay = (next - Utc::now()).to_std().unwrap_or_default();
                tokio::time::sleep(delay).await;
                debug!("timer fired for task '{task_name}'");
                on_fire().await;
            }
        });
        timers.insert(name.to_owned(), handle);
    }

    /// Tear down the timer for `name`. Returns `true` when one existed.
    pub fn disarm(&self, name: &str) -> bool {
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        match timers.remove(name) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Tear down every timer.
    pub fn disarm_all(&self) {
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }

    /// Whether a timer is currently armed for `name`.
    pub fn is_armed(&self, name: &str) -> bool {
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}

impl Drop for TimerRegistry {
    fn drop(&mut self) {
        self.disarm_all();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn parse_manual_sentinel() {
        assert!(matches!(Schedule::parse("manual-only"), Schedule::Manual));
        assert!(matches!(Schedule::parse("Manual-Only"), Schedule::Manual));
        assert!(matches!(Schedule::parse("  manual  "), Schedule::Manual));
    }

    #[test]
    fn parse_five_field_expression() {
        let schedule = Schedule::parse("0 9 * * 1-5");
        assert!(schedule.is_schedulable());
        assert!(schedule.next_fire().is_some());
    }

    #[test]
    fn parse_six_field_expression() {
        let schedule = Schedule::parse("0 30 8 * * *");
        assert!(schedule.is_schedulable());
        assert!(schedule.next_fire().is_some());
    }

    #[test]
    fn parse_garbage_yields_invalid_not_panic() {
        let schedule = Schedule::parse("every full moon");
        assert!(matches!(schedule, Schedule::Invalid { .. }));
        assert!(schedule.next_fire().is_none());
        assert!(!schedule.is_schedulable());
    }

    #[test]
    fn next_fire_is_in_the_future() {
        let schedule = Schedule::parse("0 0 * * *");
        let next = schedule.next_fire().expect("next fire");
        assert!(next > Utc::now());
    }

    #[test]
    fn manual_has_no_next_fire() {
        assert!(Schedule::parse("manual-only").next_fire().is_none());
    }

    #[test]
    fn display_round_trips_expression() {
        assert_eq!(Schedule::parse("0 9 * * 1-5").to_string(), "0 9 * * 1-5");
        assert_eq!(Schedule::parse("manual-only").to_string(), "manual-only");
        assert_eq!(Schedule::parse("bogus").to_string(), "invalid (bogus)");
    }

    #[tokio::test]
    async fn arm_manual_schedule_arms_nothing() {
        let registry = TimerRegistry::new();
        registry.arm("manual-task", Schedule::Manual, || async {});
        assert!(!registry.is_armed("manual-task"));
    }

    #[tokio::test]
    async fn arm_and_disarm_cron_timer() {
        let registry = TimerRegistry::new();
        registry.arm("nightly", Schedule::parse("0 0 * * *"), || async {});
        assert!(registry.is_armed("nightly"));
        assert!(registry.disarm("nightly"));
        assert!(!registry.is_armed("nightly"));
        assert!(!registry.disarm("nightly"));
    }

    #[tokio::test]
    async fn rearming_replaces_previous_timer() {
        let registry = TimerRegistry::new();
        let fires = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fires);
        registry.arm("tick", Schedule::parse("* * * * * *"), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        // Replace with a far-future schedule; the per-second timer must die.
        registry.arm("tick", Schedule::parse("0 0 1 1 *"), || async {});
        let after_rearm = fires.load(Ordering::SeqCst);

        tokio::time::sleep(std::time::Duration::from_millis(2200)).await;
        assert_eq!(fires.load(Ordering::SeqCst), after_rearm);
        assert!(registry.is_armed("tick"));
    }

    #[tokio::test]
    async fn armed_per_second_timer_fires() {
        let registry = TimerRegistry::new();
        let fires = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fires);
        registry.arm("fast", Schedule::parse("* * * * * *"), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(std::time::Duration::from_millis(2500)).await;
        assert!(fires.load(Ordering::SeqCst) >= 1);
    }
}
