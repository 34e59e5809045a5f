//! Deciding when a failed task is gone for good.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use berth_core::{TaskId, TaskInfo};
use tracing::{debug, info};

/// Decides whether a failed task should be replaced rather than restarted.
pub trait FailureMonitor: Send + Sync {
    /// Whether `task` has failed permanently.
    fn has_failed(&self, task: &TaskInfo) -> bool;

    /// Forget every task incarnation not in `failing`.
    fn prune(&self, _failing: &HashSet<TaskId>) {}
}

/// Only the operator's permanently-failed marker counts.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverFailureMonitor;

impl NeverFailureMonitor {
    /// Create a monitor.
    pub fn new() -> Self {
        Self
    }
}

impl FailureMonitor for NeverFailureMonitor {
    fn has_failed(&self, task: &TaskInfo) -> bool {
        task.is_permanently_failed()
    }
}

/// A task failed for longer than `timeout` is permanently failed.
///
/// The clock starts the first time the monitor is asked about a task
/// incarnation and is dropped once that incarnation is pruned.
#[derive(Debug)]
pub struct TimedFailureMonitor {
    timeout: Duration,
    first_seen: Mutex<HashMap<TaskId, Instant>>,
}

impl TimedFailureMonitor {
    /// Create a monitor with the given timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            first_seen: Mutex::new(HashMap::new()),
        }
    }

    /// Task incarnations whose failure clock is running.
    pub fn tracked(&self) -> usize {
        self.first_seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl FailureMonitor for TimedFailureMonitor {
    fn has_failed(&self, task: &TaskInfo) -> bool {
        if task.is_permanently_failed() {
            return true;
        }
        let mut first_seen = self.first_seen.lock().unwrap_or_else(PoisonError::into_inner);
        let since = *first_seen
            .entry(task.task_id.clone())
            .or_insert_with(Instant::now);
        let failed = since.elapsed() >= self.timeout;
        if failed {
            info!("Task {} failed more than {:?} ago", task.name, self.timeout);
            first_seen.remove(&task.task_id);
        }
        failed
    }

    fn prune(&self, failing: &HashSet<TaskId>) {
        let mut first_seen = self.first_seen.lock().unwrap_or_else(PoisonError::into_inner);
        let before = first_seen.len();
        first_seen.retain(|task_id, _| failing.contains(task_id));
        if first_seen.len() < before {
            debug!("Forgot {} recovered task incarnations", before - first_seen.len());
        }
    }
}
