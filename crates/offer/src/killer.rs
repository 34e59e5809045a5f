//! Killing tasks by name.

use std::sync::Arc;

use async_trait::async_trait;
use berth_core::PERMANENTLY_FAILED_LABEL;
use berth_storage::StateStore;
use tracing::{debug, error, info, warn};

use crate::driver::SchedulerDriver;

/// Kills tasks by name. Unknown names are a no-op.
#[async_trait]
pub trait TaskKiller: Send + Sync {
    /// Kill the named task. A destructive kill also marks it permanently failed,
    /// so recovery replaces the pod instead of restarting it in place.
    async fn kill_task(&self, task_name: &str, destructive: bool);
}

/// Resolves task names through the state store and kills through the driver.
pub struct DefaultTaskKiller {
    store: Arc<dyn StateStore>,
    driver: Arc<dyn SchedulerDriver>,
}

impl DefaultTaskKiller {
    /// Create a killer.
    pub fn new(store: Arc<dyn StateStore>, driver: Arc<dyn SchedulerDriver>) -> Self {
        Self { store, driver }
    }
}

#[async_trait]
impl TaskKiller for DefaultTaskKiller {
    async fn kill_task(&self, task_name: &str, destructive: bool) {
        let task = match self.store.fetch_task(task_name).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                debug!("No task named {} to kill", task_name);
                return;
            }
            Err(e) => {
                error!("Failed to look up task {} for kill: {}", task_name, e);
                return;
            }
        };

        if destructive {
            let marked = task.clone().with_label(PERMANENTLY_FAILED_LABEL, "true");
            if let Err(e) = self.store.store_tasks(&[marked]).await {
                error!("Failed to mark {} permanently failed: {}", task_name, e);
            }
        }

        match self.store.fetch_status(task_name).await {
            Ok(Some(status)) if status.task_id == task.task_id && status.state.is_terminal() => {
                debug!("Task {} already {}, not killing", task_name, status.state);
                return;
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to read status of {}: {}", task_name, e),
        }

        info!("Killing task {} ({})", task_name, task.task_id);
        if let Err(e) = self.driver.kill_task(&task.task_id).await {
            error!("Failed to kill task {}: {}", task_name, e);
        }
    }
}
