//! In-memory storage, for tests and runs without a state directory.

use std::collections::BTreeMap;

use async_trait::async_trait;
use berth_core::{TaskInfo, TaskStatus};
use tokio::sync::RwLock;

use super::trait_::{check_incarnation, status_task_name};
use super::{Result, StateStore};

#[derive(Default)]
struct State {
    tasks: BTreeMap<String, TaskInfo>,
    statuses: BTreeMap<String, TaskStatus>,
}

/// State store kept entirely in process memory.
#[derive(Default)]
pub struct MemoryStateStore {
    state: RwLock<State>,
}

impl MemoryStateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn store_tasks(&self, tasks: &[TaskInfo]) -> Result<()> {
        let mut state = self.state.write().await;
        for task in tasks {
            state.tasks.insert(task.name.clone(), task.clone());
        }
        Ok(())
    }

    async fn fetch_tasks(&self) -> Result<Vec<TaskInfo>> {
        Ok(self.state.read().await.tasks.values().cloned().collect())
    }

    async fn fetch_task(&self, name: &str) -> Result<Option<TaskInfo>> {
        Ok(self.state.read().await.tasks.get(name).cloned())
    }

    async fn clear_task(&self, name: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.tasks.remove(name);
        state.statuses.remove(name);
        Ok(())
    }

    async fn store_status(&self, status: &TaskStatus) -> Result<()> {
        let name = status_task_name(status)?;
        let mut state = self.state.write().await;
        check_incarnation(&name, state.tasks.get(&name), status)?;
        state.statuses.insert(name, status.clone());
        Ok(())
    }

    async fn fetch_status(&self, name: &str) -> Result<Option<TaskStatus>> {
        Ok(self.state.read().await.statuses.get(name).cloned())
    }

    async fn fetch_statuses(&self) -> Result<Vec<TaskStatus>> {
        Ok(self.state.read().await.statuses.values().cloned().collect())
    }
}
