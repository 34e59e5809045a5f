//! JSON file storage implementation.
//!
//! Stores each task and its latest status as a JSON file under the state
//! directory, named after the task.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use berth_core::{TaskInfo, TaskStatus};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::trait_::{check_incarnation, status_task_name};
use super::{Result, StateStore};

/// File-based JSON state store.
pub struct JsonStateStore {
    root: PathBuf,
    // Serializes read-check-write sequences across concurrent callers.
    write_lock: Mutex<()>,
}

impl JsonStateStore {
    /// Open a store rooted at `root`, creating the directories it needs.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(root.join("tasks")).await?;
        fs::create_dir_all(root.join("statuses")).await?;

        debug!("Opened JSON state store at {}", root.display());
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn task_path(&self, name: &str) -> PathBuf {
        self.root.join("tasks").join(format!("{}.json", name))
    }

    fn status_path(&self, name: &str) -> PathBuf {
        self.root.join("statuses").join(format!("{}.json", name))
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn store_tasks(&self, tasks: &[TaskInfo]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        for task in tasks {
            let json = serde_json::to_string_pretty(task)?;
            fs::write(self.task_path(&task.name), json.as_bytes()).await?;
            debug!("Stored task {}", task.name);
        }
        Ok(())
    }

    async fn fetch_tasks(&self) -> Result<Vec<TaskInfo>> {
        let mut tasks: Vec<TaskInfo> = list_dir(&self.root.join("tasks")).await?;
        tasks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tasks)
    }

    async fn fetch_task(&self, name: &str) -> Result<Option<TaskInfo>> {
        read_json(&self.task_path(name)).await
    }

    async fn clear_task(&self, name: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        for path in [self.task_path(name), self.status_path(name)] {
            remove_if_exists(&path).await?;
        }
        Ok(())
    }

    async fn store_status(&self, status: &TaskStatus) -> Result<()> {
        let name = status_task_name(status)?;
        let _guard = self.write_lock.lock().await;
        let stored: Option<TaskInfo> = read_json(&self.task_path(&name)).await?;
        check_incarnation(&name, stored.as_ref(), status)?;

        let json = serde_json::to_string_pretty(status)?;
        fs::write(self.status_path(&name), json.as_bytes()).await?;
        Ok(())
    }

    async fn fetch_status(&self, name: &str) -> Result<Option<TaskStatus>> {
        read_json(&self.status_path(name)).await
    }

    async fn fetch_statuses(&self) -> Result<Vec<TaskStatus>> {
        let mut statuses: Vec<TaskStatus> = list_dir(&self.root.join("statuses")).await?;
        statuses.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        Ok(statuses)
    }
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    fs::remove_file(path).await.or_else(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Ok(())
        } else {
            Err(e)
        }
    })?;
    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        match read_json(&entry.path()).await {
            Ok(Some(item)) => items.push(item),
            Ok(None) => {}
            Err(e) => warn!("Skipping unreadable record {}: {}", entry.path().display(), e),
        }
    }
    Ok(items)
}
