//! Storage trait abstraction.

use async_trait::async_trait;
use berth_core::{TaskId, TaskInfo, TaskStatus};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A status names a different incarnation than the stored task
    #[error("Status for task '{name}' has id {status_id}, stored task has id {stored_id}")]
    IdMismatch {
        /// Task name
        name: String,
        /// Id carried by the status
        status_id: TaskId,
        /// Id of the stored task
        stored_id: TaskId,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Persisted scheduler state: launched tasks and their latest status.
///
/// Records are keyed by task name, so a relaunch replaces the previous
/// incarnation of the task.
#[async_trait]
pub trait StateStore: Send + Sync {
    // === Task operations ===

    /// Save launched tasks (create or replace by name).
    async fn store_tasks(&self, tasks: &[TaskInfo]) -> Result<()>;

    /// Load every stored task.
    async fn fetch_tasks(&self) -> Result<Vec<TaskInfo>>;

    /// Load a task by name.
    async fn fetch_task(&self, name: &str) -> Result<Option<TaskInfo>>;

    /// Remove a task and its status.
    async fn clear_task(&self, name: &str) -> Result<()>;

    // === Status operations ===

    /// Save the latest status of a stored task.
    ///
    /// Fails if the task is unknown or the status belongs to another incarnation.
    async fn store_status(&self, status: &TaskStatus) -> Result<()>;

    /// Load the latest status of a task by name.
    async fn fetch_status(&self, name: &str) -> Result<Option<TaskStatus>>;

    /// Load every stored status.
    async fn fetch_statuses(&self) -> Result<Vec<TaskStatus>>;
}

/// Name of the task a status report belongs to.
pub(crate) fn status_task_name(status: &TaskStatus) -> Result<String> {
    status
        .task_id
        .task_name()
        .map(str::to_string)
        .map_err(|e| StorageError::Other(e.to_string()))
}

/// Check that a status belongs to the stored incarnation of its task.
pub(crate) fn check_incarnation(name: &str, stored: Option<&TaskInfo>, status: &TaskStatus) -> Result<()> {
    let stored = stored.ok_or_else(|| StorageError::NotFound(format!("task '{}'", name)))?;
    if stored.task_id != status.task_id {
        return Err(StorageError::IdMismatch {
            name: name.to_string(),
            status_id: status.task_id.clone(),
            stored_id: stored.task_id.clone(),
        });
    }
    Ok(())
}
