//! Error type for recovery.

use berth_core::CoreError;
use berth_plan::PlanError;
use berth_storage::StorageError;
use thiserror::Error;

/// Errors raised while planning a recovery.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// A stored task names a pod type the service does not declare
    #[error("Unknown pod type: {0}")]
    UnknownPod(String),

    /// A stored task carries no pod labels
    #[error("Task '{0}' is not labelled with its pod")]
    Unlabelled(String),

    /// Core model error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Plan construction error
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// State store error
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result alias for recovery operations.
pub type Result<T> = std::result::Result<T, RecoveryError>;
