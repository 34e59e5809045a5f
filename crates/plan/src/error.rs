//! Error type for plan construction.

use berth_core::CoreError;
use berth_storage::StorageError;
use thiserror::Error;

/// Errors raised while building steps, phases and plans.
#[derive(Debug, Error)]
pub enum PlanError {
    /// A dependency graph was built inconsistently
    #[error("Invalid dependency: {0}")]
    InvalidDependency(String),

    /// A step cannot be built from its pod
    #[error("Invalid step: {0}")]
    InvalidStep(String),

    /// Core model error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// State store error
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result alias for plan operations.
pub type Result<T> = std::result::Result<T, PlanError>;
