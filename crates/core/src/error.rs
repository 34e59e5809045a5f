//! Error type for the core data model.

use thiserror::Error;

use crate::value::ValueType;

/// Errors raised by the core data model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// A task id does not carry a recoverable task name
    #[error("TaskId '{0}' is malformed, expected '<name>__<suffix>'")]
    InvalidTaskId(String),

    /// The task is not declared by the pod
    #[error("Task '{task}' is not part of pod '{pod}'")]
    UnknownTask {
        /// Pod instance name
        pod: String,
        /// Task instance name
        task: String,
    },

    /// An rlimit failed validation
    #[error("Invalid rlimit: {0}")]
    InvalidRLimit(String),

    /// Arithmetic across values of different types
    #[error("Value type mismatch: {left:?} vs {right:?}")]
    ValueTypeMismatch {
        /// Left operand type
        left: ValueType,
        /// Right operand type
        right: ValueType,
    },
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
