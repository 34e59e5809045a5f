//! Error types for offer matching and driver calls.

use berth_core::CoreError;
use thiserror::Error;

/// Errors raised while building offer requirements.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OfferError {
    /// The pod requirement cannot be turned into resource requirements
    #[error("Invalid requirement: {0}")]
    InvalidRequirement(String),

    /// Core model error
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Errors reported by the cluster driver.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DriverError {
    /// The cluster refused the call
    #[error("Driver rejected call: {0}")]
    Rejected(String),

    /// No connection to the cluster
    #[error("Driver is disconnected")]
    Disconnected,
}

/// Result alias for offer operations.
pub type Result<T> = std::result::Result<T, OfferError>;
