//! berth core data models.
//!
//! This crate defines the protocol data shapes, the declarative service
//! model and the identifiers shared by the berth scheduling crates.

#![warn(missing_docs)]

// Core identities
mod id;
mod error;

// Protocol shapes
mod value;
mod resource;
mod offer;
mod task;

// Service model
mod spec;
mod rlimit;

// Plan state
mod status;
mod event;

// Re-exports
pub use id::*;
pub use error::{CoreError, Result};

pub use value::{Range, Value, ValueType};
pub use resource::{
    DiskInfo, DiskSource, DiskSourceType, Label, Persistence, Reservation, Resource, Volume,
    DYNAMIC_PORT_KEY, POD_INDEX_KEY, POD_NAME_KEY, RESOURCE_ID_KEY, RESOURCE_SET_KEY,
    UNRESERVED_ROLE,
};
pub use offer::{Offer, Operation};
pub use task::{
    needs_recovery, TaskInfo, TaskState, TaskStatus, GOAL_STATE_LABEL, PERMANENTLY_FAILED_LABEL,
    POD_INDEX_LABEL, POD_TYPE_LABEL, TRANSIENT_LABEL,
};

pub use spec::{
    GoalState, PodInstance, PodInstanceRequirement, PodSpec, PortSpec, ResourceSet, ResourceSpec,
    ServiceSpec, TaskSpec, VolumeSpec, VolumeType,
};
pub use rlimit::{rlimit_kind, RLimit, RLimitKind, RLIMIT_UNKNOWN};

pub use status::Status;
pub use event::StatusChange;

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
