//! Recovery of failed pods.
//!
//! The [`RecoveryPlanManager`] watches the state store for pods whose every
//! task has failed and relaunches them, either in place ([`RecoveryType::Transient`])
//! or from scratch on fresh reservations ([`RecoveryType::Permanent`]).
//! [`LaunchConstrainer`]s rate-limit relaunches and [`FailureMonitor`]s decide
//! when a failure is permanent.

#![warn(missing_docs)]

pub mod error;
pub mod config;
pub mod constrainer;
pub mod monitor;
pub mod requirement;
pub mod step;
pub mod manager;

pub use error::{RecoveryError, Result};
pub use config::RecoveryConfig;
pub use constrainer::{LaunchConstrainer, TimedLaunchConstrainer, UnconstrainedLaunchConstrainer};
pub use monitor::{FailureMonitor, NeverFailureMonitor, TimedFailureMonitor};
pub use requirement::{RecoveryRequirement, RecoveryRequirementProvider};
pub use step::{RecoveryStep, RecoveryType};
pub use manager::RecoveryPlanManager;
