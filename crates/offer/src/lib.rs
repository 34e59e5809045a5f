//! Offer matching for berth.
//!
//! Turns pod launch requirements into resource requirements, matches them
//! against cluster offers through a per-offer [`ResourcePool`], and accepts
//! the resulting recommendations through a [`SchedulerDriver`].

#![warn(missing_docs)]

pub mod error;
pub mod requirement;
pub mod pool;
pub mod recommendation;
pub mod provider;
pub mod placement;
pub mod evaluator;
pub mod driver;
pub mod accepter;
pub mod killer;

pub use error::{DriverError, OfferError, Result};
pub use requirement::{DynamicPortRequirement, OfferRequirement, ResourceRequirement, TaskRequirement};
pub use pool::ResourcePool;
pub use recommendation::OfferRecommendation;
pub use provider::{DefaultOfferRequirementProvider, OfferRequirementProvider};
pub use placement::{HostnameRule, PlacementRule};
pub use evaluator::{DefaultOfferEvaluator, OfferEvaluator};
pub use driver::SchedulerDriver;
pub use accepter::{DefaultOfferAccepter, OfferAccepter, OperationRecorder, PersistentLaunchRecorder};
pub use killer::{DefaultTaskKiller, TaskKiller};
