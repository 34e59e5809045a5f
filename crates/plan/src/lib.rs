//! Plan execution layer - steps, phases, plans, strategies and the offer-cycle driver.
//!
//! A [`Plan`] is an ordered set of [`Phase`]s, each an ordered set of
//! [`Step`]s. Strategies pick which children are eligible each offer cycle;
//! the [`DefaultPlanScheduler`] launches eligible steps against offers and
//! the [`PlanCoordinator`] drives every plan manager from one offer stream.

#![warn(missing_docs)]

pub mod error;
pub mod publisher;
pub mod element;
pub mod step;
pub mod dependency;
pub mod strategy;
pub mod phase;
pub mod plan;
pub mod builder;
pub mod factory;
pub mod manager;
pub mod scheduler;
pub mod coordinator;

pub use error::{PlanError, Result};
pub use publisher::StatusPublisher;
pub use element::{rollup_status, Element, Step};
pub use step::DefaultStep;
pub use dependency::DependencyGraph;
pub use strategy::{DependencyStrategy, ParallelStrategy, SerialStrategy, Strategy, StrategyKind};
pub use phase::Phase;
pub use plan::Plan;
pub use builder::{PhaseBuilder, PlanBuilder};
pub use factory::{PhaseFactory, StepFactory};
pub use manager::{in_progress_assets, DefaultPlanManager, PlanManager};
pub use scheduler::{DefaultPlanScheduler, PlanScheduler};
pub use coordinator::{CoordinatorConfig, CycleResult, PlanCoordinator};
