//! Drives every plan manager from one offer stream and one status stream.

use std::collections::HashSet;
use std::sync::Arc;

use berth_core::{Offer, OfferId, TaskStatus};
use berth_offer::SchedulerDriver;
use berth_storage::{StateStore, StorageError};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::element::{Element, Step};
use crate::manager::PlanManager;
use crate::scheduler::PlanScheduler;
use crate::strategy::StrategyKind;

/// Configuration for the coordinator loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Strategy between the steps of each deploy phase
    pub deploy_strategy: StrategyKind,
    /// Max offer cycles before stopping (None = until every plan completes)
    pub max_cycles: Option<usize>,
}

impl CoordinatorConfig {
    /// Set the deploy strategy.
    pub fn with_deploy_strategy(mut self, deploy_strategy: StrategyKind) -> Self {
        self.deploy_strategy = deploy_strategy;
        self
    }

    /// Set the cycle limit.
    pub fn with_max_cycles(mut self, max_cycles: Option<usize>) -> Self {
        self.max_cycles = max_cycles;
        self
    }
}

/// Result of a single offer cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleResult {
    /// Offers were accepted
    Launched {
        /// Accepted offers
        accepted: Vec<OfferId>,
    },
    /// Steps were tried but no offer fit
    Unmatched,
    /// No step wanted offers
    Idle,
    /// Every plan is complete
    Complete,
}

/// Shares offers between plan managers.
///
/// Each manager only sees steps whose assets are not in flight in another
/// manager's plan or already chosen earlier in the same cycle.
pub struct PlanCoordinator {
    managers: Vec<Arc<dyn PlanManager>>,
    scheduler: Arc<dyn PlanScheduler>,
    store: Arc<dyn StateStore>,
    config: CoordinatorConfig,
    cycles_run: usize,
}

impl PlanCoordinator {
    /// Create a coordinator.
    pub fn new(scheduler: Arc<dyn PlanScheduler>, store: Arc<dyn StateStore>) -> Self {
        Self {
            managers: Vec::new(),
            scheduler,
            store,
            config: CoordinatorConfig::default(),
            cycles_run: 0,
        }
    }

    /// Add a plan manager. Earlier managers get first pick of each cycle.
    pub fn with_manager(mut self, manager: Arc<dyn PlanManager>) -> Self {
        self.managers.push(manager);
        self
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Managers in priority order.
    pub fn managers(&self) -> &[Arc<dyn PlanManager>] {
        &self.managers
    }

    /// Offer cycles run so far.
    pub fn cycles(&self) -> usize {
        self.cycles_run
    }

    /// Whether every managed plan is complete.
    pub fn is_complete(&self) -> bool {
        self.managers.iter().all(|m| m.plan().is_complete())
    }

    /// Candidate steps of every manager for this cycle.
    pub async fn candidates(&self) -> Vec<Arc<dyn Step>> {
        let mut chosen: HashSet<String> = HashSet::new();
        let mut steps = Vec::new();

        for (index, manager) in self.managers.iter().enumerate() {
            let mut dirty = chosen.clone();
            for (other_index, other) in self.managers.iter().enumerate() {
                if other_index != index {
                    dirty.extend(other.dirty_assets());
                }
            }

            for step in manager.candidates(&dirty).await {
                if let Some(asset) = step.asset() {
                    chosen.insert(asset);
                }
                steps.push(step);
            }
        }
        steps
    }

    /// Run one offer cycle.
    pub async fn process_offers(&mut self, driver: &dyn SchedulerDriver, offers: &[Offer]) -> CycleResult {
        self.cycles_run += 1;
        info!("Starting offer cycle {} with {} offers", self.cycles_run, offers.len());

        let steps = self.candidates().await;
        if steps.is_empty() {
            if self.is_complete() {
                return CycleResult::Complete;
            }
            debug!("No candidate steps");
            return CycleResult::Idle;
        }
        debug!(
            "Candidate steps: {:?}",
            steps.iter().map(|s| s.name().to_string()).collect::<Vec<_>>()
        );

        let accepted = self
            .scheduler
            .resource_offers(Some(driver), Some(offers), Some(&steps))
            .await;
        for manager in &self.managers {
            manager.plan().publish_if_changed();
        }
        if accepted.is_empty() {
            CycleResult::Unmatched
        } else {
            info!("Accepted {} offers", accepted.len());
            CycleResult::Launched { accepted }
        }
    }

    /// Record a task status report and forward it to every plan.
    pub async fn update(&self, status: &TaskStatus) {
        match self.store.store_status(status).await {
            Ok(()) => {}
            Err(e @ StorageError::IdMismatch { .. }) => {
                debug!("Not storing status of an old incarnation: {}", e)
            }
            Err(e @ StorageError::NotFound(_)) => warn!("Status for unknown task: {}", e),
            Err(e) => error!("Failed to store status {} for {}: {}", status.state, status.task_id, e),
        }

        for manager in &self.managers {
            manager.update(status).await;
        }
    }

    /// Run until every plan completes, the cycle limit is reached or the
    /// offer stream ends. Status reports are drained before each cycle.
    pub async fn run(
        &mut self,
        driver: &dyn SchedulerDriver,
        mut offers: mpsc::Receiver<Vec<Offer>>,
        mut statuses: mpsc::Receiver<TaskStatus>,
    ) {
        loop {
            while let Ok(status) = statuses.try_recv() {
                self.update(&status).await;
            }

            if let Some(max) = self.config.max_cycles {
                if self.cycles_run >= max {
                    info!("Reached max cycles ({})", max);
                    break;
                }
            }
            if self.is_complete() {
                info!("All plans complete");
                break;
            }

            tokio::select! {
                biased;
                Some(status) = statuses.recv() => self.update(&status).await,
                batch = offers.recv() => match batch {
                    Some(batch) => match self.process_offers(driver, &batch).await {
                        CycleResult::Complete => break,
                        result => debug!("Cycle result: {:?}", result),
                    },
                    None => {
                        info!("Offer stream closed");
                        break;
                    }
                },
            }
        }
    }
}
