//! One offer cycle: launch candidate steps against the offers at hand.

use std::sync::Arc;

use async_trait::async_trait;
use berth_core::{Offer, OfferId, Operation};
use berth_offer::{OfferAccepter, OfferEvaluator, OfferRecommendation, SchedulerDriver, TaskKiller};
use tracing::{error, info, warn};

use crate::element::{Element, Step};

/// Runs candidate steps against an offer batch.
#[async_trait]
pub trait PlanScheduler: Send + Sync {
    /// Try every step in order against `offers`, returning the accepted offer ids.
    ///
    /// A missing argument is logged and yields no offers.
    async fn resource_offers(
        &self,
        driver: Option<&dyn SchedulerDriver>,
        offers: Option<&[Offer]>,
        steps: Option<&[Arc<dyn Step>]>,
    ) -> Vec<OfferId>;
}

/// Kills leftovers, evaluates, accepts and reports back to each step.
pub struct DefaultPlanScheduler {
    evaluator: Arc<dyn OfferEvaluator>,
    accepter: Arc<dyn OfferAccepter>,
    killer: Arc<dyn TaskKiller>,
}

impl DefaultPlanScheduler {
    /// Create a scheduler.
    pub fn new(
        evaluator: Arc<dyn OfferEvaluator>,
        accepter: Arc<dyn OfferAccepter>,
        killer: Arc<dyn TaskKiller>,
    ) -> Self {
        Self {
            evaluator,
            accepter,
            killer,
        }
    }

    async fn run_step(
        &self,
        driver: &dyn SchedulerDriver,
        available: &mut Vec<Offer>,
        step: &dyn Step,
    ) -> Vec<OfferId> {
        if !step.status().is_pending() {
            info!("Ignoring resource offers for step: {} status: {}", step.name(), step.status());
            return Vec::new();
        }

        info!("Processing resource offers for step: {}", step.name());
        let Some(requirement) = step.start() else {
            info!("No PodInstanceRequirement for step: {}", step.name());
            step.update_offer_status(&[]);
            return Vec::new();
        };

        for task_name in requirement.task_instance_names() {
            self.killer.kill_task(&task_name, false).await;
        }

        let recommendations = match self.evaluator.evaluate(&requirement, available) {
            Ok(recommendations) => recommendations,
            Err(e) => {
                warn!("Failed to evaluate offers for step {}: {}", step.name(), e);
                step.update_offer_status(&[]);
                return Vec::new();
            }
        };
        if recommendations.is_empty() {
            info!("Unable to find any offers which fulfill requirement for step: {}", step.name());
            step.update_offer_status(&[]);
            return Vec::new();
        }

        let operations: Vec<(OfferId, Operation)> = recommendations
            .iter()
            .map(|r: &OfferRecommendation| (r.offer_id.clone(), r.operation.clone()))
            .collect();
        let accepted = self.accepter.accept(driver, recommendations).await;

        // An accepted offer is spent for the rest of the cycle.
        available.retain(|offer| !accepted.contains(&offer.id));

        let launched: Vec<Operation> = operations
            .into_iter()
            .filter(|(offer_id, _)| accepted.contains(offer_id))
            .map(|(_, operation)| operation)
            .collect();
        step.update_offer_status(&launched);
        accepted
    }
}

#[async_trait]
impl PlanScheduler for DefaultPlanScheduler {
    async fn resource_offers(
        &self,
        driver: Option<&dyn SchedulerDriver>,
        offers: Option<&[Offer]>,
        steps: Option<&[Arc<dyn Step>]>,
    ) -> Vec<OfferId> {
        let (Some(driver), Some(offers), Some(steps)) = (driver, offers, steps) else {
            error!(
                "Unexpected null argument encountered: driver={} offers={} steps={}",
                driver.is_some(),
                offers.is_some(),
                steps.is_some()
            );
            return Vec::new();
        };

        let mut available = offers.to_vec();
        let mut accepted = Vec::new();
        for step in steps {
            for offer_id in self.run_step(driver, &mut available, step.as_ref()).await {
                if !accepted.contains(&offer_id) {
                    accepted.push(offer_id);
                }
            }
        }
        accepted
    }
}
