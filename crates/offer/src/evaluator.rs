//! Matches pod launch requirements against offers.

use std::sync::Arc;

use berth_core::{
    DiskInfo, Offer, Persistence, PodInstanceRequirement, Resource, DYNAMIC_PORT_KEY,
};
use tracing::{debug, info};
use ulid::Ulid;

use crate::error::Result;
use crate::placement::{HostnameRule, PlacementRule};
use crate::pool::ResourcePool;
use crate::provider::OfferRequirementProvider;
use crate::recommendation::OfferRecommendation;
use crate::requirement::{OfferRequirement, ResourceRequirement};

/// Produces the recommendations needed to launch a pod from a set of offers.
pub trait OfferEvaluator: Send + Sync {
    /// Evaluate `requirement` against `offers`.
    ///
    /// An empty result means no offer can satisfy the requirement.
    fn evaluate(
        &self,
        requirement: &PodInstanceRequirement,
        offers: &[Offer],
    ) -> Result<Vec<OfferRecommendation>>;
}

/// Tries offers in order and launches the whole pod on the first one that
/// satisfies every task.
pub struct DefaultOfferEvaluator {
    provider: Arc<dyn OfferRequirementProvider>,
    placement: Option<Arc<dyn PlacementRule>>,
}

impl DefaultOfferEvaluator {
    /// Create an evaluator.
    pub fn new(provider: Arc<dyn OfferRequirementProvider>) -> Self {
        Self {
            provider,
            placement: None,
        }
    }

    /// Filter offers through `rule` instead of the pod's own placement expression.
    pub fn with_placement(mut self, rule: Arc<dyn PlacementRule>) -> Self {
        self.placement = Some(rule);
        self
    }

    fn placement_for(&self, requirement: &OfferRequirement) -> Option<Arc<dyn PlacementRule>> {
        if let Some(rule) = &self.placement {
            return Some(rule.clone());
        }
        let rule = HostnameRule::parse(requirement.placement.as_deref()?)?;
        Some(Arc::new(rule))
    }

    fn try_offer(
        &self,
        offer: &Offer,
        requirement: &OfferRequirement,
    ) -> Option<Vec<OfferRecommendation>> {
        let mut pool = ResourcePool::new(offer);
        let mut reserves = Vec::new();
        let mut launches = Vec::new();

        for task in &requirement.tasks {
            let mut resources = Vec::new();

            for resource_requirement in &task.resources {
                let consumed = pool.consume(resource_requirement)?;
                if resource_requirement.reserves_new() {
                    let reserved = stamp_reservation(resource_requirement, consumed);
                    reserves.push(reserved.clone());
                    resources.push(reserved);
                } else {
                    resources.push(consumed);
                }
            }

            for port in &task.dynamic_ports {
                let reserved = pool
                    .consume_dynamic_port(port)?
                    .reserved(&port.role, &port.principal)
                    .with_resource_id(Ulid::new().to_string())
                    .with_label(DYNAMIC_PORT_KEY, &port.port_name);
                reserves.push(reserved.clone());
                resources.push(reserved);
            }

            let mut task_info = task.task_info.clone();
            task_info.resources = resources;
            launches.push(OfferRecommendation::launch(offer, task_info));
        }

        let mut recommendations = Vec::with_capacity(launches.len() + 1);
        if !reserves.is_empty() {
            recommendations.push(OfferRecommendation::reserve(offer, reserves));
        }
        recommendations.extend(launches);
        Some(recommendations)
    }
}

impl OfferEvaluator for DefaultOfferEvaluator {
    fn evaluate(
        &self,
        requirement: &PodInstanceRequirement,
        offers: &[Offer],
    ) -> Result<Vec<OfferRecommendation>> {
        let offer_requirement = self.provider.offer_requirement(requirement)?;
        let placement = self.placement_for(&offer_requirement);

        for offer in offers {
            if let Some(rule) = &placement {
                if !rule.accepts(offer, &offer_requirement) {
                    debug!(
                        "Offer {} rejected by placement for {}",
                        offer.id, offer_requirement.pod_instance
                    );
                    continue;
                }
            }

            if let Some(recommendations) = self.try_offer(offer, &offer_requirement) {
                info!(
                    "Offer {} satisfies {} ({} operations)",
                    offer.id,
                    offer_requirement.pod_instance,
                    recommendations.len()
                );
                return Ok(recommendations);
            }
        }

        info!(
            "No offer out of {} satisfies {}",
            offers.len(),
            offer_requirement.pod_instance
        );
        Ok(Vec::new())
    }
}

/// Turn consumed unreserved capacity into the reservation the requirement asked for.
fn stamp_reservation(requirement: &ResourceRequirement, consumed: Resource) -> Resource {
    let desired = requirement.resource();
    let mut reserved = consumed;
    reserved.role = desired.role.clone();
    reserved.reservation = desired.reservation.clone();
    let mut reserved = reserved.with_resource_id(Ulid::new().to_string());

    if let Some(desired_disk) = &desired.disk {
        let disk = reserved.disk.get_or_insert_with(DiskInfo::default);
        disk.persistence = Some(Persistence {
            id: Ulid::new().to_string(),
        });
        disk.volume = desired_disk.volume.clone();
        if disk.source.is_none() {
            disk.source = desired_disk.source.clone();
        }
    }
    reserved
}
