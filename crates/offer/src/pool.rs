//! Per-offer pool of claimable resources.
//!
//! An offer's resources are split three ways when the pool is built:
//!
//! - reserved: anything carrying a resource id, keyed by that id
//! - atomic: unreserved mount volumes, which are consumed whole
//! - merged: every other unreserved resource, summed per name
//!
//! Consumption only ever removes from these maps and release only adds back,
//! so the pool never holds more than the offer advertised.

use std::collections::HashMap;

use berth_core::{Offer, OfferId, Range, Resource, Value};
use tracing::{debug, info, warn};

use crate::requirement::{DynamicPortRequirement, ResourceRequirement};

/// Claimable resources of a single offer.
#[derive(Debug, Clone)]
pub struct ResourcePool {
    offer_id: OfferId,
    atomic: HashMap<String, Vec<Resource>>,
    merged: HashMap<String, Value>,
    reserved: HashMap<String, Resource>,
}

impl ResourcePool {
    /// Build a pool from an offer's resources.
    pub fn new(offer: &Offer) -> Self {
        let mut atomic: HashMap<String, Vec<Resource>> = HashMap::new();
        let mut merged: HashMap<String, Value> = HashMap::new();
        let mut reserved = HashMap::new();

        for resource in &offer.resources {
            if let Some(id) = resource.resource_id() {
                reserved.insert(id.to_string(), resource.clone());
            } else if resource.is_atomic() {
                atomic
                    .entry(resource.name.clone())
                    .or_default()
                    .push(resource.clone());
            } else {
                add_merged(&mut merged, &resource.name, &resource.value);
            }
        }

        Self {
            offer_id: offer.id.clone(),
            atomic,
            merged,
            reserved,
        }
    }

    /// Offer this pool was built from.
    pub fn offer_id(&self) -> &OfferId {
        &self.offer_id
    }

    /// Unreserved atomic resources by name.
    pub fn atomic(&self) -> &HashMap<String, Vec<Resource>> {
        &self.atomic
    }

    /// Aggregated unreserved mergeable values by name.
    pub fn merged(&self) -> &HashMap<String, Value> {
        &self.merged
    }

    /// Reserved resources by resource id.
    pub fn reserved(&self) -> &HashMap<String, Resource> {
        &self.reserved
    }

    /// Consume a resource satisfying `requirement`, or leave the pool untouched.
    pub fn consume(&mut self, requirement: &ResourceRequirement) -> Option<Resource> {
        if let Some(resource_id) = requirement.resource_id() {
            debug!("Retrieving reserved resource {}", resource_id);
            self.consume_reserved(resource_id, requirement)
        } else if requirement.is_atomic() {
            debug!("Retrieving atomic resource {}", requirement.name());
            self.consume_atomic(requirement)
        } else {
            debug!("Retrieving mergeable resource {}", requirement.name());
            self.consume_merged(requirement.name(), requirement.value())
        }
    }

    /// Consume the first free port of the named range resource.
    pub fn consume_dynamic_port(&mut self, requirement: &DynamicPortRequirement) -> Option<Resource> {
        let Some(begin) = self
            .merged
            .get(&requirement.name)
            .and_then(Value::first_range)
            .map(|range| range.begin)
        else {
            info!("Offer {} has no free {} port", self.offer_id, requirement.name);
            return None;
        };
        self.consume_merged(&requirement.name, &Value::ranges([Range::single(begin)]))
    }

    /// Make a previously consumed resource available again.
    pub fn release(&mut self, resource: &Resource) {
        if resource.is_atomic() {
            self.atomic
                .entry(resource.name.clone())
                .or_default()
                .push(resource.to_unreserved());
        } else {
            add_merged(&mut self.merged, &resource.name, &resource.value);
        }
    }

    fn consume_reserved(
        &mut self,
        resource_id: &str,
        requirement: &ResourceRequirement,
    ) -> Option<Resource> {
        let Some(resource) = self.reserved.get(resource_id) else {
            warn!(
                "Failed to find reserved resource {} in offer {}, available: {:?}",
                resource_id,
                self.offer_id,
                self.reserved.keys().collect::<Vec<_>>()
            );
            return None;
        };

        if resource.is_atomic() && !requirement.value().is_satisfied_by(&resource.value) {
            warn!(
                "Reserved resource {} holds {}, needed {}",
                resource_id,
                resource.value,
                requirement.value()
            );
            return None;
        }

        self.reserved.remove(resource_id)
    }

    fn consume_atomic(&mut self, requirement: &ResourceRequirement) -> Option<Resource> {
        let candidates = self.atomic.remove(requirement.name()).unwrap_or_default();
        let mut remaining = Vec::with_capacity(candidates.len());
        let mut selected = None;

        // The whole list is walked so every entry but the selected one is kept.
        for resource in candidates {
            if selected.is_none() && requirement.value().is_satisfied_by(&resource.value) {
                selected = Some(resource);
            } else {
                remaining.push(resource);
            }
        }

        if !remaining.is_empty() {
            self.atomic.insert(requirement.name().to_string(), remaining);
        }

        if selected.is_none() {
            warn!(
                "No sufficient atomic resource {} in offer {} for {}",
                requirement.name(),
                self.offer_id,
                requirement.value()
            );
        }
        selected
    }

    fn consume_merged(&mut self, name: &str, desired: &Value) -> Option<Resource> {
        let Some(available) = self.merged.get(name) else {
            info!("Offer {} has no unreserved {} for {}", self.offer_id, name, desired);
            return None;
        };
        if !desired.is_satisfied_by(available) {
            info!(
                "Insufficient {} in offer {}: need {}, have {}",
                name, self.offer_id, desired, available
            );
            return None;
        }

        match available.subtract(desired) {
            Ok(left) => {
                self.merged.insert(name.to_string(), left);
                Some(Resource::unreserved(name, desired.clone()))
            }
            Err(e) => {
                warn!("Cannot consume {} from offer {}: {}", name, self.offer_id, e);
                None
            }
        }
    }
}

fn add_merged(merged: &mut HashMap<String, Value>, name: &str, value: &Value) {
    let current = merged
        .remove(name)
        .unwrap_or_else(|| Value::zero(value.value_type()));
    match current.add(value) {
        Ok(sum) => {
            merged.insert(name.to_string(), sum);
        }
        Err(e) => {
            warn!("Dropping {} value {}: {}", name, value, e);
            merged.insert(name.to_string(), current);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::UNRESERVED_ROLE;

    fn offer(resources: Vec<Resource>) -> Offer {
        Offer::new("offer-1", "agent-1", resources)
    }

    #[test]
    fn test_partition() {
        let pool = ResourcePool::new(&offer(vec![
            Resource::scalar("cpus", 2.0),
            Resource::scalar("cpus", 2.0),
            Resource::mount_disk(5000.0, "/mnt/a"),
            Resource::scalar("mem", 512.0)
                .reserved("role", "principal")
                .with_resource_id("rid-mem"),
        ]));

        assert_eq!(pool.merged()["cpus"], Value::scalar(4.0));
        assert_eq!(pool.atomic()["disk"].len(), 1);
        assert!(pool.reserved().contains_key("rid-mem"));
        assert!(!pool.merged().contains_key("mem"));
    }

    #[test]
    fn test_merged_consumption_is_conservative() {
        let mut pool = ResourcePool::new(&offer(vec![Resource::scalar("cpus", 4.0)]));

        let got = pool
            .consume(&ResourceRequirement::new(Resource::scalar("cpus", 2.4)))
            .unwrap();
        assert_eq!(got.value, Value::scalar(2.4));
        assert_eq!(got.role, UNRESERVED_ROLE);
        assert_eq!(pool.merged()["cpus"], Value::Scalar(1.6));

        assert!(pool
            .consume(&ResourceRequirement::new(Resource::scalar("cpus", 2.0)))
            .is_none());
        assert_eq!(pool.merged()["cpus"], Value::Scalar(1.6));
    }

    #[test]
    fn test_absent_merged_resource() {
        let mut pool = ResourcePool::new(&offer(vec![Resource::scalar("cpus", 4.0)]));

        assert!(pool
            .consume(&ResourceRequirement::new(Resource::scalar("gpus", 1.0)))
            .is_none());
        assert_eq!(pool.merged().len(), 1);
        assert_eq!(pool.merged()["cpus"], Value::scalar(4.0));
    }

    #[test]
    fn test_atomic_matching_preserves_non_matches() {
        let mut pool = ResourcePool::new(&offer(vec![
            Resource::mount_disk(5000.0, "/mnt/a"),
            Resource::mount_disk(5000.0, "/mnt/b"),
        ]));
        let req = ResourceRequirement::new(Resource::mount_disk(5000.0, ""));

        let got = pool.consume(&req).unwrap();
        assert_eq!(got.value, Value::scalar(5000.0));
        assert_eq!(pool.atomic()["disk"].len(), 1);

        pool.consume(&req).unwrap();
        assert!(!pool.atomic().contains_key("disk"));
        assert!(pool.consume(&req).is_none());
    }

    #[test]
    fn test_atomic_selects_first_sufficient() {
        let mut pool = ResourcePool::new(&offer(vec![
            Resource::mount_disk(100.0, "/mnt/small"),
            Resource::mount_disk(6000.0, "/mnt/big-1"),
            Resource::mount_disk(7000.0, "/mnt/big-2"),
        ]));
        let got = pool
            .consume(&ResourceRequirement::new(Resource::mount_disk(5000.0, "")))
            .unwrap();

        assert_eq!(got.value, Value::scalar(6000.0));
        let left: Vec<f64> = pool.atomic()["disk"]
            .iter()
            .map(|r| match r.value {
                Value::Scalar(v) => v,
                _ => 0.0,
            })
            .collect();
        assert_eq!(left, vec![100.0, 7000.0]);
    }

    #[test]
    fn test_reserved_lookup() {
        let reserved = Resource::mount_disk(5000.0, "/mnt/a")
            .reserved("role", "principal")
            .with_resource_id("rid-disk");
        let mut pool = ResourcePool::new(&offer(vec![reserved.clone()]));

        let too_big = ResourceRequirement::new(
            Resource::mount_disk(9000.0, "")
                .reserved("role", "principal")
                .with_resource_id("rid-disk"),
        );
        assert!(pool.consume(&too_big).is_none());
        assert!(pool.reserved().contains_key("rid-disk"));

        let fits = ResourceRequirement::new(reserved.clone());
        assert_eq!(pool.consume(&fits), Some(reserved));
        assert!(pool.reserved().is_empty());

        let missing = ResourceRequirement::new(
            Resource::scalar("cpus", 1.0)
                .reserved("role", "principal")
                .with_resource_id("rid-missing"),
        );
        assert!(pool.consume(&missing).is_none());
    }

    #[test]
    fn test_dynamic_port_takes_first_port() {
        let mut pool = ResourcePool::new(&offer(vec![Resource::unreserved(
            "ports",
            Value::ranges([Range::new(31000, 31005), Range::new(32000, 32000)]),
        )]));
        let req = DynamicPortRequirement {
            name: "ports".into(),
            port_name: "http".into(),
            role: "role".into(),
            principal: "principal".into(),
        };

        let first = pool.consume_dynamic_port(&req).unwrap();
        assert_eq!(first.value, Value::ranges([Range::single(31000)]));
        let second = pool.consume_dynamic_port(&req).unwrap();
        assert_eq!(second.value, Value::ranges([Range::single(31001)]));
        assert_eq!(
            pool.merged()["ports"],
            Value::ranges([Range::new(31002, 31005), Range::single(32000)])
        );
    }

    #[test]
    fn test_dynamic_port_without_ports() {
        let mut pool = ResourcePool::new(&offer(vec![Resource::scalar("cpus", 1.0)]));
        let req = DynamicPortRequirement {
            name: "ports".into(),
            port_name: "http".into(),
            role: "role".into(),
            principal: "principal".into(),
        };
        assert!(pool.consume_dynamic_port(&req).is_none());
    }

    #[test]
    fn test_release() {
        let mut pool = ResourcePool::new(&offer(vec![]));

        pool.release(&Resource::scalar("cpus", 1.5));
        pool.release(&Resource::scalar("cpus", 0.5));
        assert_eq!(pool.merged()["cpus"], Value::scalar(2.0));

        let reserved_disk = Resource::mount_disk(5000.0, "/mnt/a")
            .reserved("role", "principal")
            .with_resource_id("rid");
        pool.release(&reserved_disk);
        let released = &pool.atomic()["disk"][0];
        assert_eq!(released.role, UNRESERVED_ROLE);
        assert!(released.reservation.is_none());
    }

    #[test]
    fn test_type_mismatch_is_insufficient() {
        let mut pool = ResourcePool::new(&offer(vec![Resource::scalar("ports", 10.0)]));
        let req = ResourceRequirement::new(Resource::unreserved(
            "ports",
            Value::ranges([Range::single(80)]),
        ));
        assert!(pool.consume(&req).is_none());
        assert_eq!(pool.merged()["ports"], Value::scalar(10.0));
    }
}
