//! Plan managers own one plan each and hand its steps to the offer cycle.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use berth_core::TaskStatus;
use tracing::debug;

use crate::element::{Element, Step};
use crate::plan::Plan;

/// Owns a plan and answers for it during offer cycles.
#[async_trait]
pub trait PlanManager: Send + Sync {
    /// The managed plan.
    fn plan(&self) -> Arc<Plan>;

    /// Steps to try this cycle, skipping any touching a `dirty` asset.
    async fn candidates(&self, dirty: &HashSet<String>) -> Vec<Arc<dyn Step>>;

    /// Feed a task status report to the plan.
    async fn update(&self, status: &TaskStatus);

    /// Assets of steps currently in flight.
    fn dirty_assets(&self) -> HashSet<String> {
        in_progress_assets(self.plan().steps())
    }
}

/// Assets of the steps that are prepared or starting.
pub fn in_progress_assets<'a>(steps: impl Iterator<Item = &'a Arc<dyn Step>>) -> HashSet<String> {
    steps
        .filter(|step| step.status().is_in_progress())
        .filter_map(|step| step.asset())
        .collect()
}

/// Manages a fixed plan, such as the deploy plan.
pub struct DefaultPlanManager {
    plan: Arc<Plan>,
}

impl DefaultPlanManager {
    /// Manage `plan`.
    pub fn new(plan: Plan) -> Self {
        Self {
            plan: Arc::new(plan),
        }
    }
}

#[async_trait]
impl PlanManager for DefaultPlanManager {
    fn plan(&self) -> Arc<Plan> {
        Arc::clone(&self.plan)
    }

    async fn candidates(&self, dirty: &HashSet<String>) -> Vec<Arc<dyn Step>> {
        let mut taken = dirty.clone();
        let candidates: Vec<Arc<dyn Step>> = self
            .plan
            .candidates(dirty)
            .into_iter()
            .filter(|step| match step.asset() {
                Some(asset) => taken.insert(asset),
                None => true,
            })
            .collect();
        debug!("Plan {} offers {} candidate steps", self.plan.name(), candidates.len());
        candidates
    }

    async fn update(&self, status: &TaskStatus) {
        self.plan.update(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::{PhaseFactory, StepFactory};
    use crate::strategy::StrategyKind;
    use berth_core::{
        GoalState, Operation, PodSpec, ResourceSet, ServiceSpec, TaskInfo, TaskSpec,
    };

    fn manager() -> DefaultPlanManager {
        let pod = PodSpec {
            pod_type: "node".into(),
            count: 2,
            tasks: vec![TaskSpec {
                name: "server".into(),
                goal: GoalState::Running,
                command: String::new(),
                resource_set: ResourceSet {
                    id: "rs".into(),
                    role: "role".into(),
                    principal: "principal".into(),
                    resources: vec![],
                    volumes: vec![],
                    ports: vec![],
                },
                rlimits: vec![],
            }],
            placement: None,
        };
        let service = ServiceSpec {
            name: "svc".into(),
            role: "role".into(),
            principal: "principal".into(),
            pods: vec![pod],
        };
        let factory = PhaseFactory::new(StepFactory::default());
        DefaultPlanManager::new(factory.plan(&service, StrategyKind::Parallel))
    }

    #[tokio::test]
    async fn test_candidates_skip_dirty_assets() {
        let manager = manager();
        let all = manager.candidates(&HashSet::new()).await;
        assert_eq!(all.len(), 2);

        let dirty = HashSet::from(["node-0".to_string()]);
        let some = manager.candidates(&dirty).await;
        assert_eq!(some.len(), 1);
        assert_eq!(some[0].asset().as_deref(), Some("node-1"));
    }

    #[tokio::test]
    async fn test_dirty_assets_are_in_progress_steps() {
        let manager = manager();
        assert!(manager.dirty_assets().is_empty());

        let plan = manager.plan();
        let step = plan.steps().next().unwrap();
        step.update_offer_status(&[Operation::Launch {
            task_infos: vec![TaskInfo::new("node-0-server")],
        }]);

        assert_eq!(manager.dirty_assets(), HashSet::from(["node-0".to_string()]));
    }
}
