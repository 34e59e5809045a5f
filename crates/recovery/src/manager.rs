//! The recovery plan manager.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use berth_core::{needs_recovery, ServiceSpec, TaskId, TaskInfo, TaskStatus};
use berth_plan::{
    Element, ParallelStrategy, Phase, Plan, PlanManager, SerialStrategy, StatusPublisher, Step,
};
use berth_storage::StateStore;
use tracing::{debug, error, info, warn};

use crate::constrainer::LaunchConstrainer;
use crate::error::Result;
use crate::monitor::FailureMonitor;
use crate::requirement::RecoveryRequirementProvider;
use crate::step::{RecoveryStep, RecoveryType};

const RECOVERY_PLAN_NAME: &str = "recovery";

/// Builds recovery steps for pods whose tasks have all failed.
///
/// The plan is rebuilt from the state store on every candidate request:
/// finished recovery steps are dropped and newly failed pods get a step,
/// unless the pod is being worked on elsewhere or the launch constrainer
/// holds it back. Only one PERMANENT recovery is outstanding at a time.
///
/// Rebuilt plans share the manager's strategies and publisher, so an
/// interrupt or a subscription outlives the rebuild.
pub struct RecoveryPlanManager {
    store: Arc<dyn StateStore>,
    provider: RecoveryRequirementProvider,
    constrainer: Arc<dyn LaunchConstrainer>,
    monitor: Arc<dyn FailureMonitor>,
    publisher: StatusPublisher,
    phase_strategy: Arc<ParallelStrategy>,
    plan_strategy: Arc<SerialStrategy>,
    steps: Mutex<Vec<Arc<RecoveryStep>>>,
    plan: Mutex<Arc<Plan>>,
}

impl RecoveryPlanManager {
    /// Create a manager recovering the pods of `service`.
    pub fn new(
        store: Arc<dyn StateStore>,
        service: ServiceSpec,
        constrainer: Arc<dyn LaunchConstrainer>,
        monitor: Arc<dyn FailureMonitor>,
    ) -> Self {
        let publisher = StatusPublisher::default();
        let phase_strategy = Arc::new(ParallelStrategy::new());
        let plan_strategy = Arc::new(SerialStrategy::new());
        let plan = build_plan(&[], &phase_strategy, &plan_strategy, &publisher);
        Self {
            store,
            provider: RecoveryRequirementProvider::new(service),
            constrainer,
            monitor,
            publisher,
            phase_strategy,
            plan_strategy,
            steps: Mutex::new(Vec::new()),
            plan: Mutex::new(Arc::new(plan)),
        }
    }

    /// Recovery steps and the recovery plan publish their status changes
    /// through `publisher`.
    pub fn with_publisher(mut self, publisher: StatusPublisher) -> Self {
        self.publisher = publisher;
        self.plan = Mutex::new(Arc::new(self.rebuild(&[])));
        self
    }

    /// New recovery steps for failed pods, given the assets in flight elsewhere.
    pub async fn create_steps(&self, dirty: &HashSet<String>) -> Result<Vec<Arc<RecoveryStep>>> {
        let tasks = self.store.fetch_tasks().await?;
        let statuses: HashMap<String, TaskStatus> = self
            .store
            .fetch_statuses()
            .await?
            .into_iter()
            .filter_map(|status| Some((status.task_id.task_name().ok()?.to_string(), status)))
            .collect();

        let mut pods: BTreeMap<String, Vec<TaskInfo>> = BTreeMap::new();
        for task in tasks {
            match task.pod_instance_name() {
                Some(pod) => pods.entry(pod).or_default().push(task),
                None => debug!("Task {} has no pod labels, not recoverable", task.name),
            }
        }

        let (in_flight, mut permanent_in_flight) = {
            let current = self.steps.lock().unwrap_or_else(PoisonError::into_inner);
            let pending: Vec<&Arc<RecoveryStep>> =
                current.iter().filter(|step| !step.is_complete()).collect();
            let assets: HashSet<String> = pending.iter().filter_map(|step| step.asset()).collect();
            let permanent = pending
                .iter()
                .any(|step| step.recovery_type() == RecoveryType::Permanent);
            (assets, permanent)
        };

        let mut failing: HashSet<TaskId> = HashSet::new();
        let mut steps = Vec::new();
        for (pod, tasks) in pods {
            let all_failed = tasks.iter().all(|task| {
                statuses
                    .get(&task.name)
                    .filter(|status| status.task_id == task.task_id)
                    .is_some_and(|status| needs_recovery(task.goal_state(), status))
            });
            if !all_failed {
                continue;
            }
            failing.extend(tasks.iter().map(|task| task.task_id.clone()));

            if dirty.contains(&pod) || tasks.iter().any(|t| dirty.contains(&t.name)) {
                debug!("Pod {} is dirty, not recovering", pod);
                continue;
            }
            if in_flight.contains(&pod) {
                continue;
            }

            let recovery_type = if tasks.iter().any(|task| self.monitor.has_failed(task)) {
                RecoveryType::Permanent
            } else {
                RecoveryType::Transient
            };
            if recovery_type == RecoveryType::Permanent && permanent_in_flight {
                info!("{} waits for the outstanding PERMANENT recovery", pod);
                continue;
            }
            if !self.constrainer.can_launch(recovery_type) {
                info!("{} recovery of {} is constrained", recovery_type, pod);
                continue;
            }

            let recovery = match self.provider.requirement(&tasks, recovery_type) {
                Ok(recovery) => recovery,
                Err(e) => {
                    warn!("Cannot recover pod {}: {}", pod, e);
                    continue;
                }
            };
            let names: Vec<&str> = recovery
                .requirement
                .tasks_to_launch
                .iter()
                .map(String::as_str)
                .collect();
            let name = format!("{}:[{}]", pod, names.join(", "));
            info!("Recovering {} ({})", name, recovery_type);

            if recovery_type == RecoveryType::Permanent {
                permanent_in_flight = true;
            }
            let step = RecoveryStep::new(name, recovery, Arc::clone(&self.constrainer))
                .with_publisher(self.publisher.clone());
            steps.push(Arc::new(step));
        }

        self.monitor.prune(&failing);
        Ok(steps)
    }

    async fn refresh(&self, dirty: &HashSet<String>) {
        let created = match self.create_steps(dirty).await {
            Ok(steps) => steps,
            Err(e) => {
                error!("Failed to read recovery state: {}", e);
                Vec::new()
            }
        };

        let mut steps = self.steps.lock().unwrap_or_else(PoisonError::into_inner);
        steps.retain(|step| !step.is_complete());
        steps.extend(created);
        let plan = Arc::new(self.rebuild(&steps));
        *self.plan.lock().unwrap_or_else(PoisonError::into_inner) = plan;
    }

    fn rebuild(&self, steps: &[Arc<RecoveryStep>]) -> Plan {
        build_plan(steps, &self.phase_strategy, &self.plan_strategy, &self.publisher)
    }
}

fn build_plan(
    steps: &[Arc<RecoveryStep>],
    phase_strategy: &Arc<ParallelStrategy>,
    plan_strategy: &Arc<SerialStrategy>,
    publisher: &StatusPublisher,
) -> Plan {
    let steps: Vec<Arc<dyn Step>> = steps
        .iter()
        .map(|step| Arc::clone(step) as Arc<dyn Step>)
        .collect();
    let phase = Phase::new(RECOVERY_PLAN_NAME, steps, Box::new(Arc::clone(phase_strategy)));
    Plan::new(
        RECOVERY_PLAN_NAME,
        vec![Arc::new(phase)],
        Box::new(Arc::clone(plan_strategy)),
    )
    .with_publisher(publisher.clone())
}

#[async_trait]
impl PlanManager for RecoveryPlanManager {
    fn plan(&self) -> Arc<Plan> {
        Arc::clone(&self.plan.lock().unwrap_or_else(PoisonError::into_inner))
    }

    async fn candidates(&self, dirty: &HashSet<String>) -> Vec<Arc<dyn Step>> {
        self.refresh(dirty).await;
        let mut taken = dirty.clone();
        self.plan()
            .candidates(dirty)
            .into_iter()
            .filter(|step| step.asset().map_or(true, |asset| taken.insert(asset)))
            .collect()
    }

    async fn update(&self, status: &TaskStatus) {
        self.plan().update(status);
    }
}
