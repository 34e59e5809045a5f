//! Building deploy steps, phases and plans from pod specs and stored state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use berth_core::{
    CoreError, GoalState, PodInstance, PodInstanceRequirement, PodSpec, ServiceSpec, Status,
    TaskInfo, TaskState, TaskStatus,
};
use berth_storage::StateStore;
use tracing::{debug, warn};

use crate::element::Step;
use crate::error::{PlanError, Result};
use crate::phase::Phase;
use crate::plan::Plan;
use crate::publisher::StatusPublisher;
use crate::step::DefaultStep;
use crate::strategy::{SerialStrategy, StrategyKind};

/// Builds one step per pod instance, seeded from previously stored tasks.
///
/// A step whose tasks were all launched before and reached their goal
/// starts out complete, so a restarted scheduler does not redeploy them.
#[derive(Debug, Clone, Default)]
pub struct StepFactory {
    tasks: HashMap<String, TaskInfo>,
    statuses: HashMap<String, TaskStatus>,
    publisher: Option<StatusPublisher>,
}

impl StepFactory {
    /// Create a factory over known tasks and their latest statuses.
    pub fn new(tasks: Vec<TaskInfo>, statuses: Vec<TaskStatus>) -> Self {
        let statuses = statuses
            .into_iter()
            .filter_map(|status| match status.task_id.task_name() {
                Ok(name) => Some((name.to_string(), status)),
                Err(e) => {
                    warn!("Ignoring stored status: {}", e);
                    None
                }
            })
            .collect();
        Self {
            tasks: tasks.into_iter().map(|t| (t.name.clone(), t)).collect(),
            statuses,
            publisher: None,
        }
    }

    /// Create a factory from the contents of `store`.
    pub async fn from_store(store: &dyn StateStore) -> Result<Self> {
        Ok(Self::new(store.fetch_tasks().await?, store.fetch_statuses().await?))
    }

    /// Steps built from now on publish through `publisher`.
    pub fn with_publisher(mut self, publisher: StatusPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Build the step launching `tasks_to_launch` of `pod_instance`.
    pub fn step(&self, pod_instance: &PodInstance, tasks_to_launch: &[String]) -> Result<DefaultStep> {
        let mut resource_sets = HashSet::new();
        for task_name in tasks_to_launch {
            let spec = pod_instance
                .task(task_name)
                .ok_or_else(|| CoreError::UnknownTask {
                    pod: pod_instance.name(),
                    task: task_name.clone(),
                })?;
            for rlimit in &spec.rlimits {
                rlimit.validate()?;
            }
            if !resource_sets.insert(spec.resource_set.id.as_str()) {
                return Err(PlanError::InvalidStep(format!(
                    "resource set {} is shared by more than one task of {}",
                    spec.resource_set.id,
                    pod_instance.name()
                )));
            }
        }

        let mut existing = Vec::new();
        let mut complete = !tasks_to_launch.is_empty();
        for task_name in tasks_to_launch {
            let instance_name = pod_instance.task_instance_name(task_name);
            let goal = pod_instance.goal_state(&instance_name)?;
            match self.tasks.get(&instance_name) {
                Some(task) => {
                    complete &= self.reached_goal(task, goal);
                    existing.push(task.clone());
                }
                None => complete = false,
            }
        }

        let name = format!("{}:[{}]", pod_instance.name(), tasks_to_launch.join(", "));
        let status = if complete { Status::Complete } else { Status::Pending };
        debug!("Built step {} with status {}", name, status);

        let requirement = PodInstanceRequirement::new(pod_instance.clone(), tasks_to_launch.to_vec())
            .with_existing_tasks(existing);
        let step = DefaultStep::new(name, status, requirement);
        Ok(match &self.publisher {
            Some(publisher) => step.with_publisher(publisher.clone()),
            None => step,
        })
    }

    fn reached_goal(&self, task: &TaskInfo, goal: GoalState) -> bool {
        let Some(status) = self.statuses.get(&task.name) else {
            return false;
        };
        if status.task_id != task.task_id {
            return false;
        }
        matches!(
            (goal, status.state),
            (GoalState::Running, TaskState::Running) | (GoalState::Finished, TaskState::Finished)
        )
    }
}

/// Builds deploy phases and plans out of a [`StepFactory`].
#[derive(Debug, Clone, Default)]
pub struct PhaseFactory {
    steps: StepFactory,
}

impl PhaseFactory {
    /// Create a phase factory.
    pub fn new(steps: StepFactory) -> Self {
        Self { steps }
    }

    /// One step per instance of `pod`, covering its long-running tasks.
    ///
    /// A step that cannot be built becomes an errored step; its siblings
    /// are still built.
    pub fn phase(&self, pod: &PodSpec, strategy: StrategyKind) -> Phase {
        let tasks: Vec<String> = pod
            .tasks
            .iter()
            .filter(|t| t.goal == GoalState::Running)
            .map(|t| t.name.clone())
            .collect();

        let steps: Vec<Arc<dyn Step>> = (0..pod.count)
            .map(|index| {
                let instance = PodInstance::new(pod.clone(), index);
                match self.steps.step(&instance, &tasks) {
                    Ok(step) => Arc::new(step) as Arc<dyn Step>,
                    Err(e) => Arc::new(DefaultStep::errored(
                        format!("{}:[{}]", instance.name(), tasks.join(", ")),
                        vec![e.to_string()],
                    )),
                }
            })
            .collect();

        Phase::new(pod.pod_type.clone(), steps, strategy.build())
    }

    /// The deploy plan: one phase per pod type, deployed in declaration order.
    pub fn plan(&self, service: &ServiceSpec, strategy: StrategyKind) -> Plan {
        let phases = service
            .pods
            .iter()
            .map(|pod| Arc::new(self.phase(pod, strategy)))
            .collect();
        Plan::new("deploy", phases, Box::new(SerialStrategy::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;
    use berth_core::{RLimit, ResourceSet, TaskSpec};
    use berth_storage::MemoryStateStore;

    fn task(name: &str, goal: GoalState, resource_set: &str) -> TaskSpec {
        TaskSpec {
            name: name.into(),
            goal,
            command: String::new(),
            resource_set: ResourceSet {
                id: resource_set.into(),
                role: "role".into(),
                principal: "principal".into(),
                resources: vec![],
                volumes: vec![],
                ports: vec![],
            },
            rlimits: vec![],
        }
    }

    fn pod() -> PodSpec {
        PodSpec {
            pod_type: "node".into(),
            count: 2,
            tasks: vec![
                task("server", GoalState::Running, "server-rs"),
                task("init", GoalState::Finished, "init-rs"),
            ],
            placement: None,
        }
    }

    #[test]
    fn test_fresh_step_is_pending() {
        let factory = StepFactory::default();
        let step = factory
            .step(&PodInstance::new(pod(), 0), &["server".into()])
            .unwrap();

        assert_eq!(step.name(), "node-0:[server]");
        assert_eq!(step.status(), Status::Pending);
        assert_eq!(step.asset().as_deref(), Some("node-0"));
        assert!(step.start().unwrap().existing_tasks.is_empty());
    }

    #[tokio::test]
    async fn test_step_complete_when_goal_reached() {
        let store = MemoryStateStore::new();
        let server = TaskInfo::new("node-0-server");
        store.store_tasks(&[server.clone()]).await.unwrap();
        store
            .store_status(&TaskStatus::new(server.task_id.clone(), TaskState::Running))
            .await
            .unwrap();

        let factory = StepFactory::from_store(&store).await.unwrap();
        let instance = PodInstance::new(pod(), 0);

        let step = factory.step(&instance, &["server".into()]).unwrap();
        assert_eq!(step.status(), Status::Complete);
        assert_eq!(step.start().unwrap().existing_tasks, vec![server]);

        // The init task never ran, so the combined step still has work to do.
        let step = factory
            .step(&instance, &["server".into(), "init".into()])
            .unwrap();
        assert_eq!(step.status(), Status::Pending);
    }

    #[test]
    fn test_status_of_old_incarnation_does_not_count() {
        let server = TaskInfo::new("node-0-server");
        let stale = TaskStatus::new(
            berth_core::TaskId::for_task("node-0-server"),
            TaskState::Running,
        );
        let factory = StepFactory::new(vec![server], vec![stale]);

        let step = factory
            .step(&PodInstance::new(pod(), 0), &["server".into()])
            .unwrap();
        assert_eq!(step.status(), Status::Pending);
    }

    #[test]
    fn test_invalid_steps() {
        let factory = StepFactory::default();
        let instance = PodInstance::new(pod(), 0);
        assert!(factory.step(&instance, &["sidecar".into()]).is_err());

        let mut shared = pod();
        shared.tasks[1].resource_set.id = "server-rs".into();
        let instance = PodInstance::new(shared, 0);
        assert!(matches!(
            factory.step(&instance, &["server".into(), "init".into()]),
            Err(PlanError::InvalidStep(_))
        ));
    }

    #[test]
    fn test_phase_isolates_broken_steps() {
        let mut broken = pod();
        broken.tasks[0].rlimits = vec![RLimit {
            name: "RLIMIT_NOFILE".into(),
            soft: Some(10),
            hard: None,
        }];

        let phase = PhaseFactory::default().phase(&broken, StrategyKind::Parallel);
        assert_eq!(phase.steps().len(), 2);
        assert!(phase.steps().iter().all(|s| s.status() == Status::Error));
        assert_eq!(phase.status(), Status::Error);

        let phase = PhaseFactory::default().phase(&pod(), StrategyKind::Parallel);
        let names: Vec<_> = phase.steps().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, ["node-0:[server]", "node-1:[server]"]);
    }

    #[test]
    fn test_deploy_plan() {
        let mut other = pod();
        other.pod_type = "proxy".into();
        other.count = 1;
        let service = ServiceSpec {
            name: "svc".into(),
            role: "role".into(),
            principal: "principal".into(),
            pods: vec![pod(), other],
        };

        let plan = PhaseFactory::default().plan(&service, StrategyKind::Serial);
        assert_eq!(plan.name(), "deploy");
        assert_eq!(plan.phases().len(), 2);
        assert_eq!(plan.steps().count(), 3);

        let candidates = plan.candidates(&HashSet::new());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name(), "node-0:[server]");
    }
}
