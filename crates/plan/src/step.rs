//! The default step state machine.

use std::sync::{Mutex, MutexGuard, PoisonError};

use berth_core::{
    ElementId, GoalState, Operation, PodInstanceRequirement, Status, StatusChange, TaskId,
    TaskState, TaskStatus,
};
use tracing::{debug, error, info, warn};

use crate::element::{Element, Step};
use crate::publisher::StatusPublisher;

#[derive(Debug)]
struct StepState {
    status: Status,
    // Insertion ordered; only holds tasks from the latest launch attempt.
    tasks: Vec<(TaskId, Status)>,
}

impl StepState {
    fn task_status_mut(&mut self, task_id: &TaskId) -> Option<&mut Status> {
        self.tasks
            .iter_mut()
            .find(|(id, _)| id == task_id)
            .map(|(_, status)| status)
    }

    /// First task that is not complete decides; no tasks means pending.
    fn rollup(&self) -> Status {
        if self.tasks.is_empty() {
            return Status::Pending;
        }
        self.tasks
            .iter()
            .map(|(_, status)| *status)
            .find(|status| *status != Status::Complete)
            .unwrap_or(Status::Complete)
    }
}

/// Launches one pod instance's tasks and tracks them to their goal state.
///
/// All state lives behind one mutex that is never held while calling into
/// another component; status changes are published after it is released.
#[derive(Debug)]
pub struct DefaultStep {
    id: ElementId,
    name: String,
    requirement: Option<PodInstanceRequirement>,
    errors: Vec<String>,
    state: Mutex<StepState>,
    publisher: Option<StatusPublisher>,
}

impl DefaultStep {
    /// Create a step launching `requirement`, starting in `status`.
    pub fn new(name: impl Into<String>, status: Status, requirement: PodInstanceRequirement) -> Self {
        let step = Self {
            id: ElementId::new(),
            name: name.into(),
            requirement: Some(requirement),
            errors: Vec::new(),
            state: Mutex::new(StepState {
                status,
                tasks: Vec::new(),
            }),
            publisher: None,
        };
        info!("{}: created with status {}", step.name, status);
        step
    }

    /// A step that could not be built; it stays in ERROR and launches nothing.
    pub fn errored(name: impl Into<String>, errors: Vec<String>) -> Self {
        let name = name.into();
        error!("{}: could not be built: {:?}", name, errors);
        Self {
            id: ElementId::new(),
            name,
            requirement: None,
            errors,
            state: Mutex::new(StepState {
                status: Status::Error,
                tasks: Vec::new(),
            }),
            publisher: None,
        }
    }

    /// Publish status changes through `publisher`.
    pub fn with_publisher(mut self, publisher: StatusPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Task ids tracked from the latest launch, with their sub-status.
    pub fn tasks(&self) -> Vec<(TaskId, Status)> {
        self.lock().tasks.clone()
    }

    /// Force the overall status.
    pub fn set_status(&self, status: Status) {
        let from = {
            let mut state = self.lock();
            std::mem::replace(&mut state.status, status)
        };
        self.status_changed(from, status);
    }

    fn lock(&self) -> MutexGuard<'_, StepState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status_changed(&self, from: Status, to: Status) {
        info!("{}: changed status from: {} to: {}", self.name, from, to);
        if from == to {
            return;
        }
        if let Some(publisher) = &self.publisher {
            publisher.publish(StatusChange::new(&self.name, self.id, from, to));
        }
    }

    fn goal_state(&self, status: &TaskStatus) -> Option<GoalState> {
        let requirement = self.requirement.as_ref()?;
        let goal = status
            .task_id
            .task_name()
            .and_then(|name| requirement.pod_instance.goal_state(name));
        match goal {
            Ok(goal) => Some(goal),
            Err(e) => {
                error!("{}: failed to update status: {}", self.name, e);
                None
            }
        }
    }
}

impl Element for DefaultStep {
    fn id(&self) -> ElementId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> Status {
        self.lock().status
    }

    fn errors(&self) -> Vec<String> {
        self.errors.clone()
    }

    fn update(&self, status: &TaskStatus) {
        info!("{} received status: {} for {}", self.name, status.state, status.task_id);

        {
            let state = self.lock();
            if !state.tasks.iter().any(|(id, _)| *id == status.task_id) {
                debug!("{} ignoring irrelevant status for {}", self.name, status.task_id);
                return;
            }
            if state.status.is_complete() {
                debug!("{} ignoring status for {}, step is complete", self.name, status.task_id);
                return;
            }
        }

        let Some(goal) = self.goal_state(status) else {
            return;
        };

        let (from, to) = {
            let mut state = self.lock();
            // Re-checked: the lock was released for the goal lookup.
            if state.status.is_complete() {
                return;
            }
            let Some(task_status) = state.task_status_mut(&status.task_id) else {
                return;
            };

            let retry = match status.state {
                TaskState::Error | TaskState::Failed | TaskState::Killed | TaskState::Killing => {
                    *task_status = Status::Pending;
                    true
                }
                TaskState::Staging | TaskState::Starting => {
                    *task_status = Status::Starting;
                    false
                }
                TaskState::Running => {
                    *task_status = if goal == GoalState::Running {
                        Status::Complete
                    } else {
                        Status::Starting
                    };
                    false
                }
                TaskState::Finished => {
                    *task_status = if goal == GoalState::Finished {
                        Status::Complete
                    } else {
                        Status::Pending
                    };
                    false
                }
                other => {
                    warn!("{}: failed to process unexpected state: {}", self.name, other);
                    false
                }
            };
            info!("Status for: {} is: {}", status.task_id, task_status);

            // A failed task sends the whole step back for a full retry.
            let next = if retry { Status::Pending } else { state.rollup() };
            (std::mem::replace(&mut state.status, next), next)
        };

        self.status_changed(from, to);
    }

    fn restart(&self) {
        warn!("Restarting step: '{} [{}]'", self.name, self.id);
        self.set_status(Status::Pending);
    }

    fn force_complete(&self) {
        warn!("Forcing completion of step: '{} [{}]'", self.name, self.id);
        self.set_status(Status::Complete);
    }

    fn asset(&self) -> Option<String> {
        self.requirement.as_ref().map(|r| r.pod_instance.name())
    }
}

impl Step for DefaultStep {
    fn start(&self) -> Option<PodInstanceRequirement> {
        self.requirement.clone()
    }

    fn update_offer_status(&self, operations: &[Operation]) {
        info!("{}: updated with {} operations", self.name, operations.len());

        let (from, to) = {
            let mut state = self.lock();
            state.tasks.clear();
            for operation in operations {
                for task in operation.launched_tasks() {
                    if !task.task_id.is_empty() {
                        state.tasks.push((task.task_id.clone(), Status::Prepared));
                    }
                }
            }
            info!(
                "{} is now waiting for updates for task ids: {:?}",
                self.name,
                state.tasks.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>()
            );

            let next = if operations.is_empty() {
                Status::Prepared
            } else {
                Status::Starting
            };
            (std::mem::replace(&mut state.status, next), next)
        };

        self.status_changed(from, to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::{
        PodInstance, PodSpec, ResourceSet, TaskInfo, TaskSpec,
    };

    fn task_spec(name: &str, goal: GoalState) -> TaskSpec {
        TaskSpec {
            name: name.into(),
            goal,
            command: String::new(),
            resource_set: ResourceSet {
                id: format!("{}-resources", name),
                role: "role".into(),
                principal: "principal".into(),
                resources: vec![],
                volumes: vec![],
                ports: vec![],
            },
            rlimits: vec![],
        }
    }

    fn requirement() -> PodInstanceRequirement {
        let pod = PodSpec {
            pod_type: "node".into(),
            count: 1,
            tasks: vec![
                task_spec("server", GoalState::Running),
                task_spec("init", GoalState::Finished),
            ],
            placement: None,
        };
        PodInstanceRequirement::new(
            PodInstance::new(pod, 0),
            vec!["server".into(), "init".into()],
        )
    }

    /// A step that launched both tasks of node-0.
    fn launched_step() -> (DefaultStep, TaskId, TaskId) {
        let step = DefaultStep::new("node-0:[server, init]", Status::Pending, requirement());
        let server = TaskInfo::new("node-0-server");
        let init = TaskInfo::new("node-0-init");
        step.update_offer_status(&[Operation::Launch {
            task_infos: vec![server.clone(), init.clone()],
        }]);
        (step, server.task_id, init.task_id)
    }

    #[test]
    fn test_update_offer_status() {
        let step = DefaultStep::new("node-0", Status::Pending, requirement());

        step.update_offer_status(&[]);
        assert_eq!(step.status(), Status::Prepared);
        assert!(step.tasks().is_empty());

        let (step, server, init) = launched_step();
        assert_eq!(step.status(), Status::Starting);
        assert_eq!(
            step.tasks(),
            vec![(server, Status::Prepared), (init, Status::Prepared)]
        );
    }

    #[test]
    fn test_empty_task_ids_are_not_tracked() {
        let step = DefaultStep::new("node-0", Status::Pending, requirement());
        let mut transient = TaskInfo::new("node-0-init");
        transient.task_id = TaskId::empty();
        step.update_offer_status(&[Operation::Launch {
            task_infos: vec![transient],
        }]);

        assert_eq!(step.status(), Status::Starting);
        assert!(step.tasks().is_empty());
    }

    #[test]
    fn test_status_rollup() {
        let (step, server, init) = launched_step();

        step.update(&TaskStatus::new(server.clone(), TaskState::Running));
        step.update(&TaskStatus::new(init.clone(), TaskState::Starting));
        assert_eq!(step.status(), Status::Starting);

        step.update(&TaskStatus::new(init.clone(), TaskState::Finished));
        assert_eq!(step.status(), Status::Complete);

        // Nothing moves a complete step.
        step.update(&TaskStatus::new(TaskId::for_task("node-0-server"), TaskState::Failed));
        step.update(&TaskStatus::new(server, TaskState::Failed));
        assert_eq!(step.status(), Status::Complete);
    }

    #[test]
    fn test_untracked_status_is_ignored() {
        let (step, _, _) = launched_step();
        step.update(&TaskStatus::new(TaskId::for_task("node-0-server"), TaskState::Running));
        assert_eq!(step.status(), Status::Starting);
        assert!(step.tasks().iter().all(|(_, s)| *s == Status::Prepared));
    }

    #[test]
    fn test_failure_resets_whole_step() {
        let (step, server, init) = launched_step();
        step.update(&TaskStatus::new(init.clone(), TaskState::Finished));
        step.update(&TaskStatus::new(server.clone(), TaskState::Failed));

        assert_eq!(step.status(), Status::Pending);
        assert_eq!(
            step.tasks(),
            vec![(server, Status::Pending), (init, Status::Complete)]
        );
    }

    #[test]
    fn test_goal_mismatch() {
        let (step, server, init) = launched_step();

        // Running is not the goal of a run-to-completion task.
        step.update(&TaskStatus::new(init.clone(), TaskState::Running));
        assert_eq!(step.tasks()[1].1, Status::Starting);

        // Finishing is not the goal of a long-running task.
        step.update(&TaskStatus::new(server.clone(), TaskState::Finished));
        assert_eq!(step.tasks()[0].1, Status::Pending);
        assert_eq!(step.status(), Status::Pending);
    }

    #[test]
    fn test_unknown_goal_leaves_status() {
        let step = DefaultStep::new("node-0", Status::Pending, requirement());
        let stray = TaskInfo::new("node-0-sidecar");
        step.update_offer_status(&[Operation::Launch {
            task_infos: vec![stray.clone()],
        }]);

        step.update(&TaskStatus::new(stray.task_id.clone(), TaskState::Running));
        assert_eq!(step.status(), Status::Starting);
        assert_eq!(step.tasks(), vec![(stray.task_id, Status::Prepared)]);
    }

    #[test]
    fn test_admin_overrides() {
        let (step, _, _) = launched_step();
        step.force_complete();
        assert_eq!(step.status(), Status::Complete);
        step.restart();
        assert_eq!(step.status(), Status::Pending);
    }

    #[test]
    fn test_errored_step() {
        let step = DefaultStep::errored("node-0", vec!["bad rlimit".into()]);
        assert_eq!(step.status(), Status::Error);
        assert!(step.has_errors());
        assert!(step.start().is_none());
        assert!(step.asset().is_none());
    }

    #[test]
    fn test_asset_is_pod_instance() {
        let step = DefaultStep::new("node-0", Status::Pending, requirement());
        assert_eq!(step.asset().as_deref(), Some("node-0"));
    }

    #[tokio::test]
    async fn test_changes_are_published() {
        let publisher = StatusPublisher::default();
        let mut changes = publisher.subscribe();
        let step = DefaultStep::new("node-0", Status::Pending, requirement())
            .with_publisher(publisher);

        step.update_offer_status(&[]);
        // Same status again publishes nothing.
        step.update_offer_status(&[]);
        step.force_complete();

        let first = changes.recv().await.unwrap();
        assert_eq!((first.from, first.to), (Status::Pending, Status::Prepared));
        let second = changes.recv().await.unwrap();
        assert_eq!((second.from, second.to), (Status::Prepared, Status::Complete));
        assert_eq!(second.element_id, step.id());
    }
}
