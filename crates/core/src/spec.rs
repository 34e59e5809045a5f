//! Declarative service model - what the scheduler is asked to run.
//!
//! These types are produced by an external spec loader; the scheduling core
//! only reads them.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::rlimit::RLimit;
use crate::task::TaskInfo;
use crate::value::Value;

/// Desired terminal state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoalState {
    /// Task should keep running
    Running,
    /// Task should run to completion
    Finished,
}

impl GoalState {
    /// Label form of the goal state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
        }
    }
}

/// A whole service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Service name
    pub name: String,

    /// Role resources are reserved for
    pub role: String,

    /// Principal reservations are made with
    pub principal: String,

    /// Pod types, deployed in declaration order
    pub pods: Vec<PodSpec>,
}

/// A pod type: a group of co-located tasks, instantiated `count` times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodSpec {
    /// Pod type name
    #[serde(rename = "type")]
    pub pod_type: String,

    /// Number of instances
    pub count: u32,

    /// Tasks in each instance
    pub tasks: Vec<TaskSpec>,

    /// Opaque placement rule expression, interpreted by the placement capability
    #[serde(default)]
    pub placement: Option<String>,
}

/// A task inside a pod.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Task name, unique within the pod
    pub name: String,

    /// Goal state
    pub goal: GoalState,

    /// Command line
    #[serde(default)]
    pub command: String,

    /// Resources the task runs with
    pub resource_set: ResourceSet,

    /// Process resource limits
    #[serde(default)]
    pub rlimits: Vec<RLimit>,
}

/// Named group of resources consumed by one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSet {
    /// Resource set id
    pub id: String,

    /// Role to reserve under
    pub role: String,

    /// Principal to reserve with
    pub principal: String,

    /// Plain resources (cpus, mem...)
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,

    /// Disk volumes
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,

    /// Ports
    #[serde(default)]
    pub ports: Vec<PortSpec>,
}

/// A plain resource request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Resource name
    pub name: String,
    /// Requested value
    pub value: Value,
}

/// Kind of volume requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolumeType {
    /// Slice of the agent's root disk
    Root,
    /// Whole mounted device
    Mount,
}

/// A disk volume request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSpec {
    /// Volume type
    pub volume_type: VolumeType,
    /// Size in MB
    pub size_mb: f64,
    /// Mount point inside the container
    pub container_path: String,
}

/// A port request. Port `0` asks for any free port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSpec {
    /// Port name
    pub name: String,
    /// Requested port, or 0 for a dynamic port
    #[serde(default)]
    pub port: u64,
}

/// One instance of a pod type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodInstance {
    /// Pod type
    pub pod: PodSpec,
    /// Instance index
    pub index: u32,
}

impl PodInstance {
    /// Create a pod instance.
    pub fn new(pod: PodSpec, index: u32) -> Self {
        Self { pod, index }
    }

    /// Instance name, `<type>-<index>`.
    pub fn name(&self) -> String {
        format!("{}-{}", self.pod.pod_type, self.index)
    }

    /// Instance name of one of the pod's tasks, `<type>-<index>-<task>`.
    pub fn task_instance_name(&self, task_name: &str) -> String {
        format!("{}-{}", self.name(), task_name)
    }

    /// Task spec by task name.
    pub fn task(&self, task_name: &str) -> Option<&TaskSpec> {
        self.pod.tasks.iter().find(|t| t.name == task_name)
    }

    /// Goal state of the task with the given instance name.
    pub fn goal_state(&self, task_instance_name: &str) -> Result<GoalState> {
        self.pod
            .tasks
            .iter()
            .find(|t| self.task_instance_name(&t.name) == task_instance_name)
            .map(|t| t.goal)
            .ok_or_else(|| CoreError::UnknownTask {
                pod: self.name(),
                task: task_instance_name.to_string(),
            })
    }
}

/// A request to launch some of a pod instance's tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodInstanceRequirement {
    /// The pod instance
    pub pod_instance: PodInstance,

    /// Task names (as declared in the pod) to launch
    pub tasks_to_launch: Vec<String>,

    /// Previously launched incarnations of these tasks, whose reservations are re-used
    #[serde(default)]
    pub existing_tasks: Vec<TaskInfo>,
}

impl PodInstanceRequirement {
    /// Requirement for a fresh launch.
    pub fn new(pod_instance: PodInstance, tasks_to_launch: Vec<String>) -> Self {
        Self {
            pod_instance,
            tasks_to_launch,
            existing_tasks: Vec::new(),
        }
    }

    /// Attach previously launched task incarnations.
    pub fn with_existing_tasks(mut self, existing_tasks: Vec<TaskInfo>) -> Self {
        self.existing_tasks = existing_tasks;
        self
    }

    /// Instance names of the tasks to launch.
    pub fn task_instance_names(&self) -> Vec<String> {
        self.tasks_to_launch
            .iter()
            .map(|t| self.pod_instance.task_instance_name(t))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod() -> PodSpec {
        let json = r#"{
            "type": "node",
            "count": 2,
            "tasks": [
                {
                    "name": "server",
                    "goal": "RUNNING",
                    "command": "./server",
                    "resource_set": {
                        "id": "server-resources",
                        "role": "svc-role",
                        "principal": "svc-principal",
                        "resources": [{"name": "cpus", "value": {"type": "scalar", "value": 1.0}}],
                        "volumes": [{"volume_type": "MOUNT", "size_mb": 5000.0, "container_path": "data"}]
                    }
                },
                {
                    "name": "init",
                    "goal": "FINISHED",
                    "resource_set": {"id": "init-resources", "role": "svc-role", "principal": "svc-principal"}
                }
            ]
        }"#;
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_pod_spec_from_json() {
        let pod = pod();
        assert_eq!(pod.pod_type, "node");
        assert_eq!(pod.tasks.len(), 2);
        assert_eq!(pod.tasks[0].resource_set.volumes[0].volume_type, VolumeType::Mount);
        assert!(pod.tasks[1].rlimits.is_empty());
    }

    #[test]
    fn test_instance_names() {
        let instance = PodInstance::new(pod(), 1);
        assert_eq!(instance.name(), "node-1");
        assert_eq!(instance.task_instance_name("server"), "node-1-server");
    }

    #[test]
    fn test_goal_state_lookup() {
        let instance = PodInstance::new(pod(), 0);
        assert_eq!(instance.goal_state("node-0-server").unwrap(), GoalState::Running);
        assert_eq!(instance.goal_state("node-0-init").unwrap(), GoalState::Finished);
        assert!(matches!(
            instance.goal_state("node-0-missing"),
            Err(CoreError::UnknownTask { .. })
        ));
    }

    #[test]
    fn test_requirement_task_instance_names() {
        let requirement =
            PodInstanceRequirement::new(PodInstance::new(pod(), 0), vec!["server".into()]);
        assert_eq!(requirement.task_instance_names(), vec!["node-0-server".to_string()]);
    }
}
