//! Task model - launched task descriptors and their status reports.

use serde::{Deserialize, Serialize};

use crate::id::{AgentId, TaskId};
use crate::resource::{Label, Resource};
use crate::spec::GoalState;
use crate::Time;

/// Label key carrying the pod type of a task.
pub const POD_TYPE_LABEL: &str = "pod_type";
/// Label key carrying the pod index of a task.
pub const POD_INDEX_LABEL: &str = "pod_index";
/// Label key carrying the declared goal state of a task.
pub const GOAL_STATE_LABEL: &str = "goal_state";
/// Label key marking a transient task.
pub const TRANSIENT_LABEL: &str = "transient";
/// Label key marking a task the operator declared permanently failed.
pub const PERMANENTLY_FAILED_LABEL: &str = "permanently_failed";

/// Description of a task to launch (or that was launched).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Task id (empty for transient launches)
    pub task_id: TaskId,

    /// Task instance name, unique within the service
    pub name: String,

    /// Agent the task is bound to
    pub agent_id: Option<AgentId>,

    /// Command line
    #[serde(default)]
    pub command: String,

    /// Resources consumed by the task
    #[serde(default)]
    pub resources: Vec<Resource>,

    /// Metadata labels
    #[serde(default)]
    pub labels: Vec<Label>,
}

impl TaskInfo {
    /// Create a task with a fresh id and no resources.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            task_id: TaskId::for_task(&name),
            name,
            agent_id: None,
            command: String::new(),
            resources: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// Look up a label.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.key == key)
            .map(|l| l.value.as_str())
    }

    /// Set a label, replacing any existing value.
    pub fn set_label(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.labels.retain(|l| l.key != key);
        self.labels.push(Label::new(key, value));
    }

    /// Builder-style [`TaskInfo::set_label`].
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_label(key, value);
        self
    }

    /// Pod type this task belongs to.
    pub fn pod_type(&self) -> Option<&str> {
        self.label(POD_TYPE_LABEL)
    }

    /// Pod index this task belongs to.
    pub fn pod_index(&self) -> Option<u32> {
        self.label(POD_INDEX_LABEL)?.parse().ok()
    }

    /// Pod instance name (`<type>-<index>`), when both labels are present.
    pub fn pod_instance_name(&self) -> Option<String> {
        Some(format!("{}-{}", self.pod_type()?, self.pod_index()?))
    }

    /// Declared goal state, when labelled.
    pub fn goal_state(&self) -> Option<GoalState> {
        match self.label(GOAL_STATE_LABEL)? {
            "RUNNING" => Some(GoalState::Running),
            "FINISHED" => Some(GoalState::Finished),
            _ => None,
        }
    }

    /// Transient tasks get their id assigned at launch time.
    pub fn is_transient(&self) -> bool {
        self.label(TRANSIENT_LABEL) == Some("true")
    }

    /// Whether the task was marked as permanently failed.
    pub fn is_permanently_failed(&self) -> bool {
        self.label(PERMANENTLY_FAILED_LABEL) == Some("true")
    }
}

/// Cluster-reported state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Accepted by the agent, not yet starting
    Staging,
    /// Starting up
    Starting,
    /// Running
    Running,
    /// Being killed
    Killing,
    /// Exited successfully
    Finished,
    /// Exited with failure
    Failed,
    /// Killed
    Killed,
    /// Could not be launched
    Error,
    /// Lost along with its agent
    Lost,
    /// State cannot be determined
    Unknown,
}

impl TaskState {
    /// Whether the task will never run again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished | Self::Failed | Self::Killed | Self::Error | Self::Lost
        )
    }

    /// Terminal states that indicate a failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Killed | Self::Error | Self::Lost)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Staging => "TASK_STAGING",
            Self::Starting => "TASK_STARTING",
            Self::Running => "TASK_RUNNING",
            Self::Killing => "TASK_KILLING",
            Self::Finished => "TASK_FINISHED",
            Self::Failed => "TASK_FAILED",
            Self::Killed => "TASK_KILLED",
            Self::Error => "TASK_ERROR",
            Self::Lost => "TASK_LOST",
            Self::Unknown => "TASK_UNKNOWN",
        };
        f.write_str(name)
    }
}

/// A status report for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    /// Task the report is about
    pub task_id: TaskId,

    /// Reported state
    pub state: TaskState,

    /// Optional human-readable detail
    pub message: Option<String>,

    /// When the report was generated
    pub timestamp: Time,
}

impl TaskStatus {
    /// Create a status report stamped now.
    pub fn new(task_id: TaskId, state: TaskState) -> Self {
        Self {
            task_id,
            state,
            message: None,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Attach a message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Whether a task with the given goal needs to be relaunched given its last status.
pub fn needs_recovery(goal: Option<GoalState>, status: &TaskStatus) -> bool {
    match status.state {
        TaskState::Finished => goal != Some(GoalState::Finished),
        state => state.is_failure(),
    }
}
