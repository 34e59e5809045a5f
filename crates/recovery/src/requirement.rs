//! Turning failed tasks back into launch requirements.

use berth_core::{CoreError, PodInstance, PodInstanceRequirement, ServiceSpec, TaskInfo};

use crate::error::{RecoveryError, Result};
use crate::step::RecoveryType;

/// What to relaunch and how.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryRequirement {
    /// The pod launch
    pub requirement: PodInstanceRequirement,
    /// How the pod is recovered
    pub recovery_type: RecoveryType,
}

/// Resolves failed tasks against the service's pod specs.
#[derive(Debug, Clone)]
pub struct RecoveryRequirementProvider {
    service: ServiceSpec,
}

impl RecoveryRequirementProvider {
    /// Create a provider for `service`.
    pub fn new(service: ServiceSpec) -> Self {
        Self { service }
    }

    /// Requirement relaunching the failed tasks of one pod instance.
    ///
    /// A transient recovery keeps the tasks' reservations; a permanent one
    /// launches onto fresh reservations.
    pub fn requirement(&self, failed: &[TaskInfo], recovery_type: RecoveryType) -> Result<RecoveryRequirement> {
        let first = failed
            .first()
            .ok_or_else(|| RecoveryError::Unlabelled(String::new()))?;
        let (Some(pod_type), Some(index)) = (first.pod_type(), first.pod_index()) else {
            return Err(RecoveryError::Unlabelled(first.name.clone()));
        };
        let pod = self
            .service
            .pods
            .iter()
            .find(|pod| pod.pod_type == pod_type)
            .ok_or_else(|| RecoveryError::UnknownPod(pod_type.to_string()))?;
        let pod_instance = PodInstance::new(pod.clone(), index);

        for task in failed {
            if pod_instance.task(strip_instance(&pod_instance, &task.name)).is_none() {
                return Err(CoreError::UnknownTask {
                    pod: pod_instance.name(),
                    task: task.name.clone(),
                }
                .into());
            }
        }
        let tasks_to_launch: Vec<String> = pod
            .tasks
            .iter()
            .filter(|spec| {
                let instance_name = pod_instance.task_instance_name(&spec.name);
                failed.iter().any(|task| task.name == instance_name)
            })
            .map(|spec| spec.name.clone())
            .collect();

        let requirement = PodInstanceRequirement::new(pod_instance, tasks_to_launch);
        let requirement = match recovery_type {
            RecoveryType::Transient => requirement.with_existing_tasks(failed.to_vec()),
            RecoveryType::Permanent => requirement,
        };
        Ok(RecoveryRequirement {
            requirement,
            recovery_type,
        })
    }
}

fn strip_instance<'a>(pod_instance: &PodInstance, task_name: &'a str) -> &'a str {
    let prefix = format!("{}-", pod_instance.name());
    task_name.strip_prefix(prefix.as_str()).unwrap_or(task_name)
}
