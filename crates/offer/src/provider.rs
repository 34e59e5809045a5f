//! Builds offer requirements from pod launch requirements.

use berth_core::{
    DiskInfo, DiskSource, DiskSourceType, PodInstance, PodInstanceRequirement, Range, Resource,
    ResourceSet, TaskInfo, TaskSpec, Value, Volume, VolumeType, GOAL_STATE_LABEL, POD_INDEX_KEY,
    POD_INDEX_LABEL, POD_NAME_KEY, POD_TYPE_LABEL, RESOURCE_SET_KEY,
};

use crate::error::{OfferError, Result};
use crate::requirement::{
    DynamicPortRequirement, OfferRequirement, ResourceRequirement, TaskRequirement,
};

/// Turns a [`PodInstanceRequirement`] into what must be found in an offer.
pub trait OfferRequirementProvider: Send + Sync {
    /// Build the offer requirement for a pod launch.
    fn offer_requirement(&self, requirement: &PodInstanceRequirement) -> Result<OfferRequirement>;
}

/// Requests fresh reservations for new tasks and re-uses the reservations of
/// tasks listed in the requirement's `existing_tasks`.
#[derive(Debug, Default, Clone)]
pub struct DefaultOfferRequirementProvider;

impl DefaultOfferRequirementProvider {
    /// Create a provider.
    pub fn new() -> Self {
        Self
    }

    fn task_requirement(
        &self,
        pod_instance: &PodInstance,
        spec: &TaskSpec,
        existing: Option<&TaskInfo>,
    ) -> Result<TaskRequirement> {
        for rlimit in &spec.rlimits {
            rlimit.validate()?;
        }

        let instance_name = pod_instance.task_instance_name(&spec.name);
        let mut task_info = TaskInfo::new(&instance_name)
            .with_label(POD_TYPE_LABEL, &pod_instance.pod.pod_type)
            .with_label(POD_INDEX_LABEL, pod_instance.index.to_string())
            .with_label(GOAL_STATE_LABEL, spec.goal.as_str());
        task_info.command = spec.command.clone();

        match existing {
            Some(existing) => {
                // Keep operator-set labels such as the transient marker.
                for label in &existing.labels {
                    if task_info.label(&label.key).is_none() {
                        task_info.set_label(&label.key, &label.value);
                    }
                }
                Ok(TaskRequirement {
                    task_info,
                    resources: existing
                        .resources
                        .iter()
                        .cloned()
                        .map(ResourceRequirement::new)
                        .collect(),
                    dynamic_ports: Vec::new(),
                })
            }
            None => new_task_requirement(task_info, pod_instance, &spec.resource_set),
        }
    }
}

impl OfferRequirementProvider for DefaultOfferRequirementProvider {
    fn offer_requirement(&self, requirement: &PodInstanceRequirement) -> Result<OfferRequirement> {
        let pod_instance = &requirement.pod_instance;
        if requirement.tasks_to_launch.is_empty() {
            return Err(OfferError::InvalidRequirement(format!(
                "no tasks to launch for pod {}",
                pod_instance.name()
            )));
        }

        let mut tasks = Vec::with_capacity(requirement.tasks_to_launch.len());
        for task_name in &requirement.tasks_to_launch {
            let spec = pod_instance.task(task_name).ok_or_else(|| {
                OfferError::InvalidRequirement(format!(
                    "task {} is not part of pod {}",
                    task_name,
                    pod_instance.name()
                ))
            })?;
            let instance_name = pod_instance.task_instance_name(task_name);
            let existing = requirement
                .existing_tasks
                .iter()
                .find(|t| t.name == instance_name);
            tasks.push(self.task_requirement(pod_instance, spec, existing)?);
        }

        Ok(OfferRequirement {
            pod_type: pod_instance.pod.pod_type.clone(),
            pod_instance: pod_instance.name(),
            tasks,
            placement: pod_instance.pod.placement.clone(),
        })
    }
}

fn new_task_requirement(
    task_info: TaskInfo,
    pod_instance: &PodInstance,
    resource_set: &ResourceSet,
) -> Result<TaskRequirement> {
    let reserve = |resource: Resource| {
        resource
            .reserved(&resource_set.role, &resource_set.principal)
            .with_resource_id("")
            .with_label(RESOURCE_SET_KEY, &resource_set.id)
            .with_label(POD_NAME_KEY, &pod_instance.pod.pod_type)
            .with_label(POD_INDEX_KEY, pod_instance.index.to_string())
    };

    let mut resources = Vec::new();
    for spec in &resource_set.resources {
        resources.push(ResourceRequirement::new(reserve(Resource::unreserved(
            &spec.name,
            spec.value.clone(),
        ))));
    }

    for volume in &resource_set.volumes {
        if volume.size_mb <= 0.0 {
            return Err(OfferError::InvalidRequirement(format!(
                "volume {} has no size",
                volume.container_path
            )));
        }
        let mut disk = Resource::scalar("disk", volume.size_mb);
        disk.disk = Some(DiskInfo {
            source: match volume.volume_type {
                VolumeType::Mount => Some(DiskSource {
                    source_type: DiskSourceType::Mount,
                    root: None,
                }),
                VolumeType::Root => None,
            },
            persistence: None,
            volume: Some(Volume {
                container_path: volume.container_path.clone(),
            }),
        });
        resources.push(ResourceRequirement::new(reserve(disk)));
    }

    let mut dynamic_ports = Vec::new();
    for port in &resource_set.ports {
        if port.port == 0 {
            dynamic_ports.push(DynamicPortRequirement {
                name: "ports".to_string(),
                port_name: port.name.clone(),
                role: resource_set.role.clone(),
                principal: resource_set.principal.clone(),
            });
        } else {
            resources.push(ResourceRequirement::new(reserve(Resource::unreserved(
                "ports",
                Value::ranges([Range::single(port.port)]),
            ))));
        }
    }

    Ok(TaskRequirement {
        task_info,
        resources,
        dynamic_ports,
    })
}
