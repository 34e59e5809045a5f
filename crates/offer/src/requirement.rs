//! Resource, task and offer requirements.

use berth_core::{Resource, TaskInfo, Value};

/// A desired resource, with the flags deciding how it is consumed from a pool.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRequirement {
    resource: Resource,
    resource_id: Option<String>,
    is_atomic: bool,
    reserves_new: bool,
    consumes_unreserved: bool,
}

impl ResourceRequirement {
    /// Derive a requirement from a desired resource.
    ///
    /// A resource carrying a resource id expects that reservation; a reserved
    /// resource without one asks for a new reservation; anything else consumes
    /// unreserved capacity as-is.
    pub fn new(resource: Resource) -> Self {
        let resource_id = resource.resource_id().map(str::to_string);
        let reserved = resource.has_reservation();
        Self {
            is_atomic: resource.is_atomic(),
            reserves_new: reserved && resource_id.is_none(),
            consumes_unreserved: !reserved,
            resource_id,
            resource,
        }
    }

    /// Desired resource.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Resource name.
    pub fn name(&self) -> &str {
        &self.resource.name
    }

    /// Desired value.
    pub fn value(&self) -> &Value {
        &self.resource.value
    }

    /// Id of the previously reserved resource this requirement expects.
    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id.as_deref()
    }

    /// Whether a specific reserved resource is expected.
    pub fn expects_resource(&self) -> bool {
        self.resource_id.is_some()
    }

    /// Whether the resource cannot be split.
    pub fn is_atomic(&self) -> bool {
        self.is_atomic
    }

    /// Whether a new reservation must be made.
    pub fn reserves_new(&self) -> bool {
        self.reserves_new
    }

    /// Whether plain unreserved capacity is consumed.
    pub fn consumes_unreserved(&self) -> bool {
        self.consumes_unreserved
    }
}

/// A request for any single free port out of a named range resource.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicPortRequirement {
    /// Range resource to take the port from, normally `ports`
    pub name: String,
    /// Name the chosen port is published under
    pub port_name: String,
    /// Role to reserve the port for
    pub role: String,
    /// Principal to reserve the port with
    pub principal: String,
}

/// One task to launch and the resources it needs.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequirement {
    /// Task descriptor, without resources
    pub task_info: TaskInfo,
    /// Resources to consume
    pub resources: Vec<ResourceRequirement>,
    /// Dynamic ports to allocate
    pub dynamic_ports: Vec<DynamicPortRequirement>,
}

/// Everything one pod launch needs from a single offer.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferRequirement {
    /// Pod type
    pub pod_type: String,
    /// Pod instance name
    pub pod_instance: String,
    /// Tasks to launch together
    pub tasks: Vec<TaskRequirement>,
    /// Opaque placement expression
    pub placement: Option<String>,
}

impl OfferRequirement {
    /// Names of the tasks this requirement launches.
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.task_info.name.as_str()).collect()
    }
}
