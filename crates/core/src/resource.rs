//! Resource model - a named quantity inside an offer.

use serde::{Deserialize, Serialize};

use crate::value::{Value, ValueType};

/// Role used by resources that are not reserved.
pub const UNRESERVED_ROLE: &str = "*";

/// Label key carrying the stable identity of a reserved resource.
pub const RESOURCE_ID_KEY: &str = "resource_id";
/// Label key carrying the owning resource-set name.
pub const RESOURCE_SET_KEY: &str = "resource_set";
/// Label key carrying the owning pod name.
pub const POD_NAME_KEY: &str = "pod_name";
/// Label key carrying the owning pod index.
pub const POD_INDEX_KEY: &str = "pod_index";
/// Label key marking a "pick any free port" request.
pub const DYNAMIC_PORT_KEY: &str = "dynamic_port";

/// A key/value label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    /// Label key
    pub key: String,
    /// Label value
    pub value: String,
}

impl Label {
    /// Create a label.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Reservation info attached to a reserved resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    /// Principal that made the reservation
    pub principal: Option<String>,
    /// Metadata labels (resource id, resource set, pod...)
    #[serde(default)]
    pub labels: Vec<Label>,
}

/// Kind of disk source backing a disk resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskSourceType {
    /// A whole mounted device, consumed all-or-nothing
    Mount,
    /// A directory on a shared device, partially consumable
    Path,
}

/// Source of a disk resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskSource {
    /// Source kind
    pub source_type: DiskSourceType,
    /// Root of the mount/path on the agent
    pub root: Option<String>,
}

/// Persistent volume marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persistence {
    /// Persistence id
    pub id: String,
}

/// Volume mapping inside the task container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    /// Mount point inside the container
    pub container_path: String,
}

/// Disk descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskInfo {
    /// Backing source (absent = root disk)
    pub source: Option<DiskSource>,
    /// Persistence marker for persistent volumes
    pub persistence: Option<Persistence>,
    /// Container mapping
    pub volume: Option<Volume>,
}

/// A single named quantity within an offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource name ("cpus", "mem", "disk", "ports"...)
    pub name: String,
    /// Typed quantity
    pub value: Value,
    /// Role the resource is offered to
    pub role: String,
    /// Reservation, if reserved
    pub reservation: Option<Reservation>,
    /// Disk descriptor, for disk resources
    pub disk: Option<DiskInfo>,
}

impl Resource {
    /// An unreserved resource with the given value.
    pub fn unreserved(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
            role: UNRESERVED_ROLE.to_string(),
            reservation: None,
            disk: None,
        }
    }

    /// An unreserved scalar resource.
    pub fn scalar(name: impl Into<String>, value: f64) -> Self {
        Self::unreserved(name, Value::scalar(value))
    }

    /// An unreserved mount-volume disk resource.
    pub fn mount_disk(size_mb: f64, root: impl Into<String>) -> Self {
        let mut resource = Self::scalar("disk", size_mb);
        resource.disk = Some(DiskInfo {
            source: Some(DiskSource {
                source_type: DiskSourceType::Mount,
                root: Some(root.into()),
            }),
            persistence: None,
            volume: None,
        });
        resource
    }

    /// Reserve this resource for `role`/`principal`.
    pub fn reserved(mut self, role: impl Into<String>, principal: impl Into<String>) -> Self {
        self.role = role.into();
        let reservation = self.reservation.get_or_insert_with(Reservation::default);
        reservation.principal = Some(principal.into());
        self
    }

    /// Attach a reservation label, creating the reservation if needed.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let reservation = self.reservation.get_or_insert_with(Reservation::default);
        reservation.labels.retain(|l| l.key != key);
        reservation.labels.push(Label::new(key, value));
        self
    }

    /// Attach a stable resource id label.
    pub fn with_resource_id(self, resource_id: impl Into<String>) -> Self {
        self.with_label(RESOURCE_ID_KEY, resource_id)
    }

    /// Value type of this resource.
    pub fn value_type(&self) -> ValueType {
        self.value.value_type()
    }

    /// Look up a reservation label.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.reservation
            .as_ref()?
            .labels
            .iter()
            .find(|l| l.key == key)
            .map(|l| l.value.as_str())
    }

    /// Stable reservation identity, if any.
    pub fn resource_id(&self) -> Option<&str> {
        self.label(RESOURCE_ID_KEY).filter(|id| !id.is_empty())
    }

    /// Owning resource-set name.
    pub fn resource_set(&self) -> Option<&str> {
        self.label(RESOURCE_SET_KEY)
    }

    /// Owning pod name.
    pub fn pod_name(&self) -> Option<&str> {
        self.label(POD_NAME_KEY)
    }

    /// Owning pod index.
    pub fn pod_index(&self) -> Option<u32> {
        self.label(POD_INDEX_KEY)?.parse().ok()
    }

    /// Whether this resource requests a dynamically chosen port.
    pub fn is_dynamic_port(&self) -> bool {
        self.label(DYNAMIC_PORT_KEY).is_some()
    }

    /// Whether this resource is reserved.
    pub fn has_reservation(&self) -> bool {
        self.reservation.is_some()
    }

    /// Principal of the reservation.
    pub fn principal(&self) -> Option<&str> {
        self.reservation.as_ref()?.principal.as_deref()
    }

    /// Atomic resources (mount volumes) cannot be partially consumed.
    pub fn is_atomic(&self) -> bool {
        matches!(
            self.disk.as_ref().and_then(|d| d.source.as_ref()),
            Some(DiskSource {
                source_type: DiskSourceType::Mount,
                ..
            })
        )
    }

    /// A copy with reservation, persistence and volume stripped and role reset.
    pub fn to_unreserved(&self) -> Resource {
        let mut released = self.clone();
        released.reservation = None;
        released.role = UNRESERVED_ROLE.to_string();
        if let Some(disk) = released.disk.as_mut() {
            disk.persistence = None;
            disk.volume = None;
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_disk_is_atomic() {
        assert!(Resource::mount_disk(5000.0, "/mnt/a").is_atomic());
        assert!(!Resource::scalar("disk", 5000.0).is_atomic());
    }

    #[test]
    fn test_labels() {
        let resource = Resource::scalar("cpus", 1.0)
            .reserved("svc-role", "svc-principal")
            .with_resource_id("rid-1")
            .with_label(RESOURCE_SET_KEY, "server-resources");

        assert_eq!(resource.resource_id(), Some("rid-1"));
        assert_eq!(resource.resource_set(), Some("server-resources"));
        assert_eq!(resource.principal(), Some("svc-principal"));
        assert_eq!(resource.role, "svc-role");
    }

    #[test]
    fn test_empty_resource_id_is_absent() {
        let resource = Resource::scalar("cpus", 1.0).with_resource_id("");
        assert!(resource.resource_id().is_none());
    }

    #[test]
    fn test_to_unreserved_strips_state() {
        let mut resource = Resource::mount_disk(5000.0, "/mnt/a")
            .reserved("role", "principal")
            .with_resource_id("rid");
        if let Some(disk) = resource.disk.as_mut() {
            disk.persistence = Some(Persistence { id: "p".into() });
            disk.volume = Some(Volume { container_path: "data".into() });
        }

        let released = resource.to_unreserved();
        assert_eq!(released.role, UNRESERVED_ROLE);
        assert!(released.reservation.is_none());
        let disk = released.disk.as_ref().unwrap();
        assert!(disk.persistence.is_none());
        assert!(disk.volume.is_none());
        assert!(released.is_atomic());
    }
}
