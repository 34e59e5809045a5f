//! Unique identifiers for berth entities.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::CoreError;

/// Separator between a task name and its generated suffix.
pub const TASK_ID_DELIM: &str = "__";

/// Unique identifier for a plan element (step, phase or plan).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(Ulid);

impl ElementId {
    /// Generate a new ElementId
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ElementId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for ElementId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Unique identifier for a published event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(Ulid);

impl EventId {
    /// Generate a new EventId
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of an offer, assigned by the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OfferId(pub String);

impl OfferId {
    /// Create a new offer ID.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl std::fmt::Display for OfferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the agent that owns an offer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    /// Create a new agent ID.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a launched task.
///
/// Generated ids have the form `<task-name>__<ulid>`. An empty id marks a
/// transient launch whose id is assigned when the launch happens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a fresh id for the named task.
    pub fn for_task(task_name: &str) -> Self {
        Self(format!("{}{}{}", task_name, TASK_ID_DELIM, Ulid::new()))
    }

    /// The empty id used for transient launches.
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Whether this id is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recover the task name this id was generated for.
    pub fn task_name(&self) -> Result<&str, CoreError> {
        match self.0.rfind(TASK_ID_DELIM) {
            Some(idx) if idx > 0 => Ok(&self.0[..idx]),
            _ => Err(CoreError::InvalidTaskId(self.0.clone())),
        }
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_round_trips_name() {
        let id = TaskId::for_task("node-0-server");
        assert!(id.as_str().starts_with("node-0-server__"));
        assert_eq!(id.task_name().unwrap(), "node-0-server");
    }

    #[test]
    fn test_task_id_name_uses_last_delimiter() {
        let id = TaskId::from("a__b__01HZX");
        assert_eq!(id.task_name().unwrap(), "a__b");
    }

    #[test]
    fn test_malformed_task_id() {
        assert!(TaskId::from("no-delimiter").task_name().is_err());
        assert!(TaskId::empty().task_name().is_err());
        assert!(TaskId::from("__suffix").task_name().is_err());
    }

    #[test]
    fn test_element_ids_are_unique() {
        assert_ne!(ElementId::new(), ElementId::new());
    }
}
