//! Event model - status changes published by plan elements.

use crate::id::{ElementId, EventId};
use crate::status::Status;
use crate::Time;
use serde::{Deserialize, Serialize};

/// A plan element moved from one status to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    /// Unique identifier
    pub id: EventId,

    /// When it happened
    pub timestamp: Time,

    /// Name of the element that changed
    pub element: String,

    /// Id of the element that changed
    pub element_id: ElementId,

    /// Previous status
    pub from: Status,

    /// New status
    pub to: Status,
}

impl StatusChange {
    /// Create a new status change stamped now.
    pub fn new(element: impl Into<String>, element_id: ElementId, from: Status, to: Status) -> Self {
        Self {
            id: EventId::new(),
            timestamp: chrono::Utc::now(),
            element: element.into(),
            element_id,
            from,
            to,
        }
    }
}
