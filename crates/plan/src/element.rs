//! The element hierarchy shared by steps, phases and plans.

use std::sync::Arc;

use berth_core::{ElementId, Operation, PodInstanceRequirement, Status, TaskStatus};

/// A node of a plan: a step, a phase or the plan itself.
///
/// Mutating methods take `&self`; implementations guard their own state so
/// offer cycles and status reports can reach the same element concurrently.
pub trait Element: Send + Sync {
    /// Stable identifier.
    fn id(&self) -> ElementId;

    /// Display name.
    fn name(&self) -> &str;

    /// Current status.
    fn status(&self) -> Status;

    /// Errors recorded while building the element.
    fn errors(&self) -> Vec<String>;

    /// Feed a task status report.
    fn update(&self, status: &TaskStatus);

    /// Administrative override back to pending.
    fn restart(&self);

    /// Administrative override to complete.
    fn force_complete(&self);

    /// Whether this element's strategy has been cooperatively interrupted.
    fn is_interrupted(&self) -> bool {
        false
    }

    /// Named asset touched while this element is in flight.
    fn asset(&self) -> Option<String> {
        None
    }

    /// Whether the element is complete.
    fn is_complete(&self) -> bool {
        self.status().is_complete()
    }

    /// Whether any errors were recorded.
    fn has_errors(&self) -> bool {
        !self.errors().is_empty()
    }
}

/// A leaf element: one pod instance's task launch.
pub trait Step: Element {
    /// The launch this step wants. Pure; may be called repeatedly.
    fn start(&self) -> Option<PodInstanceRequirement>;

    /// Report the operations an offer cycle performed for this step.
    fn update_offer_status(&self, operations: &[Operation]);

    /// Human-readable summary.
    fn message(&self) -> String {
        format!("Step: '{}' [{}] has status: '{}'", self.name(), self.id(), self.status())
    }
}

/// Status of a parent element derived from its children.
///
/// No children is complete; any error wins; otherwise complete, pending or
/// starting depending on how far the children got.
pub fn rollup_status<C: Element + ?Sized>(children: &[Arc<C>]) -> Status {
    if children.is_empty() {
        return Status::Complete;
    }

    let statuses: Vec<Status> = children.iter().map(|c| c.status()).collect();
    if children.iter().any(|c| c.has_errors()) || statuses.contains(&Status::Error) {
        Status::Error
    } else if statuses.iter().all(Status::is_complete) {
        Status::Complete
    } else if statuses.iter().all(|s| *s == Status::Pending) {
        Status::Pending
    } else {
        Status::Starting
    }
}
