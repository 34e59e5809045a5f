//! Recovery steps.

use std::sync::Arc;

use berth_core::{ElementId, Operation, PodInstanceRequirement, Status, TaskStatus};
use berth_plan::{DefaultStep, Element, StatusPublisher, Step};
use serde::{Deserialize, Serialize};

use crate::constrainer::LaunchConstrainer;
use crate::requirement::RecoveryRequirement;

/// How a failed pod is brought back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryType {
    /// Relaunch in place, keeping reservations and volumes
    Transient,
    /// Rebuild on fresh reservations
    Permanent,
}

impl RecoveryType {
    /// Upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "TRANSIENT",
            Self::Permanent => "PERMANENT",
        }
    }
}

impl std::fmt::Display for RecoveryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A [`DefaultStep`] that tells its launch constrainer about every launch.
pub struct RecoveryStep {
    inner: DefaultStep,
    recovery_type: RecoveryType,
    constrainer: Arc<dyn LaunchConstrainer>,
}

impl RecoveryStep {
    /// Create a pending recovery step.
    pub fn new(
        name: impl Into<String>,
        recovery: RecoveryRequirement,
        constrainer: Arc<dyn LaunchConstrainer>,
    ) -> Self {
        Self {
            inner: DefaultStep::new(name, Status::Pending, recovery.requirement),
            recovery_type: recovery.recovery_type,
            constrainer,
        }
    }

    /// Publish status changes through `publisher`.
    pub fn with_publisher(mut self, publisher: StatusPublisher) -> Self {
        self.inner = self.inner.with_publisher(publisher);
        self
    }

    /// How this step recovers its pod.
    pub fn recovery_type(&self) -> RecoveryType {
        self.recovery_type
    }
}

impl Element for RecoveryStep {
    fn id(&self) -> ElementId {
        self.inner.id()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn status(&self) -> Status {
        self.inner.status()
    }

    fn errors(&self) -> Vec<String> {
        self.inner.errors()
    }

    fn update(&self, status: &TaskStatus) {
        self.inner.update(status);
    }

    fn restart(&self) {
        self.inner.restart();
    }

    fn force_complete(&self) {
        self.inner.force_complete();
    }

    fn asset(&self) -> Option<String> {
        self.inner.asset()
    }
}

impl Step for RecoveryStep {
    fn start(&self) -> Option<PodInstanceRequirement> {
        self.inner.start()
    }

    fn update_offer_status(&self, operations: &[Operation]) {
        self.inner.update_offer_status(operations);
        if let Some(operation) = operations.first() {
            self.constrainer.launch_happened(operation, self.recovery_type);
        }
    }

    fn message(&self) -> String {
        format!("{} RecoveryType: {}", self.inner.message(), self.recovery_type)
    }
}

impl std::fmt::Debug for RecoveryStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryStep")
            .field("inner", &self.inner)
            .field("recovery_type", &self.recovery_type)
            .finish()
    }
}
