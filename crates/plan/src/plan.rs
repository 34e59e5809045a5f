//! Top of the element hierarchy.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use berth_core::{ElementId, Status, StatusChange, TaskStatus};
use tokio::sync::broadcast;
use tracing::info;

use crate::element::{rollup_status, Element, Step};
use crate::phase::Phase;
use crate::publisher::StatusPublisher;
use crate::strategy::Strategy;

/// Ordered phases plus the strategy that picks among them.
///
/// The plan republishes its own status whenever an update, restart or
/// forced completion changes it. Offer outcomes change step status behind
/// the plan's back, so whoever drives the offers calls
/// [`Plan::publish_if_changed`] afterwards.
pub struct Plan {
    id: ElementId,
    name: String,
    phases: Vec<Arc<Phase>>,
    strategy: Box<dyn Strategy<Phase>>,
    errors: Vec<String>,
    publisher: StatusPublisher,
    last_status: Mutex<Status>,
}

impl Plan {
    /// Create a plan.
    pub fn new(
        name: impl Into<String>,
        phases: Vec<Arc<Phase>>,
        strategy: Box<dyn Strategy<Phase>>,
    ) -> Self {
        let status = rollup_status(&phases);
        Self {
            id: ElementId::new(),
            name: name.into(),
            phases,
            strategy,
            errors: Vec::new(),
            publisher: StatusPublisher::default(),
            last_status: Mutex::new(status),
        }
    }

    /// Record construction errors on the plan itself.
    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }

    /// Publish plan status changes through `publisher`.
    pub fn with_publisher(mut self, publisher: StatusPublisher) -> Self {
        self.publisher = publisher;
        self
    }

    /// Phases in declaration order.
    pub fn phases(&self) -> &[Arc<Phase>] {
        &self.phases
    }

    /// Every step of every phase.
    pub fn steps(&self) -> impl Iterator<Item = &Arc<dyn Step>> + '_ {
        self.phases.iter().flat_map(|phase| phase.steps().iter())
    }

    /// Steps eligible this cycle, phase by phase.
    pub fn candidates(&self, dirty: &HashSet<String>) -> Vec<Arc<dyn Step>> {
        self.strategy
            .candidates(&self.phases, dirty)
            .iter()
            .flat_map(|phase| phase.candidates(dirty))
            .collect()
    }

    /// Subscribe to status changes of this plan.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.publisher.subscribe()
    }

    /// Stop handing out phases.
    pub fn interrupt(&self) {
        info!("Interrupting plan {}", self.name);
        self.strategy.interrupt();
    }

    /// Resume handing out phases.
    pub fn proceed(&self) {
        info!("Proceeding with plan {}", self.name);
        self.strategy.proceed();
    }

    /// Publish the plan status if it moved since it was last published.
    pub fn publish_if_changed(&self) {
        let to = self.status();
        let from = {
            let mut last = self.last_status.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *last, to)
        };
        if from != to {
            info!("Plan {} changed status from: {} to: {}", self.name, from, to);
            self.publisher
                .publish(StatusChange::new(&self.name, self.id, from, to));
        }
    }
}

impl Element for Plan {
    fn id(&self) -> ElementId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> Status {
        if !self.errors.is_empty() {
            return Status::Error;
        }
        rollup_status(&self.phases)
    }

    fn errors(&self) -> Vec<String> {
        self.errors.clone()
    }

    fn update(&self, status: &TaskStatus) {
        for phase in &self.phases {
            phase.update(status);
        }
        self.publish_if_changed();
    }

    fn restart(&self) {
        for phase in &self.phases {
            phase.restart();
        }
        self.publish_if_changed();
    }

    fn force_complete(&self) {
        for phase in &self.phases {
            phase.force_complete();
        }
        self.publish_if_changed();
    }

    fn is_interrupted(&self) -> bool {
        self.strategy.is_interrupted()
    }
}

impl std::fmt::Debug for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plan")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("phases", &self.phases)
            .field("errors", &self.errors)
            .finish()
    }
}
