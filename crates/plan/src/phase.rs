//! A named group of steps driven by one strategy.

use std::collections::HashSet;
use std::sync::Arc;

use berth_core::{ElementId, Status, TaskStatus};
use tracing::info;

use crate::element::{rollup_status, Element, Step};
use crate::strategy::Strategy;

/// Ordered steps plus the strategy that picks among them.
pub struct Phase {
    id: ElementId,
    name: String,
    steps: Vec<Arc<dyn Step>>,
    strategy: Box<dyn Strategy<dyn Step>>,
    errors: Vec<String>,
}

impl Phase {
    /// Create a phase.
    pub fn new(
        name: impl Into<String>,
        steps: Vec<Arc<dyn Step>>,
        strategy: Box<dyn Strategy<dyn Step>>,
    ) -> Self {
        Self {
            id: ElementId::new(),
            name: name.into(),
            steps,
            strategy,
            errors: Vec::new(),
        }
    }

    /// Record construction errors on the phase itself.
    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }

    /// Steps in declaration order.
    pub fn steps(&self) -> &[Arc<dyn Step>] {
        &self.steps
    }

    /// Steps eligible this cycle.
    pub fn candidates(&self, dirty: &HashSet<String>) -> Vec<Arc<dyn Step>> {
        self.strategy.candidates(&self.steps, dirty)
    }

    /// Stop handing out steps.
    pub fn interrupt(&self) {
        info!("Interrupting phase {}", self.name);
        self.strategy.interrupt();
    }

    /// Resume handing out steps.
    pub fn proceed(&self) {
        info!("Proceeding with phase {}", self.name);
        self.strategy.proceed();
    }
}

impl Element for Phase {
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
        rollup_status(&self.steps)
    }

    fn errors(&self) -> Vec<String> {
        self.errors.clone()
    }

    fn update(&self, status: &TaskStatus) {
        for step in &self.steps {
            step.update(status);
        }
    }

    fn restart(&self) {
        for step in &self.steps {
            step.restart();
        }
    }

    fn force_complete(&self) {
        for step in &self.steps {
            step.force_complete();
        }
    }

    fn is_interrupted(&self) -> bool {
        self.strategy.is_interrupted()
    }
}

impl std::fmt::Debug for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Phase")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("steps", &self.steps.iter().map(|s| s.name().to_string()).collect::<Vec<_>>())
            .field("errors", &self.errors)
            .finish()
    }
}
