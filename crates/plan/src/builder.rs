//! Builders wiring children and their dependencies into phases and plans.

use std::sync::Arc;

use berth_core::ElementId;

use crate::dependency::DependencyGraph;
use crate::element::{Element, Step};
use crate::error::{PlanError, Result};
use crate::phase::Phase;
use crate::plan::Plan;
use crate::strategy::DependencyStrategy;

/// Children plus the graph between them.
struct Children<C: ?Sized> {
    elements: Vec<Arc<C>>,
    graph: DependencyGraph,
}

impl<C: Element + ?Sized> Children<C> {
    fn new() -> Self {
        Self {
            elements: Vec::new(),
            graph: DependencyGraph::new(),
        }
    }

    fn add(&mut self, element: Arc<C>) -> Result<()> {
        self.graph.add_element(element.id()).map_err(|_| {
            PlanError::InvalidDependency(format!("{} was added twice", element.name()))
        })?;
        self.elements.push(element);
        Ok(())
    }

    fn keep(&mut self, element: &Arc<C>) {
        if !self.elements.iter().any(|e| e.id() == element.id()) {
            self.elements.push(Arc::clone(element));
        }
    }

    fn depend(&mut self, child: &Arc<C>, parent: &Arc<C>) {
        self.keep(parent);
        self.keep(child);
        self.graph.add_dependency(child.id(), parent.id());
    }

    fn chain(&mut self, elements: &[Arc<C>]) {
        for pair in elements.windows(2) {
            self.depend(&pair[1], &pair[0]);
        }
        if let Some(first) = elements.first() {
            self.keep(first);
            self.graph.register(first.id());
        }
    }

    fn ids(&self) -> Vec<ElementId> {
        self.elements.iter().map(|e| e.id()).collect()
    }
}

/// Builds a [`Phase`] driven by an explicit dependency graph.
pub struct PhaseBuilder {
    name: String,
    steps: Children<dyn Step>,
}

impl PhaseBuilder {
    /// Start a phase called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Children::new(),
        }
    }

    /// Add a step with no prerequisites. Adding the same step twice fails.
    pub fn add_step(&mut self, step: Arc<dyn Step>) -> Result<&mut Self> {
        self.steps.add(step)?;
        Ok(self)
    }

    /// Make `child` wait for `parent`, adding either if new.
    pub fn add_dependency(&mut self, child: &Arc<dyn Step>, parent: &Arc<dyn Step>) -> &mut Self {
        self.steps.depend(child, parent);
        self
    }

    /// Add independent steps that may all run at once.
    pub fn add_all(&mut self, steps: impl IntoIterator<Item = Arc<dyn Step>>) -> Result<&mut Self> {
        for step in steps {
            self.steps.add(step)?;
        }
        Ok(self)
    }

    /// Add steps that run one after another.
    pub fn add_serial(&mut self, steps: &[Arc<dyn Step>]) -> &mut Self {
        self.steps.chain(steps);
        self
    }

    /// Step ids added so far, in order.
    pub fn step_ids(&self) -> Vec<ElementId> {
        self.steps.ids()
    }

    /// Finish the phase.
    pub fn build(self) -> Phase {
        Phase::new(
            self.name,
            self.steps.elements,
            Box::new(DependencyStrategy::new(self.steps.graph)),
        )
    }
}

/// Builds a [`Plan`] driven by an explicit dependency graph between phases.
pub struct PlanBuilder {
    name: String,
    phases: Children<Phase>,
}

impl PlanBuilder {
    /// Start a plan called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phases: Children::new(),
        }
    }

    /// Add a phase with no prerequisites. Adding the same phase twice fails.
    pub fn add_phase(&mut self, phase: Arc<Phase>) -> Result<&mut Self> {
        self.phases.add(phase)?;
        Ok(self)
    }

    /// Make `child` wait for `parent`, adding either if new.
    pub fn add_dependency(&mut self, child: &Arc<Phase>, parent: &Arc<Phase>) -> &mut Self {
        self.phases.depend(child, parent);
        self
    }

    /// Add independent phases that may all run at once.
    pub fn add_all(&mut self, phases: impl IntoIterator<Item = Arc<Phase>>) -> Result<&mut Self> {
        for phase in phases {
            self.phases.add(phase)?;
        }
        Ok(self)
    }

    /// Add phases that run one after another.
    pub fn add_serial(&mut self, phases: &[Arc<Phase>]) -> &mut Self {
        self.phases.chain(phases);
        self
    }

    /// Finish the plan.
    pub fn build(self) -> Plan {
        Plan::new(
            self.name,
            self.phases.elements,
            Box::new(DependencyStrategy::new(self.phases.graph)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::DefaultStep;
    use crate::strategy::{ParallelStrategy, SerialStrategy};
    use berth_core::{
        GoalState, PodInstance, PodInstanceRequirement, PodSpec, ResourceSet, Status, TaskSpec,
    };
    use std::collections::HashSet;

    fn step(name: &str) -> Arc<dyn Step> {
        let pod = PodSpec {
            pod_type: name.to_lowercase(),
            count: 1,
            tasks: vec![TaskSpec {
                name: "server".into(),
                goal: GoalState::Running,
                command: String::new(),
                resource_set: ResourceSet {
                    id: "rs".into(),
                    role: "role".into(),
                    principal: "principal".into(),
                    resources: vec![],
                    volumes: vec![],
                    ports: vec![],
                },
                rlimits: vec![],
            }],
            placement: None,
        };
        let requirement =
            PodInstanceRequirement::new(PodInstance::new(pod, 0), vec!["server".into()]);
        Arc::new(DefaultStep::new(name, Status::Pending, requirement))
    }

    fn names(steps: &[Arc<dyn Step>]) -> Vec<String> {
        steps.iter().map(|s| s.name().to_string()).collect()
    }

    #[test]
    fn test_diamond_phase() {
        let (a, b, c, d) = (step("A"), step("B"), step("C"), step("D"));
        let mut builder = PhaseBuilder::new("deploy");
        builder
            .add_dependency(&b, &a)
            .add_dependency(&c, &a)
            .add_dependency(&d, &b)
            .add_dependency(&d, &c);
        let phase = builder.build();
        let dirty = HashSet::new();

        assert_eq!(names(phase.steps()), ["A", "B", "C", "D"]);
        assert_eq!(names(&phase.candidates(&dirty)), ["A"]);
        a.force_complete();
        assert_eq!(names(&phase.candidates(&dirty)), ["B", "C"]);
        b.force_complete();
        assert_eq!(names(&phase.candidates(&dirty)), ["C"]);
        c.force_complete();
        assert_eq!(names(&phase.candidates(&dirty)), ["D"]);
        d.force_complete();
        assert!(phase.candidates(&dirty).is_empty());
        assert_eq!(phase.status(), Status::Complete);
    }

    #[test]
    fn test_serial_and_parallel_phases() {
        let (a, b) = (step("A"), step("B"));
        let mut serial = PhaseBuilder::new("serial");
        serial.add_serial(&[a.clone(), b.clone()]);
        assert_eq!(names(&serial.build().candidates(&HashSet::new())), ["A"]);

        let mut parallel = PhaseBuilder::new("parallel");
        parallel.add_all([a, b]).unwrap();
        assert_eq!(
            names(&parallel.build().candidates(&HashSet::new())),
            ["A", "B"]
        );
    }

    #[test]
    fn test_duplicate_step_rejected() {
        let a = step("A");
        let mut builder = PhaseBuilder::new("deploy");
        builder.add_step(a.clone()).unwrap();
        assert!(builder.add_step(a).is_err());
    }

    #[test]
    fn test_plan_flattens_phase_candidates() {
        let (a, b, c) = (step("A"), step("B"), step("C"));
        let first = Arc::new(Phase::new(
            "first",
            vec![a.clone(), b.clone()],
            Box::new(ParallelStrategy::new()),
        ));
        let second = Arc::new(Phase::new("second", vec![c], Box::new(SerialStrategy::new())));

        let mut builder = PlanBuilder::new("deploy");
        builder.add_dependency(&second, &first);
        let plan = builder.build();

        assert_eq!(names(&plan.candidates(&HashSet::new())), ["A", "B"]);
        a.force_complete();
        b.force_complete();
        assert_eq!(names(&plan.candidates(&HashSet::new())), ["C"]);
        assert_eq!(plan.status(), Status::Starting);
    }
}
