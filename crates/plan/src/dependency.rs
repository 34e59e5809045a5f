//! Dependency graph over plan elements.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use berth_core::ElementId;
use tracing::debug;

use crate::element::Element;
use crate::error::{PlanError, Result};

/// Prerequisites between elements, keyed by element id.
///
/// The graph holds ids only. Candidates are resolved against the children
/// passed in on each call, so the graph never shares ownership of elements.
/// Cycles are not detected; elements on a cycle never become candidates.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    order: Vec<ElementId>,
    dependencies: HashMap<ElementId, HashSet<ElementId>>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an element with no prerequisites.
    pub fn add_element(&mut self, id: ElementId) -> Result<()> {
        if self.dependencies.contains_key(&id) {
            return Err(PlanError::InvalidDependency(format!(
                "element {} is already in the graph",
                id
            )));
        }
        self.register(id);
        Ok(())
    }

    /// Make `child` wait for `parent`. Unknown elements are registered.
    pub fn add_dependency(&mut self, child: ElementId, parent: ElementId) {
        self.register(parent);
        self.register(child);
        if let Some(deps) = self.dependencies.get_mut(&child) {
            deps.insert(parent);
        }
    }

    /// Whether the element is registered.
    pub fn contains(&self, id: &ElementId) -> bool {
        self.dependencies.contains_key(id)
    }

    /// Direct prerequisites of `id`.
    pub fn dependencies(&self, id: &ElementId) -> HashSet<ElementId> {
        self.dependencies.get(id).cloned().unwrap_or_default()
    }

    /// Registered ids in insertion order.
    pub fn elements(&self) -> &[ElementId] {
        &self.order
    }

    /// Elements eligible for work this cycle, in insertion order.
    ///
    /// An element qualifies when it is not interrupted, not complete, has no
    /// errors, every prerequisite is complete and its asset is not dirty.
    /// A prerequisite missing from `children` counts as incomplete.
    pub fn candidates<C: Element + ?Sized>(
        &self,
        children: &[Arc<C>],
        dirty: &HashSet<String>,
    ) -> Vec<Arc<C>> {
        let by_id: HashMap<ElementId, &Arc<C>> =
            children.iter().map(|child| (child.id(), child)).collect();

        let mut candidates = Vec::new();
        for id in &self.order {
            let Some(element) = by_id.get(id) else {
                continue;
            };
            if element.is_interrupted() || element.is_complete() || element.has_errors() {
                continue;
            }

            let blocked = self.dependencies(id).iter().any(|dep| {
                by_id.get(dep).map_or(true, |parent| !parent.is_complete())
            });
            if blocked {
                continue;
            }

            if let Some(asset) = element.asset() {
                if dirty.contains(&asset) {
                    debug!("Skipping {}: asset {} is dirty", element.name(), asset);
                    continue;
                }
            }
            candidates.push(Arc::clone(element));
        }
        candidates
    }

    pub(crate) fn register(&mut self, id: ElementId) {
        if !self.dependencies.contains_key(&id) {
            self.dependencies.insert(id, HashSet::new());
            self.order.push(id);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use berth_core::{Status, TaskStatus};
    use std::sync::Mutex;

    /// Minimal element with settable status.
    pub(crate) struct TestElement {
        id: ElementId,
        name: String,
        status: Mutex<Status>,
        asset: Option<String>,
        errors: Vec<String>,
    }

    impl TestElement {
        fn build(name: &str, asset: Option<&str>, errors: Vec<String>) -> Arc<Self> {
            Arc::new(Self {
                id: ElementId::new(),
                name: name.into(),
                status: Mutex::new(Status::Pending),
                asset: asset.map(String::from),
                errors,
            })
        }

        pub(crate) fn new(name: &str) -> Arc<Self> {
            Self::build(name, None, vec![])
        }

        pub(crate) fn with_asset(name: &str, asset: &str) -> Arc<Self> {
            Self::build(name, Some(asset), vec![])
        }

        pub(crate) fn errored(name: &str) -> Arc<Self> {
            Self::build(name, None, vec!["broken".into()])
        }

        pub(crate) fn complete(&self) {
            *self.status.lock().unwrap() = Status::Complete;
        }
    }

    impl Element for TestElement {
        fn id(&self) -> ElementId {
            self.id
        }
        fn name(&self) -> &str {
            &self.name
        }
        fn status(&self) -> Status {
            *self.status.lock().unwrap()
        }
        fn errors(&self) -> Vec<String> {
            self.errors.clone()
        }
        fn update(&self, _status: &TaskStatus) {}
        fn restart(&self) {
            *self.status.lock().unwrap() = Status::Pending;
        }
        fn force_complete(&self) {
            self.complete();
        }
        fn asset(&self) -> Option<String> {
            self.asset.clone()
        }
    }

    pub(crate) fn names<C: Element + ?Sized>(elements: &[Arc<C>]) -> Vec<String> {
        elements.iter().map(|e| e.name().to_string()).collect()
    }

    #[test]
    fn test_diamond() {
        let (a, b, c, d) = (
            TestElement::new("A"),
            TestElement::new("B"),
            TestElement::new("C"),
            TestElement::new("D"),
        );
        let mut graph = DependencyGraph::new();
        graph.add_dependency(b.id, a.id);
        graph.add_dependency(c.id, a.id);
        graph.add_dependency(d.id, b.id);
        graph.add_dependency(d.id, c.id);

        let children = vec![a.clone(), b.clone(), c.clone(), d.clone()];
        let dirty = HashSet::new();

        assert_eq!(names(&graph.candidates(&children, &dirty)), ["A"]);
        a.complete();
        assert_eq!(names(&graph.candidates(&children, &dirty)), ["B", "C"]);
        b.complete();
        assert_eq!(names(&graph.candidates(&children, &dirty)), ["C"]);
        c.complete();
        assert_eq!(names(&graph.candidates(&children, &dirty)), ["D"]);
        d.complete();
        assert!(graph.candidates(&children, &dirty).is_empty());
    }

    #[test]
    fn test_add_dependency_registers_both() {
        let mut graph = DependencyGraph::new();
        let (child, parent) = (ElementId::new(), ElementId::new());
        graph.add_dependency(child, parent);

        assert!(graph.contains(&child));
        assert!(graph.contains(&parent));
        assert_eq!(graph.elements(), &[parent, child]);
        assert_eq!(graph.dependencies(&child), HashSet::from([parent]));
        assert!(graph.add_element(child).is_err());
    }

    #[test]
    fn test_dirty_asset_and_errors_excluded() {
        let busy = TestElement::with_asset("busy", "node-0");
        let free = TestElement::with_asset("free", "node-1");
        let broken = TestElement::errored("broken");
        let mut graph = DependencyGraph::new();
        for e in [&busy, &free, &broken] {
            graph.add_element(e.id).unwrap();
        }

        let dirty = HashSet::from(["node-0".to_string()]);
        let children = vec![busy, free, broken];
        assert_eq!(names(&graph.candidates(&children, &dirty)), ["free"]);
    }

    #[test]
    fn test_missing_prerequisite_blocks() {
        let a = TestElement::new("A");
        let mut graph = DependencyGraph::new();
        graph.add_dependency(a.id, ElementId::new());

        assert!(graph.candidates(&[a], &HashSet::new()).is_empty());
    }
}
