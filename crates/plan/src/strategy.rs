//! Strategies choosing which children of a phase or plan get worked on.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dependency::DependencyGraph;
use crate::element::Element;

/// Picks the children eligible for work in the current offer cycle.
///
/// An interrupted strategy yields no candidates until it is told to proceed.
/// Interruption never aborts work already handed out.
pub trait Strategy<C: Element + ?Sized>: Send + Sync {
    /// Children eligible this cycle, in evaluation order.
    fn candidates(&self, children: &[Arc<C>], dirty: &HashSet<String>) -> Vec<Arc<C>>;

    /// Stop producing candidates.
    fn interrupt(&self);

    /// Resume producing candidates.
    fn proceed(&self);

    /// Whether the strategy is interrupted.
    fn is_interrupted(&self) -> bool;
}

/// A shared strategy, so plans rebuilt around it keep its interrupt state.
impl<C: Element + ?Sized, S: Strategy<C> + ?Sized> Strategy<C> for Arc<S> {
    fn candidates(&self, children: &[Arc<C>], dirty: &HashSet<String>) -> Vec<Arc<C>> {
        (**self).candidates(children, dirty)
    }

    fn interrupt(&self) {
        (**self).interrupt();
    }

    fn proceed(&self) {
        (**self).proceed();
    }

    fn is_interrupted(&self) -> bool {
        (**self).is_interrupted()
    }
}

#[derive(Debug, Default)]
struct Interrupt(AtomicBool);

impl Interrupt {
    fn set(&self, interrupted: bool) {
        self.0.store(interrupted, Ordering::SeqCst);
    }

    fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One child at a time, in declaration order.
///
/// Each child waits for the one before it, so an errored child blocks
/// everything declared after it.
#[derive(Debug, Default)]
pub struct SerialStrategy {
    interrupted: Interrupt,
}

impl SerialStrategy {
    /// Create a serial strategy.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C: Element + ?Sized> Strategy<C> for SerialStrategy {
    fn candidates(&self, children: &[Arc<C>], dirty: &HashSet<String>) -> Vec<Arc<C>> {
        if self.interrupted.get() {
            return Vec::new();
        }
        let mut graph = DependencyGraph::new();
        let mut previous = None;
        for child in children {
            let id = child.id();
            match previous {
                Some(parent) => graph.add_dependency(id, parent),
                None => graph.register(id),
            }
            previous = Some(id);
        }
        graph.candidates(children, dirty)
    }

    fn interrupt(&self) {
        info!("Interrupting serial strategy");
        self.interrupted.set(true);
    }

    fn proceed(&self) {
        info!("Proceeding with serial strategy");
        self.interrupted.set(false);
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.get()
    }
}

/// Every child that is ready, all at once.
#[derive(Debug, Default)]
pub struct ParallelStrategy {
    interrupted: Interrupt,
}

impl ParallelStrategy {
    /// Create a parallel strategy.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C: Element + ?Sized> Strategy<C> for ParallelStrategy {
    fn candidates(&self, children: &[Arc<C>], dirty: &HashSet<String>) -> Vec<Arc<C>> {
        if self.interrupted.get() {
            return Vec::new();
        }
        let mut graph = DependencyGraph::new();
        for child in children {
            graph.register(child.id());
        }
        graph.candidates(children, dirty)
    }

    fn interrupt(&self) {
        info!("Interrupting parallel strategy");
        self.interrupted.set(true);
    }

    fn proceed(&self) {
        info!("Proceeding with parallel strategy");
        self.interrupted.set(false);
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.get()
    }
}

/// Children become eligible once their declared prerequisites complete.
#[derive(Debug, Default)]
pub struct DependencyStrategy {
    graph: DependencyGraph,
    interrupted: Interrupt,
}

impl DependencyStrategy {
    /// Create a strategy over an explicit graph.
    pub fn new(graph: DependencyGraph) -> Self {
        Self {
            graph,
            interrupted: Interrupt::default(),
        }
    }

    /// The graph this strategy follows.
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }
}

impl<C: Element + ?Sized> Strategy<C> for DependencyStrategy {
    fn candidates(&self, children: &[Arc<C>], dirty: &HashSet<String>) -> Vec<Arc<C>> {
        if self.interrupted.get() {
            return Vec::new();
        }
        self.graph.candidates(children, dirty)
    }

    fn interrupt(&self) {
        info!("Interrupting dependency strategy");
        self.interrupted.set(true);
    }

    fn proceed(&self) {
        info!("Proceeding with dependency strategy");
        self.interrupted.set(false);
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.get()
    }
}

/// Strategy choice as it appears in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// [`SerialStrategy`]
    #[default]
    Serial,
    /// [`ParallelStrategy`]
    Parallel,
}

impl StrategyKind {
    /// Build a fresh strategy of this kind.
    pub fn build<C: Element + ?Sized + 'static>(self) -> Box<dyn Strategy<C>> {
        match self {
            Self::Serial => Box::new(SerialStrategy::new()),
            Self::Parallel => Box::new(ParallelStrategy::new()),
        }
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "serial" => Ok(Self::Serial),
            "parallel" => Ok(Self::Parallel),
            other => Err(format!("unknown strategy: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::tests::{names, TestElement};

    fn children() -> Vec<Arc<TestElement>> {
        vec![
            TestElement::new("A"),
            TestElement::new("B"),
            TestElement::new("C"),
        ]
    }

    #[test]
    fn test_serial_one_at_a_time() {
        let children = children();
        let strategy = SerialStrategy::new();
        let dirty = HashSet::new();

        assert_eq!(names(&strategy.candidates(&children, &dirty)), ["A"]);
        children[0].complete();
        assert_eq!(names(&strategy.candidates(&children, &dirty)), ["B"]);
        children[1].complete();
        children[2].complete();
        assert!(strategy.candidates(&children, &dirty).is_empty());
    }

    #[test]
    fn test_serial_blocks_behind_error() {
        let children = vec![TestElement::errored("A"), TestElement::new("B")];
        assert!(SerialStrategy::new()
            .candidates(&children, &HashSet::new())
            .is_empty());
    }

    #[test]
    fn test_parallel_all_ready() {
        let children = children();
        children[1].complete();
        let strategy = ParallelStrategy::new();
        assert_eq!(names(&strategy.candidates(&children, &HashSet::new())), ["A", "C"]);
    }

    #[test]
    fn test_interrupt_and_proceed() {
        let children = children();
        let strategy = ParallelStrategy::new();
        Strategy::<TestElement>::interrupt(&strategy);
        assert!(Strategy::<TestElement>::is_interrupted(&strategy));
        assert!(strategy.candidates(&children, &HashSet::new()).is_empty());

        Strategy::<TestElement>::proceed(&strategy);
        assert_eq!(strategy.candidates(&children, &HashSet::new()).len(), 3);
    }

    #[test]
    fn test_shared_strategy_outlives_owner() {
        let children = children();
        let shared = Arc::new(SerialStrategy::new());
        let first: Box<dyn Strategy<TestElement>> = Box::new(Arc::clone(&shared));
        first.interrupt();
        drop(first);

        let second: Box<dyn Strategy<TestElement>> = Box::new(Arc::clone(&shared));
        assert!(second.is_interrupted());
        assert!(second.candidates(&children, &HashSet::new()).is_empty());

        second.proceed();
        assert_eq!(names(&second.candidates(&children, &HashSet::new())), ["A"]);
    }

    #[test]
    fn test_dependency_strategy() {
        let children = children();
        let mut graph = DependencyGraph::new();
        graph.add_dependency(children[2].id(), children[0].id());
        graph.add_element(children[1].id()).unwrap();
        let strategy = DependencyStrategy::new(graph);

        assert_eq!(names(&strategy.candidates(&children, &HashSet::new())), ["A", "B"]);
    }

    #[test]
    fn test_kind_from_config() {
        let kind: StrategyKind = serde_json::from_str("\"parallel\"").unwrap();
        assert_eq!(kind, StrategyKind::Parallel);
        assert_eq!("serial".parse::<StrategyKind>().unwrap(), StrategyKind::Serial);

        let strategy = kind.build::<TestElement>();
        assert_eq!(strategy.candidates(&children(), &HashSet::new()).len(), 3);
    }
}
