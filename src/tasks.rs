//! Task-dependency accumulation.
//!
//! Artifact sets never execute anything to answer "what must be built before
//! these artifacts are usable". Instead they feed the tasks they depend on
//! into a [`TaskDependencyContext`]. Two contexts are provided:
//!
//! * [`DependencyCollector`]: an ordered, de-duplicated list of tasks.
//! * [`TaskGraph`]: wires consumer tasks to their dependencies in a DAG and
//!   answers ordering questions.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::core::ArcStr;
use crate::error::TaskGraphError;

/// Identifier of a task in the surrounding build, e.g. `:app:jar`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(ArcStr);

impl TaskId {
    pub fn new(path: impl AsRef<str>) -> Self {
        Self(Arc::from(path.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({})", &*self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Receives the tasks a container depends on.
pub trait TaskDependencyContext {
    fn add(&mut self, task: &TaskId);
}

/// Anything that depends on tasks of the build.
pub trait TaskDependencyContainer {
    fn visit_dependencies(&self, context: &mut dyn TaskDependencyContext);
}

impl TaskDependencyContainer for [TaskId] {
    fn visit_dependencies(&self, context: &mut dyn TaskDependencyContext) {
        for task in self {
            context.add(task);
        }
    }
}

impl TaskDependencyContainer for Vec<TaskId> {
    fn visit_dependencies(&self, context: &mut dyn TaskDependencyContext) {
        self.as_slice().visit_dependencies(context);
    }
}

/// Collects tasks in first-seen order, each one once.
#[derive(Debug, Default, Clone)]
pub struct DependencyCollector {
    order: Vec<TaskId>,
    seen: HashSet<TaskId>,
}

impl DependencyCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect everything `container` depends on.
    pub fn collect(container: &dyn TaskDependencyContainer) -> Self {
        let mut collector = Self::new();
        container.visit_dependencies(&mut collector);
        collector
    }

    pub fn tasks(&self) -> &[TaskId] {
        &self.order
    }

    pub fn into_tasks(self) -> Vec<TaskId> {
        self.order
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl TaskDependencyContext for DependencyCollector {
    fn add(&mut self, task: &TaskId) {
        if self.seen.insert(task.clone()) {
            self.order.push(task.clone());
        }
    }
}

/// A DAG of tasks, where an edge `a -> b` means `a` must run before `b`.
#[derive(Debug, Default)]
pub struct TaskGraph {
    graph: DiGraph<TaskId, ()>,
    index: HashMap<TaskId, NodeIndex>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task, returning its node. Inserting twice is a no-op.
    pub fn add_task(&mut self, task: &TaskId) -> NodeIndex {
        if let Some(&index) = self.index.get(task) {
            return index;
        }

        let index = self.graph.add_node(task.clone());
        self.index.insert(task.clone(), index);
        index
    }

    /// Make `consumer` depend on every task `container` contributes.
    pub fn depends_on(&mut self, consumer: &TaskId, container: &dyn TaskDependencyContainer) {
        let target = self.add_task(consumer);
        let deps = DependencyCollector::collect(container);

        for dep in deps.tasks() {
            let source = self.add_task(dep);
            if self.graph.find_edge(source, target).is_none() {
                self.graph.add_edge(source, target, ());
            }
        }
    }

    /// Direct dependencies of `task`, ordered by when they entered the graph.
    pub fn dependencies_of(&self, task: &TaskId) -> Vec<TaskId> {
        let Some(&index) = self.index.get(task) else {
            return Vec::new();
        };

        let mut deps: Vec<_> = self
            .graph
            .neighbors_directed(index, Direction::Incoming)
            .collect();
        deps.sort();

        deps.into_iter().map(|i| self.graph[i].clone()).collect()
    }

    /// A valid execution order for every task in the graph.
    pub fn execution_order(&self) -> Result<Vec<TaskId>, TaskGraphError> {
        petgraph::algo::toposort(&self.graph, None)
            .map(|order| order.into_iter().map(|i| self.graph[i].clone()).collect())
            .map_err(|cycle| TaskGraphError::Cycle(self.graph[cycle.node_id()].clone()))
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}

impl TaskDependencyContext for TaskGraph {
    fn add(&mut self, task: &TaskId) {
        self.add_task(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_dedups_in_order() {
        let mut collector = DependencyCollector::new();
        for task in [":a", ":b", ":a", ":c", ":b"] {
            collector.add(&TaskId::from(task));
        }

        let names: Vec<_> = collector.tasks().iter().map(TaskId::as_str).collect();
        assert_eq!(names, [":a", ":b", ":c"]);
    }

    #[test]
    fn test_graph_orders_dependencies_first() {
        let mut graph = TaskGraph::new();
        let jar = TaskId::from(":lib:jar");
        let compile = TaskId::from(":app:compile");
        let test = TaskId::from(":app:test");

        graph.depends_on(&compile, &vec![jar.clone()]);
        graph.depends_on(&test, &vec![compile.clone(), jar.clone()]);

        let order = graph.execution_order().unwrap();
        let pos = |t: &TaskId| order.iter().position(|o| o == t).unwrap();

        assert!(pos(&jar) < pos(&compile));
        assert!(pos(&compile) < pos(&test));
        assert_eq!(graph.dependencies_of(&test), vec![compile, jar]);
    }

    #[test]
    fn test_graph_detects_cycle() {
        let mut graph = TaskGraph::new();
        let a = TaskId::from(":a");
        let b = TaskId::from(":b");

        graph.depends_on(&a, &vec![b.clone()]);
        graph.depends_on(&b, &vec![a.clone()]);

        assert!(matches!(
            graph.execution_order(),
            Err(TaskGraphError::Cycle(_))
        ));
    }
}
