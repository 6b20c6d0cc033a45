//! Explicit task dependency graph.
//!
//! Tasks declare what must run before them; composites ask the graph for an
//! execution plan instead of relying on whatever happens to be on disk.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::task::{Task, TaskId};

/// Errors from building or planning the graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("task '{task}' depends on unknown task '{dep}'")]
    UnknownDependency { task: TaskId, dep: TaskId },

    #[error("task '{0}' cannot depend on itself")]
    SelfDependency(TaskId),

    #[error("cycle detected in task graph involving task '{0}'")]
    Cycle(TaskId),

    #[error("task '{0}' is not registered")]
    UnknownTask(TaskId),
}

/// Task dependency graph keyed by task id.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    deps: BTreeMap<TaskId, Vec<TaskId>>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and validate a graph from registered tasks.
    pub fn from_tasks<'a, I>(tasks: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = &'a dyn Task>,
    {
        let mut graph = Self::new();
        for task in tasks {
            graph.declare(task.id(), task.deps());
        }
        graph.validate()?;
        Ok(graph)
    }

    /// Declare a task and its direct dependencies.
    pub fn declare(&mut self, task: TaskId, deps: &[TaskId]) {
        self.deps.insert(task, deps.to_vec());
    }

    pub fn dependencies_of(&self, task: TaskId) -> &[TaskId] {
        self.deps.get(&task).map(|d| d.as_slice()).unwrap_or(&[])
    }

    /// Check that every dependency exists and there are no cycles.
    pub fn validate(&self) -> Result<(), GraphError> {
        for (&task, deps) in &self.deps {
            for &dep in deps {
                if dep == task {
                    return Err(GraphError::SelfDependency(task));
                }
                if !self.deps.contains_key(&dep) {
                    return Err(GraphError::UnknownDependency { task, dep });
                }
            }
        }

        let all: BTreeSet<TaskId> = self.deps.keys().copied().collect();
        self.order(&all).map(|_| ())
    }

    /// Execution order for `requested` plus everything they transitively need.
    ///
    /// Dependencies always come before their dependents.
    pub fn plan(&self, requested: &[TaskId]) -> Result<Vec<TaskId>, GraphError> {
        let mut closure = BTreeSet::new();
        let mut stack: Vec<TaskId> = requested.to_vec();

        while let Some(task) = stack.pop() {
            if !self.deps.contains_key(&task) {
                return Err(GraphError::UnknownTask(task));
            }
            if closure.insert(task) {
                stack.extend(self.dependencies_of(task).iter().copied());
            }
        }

        self.order(&closure)
    }

    fn order(&self, nodes: &BTreeSet<TaskId>) -> Result<Vec<TaskId>, GraphError> {
        // Edge direction: dep -> task
        let mut graph: DiGraphMap<TaskId, ()> = DiGraphMap::new();

        for &task in nodes {
            graph.add_node(task);
        }
        for &task in nodes {
            for &dep in self.dependencies_of(task) {
                if nodes.contains(&dep) {
                    graph.add_edge(dep, task, ());
                }
            }
        }

        toposort(&graph, None).map_err(|cycle| GraphError::Cycle(cycle.node_id()))
    }
}
