// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet, HashSet};

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graphmap::DiGraphMap;

use crate::dag::task_info::{RunState, TaskState};
use crate::engine::TaskId;
use crate::errors::GraphError;
use crate::task::Task;

/// Internal node structure: the task plus immediate deps and dependents.
#[derive(Debug, Clone)]
struct DagNode {
    task: Task,
    /// Direct dependencies: tasks that must succeed before this one can run.
    deps: Vec<TaskId>,
    /// Direct dependents: tasks that depend on this one.
    dependents: Vec<TaskId>,
}

/// Immutable dependency graph over the tasks of one pipeline.
///
/// Construction rejects cycles, unknown ids and duplicates, so every value of
/// this type is a valid DAG. Per-run state lives in [`RunState`]; the graph
/// itself is never mutated while a run is executing.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: BTreeMap<TaskId, DagNode>,
    /// Topological order, computed once at construction.
    order: Vec<TaskId>,
}

/// Incremental construction of a [`DependencyGraph`].
#[derive(Debug, Clone, Default)]
pub struct DependencyGraphBuilder {
    tasks: Vec<Task>,
    edges: Vec<(TaskId, TaskId)>,
}

impl DependencyGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task; its own `upstream` set contributes edges too.
    pub fn add_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    /// Declare that `downstream` may only run after `upstream` succeeded.
    pub fn add_dependency(mut self, upstream: impl Into<TaskId>, downstream: impl Into<TaskId>) -> Self {
        self.edges.push((upstream.into(), downstream.into()));
        self
    }

    pub fn build(self) -> Result<DependencyGraph, GraphError> {
        DependencyGraph::build(self.tasks, self.edges)
    }
}

impl DependencyGraph {
    pub fn builder() -> DependencyGraphBuilder {
        DependencyGraphBuilder::new()
    }

    /// Build a graph from tasks plus extra `(upstream, downstream)` edges.
    ///
    /// Fails with [`GraphError::Cycle`] naming every task of the offending
    /// strongly-connected component.
    pub fn build(
        tasks: Vec<Task>,
        edges: Vec<(TaskId, TaskId)>,
    ) -> Result<DependencyGraph, GraphError> {
        if tasks.is_empty() {
            return Err(GraphError::Empty);
        }

        let mut by_id: BTreeMap<TaskId, Task> = BTreeMap::new();
        for task in tasks {
            if by_id.contains_key(&task.id) {
                return Err(GraphError::DuplicateTask(task.id));
            }
            by_id.insert(task.id.clone(), task);
        }

        for (upstream, downstream) in edges {
            if !by_id.contains_key(&upstream) {
                return Err(GraphError::UnknownTask {
                    task: downstream,
                    missing: upstream,
                });
            }
            match by_id.get_mut(&downstream) {
                Some(task) => {
                    task.upstream.insert(upstream);
                }
                None => {
                    return Err(GraphError::UnknownTask {
                        task: upstream,
                        missing: downstream,
                    });
                }
            }
        }

        for task in by_id.values() {
            if let Some(missing) = task.upstream.iter().find(|dep| !by_id.contains_key(*dep)) {
                return Err(GraphError::UnknownTask {
                    task: task.id.clone(),
                    missing: missing.clone(),
                });
            }
        }

        let order = topological_order(&by_id)?;

        let mut nodes: BTreeMap<TaskId, DagNode> = by_id
            .into_iter()
            .map(|(id, task)| {
                let deps = task.upstream.iter().cloned().collect();
                (
                    id,
                    DagNode {
                        task,
                        deps,
                        dependents: Vec::new(),
                    },
                )
            })
            .collect();

        // Second pass: populate dependents based on deps.
        let ids: Vec<TaskId> = nodes.keys().cloned().collect();
        for id in ids {
            let deps = nodes.get(&id).map(|n| n.deps.clone()).unwrap_or_default();
            for dep in deps {
                if let Some(dep_node) = nodes.get_mut(&dep) {
                    dep_node.dependents.push(id.clone());
                }
            }
        }

        Ok(Self { nodes, order })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.nodes.get(id).map(|n| &n.task)
    }

    /// Tasks in topological order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(|id| self.task(id))
    }

    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn topological_order(&self) -> &[TaskId] {
        &self.order
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, id: &str) -> &[TaskId] {
        self.nodes
            .get(id)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task.
    pub fn dependents_of(&self, id: &str) -> &[TaskId] {
        self.nodes
            .get(id)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Every task reachable downstream of `id` (excluding `id`).
    pub fn downstream_of(&self, id: &str) -> BTreeSet<TaskId> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&TaskId> = self.dependents_of(id).iter().collect();
        while let Some(next) = stack.pop() {
            if seen.insert(next.clone()) {
                stack.extend(self.dependents_of(next));
            }
        }
        seen
    }

    /// Tasks without upstream.
    pub fn roots(&self) -> BTreeSet<TaskId> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.deps.is_empty())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Tasks without downstream.
    pub fn sinks(&self) -> BTreeSet<TaskId> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.dependents.is_empty())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// `Pending` tasks whose every upstream task has `Succeeded`.
    ///
    /// Tasks sitting out a retry backoff are not ready.
    pub fn ready_tasks(&self, state: &RunState) -> BTreeSet<TaskId> {
        self.nodes
            .iter()
            .filter(|(id, node)| {
                state.state_of(id) == Some(TaskState::Pending)
                    && !state.is_awaiting_retry(id)
                    && node
                        .deps
                        .iter()
                        .all(|dep| state.state_of(dep) == Some(TaskState::Succeeded))
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Whether every task reached a terminal state and no retry is pending.
    pub fn is_terminal(&self, state: &RunState) -> bool {
        self.nodes.keys().all(|id| {
            state.state_of(id).is_some_and(|s| s.is_terminal()) && !state.is_awaiting_retry(id)
        })
    }
}

/// Kahn-style ordering via petgraph; on failure, report the whole
/// strongly-connected component that contains the cycle.
fn topological_order(tasks: &BTreeMap<TaskId, Task>) -> Result<Vec<TaskId>, GraphError> {
    // Edge direction: dep -> task.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for id in tasks.keys() {
        graph.add_node(id.as_str());
    }
    for task in tasks.values() {
        for dep in task.upstream.iter() {
            graph.add_edge(dep.as_str(), task.id.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
        Err(cycle) => {
            let node = cycle.node_id();
            let involved: HashSet<&str> = tarjan_scc(&graph)
                .into_iter()
                .find(|scc| scc.contains(&node))
                .map(|scc| scc.into_iter().collect())
                .unwrap_or_else(|| HashSet::from([node]));

            let mut involved: Vec<TaskId> = involved.into_iter().map(str::to_string).collect();
            involved.sort();
            Err(GraphError::Cycle { involved })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> DependencyGraph {
        DependencyGraph::builder()
            .add_task(Task::marker("A"))
            .add_task(Task::marker("B").after("A"))
            .add_task(Task::marker("C"))
            .add_dependency("B", "C")
            .build()
            .unwrap()
    }

    #[test]
    fn builder_merges_task_upstream_and_explicit_edges() {
        let g = chain();
        assert_eq!(g.topological_order(), &["A", "B", "C"]);
        assert_eq!(g.dependencies_of("C"), &["B".to_string()]);
        assert_eq!(g.dependents_of("A"), &["B".to_string()]);
        assert_eq!(g.roots(), BTreeSet::from(["A".to_string()]));
        assert_eq!(g.sinks(), BTreeSet::from(["C".to_string()]));
        assert_eq!(
            g.downstream_of("A"),
            BTreeSet::from(["B".to_string(), "C".to_string()])
        );
    }

    #[test]
    fn cycle_names_all_members_but_not_bystanders() {
        let err = DependencyGraph::builder()
            .add_task(Task::marker("start"))
            .add_task(Task::marker("X").after("start").after("Z"))
            .add_task(Task::marker("Y").after("X"))
            .add_task(Task::marker("Z").after("Y"))
            .build()
            .unwrap_err();

        assert_eq!(
            err,
            GraphError::Cycle {
                involved: vec!["X".to_string(), "Y".to_string(), "Z".to_string()]
            }
        );
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let err = DependencyGraph::builder()
            .add_task(Task::marker("A").after("A"))
            .build()
            .unwrap_err();
        assert_eq!(err, GraphError::Cycle { involved: vec!["A".to_string()] });
    }

    #[test]
    fn rejects_unknown_duplicate_and_empty() {
        assert_eq!(DependencyGraph::builder().build().unwrap_err(), GraphError::Empty);

        let err = DependencyGraph::builder()
            .add_task(Task::marker("A"))
            .add_task(Task::marker("A"))
            .build()
            .unwrap_err();
        assert_eq!(err, GraphError::DuplicateTask("A".to_string()));

        let err = DependencyGraph::builder()
            .add_task(Task::marker("A").after("ghost"))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownTask {
                task: "A".to_string(),
                missing: "ghost".to_string()
            }
        );

        let err = DependencyGraph::builder()
            .add_task(Task::marker("A"))
            .add_dependency("A", "ghost")
            .build()
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownTask { .. }));
    }
}
