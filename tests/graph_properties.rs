// tests/graph_properties.rs

use std::collections::{BTreeSet, HashSet};

use proptest::prelude::*;

use etldag::dag::{DependencyGraph, RunState};
use etldag::errors::GraphError;
use etldag::task::Task;

/// `(task count, raw edge list)`; edges are later forced to point from a
/// lower to a higher index, which keeps the graph acyclic.
fn acyclic_strategy(max_tasks: usize) -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (2..=max_tasks).prop_flat_map(|n| {
        let edges = proptest::collection::vec((0..n, 0..n), 0..n * 2);
        (Just(n), edges)
    })
}

fn name(i: usize) -> String {
    format!("task_{i:02}")
}

fn acyclic_graph(n: usize, raw: &[(usize, usize)]) -> (DependencyGraph, HashSet<usize>) {
    let mut has_upstream = HashSet::new();
    let mut builder = DependencyGraph::builder();
    for i in 0..n {
        builder = builder.add_task(Task::marker(name(i)));
    }
    for &(a, b) in raw {
        if a == b {
            continue;
        }
        let (up, down) = if a < b { (a, b) } else { (b, a) };
        has_upstream.insert(down);
        builder = builder.add_dependency(name(up), name(down));
    }
    (builder.build().unwrap(), has_upstream)
}

proptest! {
    #[test]
    fn acyclic_graphs_build_and_start_with_their_roots(
        (n, raw) in acyclic_strategy(12)
    ) {
        let (graph, has_upstream) = acyclic_graph(n, &raw);

        let expected: BTreeSet<String> = (0..n)
            .filter(|i| !has_upstream.contains(i))
            .map(name)
            .collect();

        let state = RunState::new(&graph);
        prop_assert_eq!(graph.ready_tasks(&state), expected.clone());
        prop_assert_eq!(graph.roots(), expected);
        prop_assert!(!graph.is_terminal(&state));

        // Every upstream comes before its dependents.
        let order = graph.topological_order();
        for (pos, id) in order.iter().enumerate() {
            for dep in graph.dependencies_of(id) {
                let dep_pos = order.iter().position(|x| x == dep).unwrap();
                prop_assert!(dep_pos < pos);
            }
        }
    }

    #[test]
    fn cycles_are_rejected_naming_a_member(
        (n, raw) in acyclic_strategy(10),
        start in 0usize..10,
        len in 2usize..5,
    ) {
        // Close a ring over `len` consecutive indices on top of the acyclic edges.
        let len = len.min(n);
        let start = start % (n - len + 1);
        let ring: Vec<usize> = (start..start + len).collect();

        let mut builder = DependencyGraph::builder();
        for i in 0..n {
            builder = builder.add_task(Task::marker(name(i)));
        }
        for &(a, b) in &raw {
            if a != b {
                builder = builder.add_dependency(name(a.min(b)), name(a.max(b)));
            }
        }
        for w in ring.windows(2) {
            builder = builder.add_dependency(name(w[0]), name(w[1]));
        }
        builder = builder.add_dependency(name(ring[len - 1]), name(ring[0]));

        match builder.build() {
            Err(GraphError::Cycle { involved }) => {
                let ring_names: HashSet<String> = ring.iter().copied().map(name).collect();
                prop_assert!(involved.iter().any(|id| ring_names.contains(id)));
            }
            other => prop_assert!(false, "expected a cycle error, got {:?}", other.map(|g| g.len())),
        }
    }
}

#[test]
fn duplicate_unknown_and_empty_are_rejected() {
    let dup = DependencyGraph::builder()
        .add_task(Task::marker("a"))
        .add_task(Task::marker("a"))
        .build();
    assert_eq!(dup.unwrap_err(), GraphError::DuplicateTask("a".to_string()));

    let unknown = DependencyGraph::builder()
        .add_task(Task::marker("a").after("ghost"))
        .build();
    assert!(matches!(unknown, Err(GraphError::UnknownTask { .. })));

    assert_eq!(
        DependencyGraph::build(Vec::new(), Vec::new()).unwrap_err(),
        GraphError::Empty
    );
}
