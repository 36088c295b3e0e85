//! Property-based tests for block planning.
//!
//! Builds random graphs through the public API and checks that every plan is a
//! dependency order containing each reachable job exactly once.

use proptest::prelude::*;
use raumklang::nodes::Mixer;
use raumklang::{GraphError, Job, JobId, Node, Root};

const MAX_NODES: usize = 10;

/// Position of every id in `plan`, panicking on duplicates.
fn positions(plan: &[JobId]) -> std::collections::HashMap<JobId, usize> {
    let mut seen = std::collections::HashMap::new();
    for (i, id) in plan.iter().enumerate() {
        assert!(seen.insert(*id, i).is_none(), "{id} planned twice");
    }
    seen
}

/// Mixers with one mono slot per possible upstream.
fn mixers(root: &Root, n: usize) -> Vec<Node> {
    (0..n)
        .map(|_| root.create_node(Mixer::mono(MAX_NODES)).unwrap())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Forward edges of a random DAG, all merged into one output mixer.
    #[test]
    fn plan_orders_a_random_dag(
        n in 1usize..MAX_NODES,
        adjacency in prop::collection::vec(any::<bool>(), MAX_NODES * MAX_NODES),
    ) {
        let root = Root::new(48000).unwrap();
        let nodes = mixers(&root, n);
        let sink = root.create_node(Mixer::mono(MAX_NODES)).unwrap();

        let mut edges = Vec::new();
        for to in 0..n {
            for from in 0..to {
                if adjacency[from * MAX_NODES + to] {
                    nodes[from].connect(0, &nodes[to], from).unwrap();
                    edges.push((from, to));
                }
            }
            nodes[to].connect(0, &sink, to).unwrap();
        }
        root.set_output(&sink, 0).unwrap();

        let plan = root.plan().unwrap();
        prop_assert_eq!(plan.len(), n + 1);
        let sink_id = sink.id();
        prop_assert_eq!(plan.last(), Some(&sink_id));

        let pos = positions(&plan);
        for (from, to) in edges {
            prop_assert!(pos[&nodes[from].id()] < pos[&nodes[to].id()]);
        }
        drop(root.tick().unwrap());
    }

    /// Arbitrary connect attempts either succeed or are refused as cycles, and
    /// the graph always stays plannable.
    #[test]
    fn refused_connections_keep_the_graph_acyclic(
        ops in prop::collection::vec((0usize..MAX_NODES, 0usize..MAX_NODES), 0..40),
    ) {
        let root = Root::new(48000).unwrap();
        let nodes = mixers(&root, MAX_NODES);
        for node in &nodes {
            root.set_always_active(node).unwrap();
        }

        let mut edges = Vec::new();
        for (from, to) in ops {
            match nodes[from].connect(0, &nodes[to], from) {
                Ok(()) => edges.push((from, to)),
                Err(GraphError::WouldCycle { .. }) => {}
                Err(e) => prop_assert!(false, "unexpected error {e}"),
            }
        }

        let plan = root.plan().unwrap();
        prop_assert_eq!(plan.len(), MAX_NODES);
        let pos = positions(&plan);
        for (from, to) in edges {
            prop_assert!(pos[&nodes[from].id()] < pos[&nodes[to].id()]);
        }
    }
}
