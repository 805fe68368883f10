//! Property-based invariant tests for the component lifecycle engine.
//!
//! Random acyclic graphs of scripted components are driven by random
//! operation streams on a lab sequence. Verifies:
//!
//! 1. Graph invariants hold after every step (see `depgate_harness::graph`):
//!    no premature `on_enable`, enabled components have enabled
//!    dependencies, the enabled bit matches the state, `on_disable` never
//!    runs while a dependent holds the component, and leases are conserved.
//! 2. Teardown drops every value exactly once, whatever the history.
//! 3. With no failing hooks, enabling every component and settling leaves
//!    the whole graph enabled.
//! 4. Disabling one component disables exactly its transitive dependents.
//! 5. Weak leases add to and subtract from the count one-for-one.

use depgate::ComponentState;
use depgate_harness::{Graph, GraphOp, GraphSpec, NodeSpec, Reply};
use proptest::prelude::*;

// ── Strategies ───────────────────────────────────────────────────────

const MAX_NODES: usize = 6;

fn arb_enable_reply() -> impl Strategy<Value = Reply> {
    prop_oneof![
        3 => Just(Reply::Succeed),
        1 => Just(Reply::Fail),
        2 => Just(Reply::Manual),
    ]
}

fn arb_disable_reply() -> impl Strategy<Value = Reply> {
    prop_oneof![Just(Reply::Succeed), Just(Reply::Manual)]
}

/// Node `i` depends on node `j < i` when bit `j` of its mask is set.
fn spec_from(nodes: Vec<(u8, Reply, Reply)>) -> GraphSpec {
    GraphSpec {
        nodes: nodes
            .into_iter()
            .enumerate()
            .map(|(i, (mask, enable, disable))| NodeSpec {
                dependencies: (0..i).filter(|&j| mask & (1 << j) != 0).collect(),
                enable,
                disable,
            })
            .collect(),
    }
}

fn arb_spec() -> impl Strategy<Value = GraphSpec> {
    prop::collection::vec(
        (any::<u8>(), arb_enable_reply(), arb_disable_reply()),
        1..=MAX_NODES,
    )
    .prop_map(spec_from)
}

fn arb_reliable_spec() -> impl Strategy<Value = GraphSpec> {
    prop::collection::vec(
        (
            any::<u8>(),
            prop_oneof![Just(Reply::Succeed), Just(Reply::Manual)],
            arb_disable_reply(),
        ),
        1..=MAX_NODES,
    )
    .prop_map(spec_from)
}

fn arb_op() -> impl Strategy<Value = GraphOp> {
    let index = 0..MAX_NODES;
    prop_oneof![
        4 => index.clone().prop_map(GraphOp::Enable),
        3 => index.clone().prop_map(GraphOp::Disable),
        1 => index.clone().prop_map(GraphOp::Destroy),
        3 => (index.clone(), any::<bool>()).prop_map(|(i, ok)| GraphOp::FinishEnable(i, ok)),
        3 => index.clone().prop_map(GraphOp::FinishDisable),
        2 => index.prop_map(GraphOp::Lease),
        2 => any::<usize>().prop_map(GraphOp::ReleaseLease),
        1 => Just(GraphOp::Pump),
    ]
}

/// Indices of every node that reaches `root` through strong dependencies,
/// including `root`.
fn dependents_closure(spec: &GraphSpec, root: usize) -> Vec<bool> {
    let mut hit = vec![false; spec.nodes.len()];
    hit[root] = true;
    for (i, node) in spec.nodes.iter().enumerate().skip(root + 1) {
        if node.dependencies.iter().any(|&d| hit[d]) {
            hit[i] = true;
        }
    }
    hit
}

// ═════════════════════════════════════════════════════════════════════════
// 1-2. Invariants under random operations, clean teardown
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn invariants_hold_under_random_ops(
        spec in arb_spec(),
        ops in prop::collection::vec(arb_op(), 0..=60),
    ) {
        let mut graph = Graph::new(&spec);
        for (step, op) in ops.iter().enumerate() {
            graph.apply(*op);
            if let Err(violation) = graph.check() {
                prop_assert!(
                    false,
                    "step {step} ({op:?}): {violation}\n{}",
                    graph.log().to_jsonl()
                );
            }
        }
        graph.settle();
        prop_assert!(graph.check().is_ok(), "{:?}", graph.check());
        graph.teardown();
        prop_assert!(graph.check_teardown().is_ok(), "{:?}", graph.check_teardown());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Reliable graphs enable fully
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn reliable_graph_enables_fully(spec in arb_reliable_spec()) {
        let mut graph = Graph::new(&spec);
        for i in (0..graph.len()).rev() {
            graph.apply(GraphOp::Enable(i));
        }
        graph.settle();
        for i in 0..graph.len() {
            let state = graph.component(i).map(|c| c.state());
            prop_assert_eq!(state, Some(ComponentState::Enabled), "n{}", i);
        }
        prop_assert!(graph.check().is_ok(), "{:?}", graph.check());
        graph.teardown();
        prop_assert!(graph.check_teardown().is_ok());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Disable cascades to exactly the transitive dependents
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn disable_cascades_to_transitive_dependents(
        spec in arb_reliable_spec(),
        root in 0..MAX_NODES,
    ) {
        let root = root % spec.nodes.len();
        let affected = dependents_closure(&spec, root);
        let mut graph = Graph::new(&spec);
        for i in 0..graph.len() {
            graph.apply(GraphOp::Enable(i));
        }
        graph.settle();

        graph.apply(GraphOp::Disable(root));
        graph.settle();

        for (i, &hit) in affected.iter().enumerate() {
            let state = graph.component(i).map(|c| c.state());
            let expected = if hit {
                ComponentState::Disabled
            } else {
                ComponentState::Enabled
            };
            prop_assert_eq!(state, Some(expected), "n{}", i);
        }
        prop_assert!(graph.check().is_ok(), "{:?}", graph.check());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Weak lease accounting
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn weak_leases_are_counted_one_for_one(leases in 1usize..=32) {
        let mut graph = Graph::new(&GraphSpec::chain(2));
        graph.apply(GraphOp::Enable(1));
        graph.settle();
        let base = graph.component(0).map(|c| c.lease_count());
        prop_assert_eq!(base, Some(1));

        for _ in 0..leases {
            graph.apply(GraphOp::Lease(0));
        }
        let held = graph.component(0).map(|c| c.lease_count() as usize);
        prop_assert_eq!(held, Some(leases + 1));
        prop_assert!(graph.check().is_ok(), "{:?}", graph.check());

        for k in 0..leases {
            graph.apply(GraphOp::ReleaseLease(k));
        }
        let after = graph.component(0).map(|c| c.lease_count());
        prop_assert_eq!(after, Some(1));
    }
}
