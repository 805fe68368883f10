#![no_main]

use arbitrary::Arbitrary;
use depgate_harness::{Graph, GraphOp, GraphSpec, NodeSpec, Reply};
use libfuzzer_sys::fuzz_target;

const MAX_NODES: usize = 8;
const MAX_OPS: usize = 256;

#[derive(Arbitrary, Debug)]
struct FuzzNode {
    dependency_mask: u8,
    enable: u8,
    manual_disable: bool,
}

#[derive(Arbitrary, Debug)]
enum FuzzOp {
    Enable(u8),
    Disable(u8),
    Destroy(u8),
    FinishEnable(u8, bool),
    FinishDisable(u8),
    Lease(u8),
    ReleaseLease(u8),
    Pump,
}

impl FuzzOp {
    fn to_op(&self) -> GraphOp {
        match *self {
            FuzzOp::Enable(i) => GraphOp::Enable(i.into()),
            FuzzOp::Disable(i) => GraphOp::Disable(i.into()),
            FuzzOp::Destroy(i) => GraphOp::Destroy(i.into()),
            FuzzOp::FinishEnable(i, ok) => GraphOp::FinishEnable(i.into(), ok),
            FuzzOp::FinishDisable(i) => GraphOp::FinishDisable(i.into()),
            FuzzOp::Lease(i) => GraphOp::Lease(i.into()),
            FuzzOp::ReleaseLease(k) => GraphOp::ReleaseLease(k.into()),
            FuzzOp::Pump => GraphOp::Pump,
        }
    }
}

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    nodes: Vec<FuzzNode>,
    ops: Vec<FuzzOp>,
}

fn spec(nodes: &[FuzzNode]) -> GraphSpec {
    GraphSpec {
        nodes: nodes
            .iter()
            .take(MAX_NODES)
            .enumerate()
            .map(|(i, node)| NodeSpec {
                dependencies: (0..i)
                    .filter(|&j| node.dependency_mask & (1 << j) != 0)
                    .collect(),
                enable: match node.enable % 3 {
                    0 => Reply::Succeed,
                    1 => Reply::Fail,
                    _ => Reply::Manual,
                },
                disable: if node.manual_disable {
                    Reply::Manual
                } else {
                    Reply::Succeed
                },
            })
            .collect(),
    }
}

fuzz_target!(|input: FuzzInput| {
    if input.nodes.is_empty() {
        return;
    }
    let mut graph = Graph::new(&spec(&input.nodes));
    for op in input.ops.iter().take(MAX_OPS) {
        graph.apply(op.to_op());
        if let Err(violation) = graph.check() {
            panic!("{op:?}: {violation}\n{}", graph.log().to_jsonl());
        }
    }
    graph.teardown();
    if let Err(violation) = graph.check_teardown() {
        panic!("teardown: {violation}");
    }
});
