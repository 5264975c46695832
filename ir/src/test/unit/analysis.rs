//! Dataflow analysis tests.

use crate::kernels;
use crate::{ElemType, IRFunction, NodeId, NodeOp, OpKind, VecOp, analyze};

fn ids(v: &[usize]) -> Vec<NodeId> {
    v.iter().copied().map(NodeId).collect()
}

#[test]
fn test_softmax_edges() {
    let mut func = kernels::softmax(ElemType::Float32, 4).unwrap();
    analyze(&mut func);

    // maxVal feeds the broadcast.
    assert_eq!(func[NodeId(0)].consumers, ids(&[4]));
    // The buffer is written by the shift store and read by the exp load.
    assert_eq!(func[NodeId(1)].consumers, ids(&[6, 8]));
    assert_eq!(func[NodeId(5)].producers, ids(&[3, 4]));
    // Exp feeds both the store and the sum.
    assert_eq!(func[NodeId(9)].consumers, ids(&[10, 11]));
    // expSum is read by name in the normalize loop.
    assert_eq!(func[NodeId(14)].producers, ids(&[11, 13]));
}

#[test]
fn test_external_names_create_no_edges() {
    let mut func = kernels::softmax(ElemType::Float32, 4).unwrap();
    analyze(&mut func);

    // `input`, `output` and `i` are parameters or loop variables.
    assert!(func[NodeId(3)].producers.is_empty());
    assert!(func[NodeId(13)].producers.is_empty());
    assert!(func[NodeId(15)].consumers.is_empty());
}

#[test]
fn test_name_resolves_to_latest_writer() {
    let mut func = IRFunction::new("f", ElemType::Float32);
    let first = func.add_node(OpKind::Load, VecOp::Load).reads(["a", "i"]).writes(["x"]).id();
    let second = func.add_node(OpKind::Elementwise, VecOp::Neg).inputs([first]).writes(["x"]).id();
    let user = func.add_node(OpKind::Elementwise, VecOp::Abs).reads(["x"]).id();
    analyze(&mut func);

    assert_eq!(func[user].producers, vec![second]);
    assert_eq!(func[first].consumers, vec![second]);
}

#[test]
fn test_name_never_resolves_forward() {
    let mut func = IRFunction::new("f", ElemType::Float32);
    let reader = func.add_node(OpKind::Elementwise, VecOp::Abs).reads(["late"]).id();
    func.add_node(OpKind::Load, VecOp::Load).writes(["late"]);
    analyze(&mut func);

    assert!(func[reader].producers.is_empty());
}

#[test]
fn test_duplicate_edges_collapse() {
    let mut func = IRFunction::new("f", ElemType::Float32);
    let x = func.add_node(OpKind::Load, VecOp::Load).writes(["x"]).id();
    let sq = func.add_node(OpKind::Elementwise, VecOp::Mul).inputs([x, x]).reads(["x"]).id();
    analyze(&mut func);

    assert_eq!(func[x].consumers, vec![sq]);
    assert!(func[x].has_single_consumer());
}

#[test]
fn test_analyze_idempotent() {
    let mut func = kernels::softmax(ElemType::Float32, 4).unwrap();
    analyze(&mut func);
    let once = func.clone();
    analyze(&mut func);
    assert_eq!(once, func);
}

#[test]
fn test_loop_nodes_have_no_edges() {
    let mut func = kernels::softmax(ElemType::Float32, 4).unwrap();
    analyze(&mut func);
    for node in func.all_nodes().iter().filter(|n| n.op == NodeOp::For) {
        assert!(node.producers.is_empty() && node.consumers.is_empty(), "{} has edges", node.id);
    }
}

#[test]
#[tracing_test::traced_test]
fn test_dangling_input_is_reported() {
    let mut func = IRFunction::new("f", ElemType::Float32);
    let body = func.add_node(OpKind::Loop, NodeOp::For).id();
    let neg = func.add_child(body, OpKind::Elementwise, VecOp::Neg).unwrap().inputs([NodeId(42)]).writes(["y"]).id();
    analyze(&mut func);

    assert!(func[neg].producers.is_empty());
    assert!(logs_contain("input names no node"));
}
