//! Cross-loop allocation elimination tests.

use crate::fusion::SOFTMAX_FUSION;
use crate::kernels;
use crate::{ElemType, IRFunction, LoopRange, NodeId, NodeOp, OpKind, VecOp, apply_fusion_rules, eliminate_allocations};

fn lr(end: &str) -> LoopRange {
    LoopRange::vectorized("i", end, 4)
}

/// `tmp = make(n); for { tmp[i] = x[i] }; for { out[i] = tmp[idx] }`
fn two_loops(write_end: &str, read_end: &str, read_index: &str) -> IRFunction {
    let mut func = IRFunction::new("f", ElemType::Float32);
    func.add_node(OpKind::Alloc, NodeOp::Make).writes(["tmp"]).alloc("n", ElemType::Float32);

    let w = func.add_node(OpKind::Loop, NodeOp::For).range(&lr(write_end)).id();
    let x = func.add_child(w, OpKind::Load, VecOp::Load).unwrap().reads(["x", "i"]).writes(["a"]).range(&lr(write_end)).id();
    func.add_child(w, OpKind::Store, VecOp::Store).unwrap().inputs([x]).reads(["tmp", "i"]).range(&lr(write_end));

    let r = func.add_node(OpKind::Loop, NodeOp::For).range(&lr(read_end)).id();
    let y = func.add_child(r, OpKind::Load, VecOp::Load).unwrap().reads(["tmp", read_index]).writes(["b"]).range(&lr(read_end)).id();
    func.add_child(r, OpKind::Store, VecOp::Store).unwrap().inputs([y]).reads(["out", "i"]).range(&lr(read_end));
    func
}

fn fuse(func: &mut IRFunction) -> usize {
    apply_fusion_rules(func);
    eliminate_allocations(func)
}

#[test]
fn test_softmax_eliminates_shifted() {
    let mut func = kernels::softmax(ElemType::Float32, 4).unwrap();
    assert_eq!(fuse(&mut func), 1);

    let group = func.fusion_groups.last().unwrap();
    assert_eq!(group.pattern, SOFTMAX_FUSION);
    assert_eq!(group.members, vec![NodeId(1), NodeId(2), NodeId(7)]);
    assert_eq!(group.root, NodeId(7));
    assert_eq!(group.eliminated_allocs, vec![NodeId(1)]);
    assert!(func[NodeId(7)].is_fusion_root);
    assert_eq!(func[NodeId(1)].output(), Some("shifted"));
}

#[test]
fn test_matching_loops_are_merged() {
    let mut func = two_loops("n", "n", "i");
    assert_eq!(fuse(&mut func), 1);
    assert!(func.fusion_groups.iter().any(|g| g.pattern == SOFTMAX_FUSION));
}

#[test]
fn test_range_mismatch_keeps_buffer() {
    let mut func = two_loops("n", "m", "i");
    assert_eq!(fuse(&mut func), 0);
    assert!(!func[NodeId(0)].is_fused());
}

#[test]
fn test_shifted_index_keeps_buffer() {
    // Reading tmp[j] at iteration i is not a same-iteration dependence.
    let mut func = two_loops("n", "n", "j");
    assert_eq!(fuse(&mut func), 0);
}

#[test]
fn test_second_reader_keeps_buffer() {
    let mut func = two_loops("n", "n", "i");
    let extra = func.add_node(OpKind::Loop, NodeOp::For).range(&lr("n")).id();
    func.add_child(extra, OpKind::Load, VecOp::Load).unwrap().reads(["tmp", "i"]).writes(["c"]).range(&lr("n"));

    assert_eq!(fuse(&mut func), 0);
}

#[test]
fn test_reader_before_writer_keeps_buffer() {
    let mut func = IRFunction::new("f", ElemType::Float32);
    func.add_node(OpKind::Alloc, NodeOp::Make).writes(["tmp"]).alloc("n", ElemType::Float32);
    let r = func.add_node(OpKind::Loop, NodeOp::For).range(&lr("n")).id();
    func.add_child(r, OpKind::Load, VecOp::Load).unwrap().reads(["tmp", "i"]).writes(["b"]).range(&lr("n"));
    let w = func.add_node(OpKind::Loop, NodeOp::For).range(&lr("n")).id();
    let x = func.add_child(w, OpKind::Load, VecOp::Load).unwrap().reads(["x", "i"]).writes(["a"]).range(&lr("n")).id();
    func.add_child(w, OpKind::Store, VecOp::Store).unwrap().inputs([x]).reads(["tmp", "i"]).range(&lr("n"));

    assert_eq!(fuse(&mut func), 0);
}

#[test]
fn test_elimination_is_idempotent() {
    let mut func = kernels::softmax(ElemType::Float32, 4).unwrap();
    fuse(&mut func);
    let groups = func.fusion_groups.len();
    assert_eq!(eliminate_allocations(&mut func), 0);
    assert_eq!(func.fusion_groups.len(), groups);
}

#[test]
#[tracing_test::traced_test]
fn test_elimination_is_logged() {
    let mut func = kernels::softmax(ElemType::Float32, 4).unwrap();
    fuse(&mut func);
    assert!(logs_contain("allocation eliminated"));
}
