//! Canonical kernels built through the builder API.
//!
//! These are the shapes the fusion passes are tuned for, and the fixtures most tests
//! start from.

use simdgen_dtype::ElemType;

use crate::error::Result;
use crate::{IRFunction, IRParam, LoopRange, NodeOp, OpKind, VecOp};

/// Numerically stable softmax over `input[0..size]` into `output`.
///
/// ```text
/// maxVal  = ReduceMax(input)
/// shifted = make(size)
/// for i { shifted[i] = input[i] - maxVal }
/// for i { v4 = Exp(shifted[i]); output[i] = v4; expSum += v4 }
/// for i { output[i] = output[i] / expSum }
/// ```
pub fn softmax(elem: ElemType, lanes: usize) -> Result<IRFunction> {
    let lr = LoopRange::vectorized("i", "size", lanes);
    let mut func = IRFunction::new("BaseSoftmax", elem).with_params([
        IRParam::slice("input", elem),
        IRParam::slice("output", elem),
        IRParam::int("size"),
    ]);

    func.add_node(OpKind::Reduction, VecOp::ReduceMax).reads(["input"]).writes(["maxVal"]).range(&lr);
    func.add_node(OpKind::Alloc, NodeOp::Make).writes(["shifted"]).alloc("size", elem);

    // shifted[i] = input[i] - maxVal
    let shift = func.add_node(OpKind::Loop, NodeOp::For).range(&lr).id();
    let v1 = func.add_child(shift, OpKind::Load, VecOp::Load)?.reads(["input", "i"]).writes(["v1"]).range(&lr).id();
    let max_vec = func.add_child(shift, OpKind::Broadcast, VecOp::Set)?.reads(["maxVal"]).writes(["maxVec"]).range(&lr).id();
    let v2 = func.add_child(shift, OpKind::Elementwise, VecOp::Sub)?.inputs([v1, max_vec]).writes(["v2"]).range(&lr).id();
    func.add_child(shift, OpKind::Store, VecOp::Store)?.inputs([v2]).reads(["shifted", "i"]).range(&lr);

    // output[i] = exp(shifted[i]); expSum += output[i]
    let exp = func.add_node(OpKind::Loop, NodeOp::For).range(&lr).id();
    let v3 = func.add_child(exp, OpKind::Load, VecOp::Load)?.reads(["shifted", "i"]).writes(["v3"]).range(&lr).id();
    let v4 = func.add_child(exp, OpKind::Elementwise, VecOp::Exp)?.inputs([v3]).writes(["v4"]).range(&lr).id();
    func.add_child(exp, OpKind::Store, VecOp::Store)?.inputs([v4]).reads(["output", "i"]).range(&lr);
    func.add_child(exp, OpKind::Reduction, VecOp::ReduceSum)?.inputs([v4]).writes(["expSum"]).range(&lr);

    // output[i] /= expSum
    let norm = func.add_node(OpKind::Loop, NodeOp::For).range(&lr).id();
    let v5 = func.add_child(norm, OpKind::Load, VecOp::Load)?.reads(["output", "i"]).writes(["v5"]).range(&lr).id();
    let v6 = func.add_child(norm, OpKind::Elementwise, VecOp::Div)?.inputs([v5]).reads(["expSum"]).writes(["v6"]).range(&lr).id();
    func.add_child(norm, OpKind::Store, VecOp::Store)?.inputs([v6]).reads(["output", "i"]).range(&lr);

    Ok(func)
}

/// Softmax as five separate passes over memory.
///
/// ```text
/// maxVal  = ReduceMax(input)
/// shifted = make(size)
/// for i { shifted[i] = input[i] - maxVal }
/// for i { output[i] = Exp(shifted[i]) }
/// for i { expSum += output[i] }
/// invSum  = 1 / expSum
/// for i { output[i] = output[i] * invSum }
/// ```
///
/// Only the first two loops share a buffer; the sum and normalize loops re-read `output`.
pub fn softmax_passes(elem: ElemType, lanes: usize) -> Result<IRFunction> {
    let lr = LoopRange::vectorized("i", "size", lanes);
    let mut func = IRFunction::new("BaseSoftmax", elem).with_params([
        IRParam::slice("input", elem),
        IRParam::slice("output", elem),
        IRParam::int("size"),
    ]);

    func.add_node(OpKind::Reduction, VecOp::ReduceMax).reads(["input"]).writes(["maxVal"]).range(&lr);
    func.add_node(OpKind::Alloc, NodeOp::Make).writes(["shifted"]).alloc("size", elem);

    let shift = func.add_node(OpKind::Loop, NodeOp::For).range(&lr).id();
    let v1 = func.add_child(shift, OpKind::Load, VecOp::Load)?.reads(["input", "i"]).writes(["v1"]).range(&lr).id();
    let max_vec = func.add_child(shift, OpKind::Broadcast, VecOp::Set)?.reads(["maxVal"]).writes(["maxVec"]).range(&lr).id();
    let v2 = func.add_child(shift, OpKind::Elementwise, VecOp::Sub)?.inputs([v1, max_vec]).writes(["v2"]).range(&lr).id();
    func.add_child(shift, OpKind::Store, VecOp::Store)?.inputs([v2]).reads(["shifted", "i"]).range(&lr);

    let exp = func.add_node(OpKind::Loop, NodeOp::For).range(&lr).id();
    let v3 = func.add_child(exp, OpKind::Load, VecOp::Load)?.reads(["shifted", "i"]).writes(["v3"]).range(&lr).id();
    let v4 = func.add_child(exp, OpKind::Elementwise, VecOp::Exp)?.inputs([v3]).writes(["v4"]).range(&lr).id();
    func.add_child(exp, OpKind::Store, VecOp::Store)?.inputs([v4]).reads(["output", "i"]).range(&lr);

    let sum = func.add_node(OpKind::Loop, NodeOp::For).range(&lr).id();
    let v5 = func.add_child(sum, OpKind::Load, VecOp::Load)?.reads(["output", "i"]).writes(["v5"]).range(&lr).id();
    func.add_child(sum, OpKind::Reduction, VecOp::ReduceSum)?.inputs([v5]).writes(["expSum"]).range(&lr);

    func.add_node(OpKind::Elementwise, VecOp::Div).reads(["1.0f", "expSum"]).writes(["invSum"]);

    let norm = func.add_node(OpKind::Loop, NodeOp::For).range(&lr).id();
    let v6 = func.add_child(norm, OpKind::Load, VecOp::Load)?.reads(["output", "i"]).writes(["v6"]).range(&lr).id();
    let v7 = func.add_child(norm, OpKind::Elementwise, VecOp::Mul)?.inputs([v6]).reads(["invSum"]).writes(["v7"]).range(&lr).id();
    func.add_child(norm, OpKind::Store, VecOp::Store)?.inputs([v7]).reads(["output", "i"]).range(&lr);

    Ok(func)
}

/// `output[i] = exp(input[i])` and returns `sum(output)` through `pout_result`.
///
/// A single flat loop; the store and the reduction both consume the exponential.
pub fn exp_sum(elem: ElemType, lanes: usize) -> Result<IRFunction> {
    let lr = LoopRange::vectorized("i", "size", lanes);
    let mut func = IRFunction::new("BaseExpSum", elem).with_params([
        IRParam::slice("input", elem),
        IRParam::slice("output", elem),
        IRParam::int("size"),
    ])
    .with_returns(["result"]);

    let body = func.add_node(OpKind::Loop, NodeOp::For).range(&lr).id();
    let x = func.add_child(body, OpKind::Load, VecOp::Load)?.reads(["input", "i"]).writes(["x"]).range(&lr).id();
    let e = func.add_child(body, OpKind::Elementwise, VecOp::Exp)?.inputs([x]).writes(["e"]).range(&lr).id();
    func.add_child(body, OpKind::Store, VecOp::Store)?.inputs([e]).reads(["output", "i"]).range(&lr);
    func.add_child(body, OpKind::Reduction, VecOp::ReduceSum)?.inputs([e]).writes(["result"]).range(&lr);

    Ok(func)
}
