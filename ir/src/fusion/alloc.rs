//! Cross-loop allocation elimination.
//!
//! Matches the shape
//!
//! ```text
//! tmp := make(n)
//! for i { ...; tmp[i] = v }
//! for i { x := tmp[i]; ... }
//! ```
//!
//! and groups the allocation with both loops so the emitter can run them as one pass,
//! forwarding `v` to the consumer's load instead of materializing `tmp`.

use itertools::Itertools;
use tracing::{debug, trace};

use super::{FusionPlan, commit};
use crate::{IRFunction, IRNode, NodeId, OpKind};

/// Pattern name of the groups this pass creates.
pub const SOFTMAX_FUSION: &str = "SoftmaxFusion";

/// Eliminate intermediate buffers written by one loop and read by the next.
///
/// Expects edges from a prior [`analyze`](crate::analyze). Returns the number of
/// allocations eliminated.
pub fn eliminate_allocations(func: &mut IRFunction) -> usize {
    let allocs = func.top_level(OpKind::Alloc).filter(|n| !n.is_fused()).map(|n| n.id).collect_vec();

    let mut eliminated = 0;
    for alloc in allocs {
        let Some(plan) = plan_elimination(func, alloc) else { continue };
        debug!(alloc = %alloc, producer = %plan.members[1], consumer = %plan.members[2], "allocation eliminated");
        commit(func, SOFTMAX_FUSION, plan);
        eliminated += 1;
    }
    eliminated
}

fn plan_elimination(func: &IRFunction, alloc: NodeId) -> Option<FusionPlan> {
    let buffer = func[alloc].output()?;

    let producers = func
        .top_level(OpKind::Loop)
        .filter(|l| direct_children(func, l, OpKind::Store).any(|s| stored_buffer(s) == Some(buffer)))
        .map(|l| l.id)
        .collect_vec();
    let [producer] = producers[..] else {
        trace!(alloc = %alloc, writers = producers.len(), "allocation needs exactly one writing loop");
        return None;
    };

    let consumers = func
        .top_level(OpKind::Loop)
        .filter(|l| l.id != producer)
        .filter(|l| direct_children(func, l, OpKind::Load).any(|ld| loaded_buffer(ld) == Some(buffer)))
        .map(|l| l.id)
        .collect_vec();
    let [consumer] = consumers[..] else {
        trace!(alloc = %alloc, readers = consumers.len(), "allocation needs exactly one reading loop");
        return None;
    };

    let (prod, cons) = (&func[producer], &func[consumer]);
    if prod.is_fused() || cons.is_fused() || consumer < producer {
        return None;
    }
    let range = prod.loop_range.as_ref()?;
    if !cons.loop_range.as_ref().is_some_and(|r| r.same(range)) {
        return None;
    }

    // Every use of the buffer must live in one of the two loops.
    let contained = func[alloc].consumers.iter().all(|&u| matches!(func[u].parent, Some(p) if p == producer || p == consumer));
    if !contained {
        return None;
    }

    // Element i is written and read at iteration i of the respective loop.
    let cons_var = cons.loop_range.as_ref().map(|r| r.loop_var.as_str());
    let writes_in_step = direct_children(func, prod, OpKind::Store)
        .filter(|s| stored_buffer(s) == Some(buffer))
        .all(|s| index_operand(s) == Some(range.loop_var.as_str()));
    let reads_in_step = direct_children(func, cons, OpKind::Load)
        .filter(|l| loaded_buffer(l) == Some(buffer))
        .all(|l| index_operand(l) == cons_var);
    if !writes_in_step || !reads_in_step {
        return None;
    }

    Some(FusionPlan {
        root: consumer,
        members: vec![alloc, producer, consumer],
        loop_range: Some(range.clone()),
        eliminated_allocs: vec![alloc],
    })
}

fn direct_children<'a>(func: &'a IRFunction, parent: &'a IRNode, kind: OpKind) -> impl Iterator<Item = &'a IRNode> {
    parent.children.iter().map(move |&c| &func[c]).filter(move |n| n.kind == kind)
}

/// Target buffer of a store: its first symbolic operand.
fn stored_buffer(store: &IRNode) -> Option<&str> {
    store.input_names.first().map(String::as_str)
}

fn loaded_buffer(load: &IRNode) -> Option<&str> {
    load.input_names.first().map(String::as_str)
}

fn index_operand(node: &IRNode) -> Option<&str> {
    node.input_names.get(1).map(String::as_str)
}
