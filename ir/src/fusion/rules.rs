//! Built-in pairwise fusion rules.

use super::{FusionPlan, FusionRule};
use crate::{IRNode, OpKind, ranges_compatible};

fn same_range(producer: &IRNode, consumer: &IRNode) -> bool {
    ranges_compatible(producer.loop_range.as_ref(), consumer.loop_range.as_ref())
}

/// Chain two elementwise ops over the same range.
pub struct ElemElem;

impl FusionRule for ElemElem {
    fn name(&self) -> &'static str {
        "Elem+Elem"
    }

    fn priority(&self) -> u32 {
        10
    }

    fn matches(&self, producer: &IRNode, consumer: &IRNode) -> bool {
        producer.kind == OpKind::Elementwise && consumer.kind == OpKind::Elementwise
    }

    fn can_fuse(&self, producer: &IRNode, consumer: &IRNode) -> bool {
        same_range(producer, consumer)
    }
}

/// Feed an elementwise result straight into a reduction.
pub struct ElemReduce;

impl FusionRule for ElemReduce {
    fn name(&self) -> &'static str {
        "Elem+Reduce"
    }

    fn priority(&self) -> u32 {
        20
    }

    fn matches(&self, producer: &IRNode, consumer: &IRNode) -> bool {
        producer.kind == OpKind::Elementwise && consumer.kind == OpKind::Reduction
    }

    fn can_fuse(&self, producer: &IRNode, consumer: &IRNode) -> bool {
        same_range(producer, consumer) && producer.has_single_consumer()
    }
}

/// Fold a single-use allocation into its only user.
pub struct AllocElim;

impl FusionRule for AllocElim {
    fn name(&self) -> &'static str {
        "AllocElim"
    }

    fn priority(&self) -> u32 {
        30
    }

    fn matches(&self, producer: &IRNode, _consumer: &IRNode) -> bool {
        producer.kind == OpKind::Alloc
    }

    fn can_fuse(&self, producer: &IRNode, _consumer: &IRNode) -> bool {
        producer.has_single_consumer()
    }

    fn apply(&self, alloc: &IRNode, user: &IRNode) -> FusionPlan {
        FusionPlan {
            root: user.id,
            members: vec![alloc.id, user.id],
            loop_range: user.loop_range.clone(),
            eliminated_allocs: vec![alloc.id],
        }
    }
}

/// Keep a loaded vector in registers for its only elementwise user.
pub struct LoadElem;

impl FusionRule for LoadElem {
    fn name(&self) -> &'static str {
        "Load+Elem"
    }

    fn priority(&self) -> u32 {
        5
    }

    fn matches(&self, producer: &IRNode, consumer: &IRNode) -> bool {
        producer.kind == OpKind::Load && consumer.kind == OpKind::Elementwise
    }

    fn can_fuse(&self, producer: &IRNode, consumer: &IRNode) -> bool {
        same_range(producer, consumer) && producer.has_single_consumer()
    }

    fn apply(&self, load: &IRNode, elem: &IRNode) -> FusionPlan {
        FusionPlan {
            root: elem.id,
            members: vec![load.id, elem.id],
            loop_range: elem.loop_range.clone().or_else(|| load.loop_range.clone()),
            eliminated_allocs: Vec::new(),
        }
    }
}

/// Write an elementwise result without a temporary.
pub struct ElemStore;

impl FusionRule for ElemStore {
    fn name(&self) -> &'static str {
        "Elem+Store"
    }

    fn priority(&self) -> u32 {
        5
    }

    fn matches(&self, producer: &IRNode, consumer: &IRNode) -> bool {
        producer.kind == OpKind::Elementwise && consumer.kind == OpKind::Store
    }

    fn can_fuse(&self, producer: &IRNode, consumer: &IRNode) -> bool {
        same_range(producer, consumer)
    }
}
