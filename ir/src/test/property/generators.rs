//! Generators for property-based testing.
//!
//! Produces multi-stage elementwise pipelines: each stage is one loop that loads a
//! buffer, runs a chain of elementwise ops, stores the result and optionally reduces it.
//! Stages may hand their result to the next stage through an intermediate allocation.

use proptest::prelude::*;

use simdgen_dtype::ElemType;

use crate::error::Result;
use crate::{IRFunction, IRParam, LoopRange, NodeId, NodeOp, OpKind, VecOp};

// ============================================================================
// Stage description
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElemSpec {
    pub op: VecOp,
    /// Lane count of this node's range; differing from the stage's blocks fusion.
    pub lanes: usize,
    /// Also consume the stage's load, giving the load a second consumer.
    pub reuse_load: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    pub lanes: usize,
    pub ops: Vec<ElemSpec>,
    pub reduce: bool,
    /// Write into a fresh allocation that the next stage reads.
    pub via_alloc: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSpec {
    pub elem: ElemType,
    pub stages: Vec<StageSpec>,
}

impl PipelineSpec {
    pub fn build(&self) -> Result<IRFunction> {
        let mut func = IRFunction::new("BasePipeline", self.elem).with_params([
            IRParam::slice("input", self.elem),
            IRParam::slice("output", self.elem),
            IRParam::int("size"),
        ]);

        let mut source = "input".to_string();
        let mut counter = 0usize;
        let mut fresh = |prefix: &str| {
            counter += 1;
            format!("{prefix}{counter}")
        };

        for (si, stage) in self.stages.iter().enumerate() {
            let lr = LoopRange::vectorized("i", "size", stage.lanes);
            let has_next = si + 1 < self.stages.len();

            let target = if stage.via_alloc && has_next {
                let buf = format!("tmp{si}");
                func.add_node(OpKind::Alloc, NodeOp::Make).writes([buf.as_str()]).alloc("size", self.elem);
                buf
            } else {
                "output".to_string()
            };

            let body = func.add_node(OpKind::Loop, NodeOp::For).range(&lr).id();
            let load_name = fresh("v");
            let load = func
                .add_child(body, OpKind::Load, VecOp::Load)?
                .reads([source.as_str(), "i"])
                .writes([load_name.as_str()])
                .range(&lr)
                .id();

            let mut last: NodeId = load;
            for spec in &stage.ops {
                let range = LoopRange::vectorized("i", "size", spec.lanes);
                let mut inputs = vec![last];
                if spec.reuse_load && last != load {
                    inputs.push(load);
                }
                let out = fresh("v");
                last = func
                    .add_child(body, OpKind::Elementwise, spec.op)?
                    .inputs(inputs)
                    .writes([out.as_str()])
                    .range(&range)
                    .id();
            }

            func.add_child(body, OpKind::Store, VecOp::Store)?.inputs([last]).reads([target.as_str(), "i"]).range(&lr);

            if stage.reduce {
                let sum = fresh("sum");
                func.add_child(body, OpKind::Reduction, VecOp::ReduceSum)?.inputs([last]).writes([sum.as_str()]).range(&lr);
            }

            source = target;
        }

        Ok(func)
    }
}

// ============================================================================
// Strategies
// ============================================================================

/// Elementwise ops the generator chains.
pub fn arb_elementwise_op() -> impl Strategy<Value = VecOp> {
    prop_oneof![
        Just(VecOp::Add),
        Just(VecOp::Sub),
        Just(VecOp::Mul),
        Just(VecOp::Neg),
        Just(VecOp::Abs),
        Just(VecOp::Exp),
        Just(VecOp::Sqrt),
    ]
}

/// Lane counts; mostly 4 so that fusion usually has something to do.
pub fn arb_lanes() -> impl Strategy<Value = usize> {
    prop_oneof![4 => Just(4usize), 1 => Just(8usize)]
}

pub fn arb_elem_spec() -> impl Strategy<Value = ElemSpec> {
    (arb_elementwise_op(), arb_lanes(), prop::bool::weighted(0.2))
        .prop_map(|(op, lanes, reuse_load)| ElemSpec { op, lanes, reuse_load })
}

pub fn arb_stage() -> impl Strategy<Value = StageSpec> {
    (arb_lanes(), prop::collection::vec(arb_elem_spec(), 0..4), any::<bool>(), any::<bool>())
        .prop_map(|(lanes, ops, reduce, via_alloc)| StageSpec { lanes, ops, reduce, via_alloc })
}

pub fn arb_pipeline_spec() -> impl Strategy<Value = PipelineSpec> {
    (ElemType::float_generator(), prop::collection::vec(arb_stage(), 1..5))
        .prop_map(|(elem, stages)| PipelineSpec { elem, stages })
}

/// A freshly built, unanalyzed pipeline.
pub fn arb_pipeline() -> impl Strategy<Value = IRFunction> {
    arb_pipeline_spec().prop_map(|spec| spec.build().expect("stage nodes always nest under loops"))
}
