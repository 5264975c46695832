//! Intermediate Representation (IR) for vectorized dataflow kernels.
//!
//! This crate defines the node graph a kernel is lowered into before emission,
//! and the passes that run over it.
//!
//! # Module Organization
//!
//! - [`op`] - Node kinds and the closed vocabulary of abstract vector operations
//! - [`types`] - Node ids, loop ranges, function parameters
//! - [`function`] - The node arena ([`IRFunction`]) and its builder API
//! - [`analysis`] - Producer/consumer edge analysis
//! - [`fusion`] - Rule-based fusion engine and cross-loop allocation elimination
//! - [`stats`] - Pass counting for fusion diagnostics
//! - [`kernels`] - Canonical kernels (softmax, exp+sum) built through the builder API
//! - [`error`] - Error types and result handling

pub mod analysis;
pub mod error;
pub mod function;
pub mod fusion;
pub mod kernels;
pub mod op;
pub mod stats;
pub mod types;

#[cfg(any(test, feature = "proptest"))]
pub mod test;

pub use analysis::analyze;
pub use error::{Error, Result};
pub use function::{IRFunction, IRNode, NodeBuilder};
pub use fusion::{FusionGroup, FusionRule, apply_fusion_rules, eliminate_allocations};
pub use op::{NodeOp, OpCategory, OpKind, VecOp};
pub use stats::{FusionStats, compute_fusion_stats};
pub use types::{GroupId, IRParam, LoopRange, NodeId, ParamKind, ranges_compatible};

pub use simdgen_dtype::ElemType;
