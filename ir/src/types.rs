//! Fundamental IR value types.

use derive_more::Display;
use simdgen_dtype::ElemType;
use snafu::ensure;

use crate::error::{InvalidLoopRangeSnafu, Result};

/// Index of a node inside its function's arena.
///
/// Ids are assigned monotonically in creation order, so comparing two ids compares
/// program order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("%{_0}")]
pub struct NodeId(pub usize);

impl NodeId {
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Sequential fusion group id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("g{_0}")]
pub struct GroupId(pub usize);

/// Iteration space of a loop or of a node nested in one.
///
/// Bounds are C expressions (`"0"`, `"size"`, `"lanes"`). The identifier `lanes` is
/// resolved by the emitter to the target's lane count.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoopRange {
    pub loop_var: String,
    pub start: String,
    pub end: String,
    pub step: String,
    pub is_vectorized: bool,
    pub vector_lanes: usize,
}

impl LoopRange {
    /// A vectorized range `[start, end)` stepping by `lanes`.
    pub fn vectorized(loop_var: impl Into<String>, end: impl Into<String>, vector_lanes: usize) -> Self {
        Self {
            loop_var: loop_var.into(),
            start: "0".to_string(),
            end: end.into(),
            step: "lanes".to_string(),
            is_vectorized: true,
            vector_lanes,
        }
    }

    /// A scalar range `[start, end)` stepping by one.
    pub fn scalar(loop_var: impl Into<String>, start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            loop_var: loop_var.into(),
            start: start.into(),
            end: end.into(),
            step: "1".to_string(),
            is_vectorized: false,
            vector_lanes: 1,
        }
    }

    /// Two ranges describe the same iteration space if everything but the variable name matches.
    pub fn same(&self, other: &LoopRange) -> bool {
        self.start == other.start
            && self.end == other.end
            && self.step == other.step
            && self.is_vectorized == other.is_vectorized
            && self.vector_lanes == other.vector_lanes
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.loop_var.is_empty(), InvalidLoopRangeSnafu { reason: "empty loop variable" });
        ensure!(!self.end.is_empty(), InvalidLoopRangeSnafu { reason: format!("loop over {} has no end bound", self.loop_var) });
        ensure!(
            !self.is_vectorized || self.vector_lanes > 0,
            InvalidLoopRangeSnafu { reason: format!("vectorized loop over {} has zero lanes", self.loop_var) }
        );
        Ok(())
    }
}

/// Range compatibility for fusion: both absent, or both present and the same.
pub fn ranges_compatible(a: Option<&LoopRange>, b: Option<&LoopRange>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.same(b),
        _ => false,
    }
}

/// How a kernel parameter is passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// Contiguous buffer of elements.
    Slice(ElemType),
    /// Scalar integer (trip counts, sizes).
    Int,
    /// Scalar of the given element type.
    Scalar(ElemType),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IRParam {
    pub name: String,
    pub kind: ParamKind,
}

impl IRParam {
    pub fn slice(name: impl Into<String>, elem: ElemType) -> Self {
        Self { name: name.into(), kind: ParamKind::Slice(elem) }
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: ParamKind::Int }
    }

    pub fn scalar(name: impl Into<String>, elem: ElemType) -> Self {
        Self { name: name.into(), kind: ParamKind::Scalar(elem) }
    }

    pub fn is_slice(&self) -> bool {
        matches!(self.kind, ParamKind::Slice(_))
    }
}
