//! Node kinds and abstract vector operations.
//!
//! [`VecOp`] is the closed vocabulary of leaf operations a kernel body may call. Both the
//! fused-IR path and the direct statement path select intrinsics from it, so every
//! operation the backend understands appears here exactly once.

use derive_more::Display;

/// Structural kind of an IR node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::Display, strum::AsRefStr, strum::EnumIter)]
pub enum OpKind {
    Load,
    Store,
    Elementwise,
    Reduction,
    Broadcast,
    Loop,
    Alloc,
}

impl OpKind {
    /// Kinds whose nodes may own nested children.
    pub const fn is_container(&self) -> bool {
        matches!(self, Self::Loop | Self::Alloc)
    }
}

/// Coarse grouping of [`VecOp`]s, used by the selector to pick a lowering strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCategory {
    Memory,
    Arith,
    Bitwise,
    Math,
    Compare,
    Select,
    Mask,
    Reduce,
    Shuffle,
    Convert,
    Dot,
    Tile,
}

/// Abstract vector operations.
///
/// Names match the frontend vocabulary (`"Add"`, `"MulAdd"`, `"ReduceSum"`, ...) and
/// round-trip through [`std::str::FromStr`].
#[derive(Debug, Hash, PartialOrd, Ord)]
#[derive(strum::Display, strum::EnumString, strum::AsRefStr, strum::IntoStaticStr, strum::EnumIter)]
#[derive(enumset::EnumSetType)]
pub enum VecOp {
    // Memory
    Load,
    Store,
    Set,
    Zero,
    GetLane,

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Neg,
    Abs,
    Min,
    Max,
    MulAdd,
    Sqrt,
    RSqrt,

    // Bitwise
    And,
    Or,
    Xor,

    // Transcendentals, lowered through math helpers
    Exp,
    Log,
    Sigmoid,
    Tanh,
    Erf,
    Sin,
    Cos,
    Pow,

    // Comparison (produce masks)
    LessThan,
    Equal,
    GreaterThan,
    GreaterEqual,

    // Selection
    IfThenElse,
    Clamp,

    // Mask logic
    MaskAnd,
    MaskOr,
    MaskAndNot,

    // Horizontal reductions
    ReduceSum,
    ReduceMin,
    ReduceMax,

    // Shuffles
    InterleaveLower,
    InterleaveUpper,

    // Precision conversion
    PromoteSplit,
    DemoteCombine,

    // Dot-product accumulation into a wider accumulator
    DotAccumulate,

    // Tile / outer product
    TileZero,
    OuterProductAdd,
    OuterProductSub,
    StoreRow,
    ReadRow,
    LoadCol,
}

impl VecOp {
    pub const fn category(&self) -> OpCategory {
        use VecOp::*;
        match self {
            Load | Store | Set | Zero | GetLane => OpCategory::Memory,
            Add | Sub | Mul | Div | Neg | Abs | Min | Max | MulAdd | Sqrt | RSqrt => OpCategory::Arith,
            And | Or | Xor => OpCategory::Bitwise,
            Exp | Log | Sigmoid | Tanh | Erf | Sin | Cos | Pow => OpCategory::Math,
            LessThan | Equal | GreaterThan | GreaterEqual => OpCategory::Compare,
            IfThenElse | Clamp => OpCategory::Select,
            MaskAnd | MaskOr | MaskAndNot => OpCategory::Mask,
            ReduceSum | ReduceMin | ReduceMax => OpCategory::Reduce,
            InterleaveLower | InterleaveUpper => OpCategory::Shuffle,
            PromoteSplit | DemoteCombine => OpCategory::Convert,
            DotAccumulate => OpCategory::Dot,
            TileZero | OuterProductAdd | OuterProductSub | StoreRow | ReadRow | LoadCol => OpCategory::Tile,
        }
    }

    /// C infix operator with the same lane-wise semantics, if one exists.
    ///
    /// Used as the selector's fallback when a profile lacks an intrinsic.
    pub const fn c_operator(&self) -> Option<&'static str> {
        match self {
            Self::Add => Some("+"),
            Self::Sub => Some("-"),
            Self::Mul => Some("*"),
            Self::Div => Some("/"),
            Self::And => Some("&"),
            Self::Or => Some("|"),
            Self::Xor => Some("^"),
            _ => None,
        }
    }

    /// Base name of the math helper implementing this op (`exp` → `_v_exp_f32`).
    pub const fn math_name(&self) -> Option<&'static str> {
        match self {
            Self::Exp => Some("exp"),
            Self::Log => Some("log"),
            Self::Sigmoid => Some("sigmoid"),
            Self::Tanh => Some("tanh"),
            Self::Erf => Some("erf"),
            Self::Sin => Some("sin"),
            Self::Cos => Some("cos"),
            Self::Pow => Some("pow"),
            _ => None,
        }
    }

    /// Number of vector operands the op takes.
    pub const fn arity(&self) -> usize {
        use VecOp::*;
        match self {
            Zero | TileZero => 0,
            Load | Set | Neg | Abs | Sqrt | RSqrt | Exp | Log | Sigmoid | Tanh | Erf | Sin | Cos | ReduceSum
            | ReduceMin | ReduceMax | PromoteSplit => 1,
            Store | GetLane | Add | Sub | Mul | Div | Min | Max | And | Or | Xor | Pow | LessThan | Equal
            | GreaterThan | GreaterEqual | MaskAnd | MaskOr | MaskAndNot | InterleaveLower | InterleaveUpper
            | DemoteCombine | ReadRow => 2,
            MulAdd | IfThenElse | Clamp | DotAccumulate | OuterProductAdd | OuterProductSub | StoreRow | LoadCol => 3,
        }
    }

    /// Ops that yield a scalar rather than a vector.
    pub const fn is_horizontal(&self) -> bool {
        matches!(self, Self::ReduceSum | Self::ReduceMin | Self::ReduceMax | Self::GetLane)
    }
}

/// The operation a node performs.
///
/// Loops and allocations carry structural ops; everything else carries a [`VecOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum NodeOp {
    #[display("{_0}")]
    Vector(VecOp),
    #[display("for")]
    For,
    #[display("make")]
    Make,
}

impl NodeOp {
    pub fn vec_op(&self) -> Option<VecOp> {
        match self {
            Self::Vector(op) => Some(*op),
            Self::For | Self::Make => None,
        }
    }
}

impl From<VecOp> for NodeOp {
    fn from(op: VecOp) -> Self {
        Self::Vector(op)
    }
}
