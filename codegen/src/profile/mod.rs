//! Per-(target, element type) intrinsic profiles.
//!
//! A [`Profile`] is static data: which intrinsic implements each [`VecOp`] at each
//! register [`Tier`], how the target orders FMA and select operands, whether every call
//! threads a predicate, and how reduced-precision elements are promoted for math.
//!
//! Intrinsic entries are either a plain function name, called as `name(args...)`, or a
//! template with positional `{0}`, `{1}`, ... placeholders for sequences that are not a
//! single call (`_mm256_cmp_ps({0}, {1}, _CMP_LT_OQ)`).

mod helpers;
mod neon;
mod sve;
mod table;
mod x86;

use std::collections::{HashMap, HashSet};

use bon::Builder;
use itertools::Itertools;
use snafu::ensure;

use simdgen_dtype::ElemType;
use simdgen_ir::VecOp;

use crate::emit::identifiers;
use crate::error::{IncompleteProfileSnafu, Result};

pub use table::{ProfileTable, profile};

// ============================================================================
// Targets and tiers
// ============================================================================

/// Instruction set a kernel is generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::Display, strum::EnumString, strum::EnumIter, strum::AsRefStr)]
pub enum Target {
    #[strum(serialize = "NEON")]
    Neon,
    #[strum(serialize = "AVX2")]
    Avx2,
    #[strum(serialize = "AVX512")]
    Avx512,
    /// SVE executed in streaming mode on Apple silicon; fixed 512-bit vectors.
    #[strum(serialize = "SVE_DARWIN")]
    SveDarwin,
    /// SVE with the vector length queried at runtime.
    #[strum(serialize = "SVE_LINUX")]
    SveLinux,
}

impl Target {
    /// Lowercase form used in generated function names.
    pub fn lower(&self) -> String {
        self.as_ref().to_lowercase()
    }
}

/// Register width class an intrinsic operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Tier {
    /// 128-bit NEON.
    Q,
    /// 64-bit NEON.
    D,
    Xmm,
    Ymm,
    Zmm,
    Sve,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierSpec {
    pub tier: Tier,
    pub lanes: usize,
    /// Runtime lane count expression, when the width is not known statically.
    pub dynamic_lanes: Option<&'static str>,
    pub vec_type: &'static str,
    /// Type of comparison results.
    pub mask_type: &'static str,
}

impl TierSpec {
    pub const fn fixed(tier: Tier, lanes: usize, vec_type: &'static str, mask_type: &'static str) -> Self {
        Self { tier, lanes, dynamic_lanes: None, vec_type, mask_type }
    }

    pub const fn dynamic(tier: Tier, lanes: &'static str, vec_type: &'static str, mask_type: &'static str) -> Self {
        Self { tier, lanes: 0, dynamic_lanes: Some(lanes), vec_type, mask_type }
    }

    /// C expression for the lane count.
    pub fn lanes_expr(&self) -> String {
        self.dynamic_lanes.map_or_else(|| self.lanes.to_string(), str::to_string)
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic_lanes.is_some()
    }
}

// ============================================================================
// Calling conventions
// ============================================================================

/// Operand order of the FMA intrinsic (and, by the same convention, of select).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FmaArgOrder {
    /// `fma(acc, a, b)`, `select(mask, yes, no)`.
    AccFirst,
    /// `fma(a, b, acc)`, `select(no, yes, mask)`.
    AccLast,
}

/// Governing predicate threaded through every predicated call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Predicate {
    /// Initializer of the all-true predicate `pg`.
    pub all_true: &'static str,
    /// `whilelt` constructor used for lane addressing.
    pub while_lt: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum MathStrategy {
    /// Math helpers run on the element type directly.
    Native,
    /// Math helpers run on f32 after promotion.
    Promoted,
}

/// How a reduced-precision vector is widened to f32 and narrowed back.
///
/// All fields are call templates taking the operand(s) as `{0}`/`{1}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Promotion {
    /// One narrow vector becomes two f32 halves.
    Split {
        lo: &'static str,
        hi: &'static str,
        /// f32 half back to a narrow half.
        demote: &'static str,
        /// Two narrow halves into one narrow vector.
        combine: &'static str,
        promoted_vec_type: &'static str,
    },
    /// One narrow vector becomes one f32 vector.
    Whole { promote: &'static str, demote: &'static str, promoted_vec_type: &'static str },
}

impl Promotion {
    pub fn promoted_vec_type(&self) -> &'static str {
        match self {
            Self::Split { promoted_vec_type, .. } | Self::Whole { promoted_vec_type, .. } => promoted_vec_type,
        }
    }
}

/// Scalar conversions for the tail loop, as call templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalarPromotion {
    pub promote: &'static str,
    pub demote: &'static str,
}

/// Widened-accumulator metadata: accumulators stay in f32 halves across a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WidenedAcc {
    pub acc_type: &'static str,
    pub zero: &'static str,
    pub fma_fn: &'static str,
    pub add_fn: &'static str,
}

/// Wider accumulator targeted by `DotAccumulate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DotAcc {
    pub acc_type: &'static str,
    pub zero: &'static str,
    /// Horizontal sum of the accumulator, as a call template.
    pub reduce: &'static str,
}

/// Lane-indexed hardware ops used for tile expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneOps {
    /// `fma_lane(acc, a, b, lane)`: `acc + a * b[lane]`.
    pub fma_lane: &'static str,
    /// `mul_lane(a, b, lane)`: `a * b[lane]`.
    pub mul_lane: &'static str,
    /// `set_lane(x, v, lane)`.
    pub set_lane: &'static str,
}

/// C definition of a non-intrinsic name the profile's entries call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InlineHelper {
    pub name: &'static str,
    /// A `static inline` function or a `#define`.
    pub definition: &'static str,
}

// ============================================================================
// Profile
// ============================================================================

/// Everything the selector needs to know about one (target, element type) pair.
#[derive(Debug, Clone, Builder)]
pub struct Profile {
    pub target: Target,
    pub elem: ElemType,
    pub include: &'static str,
    /// Element type in pointer signatures.
    pub c_type: &'static str,
    /// Arithmetic type of the scalar tail.
    pub scalar_type: &'static str,
    /// Widest first; the first entry is the primary tier.
    pub tiers: Vec<TierSpec>,
    #[builder(default)]
    pub intrinsics: HashMap<(VecOp, Tier), &'static str>,
    pub fma_arg_order: FmaArgOrder,
    /// Pointer cast applied to load/store addresses, e.g. `(float16_t*)`.
    pub cast_expr: Option<&'static str>,
    pub predicate: Option<Predicate>,
    #[builder(default = MathStrategy::Native)]
    pub math: MathStrategy,
    /// Suffix of vector math helpers: `_v_exp_<suffix>`.
    pub math_suffix: &'static str,
    pub promotion: Option<Promotion>,
    pub scalar_promotion: Option<ScalarPromotion>,
    pub widened: Option<WidenedAcc>,
    pub dot_acc: Option<DotAcc>,
    pub lane_ops: Option<LaneOps>,
    /// Appended after the parameter list of generated functions.
    pub func_attrs: Option<&'static str>,
    /// Definitions emitted ahead of any function that uses them. A helper only calls
    /// helpers listed before it.
    #[builder(default)]
    pub inline_helpers: Vec<InlineHelper>,
}

impl Profile {
    pub fn primary(&self) -> &TierSpec {
        &self.tiers[0]
    }

    pub fn tier(&self, tier: Tier) -> Option<&TierSpec> {
        self.tiers.iter().find(|t| t.tier == tier)
    }

    pub fn intrinsic(&self, op: VecOp, tier: Tier) -> Option<&'static str> {
        self.intrinsics.get(&(op, tier)).copied()
    }

    pub fn needs_predicate(&self) -> bool {
        self.predicate.is_some()
    }

    pub fn is_promoted(&self) -> bool {
        self.math == MathStrategy::Promoted
    }

    /// Suffix of scalar math helpers: `_s_exp_<suffix>`.
    pub fn scalar_math_suffix(&self) -> &'static str {
        if self.scalar_promotion.is_some() { "f32" } else { self.elem.suffix() }
    }

    /// Inline helpers `code` calls, directly or through other helpers, in table order.
    pub fn inline_helpers_for(&self, code: &str) -> Vec<&InlineHelper> {
        let mut used: HashSet<&str> = identifiers(code).collect();
        for helper in self.inline_helpers.iter().rev() {
            if used.contains(helper.name) {
                used.extend(identifiers(helper.definition));
            }
        }
        self.inline_helpers.iter().filter(|h| used.contains(h.name)).collect()
    }

    /// Check that the profile can lower the operations every kernel relies on.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.tiers.is_empty(),
            IncompleteProfileSnafu { target: self.target, elem: self.elem, missing: "tiers" }
        );

        let tier = self.primary().tier;
        let mut required = vec![VecOp::Load, VecOp::Store, VecOp::Set];
        if self.elem.is_float() {
            required.extend([VecOp::Add, VecOp::Sub, VecOp::Mul, VecOp::Div, VecOp::MulAdd, VecOp::ReduceSum]);
        }

        let mut missing = required
            .into_iter()
            .filter(|&op| self.intrinsic(op, tier).is_none())
            .map(|op| format!("{op}@{tier}"))
            .collect_vec();

        if self.is_promoted() && self.promotion.is_none() {
            missing.push("promotion".to_string());
        }
        if self.widened.is_some() && !matches!(self.promotion, Some(Promotion::Split { .. })) {
            missing.push("split promotion for widened accumulators".to_string());
        }
        if self.intrinsic(VecOp::DotAccumulate, tier).is_some() && self.dot_acc.is_none() {
            missing.push("dot accumulator".to_string());
        }
        if self.elem.is_reduced_precision() && self.scalar_promotion.is_none() {
            missing.push("scalar promotion".to_string());
        }

        ensure!(
            missing.is_empty(),
            IncompleteProfileSnafu { target: self.target, elem: self.elem, missing: missing.join(", ") }
        );
        Ok(())
    }
}

/// Collect `(op, tier) -> intrinsic` entries for one tier.
pub(crate) fn tier_table<'a>(
    tier: Tier,
    entries: &'a [(VecOp, &'static str)],
) -> impl Iterator<Item = ((VecOp, Tier), &'static str)> + 'a {
    entries.iter().map(move |&(op, name)| ((op, tier), name))
}
