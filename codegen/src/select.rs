//! Profile-driven instruction selection.
//!
//! A [`Selector`] lowers one abstract [`VecOp`] application at a time to a C expression,
//! applying the target's calling conventions:
//!
//! - predicated targets get `pg` prepended to every predicated call,
//! - `MulAdd` and `IfThenElse` operands are reordered per [`FmaArgOrder`],
//! - binary arithmetic without an intrinsic falls back to the C infix operator,
//! - transcendentals go through `_v_<fn>_<suffix>` helpers, promoted to f32 when the
//!   profile computes math in f32.
//!
//! Every `_v_*`/`_s_*` helper referenced along the way is recorded, so the caller can
//! declare it.

use std::collections::BTreeSet;

use enumset::{EnumSet, enum_set};
use tracing::warn;

use simdgen_dtype::ElemType;
use simdgen_ir::{OpCategory, VecOp};

use crate::emit::{Unsupported, call, group, is_template};
use crate::profile::{FmaArgOrder, Profile, Promotion, Tier, TierSpec};
use crate::promote;

pub type Lowered = Result<String, Unsupported>;

/// Ops whose intrinsics take the governing predicate as first argument.
const PREDICATED: EnumSet<VecOp> = enum_set!(
    VecOp::Load
        | VecOp::Store
        | VecOp::Add
        | VecOp::Sub
        | VecOp::Mul
        | VecOp::Div
        | VecOp::Neg
        | VecOp::Abs
        | VecOp::Min
        | VecOp::Max
        | VecOp::MulAdd
        | VecOp::Sqrt
        | VecOp::RSqrt
        | VecOp::And
        | VecOp::Or
        | VecOp::Xor
        | VecOp::ReduceSum
        | VecOp::ReduceMin
        | VecOp::ReduceMax
        | VecOp::LessThan
        | VecOp::Equal
        | VecOp::GreaterThan
        | VecOp::GreaterEqual
        | VecOp::MaskAnd
        | VecOp::MaskOr
        | VecOp::MaskAndNot
);

/// Name of the predicate variable declared at the top of predicated functions.
pub const PREDICATE_VAR: &str = "pg";

pub struct Selector<'p> {
    profile: &'p Profile,
    tier: Tier,
    helpers: BTreeSet<String>,
}

impl<'p> Selector<'p> {
    /// Selector for the profile's primary tier.
    pub fn new(profile: &'p Profile) -> Self {
        Self { profile, tier: profile.primary().tier, helpers: BTreeSet::new() }
    }

    /// Selector for a narrower tier, if the profile has one.
    pub fn at_tier(profile: &'p Profile, tier: Tier) -> Option<Self> {
        profile.tier(tier).map(|_| Self { profile, tier, helpers: BTreeSet::new() })
    }

    pub fn profile(&self) -> &'p Profile {
        self.profile
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn spec(&self) -> &'p TierSpec {
        self.profile.tier(self.tier).unwrap_or_else(|| self.profile.primary())
    }

    pub fn vec_type(&self) -> &'static str {
        self.spec().vec_type
    }

    pub fn mask_type(&self) -> &'static str {
        self.spec().mask_type
    }

    /// Math helpers referenced so far, sorted.
    pub fn helpers(&self) -> &BTreeSet<String> {
        &self.helpers
    }

    pub fn into_helpers(self) -> BTreeSet<String> {
        self.helpers
    }

    pub(crate) fn record_helper(&mut self, entry: &str) {
        let name = entry.split('(').next().unwrap_or(entry).trim();
        if name.starts_with("_v_") || name.starts_with("_s_") {
            self.helpers.insert(name.to_string());
        }
    }

    fn missing(&self, op: VecOp) -> Unsupported {
        Unsupported(format!("{op} on {} {} ({} tier)", self.profile.target, self.profile.elem, self.tier))
    }

    fn entry(&mut self, op: VecOp) -> Result<&'static str, Unsupported> {
        let entry = self.profile.intrinsic(op, self.tier).ok_or_else(|| self.missing(op))?;
        self.record_helper(entry);
        Ok(entry)
    }

    /// Apply an intrinsic entry, threading the predicate where the op takes one.
    fn invoke(&self, op: VecOp, entry: &str, mut args: Vec<String>) -> String {
        if self.profile.needs_predicate() && PREDICATED.contains(op) && !is_template(entry) {
            args.insert(0, PREDICATE_VAR.to_string());
        }
        call(entry, &args)
    }

    fn lower(&mut self, op: VecOp, args: Vec<String>) -> Lowered {
        let entry = self.entry(op)?;
        Ok(self.invoke(op, entry, args))
    }

    // ===== Memory =====

    /// Address expression `base + offset`, with the profile's pointer cast applied.
    pub fn address(&self, base: &str, offset: &str) -> String {
        let addr = if offset == "0" { base.to_string() } else { format!("{base} + {offset}") };
        match self.profile.cast_expr {
            Some(cast) if offset == "0" => format!("{cast}{addr}"),
            Some(cast) => format!("{cast}({addr})"),
            None => addr,
        }
    }

    pub fn load(&mut self, addr: &str) -> Lowered {
        self.lower(VecOp::Load, vec![addr.to_string()])
    }

    pub fn store(&mut self, addr: &str, value: &str) -> Lowered {
        self.lower(VecOp::Store, vec![addr.to_string(), value.to_string()])
    }

    pub fn dup(&mut self, scalar: &str) -> Lowered {
        self.lower(VecOp::Set, vec![scalar.to_string()])
    }

    pub fn zero(&mut self) -> Lowered {
        match self.profile.intrinsic(VecOp::Zero, self.tier) {
            Some(entry) => Ok(call(entry, &[])),
            None => self.dup(self.profile.elem.c_zero()),
        }
    }

    pub fn get_lane(&mut self, v: &str, lane: &str) -> Lowered {
        self.lower(VecOp::GetLane, vec![v.to_string(), lane.to_string()])
    }

    // ===== Arithmetic =====

    pub fn unary(&mut self, op: VecOp, a: &str) -> Lowered {
        if op.category() == OpCategory::Math {
            return self.math(op, &[a.to_string()]);
        }
        self.lower(op, vec![a.to_string()])
    }

    /// Binary op, falling back to the C infix operator when the profile has no intrinsic.
    pub fn binary(&mut self, op: VecOp, a: &str, b: &str) -> Lowered {
        if op.category() == OpCategory::Math {
            return self.math(op, &[a.to_string(), b.to_string()]);
        }
        match self.profile.intrinsic(op, self.tier) {
            Some(entry) => {
                self.record_helper(entry);
                Ok(self.invoke(op, entry, vec![a.to_string(), b.to_string()]))
            }
            None => match op.c_operator() {
                Some(sym) => {
                    warn!(%op, target = %self.profile.target, elem = %self.profile.elem, "no intrinsic, using C operator");
                    Ok(format!("({a}) {sym} ({b})"))
                }
                None => Err(self.missing(op)),
            },
        }
    }

    /// `a * b + acc`, in the target's operand order. Composed from Mul and Add when the
    /// profile has no fused multiply-add.
    pub fn mul_add(&mut self, a: &str, b: &str, acc: &str) -> Lowered {
        let Some(entry) = self.profile.intrinsic(VecOp::MulAdd, self.tier) else {
            let product = self.binary(VecOp::Mul, a, b)?;
            return self.binary(VecOp::Add, &product, acc);
        };
        let args = match self.profile.fma_arg_order {
            FmaArgOrder::AccFirst => vec![acc.to_string(), a.to_string(), b.to_string()],
            FmaArgOrder::AccLast => vec![a.to_string(), b.to_string(), acc.to_string()],
        };
        Ok(self.invoke(VecOp::MulAdd, entry, args))
    }

    // ===== Masks and selection =====

    pub fn compare(&mut self, op: VecOp, a: &str, b: &str) -> Lowered {
        self.lower(op, vec![a.to_string(), b.to_string()])
    }

    /// `mask ? yes : no` per lane. Select shares the FMA operand convention.
    pub fn if_then_else(&mut self, mask: &str, yes: &str, no: &str) -> Lowered {
        let args = match self.profile.fma_arg_order {
            FmaArgOrder::AccFirst => vec![mask.to_string(), yes.to_string(), no.to_string()],
            FmaArgOrder::AccLast => vec![no.to_string(), yes.to_string(), mask.to_string()],
        };
        self.lower(VecOp::IfThenElse, args)
    }

    /// `max(min(v, hi), lo)`.
    pub fn clamp(&mut self, v: &str, lo: &str, hi: &str) -> Lowered {
        let upper = self.binary(VecOp::Min, v, hi)?;
        self.binary(VecOp::Max, &upper, lo)
    }

    // ===== Reductions and dot products =====

    pub fn reduce(&mut self, op: VecOp, v: &str) -> Lowered {
        self.lower(op, vec![v.to_string()])
    }

    /// `acc += dot(a, b)` into the wider accumulator. Always `(acc, a, b)`.
    pub fn dot_accumulate(&mut self, a: &str, b: &str, acc: &str) -> Lowered {
        self.lower(VecOp::DotAccumulate, vec![acc.to_string(), a.to_string(), b.to_string()])
    }

    // ===== Math helpers =====

    /// Vector transcendental through `_v_<fn>_<suffix>`, promoted when the profile
    /// computes math in f32.
    pub fn math(&mut self, op: VecOp, args: &[String]) -> Lowered {
        let name = op.math_name().ok_or_else(|| Unsupported(format!("{op} is not a math function")))?;
        let helper = format!("_v_{name}_{}", self.profile.math_suffix);
        self.record_helper(&helper);

        if !self.profile.is_promoted() {
            return Ok(call(&helper, args));
        }
        promote::map_promoted(self.profile, args, |halves| call(&helper, halves))
    }

    /// Scalar transcendental for tail loops. `x` is an element in storage form.
    pub fn scalar_math(&mut self, op: VecOp, args: &[String]) -> Lowered {
        let name = op.math_name().ok_or_else(|| Unsupported(format!("{op} is not a math function")))?;
        let helper = format!("_s_{name}_{}", self.profile.scalar_math_suffix());
        self.record_helper(&helper);
        Ok(call(&helper, args))
    }

    // ===== Scalar forms =====

    /// One element of `op` in the scalar arithmetic type, for tail loops and scalar code.
    /// Compound operands are parenthesized.
    pub fn scalar(&mut self, op: VecOp, args: &[String]) -> Lowered {
        if args.len() != op.arity() {
            return Err(Unsupported(format!("{op} takes {} operands, got {}", op.arity(), args.len())));
        }
        let a = |i: usize| group(&args[i]);
        let float = self.profile.elem.is_float();
        let sqrt = if self.profile.elem == ElemType::Float64 { "sqrt" } else { "sqrtf" };

        Ok(match op {
            VecOp::And | VecOp::Or | VecOp::Xor if float => {
                return Err(Unsupported(format!("scalar {op} on {}", self.profile.elem)));
            }
            VecOp::Add | VecOp::Sub | VecOp::Mul | VecOp::Div | VecOp::And | VecOp::Or | VecOp::Xor => {
                let sym = op.c_operator().unwrap_or("+");
                format!("{} {sym} {}", a(0), a(1))
            }
            VecOp::Neg => format!("-{}", a(0)),
            VecOp::Abs => format!("{0} < 0 ? -{0} : {0}", a(0)),
            VecOp::Min => format!("{0} < {1} ? {0} : {1}", a(0), a(1)),
            VecOp::Max => format!("{0} > {1} ? {0} : {1}", a(0), a(1)),
            VecOp::MulAdd => format!("{} * {} + {}", a(0), a(1), a(2)),
            VecOp::Sqrt => format!("{sqrt}({})", args[0]),
            VecOp::RSqrt => format!("1.0f / {sqrt}({})", args[0]),
            VecOp::LessThan => format!("{} < {}", a(0), a(1)),
            VecOp::Equal => format!("{} == {}", a(0), a(1)),
            VecOp::GreaterThan => format!("{} > {}", a(0), a(1)),
            VecOp::GreaterEqual => format!("{} >= {}", a(0), a(1)),
            VecOp::IfThenElse => format!("{} ? {} : {}", a(0), a(1), a(2)),
            VecOp::Clamp => {
                let (v, lo, hi) = (a(0), a(1), a(2));
                let upper = format!("({v} < {hi} ? {v} : {hi})");
                format!("{upper} > {lo} ? {upper} : {lo}")
            }
            VecOp::MaskAnd => format!("{} && {}", a(0), a(1)),
            VecOp::MaskOr => format!("{} || {}", a(0), a(1)),
            VecOp::MaskAndNot => format!("{} && !{}", a(0), a(1)),
            VecOp::Set => args[0].clone(),
            VecOp::Zero => if float { "0.0f" } else { "0" }.to_string(),
            _ if op.category() == OpCategory::Math => self.scalar_math(op, args)?,
            other => return Err(Unsupported(format!("{other} has no scalar form"))),
        })
    }

    // ===== Dispatch =====

    /// Lower any non-tile op from its operands in abstract order.
    ///
    /// `Store` takes `(address, value)` and yields a statement; `Load` takes an address.
    pub fn apply(&mut self, op: VecOp, args: &[String]) -> Lowered {
        if args.len() != op.arity() {
            return Err(Unsupported(format!("{op} takes {} operands, got {}", op.arity(), args.len())));
        }
        let a = |i: usize| args[i].as_str();
        match op.category() {
            OpCategory::Memory => match op {
                VecOp::Load => self.load(a(0)),
                VecOp::Store => self.store(a(0), a(1)),
                VecOp::Set => self.dup(a(0)),
                VecOp::Zero => self.zero(),
                _ => self.get_lane(a(0), a(1)),
            },
            OpCategory::Arith | OpCategory::Bitwise => match op {
                VecOp::MulAdd => self.mul_add(a(0), a(1), a(2)),
                _ if op.arity() == 1 => self.unary(op, a(0)),
                _ => self.binary(op, a(0), a(1)),
            },
            OpCategory::Math => self.math(op, args),
            OpCategory::Compare => self.compare(op, a(0), a(1)),
            OpCategory::Select => match op {
                VecOp::IfThenElse => self.if_then_else(a(0), a(1), a(2)),
                _ => self.clamp(a(0), a(1), a(2)),
            },
            OpCategory::Mask | OpCategory::Shuffle => self.lower(op, args.to_vec()),
            OpCategory::Reduce => self.reduce(op, a(0)),
            OpCategory::Dot => self.dot_accumulate(a(0), a(1), a(2)),
            OpCategory::Convert => match op {
                VecOp::PromoteSplit => promote::split(self.profile, a(0)).map(|(lo, _)| lo),
                _ => promote::demote_combine(self.profile, a(0), a(1)),
            },
            OpCategory::Tile => Err(Unsupported(format!("{op} needs a tile operand"))),
        }
    }
}

/// Whether `op` lowers on the profile's primary tier without an unsupported marker.
pub fn supports(profile: &Profile, op: VecOp) -> bool {
    let tier = profile.primary().tier;
    let has = |op: VecOp| profile.intrinsic(op, tier).is_some();
    match op.category() {
        OpCategory::Math => profile.elem.is_float(),
        OpCategory::Tile => {
            matches!(profile.elem, ElemType::Float32 | ElemType::Float64)
                && !profile.primary().is_dynamic()
                && (op != VecOp::LoadCol || profile.lane_ops.is_some() || !profile.needs_predicate())
        }
        OpCategory::Convert => matches!(profile.promotion, Some(Promotion::Split { .. })),
        _ => match op {
            VecOp::Zero => has(VecOp::Zero) || has(VecOp::Set),
            VecOp::MulAdd => has(VecOp::MulAdd) || (supports(profile, VecOp::Mul) && supports(profile, VecOp::Add)),
            VecOp::Clamp => has(VecOp::Min) && has(VecOp::Max),
            _ => has(op) || op.c_operator().is_some(),
        },
    }
}
