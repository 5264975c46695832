//! Reduced-precision promotion.
//!
//! Promoted profiles (NEON f16/bf16, AVX-512 bf16) run math helpers in f32: the narrow
//! vector is promoted (split into two f32 halves, or widened whole), the helper runs on
//! each part, and the results are demoted and recombined. Scalar tails do the same one
//! element at a time.
//!
//! [`WidenedAccumulator`] keeps a running sum as an f32 `(lo, hi)` pair across a loop, so
//! partial sums never round through the narrow type.

use simdgen_ir::VecOp;

use crate::emit::{Emit, Unsupported, call};
use crate::profile::{FmaArgOrder, Profile, Promotion, WidenedAcc};
use crate::select::Lowered;

/// A vector in promoted (f32) form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Promoted {
    Split { lo: String, hi: String },
    Whole(String),
}

fn promotion(profile: &Profile) -> Result<&Promotion, Unsupported> {
    profile
        .promotion
        .as_ref()
        .ok_or_else(|| Unsupported(format!("{} {} has no promotion sequence", profile.target, profile.elem)))
}

fn arg(s: &str) -> [String; 1] {
    [s.to_string()]
}

pub fn promote(profile: &Profile, v: &str) -> Result<Promoted, Unsupported> {
    Ok(match promotion(profile)? {
        Promotion::Split { lo, hi, .. } => Promoted::Split { lo: call(lo, &arg(v)), hi: call(hi, &arg(v)) },
        Promotion::Whole { promote, .. } => Promoted::Whole(call(promote, &arg(v))),
    })
}

pub fn demote(profile: &Profile, value: Promoted) -> Lowered {
    match (promotion(profile)?, value) {
        (Promotion::Split { demote, combine, .. }, Promoted::Split { lo, hi }) => {
            Ok(call(combine, &[call(demote, &[lo]), call(demote, &[hi])]))
        }
        (Promotion::Whole { demote, .. }, Promoted::Whole(x)) => Ok(call(demote, &[x])),
        (_, value) => Err(Unsupported(format!("promoted value {value:?} does not match {} {}", profile.target, profile.elem))),
    }
}

/// The two f32 halves of a narrow vector.
pub fn split(profile: &Profile, v: &str) -> Result<(String, String), Unsupported> {
    match promote(profile, v)? {
        Promoted::Split { lo, hi } => Ok((lo, hi)),
        Promoted::Whole(_) => Err(Unsupported(format!("{} on {} {}", VecOp::PromoteSplit, profile.target, profile.elem))),
    }
}

/// Narrow two f32 halves and recombine them.
pub fn demote_combine(profile: &Profile, lo: &str, hi: &str) -> Lowered {
    match promotion(profile)? {
        Promotion::Split { .. } => demote(profile, Promoted::Split { lo: lo.to_string(), hi: hi.to_string() }),
        Promotion::Whole { .. } => {
            Err(Unsupported(format!("{} on {} {}", VecOp::DemoteCombine, profile.target, profile.elem)))
        }
    }
}

/// Promote every operand, apply `f` to each promoted part, and demote the result.
pub fn map_promoted(profile: &Profile, args: &[String], f: impl Fn(&[String]) -> String) -> Lowered {
    let promoted = args.iter().map(|a| promote(profile, a)).collect::<Result<Vec<_>, _>>()?;

    let mut los = Vec::with_capacity(promoted.len());
    let mut his = Vec::with_capacity(promoted.len());
    let mut wholes = Vec::with_capacity(promoted.len());
    for p in promoted {
        match p {
            Promoted::Split { lo, hi } => {
                los.push(lo);
                his.push(hi);
            }
            Promoted::Whole(x) => wholes.push(x),
        }
    }

    let result = if wholes.is_empty() {
        Promoted::Split { lo: f(&los), hi: f(&his) }
    } else {
        Promoted::Whole(f(&wholes))
    };
    demote(profile, result)
}

// ============================================================================
// Scalars
// ============================================================================

/// Storage element to the scalar arithmetic type. Identity for native profiles.
pub fn scalar_promote(profile: &Profile, x: &str) -> String {
    profile.scalar_promotion.map_or_else(|| x.to_string(), |sp| call(sp.promote, &arg(x)))
}

/// Scalar arithmetic type back to the storage element.
pub fn scalar_demote(profile: &Profile, x: &str) -> String {
    profile.scalar_promotion.map_or_else(|| x.to_string(), |sp| call(sp.demote, &arg(x)))
}

/// C type of scalar-tail temporaries.
pub fn scalar_temp_type(profile: &Profile) -> &'static str {
    if profile.scalar_promotion.is_some() { "float" } else { profile.scalar_type }
}

// ============================================================================
// Widened accumulators
// ============================================================================

/// An accumulator held as two f32 halves, named `<name>_lo` / `<name>_hi`.
#[derive(Debug, Clone)]
pub struct WidenedAccumulator {
    name: String,
    acc: WidenedAcc,
}

impl WidenedAccumulator {
    /// `None` when the profile accumulates in its own vector type.
    pub fn new(profile: &Profile, name: impl Into<String>) -> Option<Self> {
        profile.widened.map(|acc| Self { name: name.into(), acc })
    }

    pub fn lo(&self) -> String {
        format!("{}_lo", self.name)
    }

    pub fn hi(&self) -> String {
        format!("{}_hi", self.name)
    }

    /// Declare both halves, zeroed.
    pub fn declare(&self) -> Vec<Emit> {
        [self.lo(), self.hi()]
            .into_iter()
            .map(|half| Emit::stmt(format!("{} {half} = {}", self.acc.acc_type, self.acc.zero)))
            .collect()
    }

    /// `acc += a * b`, with both operands promoted half by half.
    pub fn mul_add(&self, profile: &Profile, a: &str, b: &str) -> Result<Vec<Emit>, Unsupported> {
        let (a_lo, a_hi) = split(profile, a)?;
        let (b_lo, b_hi) = split(profile, b)?;
        Ok([(self.lo(), a_lo, b_lo), (self.hi(), a_hi, b_hi)]
            .into_iter()
            .map(|(half, x, y)| {
                let args = match profile.fma_arg_order {
                    FmaArgOrder::AccFirst => [half.clone(), x, y],
                    FmaArgOrder::AccLast => [x, y, half.clone()],
                };
                Emit::stmt(format!("{half} = {}", call(self.acc.fma_fn, &args)))
            })
            .collect())
    }

    /// `acc += v`.
    pub fn add(&self, profile: &Profile, v: &str) -> Result<Vec<Emit>, Unsupported> {
        let (v_lo, v_hi) = split(profile, v)?;
        Ok([(self.lo(), v_lo), (self.hi(), v_hi)]
            .into_iter()
            .map(|(half, x)| Emit::stmt(format!("{half} = {}", call(self.acc.add_fn, &[half.clone(), x]))))
            .collect())
    }

    /// The halves demoted and combined into one narrow vector expression. The halves
    /// stay live, so the accumulator can keep being updated after the read.
    pub fn combined(&self, profile: &Profile) -> Lowered {
        demote_combine(profile, &self.lo(), &self.hi())
    }

    /// Demote and combine into a narrow vector named `name`. Emit once, after the loop.
    pub fn materialize(&self, profile: &Profile, name: &str) -> Result<Emit, Unsupported> {
        let value = self.combined(profile)?;
        Ok(Emit::stmt(format!("{} {name} = {value}", profile.primary().vec_type)))
    }
}
