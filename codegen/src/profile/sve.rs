//! ARM SVE profiles.
//!
//! Every SVE call except broadcasts and selects takes the governing predicate `pg`
//! first. Darwin runs SVE in streaming mode with a fixed 512-bit vector; Linux queries
//! the vector length at runtime.

use simdgen_dtype::ElemType;
use simdgen_ir::VecOp::{self, *};

use super::{FmaArgOrder, Predicate, Profile, Target, Tier, TierSpec, tier_table};

const INCLUDE: &str = "#include <arm_sve.h>";

const F32: &[(VecOp, &str)] = &[
    (Load, "svld1_f32"),
    (Store, "svst1_f32"),
    (Set, "svdup_f32"),
    (Zero, "svdup_f32(0.0f)"),
    (GetLane, "svlasta_f32(svwhilelt_b32(0, {1}), {0})"),
    (Add, "svadd_f32_x"),
    (Sub, "svsub_f32_x"),
    (Mul, "svmul_f32_x"),
    (Div, "svdiv_f32_x"),
    (MulAdd, "svmla_f32_x"),
    (Neg, "svneg_f32_x"),
    (Abs, "svabs_f32_x"),
    (Sqrt, "svsqrt_f32_x"),
    (Min, "svmin_f32_x"),
    (Max, "svmax_f32_x"),
    (ReduceSum, "svaddv_f32"),
    (ReduceMin, "svminv_f32"),
    (ReduceMax, "svmaxv_f32"),
    (InterleaveLower, "svzip1_f32"),
    (InterleaveUpper, "svzip2_f32"),
    (LessThan, "svcmplt_f32"),
    (Equal, "svcmpeq_f32"),
    (GreaterThan, "svcmpgt_f32"),
    (GreaterEqual, "svcmpge_f32"),
    (IfThenElse, "svsel_f32"),
    (MaskAnd, "svand_b_z"),
    (MaskOr, "svorr_b_z"),
    (MaskAndNot, "svbic_b_z"),
];

const F64: &[(VecOp, &str)] = &[
    (Load, "svld1_f64"),
    (Store, "svst1_f64"),
    (Set, "svdup_f64"),
    (Zero, "svdup_f64(0.0)"),
    (GetLane, "svlasta_f64(svwhilelt_b64(0, {1}), {0})"),
    (Add, "svadd_f64_x"),
    (Sub, "svsub_f64_x"),
    (Mul, "svmul_f64_x"),
    (Div, "svdiv_f64_x"),
    (MulAdd, "svmla_f64_x"),
    (Neg, "svneg_f64_x"),
    (Abs, "svabs_f64_x"),
    (Sqrt, "svsqrt_f64_x"),
    (Min, "svmin_f64_x"),
    (Max, "svmax_f64_x"),
    (ReduceSum, "svaddv_f64"),
    (ReduceMin, "svminv_f64"),
    (ReduceMax, "svmaxv_f64"),
    (InterleaveLower, "svzip1_f64"),
    (InterleaveUpper, "svzip2_f64"),
    (LessThan, "svcmplt_f64"),
    (Equal, "svcmpeq_f64"),
    (GreaterThan, "svcmpgt_f64"),
    (GreaterEqual, "svcmpge_f64"),
    (IfThenElse, "svsel_f64"),
    (MaskAnd, "svand_b_z"),
    (MaskOr, "svorr_b_z"),
    (MaskAndNot, "svbic_b_z"),
];

const B32: Predicate = Predicate { all_true: "svptrue_b32()", while_lt: "svwhilelt_b32" };
const B64: Predicate = Predicate { all_true: "svptrue_b64()", while_lt: "svwhilelt_b64" };

// Darwin only executes SVE in streaming mode.
const STREAMING: &str = "__arm_streaming";

fn sve(target: Target, elem: ElemType, tier: TierSpec, table: &[(VecOp, &'static str)], predicate: Predicate) -> Profile {
    Profile::builder()
        .target(target)
        .elem(elem)
        .include(INCLUDE)
        .c_type(elem.c_style())
        .scalar_type(elem.c_style())
        .tiers(vec![tier])
        .intrinsics(tier_table(Tier::Sve, table).collect())
        .fma_arg_order(FmaArgOrder::AccFirst)
        .predicate(predicate)
        .math_suffix(elem.suffix())
        .maybe_func_attrs((target == Target::SveDarwin).then_some(STREAMING))
        .build()
}

pub(super) fn darwin_f32() -> Profile {
    sve(Target::SveDarwin, ElemType::Float32, TierSpec::fixed(Tier::Sve, 16, "svfloat32_t", "svbool_t"), F32, B32)
}

pub(super) fn darwin_f64() -> Profile {
    sve(Target::SveDarwin, ElemType::Float64, TierSpec::fixed(Tier::Sve, 8, "svfloat64_t", "svbool_t"), F64, B64)
}

pub(super) fn linux_f32() -> Profile {
    sve(Target::SveLinux, ElemType::Float32, TierSpec::dynamic(Tier::Sve, "svcntw()", "svfloat32_t", "svbool_t"), F32, B32)
}

pub(super) fn linux_f64() -> Profile {
    sve(Target::SveLinux, ElemType::Float64, TierSpec::dynamic(Tier::Sve, "svcntd()", "svfloat64_t", "svbool_t"), F64, B64)
}
