//! ARM NEON (Advanced SIMD) profiles.

use simdgen_dtype::ElemType;
use simdgen_ir::VecOp::{self, *};

use super::{DotAcc, FmaArgOrder, LaneOps, MathStrategy, Profile, Promotion, ScalarPromotion, Tier, TierSpec, WidenedAcc, helpers, tier_table};

const INCLUDE: &str = "#include <arm_neon.h>";

// ============================================================================
// Floating point
// ============================================================================

const F32_Q: &[(VecOp, &str)] = &[
    (Load, "vld1q_f32"),
    (Store, "vst1q_f32"),
    (Set, "vdupq_n_f32"),
    (Zero, "vdupq_n_f32(0.0f)"),
    (GetLane, "vgetq_lane_f32"),
    (Add, "vaddq_f32"),
    (Sub, "vsubq_f32"),
    (Mul, "vmulq_f32"),
    (Div, "vdivq_f32"),
    (MulAdd, "vfmaq_f32"),
    (Neg, "vnegq_f32"),
    (Abs, "vabsq_f32"),
    (Sqrt, "vsqrtq_f32"),
    (RSqrt, "_v_rsqrt_f32"),
    (Min, "vminq_f32"),
    (Max, "vmaxq_f32"),
    (ReduceSum, "vaddvq_f32"),
    (ReduceMin, "vminvq_f32"),
    (ReduceMax, "vmaxvq_f32"),
    (InterleaveLower, "vzip1q_f32"),
    (InterleaveUpper, "vzip2q_f32"),
    (LessThan, "vcltq_f32"),
    (Equal, "vceqq_f32"),
    (GreaterThan, "vcgtq_f32"),
    (GreaterEqual, "vcgeq_f32"),
    (IfThenElse, "vbslq_f32"),
    (MaskAnd, "vandq_u32"),
    (MaskOr, "vorrq_u32"),
    (MaskAndNot, "vbicq_u32"),
];

const F64_Q: &[(VecOp, &str)] = &[
    (Load, "vld1q_f64"),
    (Store, "vst1q_f64"),
    (Set, "vdupq_n_f64"),
    (Zero, "vdupq_n_f64(0.0)"),
    (GetLane, "vgetq_lane_f64"),
    (Add, "vaddq_f64"),
    (Sub, "vsubq_f64"),
    (Mul, "vmulq_f64"),
    (Div, "vdivq_f64"),
    (MulAdd, "vfmaq_f64"),
    (Neg, "vnegq_f64"),
    (Abs, "vabsq_f64"),
    (Sqrt, "vsqrtq_f64"),
    (RSqrt, "_v_rsqrt_f64"),
    (Min, "vminq_f64"),
    (Max, "vmaxq_f64"),
    (ReduceSum, "vaddvq_f64"),
    (ReduceMin, "vminvq_f64"),
    (ReduceMax, "vmaxvq_f64"),
    (InterleaveLower, "vzip1q_f64"),
    (InterleaveUpper, "vzip2q_f64"),
    (LessThan, "vcltq_f64"),
    (Equal, "vceqq_f64"),
    (GreaterThan, "vcgtq_f64"),
    (GreaterEqual, "vcgeq_f64"),
    (IfThenElse, "vbslq_f64"),
    (MaskAnd, "vandq_u64"),
    (MaskOr, "vorrq_u64"),
    (MaskAndNot, "vbicq_u64"),
];

pub(super) fn f32() -> Profile {
    Profile::builder()
        .target(super::Target::Neon)
        .elem(ElemType::Float32)
        .include(INCLUDE)
        .c_type("float")
        .scalar_type("float")
        .tiers(vec![TierSpec::fixed(Tier::Q, 4, "float32x4_t", "uint32x4_t")])
        .intrinsics(tier_table(Tier::Q, F32_Q).collect())
        .fma_arg_order(FmaArgOrder::AccFirst)
        .math_suffix("f32")
        .lane_ops(LaneOps { fma_lane: "vfmaq_laneq_f32", mul_lane: "vmulq_laneq_f32", set_lane: "vsetq_lane_f32" })
        .build()
}

pub(super) fn f64() -> Profile {
    Profile::builder()
        .target(super::Target::Neon)
        .elem(ElemType::Float64)
        .include(INCLUDE)
        .c_type("double")
        .scalar_type("double")
        .tiers(vec![TierSpec::fixed(Tier::Q, 2, "float64x2_t", "uint64x2_t")])
        .intrinsics(tier_table(Tier::Q, F64_Q).collect())
        .fma_arg_order(FmaArgOrder::AccFirst)
        .math_suffix("f64")
        .lane_ops(LaneOps { fma_lane: "vfmaq_laneq_f64", mul_lane: "vmulq_laneq_f64", set_lane: "vsetq_lane_f64" })
        .build()
}

// ============================================================================
// Half precision
// ============================================================================

// Native f16 arithmetic (ARMv8.2-A FP16); transcendentals are promoted.
const F16_Q: &[(VecOp, &str)] = &[
    (Load, "vld1q_f16"),
    (Store, "vst1q_f16"),
    (Set, "vdupq_n_f16"),
    (GetLane, "vgetq_lane_f16"),
    (Add, "vaddq_f16"),
    (Sub, "vsubq_f16"),
    (Mul, "vmulq_f16"),
    (Div, "vdivq_f16"),
    (MulAdd, "vfmaq_f16"),
    (Neg, "vnegq_f16"),
    (Abs, "vabsq_f16"),
    (Sqrt, "vsqrtq_f16"),
    (Min, "vminq_f16"),
    (Max, "vmaxq_f16"),
    (ReduceSum, "vaddvq_f16"),
    (ReduceMin, "vminvq_f16"),
    (ReduceMax, "vmaxvq_f16"),
    (InterleaveLower, "vzip1q_f16"),
    (InterleaveUpper, "vzip2q_f16"),
    (LessThan, "vcltq_f16"),
    (Equal, "vceqq_f16"),
    (GreaterThan, "vcgtq_f16"),
    (GreaterEqual, "vcgeq_f16"),
    (IfThenElse, "vbslq_f16"),
    (MaskAnd, "vandq_u16"),
    (MaskOr, "vorrq_u16"),
    (MaskAndNot, "vbicq_u16"),
];

// No d-register sqrt or horizontal ops.
const F16_D: &[(VecOp, &str)] = &[
    (Load, "vld1_f16"),
    (Store, "vst1_f16"),
    (Set, "vdup_n_f16"),
    (GetLane, "vget_lane_f16"),
    (Add, "vadd_f16"),
    (Sub, "vsub_f16"),
    (Mul, "vmul_f16"),
    (Div, "vdiv_f16"),
    (MulAdd, "vfma_f16"),
    (Neg, "vneg_f16"),
    (Abs, "vabs_f16"),
    (Min, "vmin_f16"),
    (Max, "vmax_f16"),
    (InterleaveLower, "vzip1_f16"),
    (InterleaveUpper, "vzip2_f16"),
    (LessThan, "vclt_f16"),
    (Equal, "vceq_f16"),
    (GreaterThan, "vcgt_f16"),
    (GreaterEqual, "vcge_f16"),
    (IfThenElse, "vbsl_f16"),
];

pub(super) fn f16() -> Profile {
    Profile::builder()
        .target(super::Target::Neon)
        .elem(ElemType::Float16)
        .include(INCLUDE)
        .c_type("unsigned short")
        .scalar_type("float16_t")
        .tiers(vec![
            TierSpec::fixed(Tier::Q, 8, "float16x8_t", "uint16x8_t"),
            TierSpec::fixed(Tier::D, 4, "float16x4_t", "uint16x4_t"),
        ])
        .intrinsics(tier_table(Tier::Q, F16_Q).chain(tier_table(Tier::D, F16_D)).collect())
        .fma_arg_order(FmaArgOrder::AccFirst)
        .cast_expr("(float16_t*)")
        .math(MathStrategy::Promoted)
        .math_suffix("f32")
        .promotion(Promotion::Split {
            lo: "vcvt_f32_f16(vget_low_f16({0}))",
            hi: "vcvt_f32_f16(vget_high_f16({0}))",
            demote: "vcvt_f16_f32({0})",
            combine: "vcombine_f16({0}, {1})",
            promoted_vec_type: "float32x4_t",
        })
        .scalar_promotion(ScalarPromotion { promote: "f16_scalar_to_f32", demote: "f32_scalar_to_f16" })
        .inline_helpers(helpers::NEON_F16.to_vec())
        .build()
}

// ============================================================================
// BFloat16
// ============================================================================

// No native bf16 arithmetic: the bf16_*_q helpers promote, compute in f32 and demote.
const BF16_Q: &[(VecOp, &str)] = &[
    (Load, "vld1q_bf16"),
    (Store, "vst1q_bf16"),
    (Set, "bf16_dup_q"),
    (GetLane, "vgetq_lane_bf16"),
    (Add, "bf16_add_q"),
    (Sub, "bf16_sub_q"),
    (Mul, "bf16_mul_q"),
    (Div, "bf16_div_q"),
    (MulAdd, "bf16_fma_q"),
    (Neg, "bf16_neg_q"),
    (Abs, "bf16_abs_q"),
    (Sqrt, "bf16_sqrt_q"),
    (Min, "bf16_min_q"),
    (Max, "bf16_max_q"),
    (ReduceSum, "bf16_reducesum_q"),
    (ReduceMin, "bf16_reducemin_q"),
    (ReduceMax, "bf16_reducemax_q"),
    (LessThan, "bf16_lt_q"),
    (Equal, "bf16_eq_q"),
    (GreaterThan, "bf16_gt_q"),
    (GreaterEqual, "bf16_ge_q"),
    (IfThenElse, "bf16_ifelse_q"),
    (MaskAnd, "vandq_u16"),
    (MaskOr, "vorrq_u16"),
    (MaskAndNot, "vbicq_u16"),
    (DotAccumulate, "vbfdotq_f32"),
];

pub(super) fn bf16() -> Profile {
    Profile::builder()
        .target(super::Target::Neon)
        .elem(ElemType::BFloat16)
        .include(INCLUDE)
        .c_type("unsigned short")
        .scalar_type("float")
        .tiers(vec![TierSpec::fixed(Tier::Q, 8, "bfloat16x8_t", "uint16x8_t")])
        .intrinsics(tier_table(Tier::Q, BF16_Q).collect())
        .fma_arg_order(FmaArgOrder::AccFirst)
        .cast_expr("(bfloat16_t*)")
        .math(MathStrategy::Promoted)
        .math_suffix("f32")
        .promotion(Promotion::Split {
            lo: "bf16_promote_lo({0})",
            hi: "bf16_promote_hi({0})",
            demote: "bf16_demote_half({0})",
            combine: "bf16_combine({0}, {1})",
            promoted_vec_type: "float32x4_t",
        })
        .scalar_promotion(ScalarPromotion { promote: "bf16_scalar_to_f32", demote: "f32_scalar_to_bf16" })
        .widened(WidenedAcc {
            acc_type: "float32x4_t",
            zero: "vdupq_n_f32(0.0f)",
            fma_fn: "vfmaq_f32",
            add_fn: "vaddq_f32",
        })
        .dot_acc(DotAcc { acc_type: "float32x4_t", zero: "vdupq_n_f32(0.0f)", reduce: "vaddvq_f32" })
        .inline_helpers([helpers::BF16_SCALAR, helpers::NEON_BF16].concat())
        .build()
}

// ============================================================================
// Integers
// ============================================================================

const U8_Q: &[(VecOp, &str)] = &[
    (Load, "vld1q_u8"),
    (Store, "vst1q_u8"),
    (Set, "vdupq_n_u8"),
    (LessThan, "vcltq_u8"),
];

const U32_Q: &[(VecOp, &str)] = &[
    (Load, "vld1q_u32"),
    (Store, "vst1q_u32"),
    (Set, "vdupq_n_u32"),
    (GetLane, "vgetq_lane_u32"),
    (Add, "vaddq_u32"),
    (Sub, "vsubq_u32"),
    (And, "vandq_u32"),
    (Or, "vorrq_u32"),
    (Xor, "veorq_u32"),
    (Min, "vminq_u32"),
    (Max, "vmaxq_u32"),
    (ReduceSum, "vaddvq_u32"),
    (ReduceMin, "vminvq_u32"),
    (ReduceMax, "vmaxvq_u32"),
    (InterleaveLower, "vzip1q_u32"),
    (InterleaveUpper, "vzip2q_u32"),
    (LessThan, "vcltq_u32"),
    (Equal, "vceqq_u32"),
    (GreaterThan, "vcgtq_u32"),
    (GreaterEqual, "vcgeq_u32"),
    (IfThenElse, "vbslq_u32"),
    (MaskAnd, "vandq_u32"),
    (MaskOr, "vorrq_u32"),
    (MaskAndNot, "vbicq_u32"),
];

const U64_Q: &[(VecOp, &str)] = &[
    (Load, "vld1q_u64"),
    (Store, "vst1q_u64"),
    (Set, "vdupq_n_u64"),
    (GetLane, "vgetq_lane_u64"),
    (Add, "vaddq_u64"),
    (Sub, "vsubq_u64"),
    (And, "vandq_u64"),
    (Or, "vorrq_u64"),
    (Xor, "veorq_u64"),
    (ReduceSum, "vaddvq_u64"),
    (InterleaveLower, "vzip1q_u64"),
    (InterleaveUpper, "vzip2q_u64"),
    (LessThan, "vcltq_u64"),
    (Equal, "vceqq_u64"),
    (GreaterThan, "vcgtq_u64"),
    (GreaterEqual, "vcgeq_u64"),
    (IfThenElse, "vbslq_u64"),
    (MaskAnd, "vandq_u64"),
    (MaskOr, "vorrq_u64"),
    (MaskAndNot, "vbicq_u64"),
];

const S32_Q: &[(VecOp, &str)] = &[
    (Load, "vld1q_s32"),
    (Store, "vst1q_s32"),
    (Set, "vdupq_n_s32"),
    (GetLane, "vgetq_lane_s32"),
    (Add, "vaddq_s32"),
    (Sub, "vsubq_s32"),
    (Mul, "vmulq_s32"),
    (Neg, "vnegq_s32"),
    (Abs, "vabsq_s32"),
    (Min, "vminq_s32"),
    (Max, "vmaxq_s32"),
    (And, "vandq_s32"),
    (Or, "vorrq_s32"),
    (Xor, "veorq_s32"),
    (ReduceSum, "vaddvq_s32"),
    (ReduceMin, "vminvq_s32"),
    (ReduceMax, "vmaxvq_s32"),
    (InterleaveLower, "vzip1q_s32"),
    (InterleaveUpper, "vzip2q_s32"),
    (LessThan, "vcltq_s32"),
    (Equal, "vceqq_s32"),
    (GreaterThan, "vcgtq_s32"),
    (GreaterEqual, "vcgeq_s32"),
    (IfThenElse, "vbslq_s32"),
    (MaskAnd, "vandq_u32"),
    (MaskOr, "vorrq_u32"),
    (MaskAndNot, "vbicq_u32"),
];

// NEON has no 64-bit lane multiply or min/max.
const S64_Q: &[(VecOp, &str)] = &[
    (Load, "vld1q_s64"),
    (Store, "vst1q_s64"),
    (Set, "vdupq_n_s64"),
    (GetLane, "vgetq_lane_s64"),
    (Add, "vaddq_s64"),
    (Sub, "vsubq_s64"),
    (Neg, "vnegq_s64"),
    (Abs, "vabsq_s64"),
    (And, "vandq_s64"),
    (Or, "vorrq_s64"),
    (Xor, "veorq_s64"),
    (ReduceSum, "vaddvq_s64"),
    (InterleaveLower, "vzip1q_s64"),
    (InterleaveUpper, "vzip2q_s64"),
    (LessThan, "vcltq_s64"),
    (Equal, "vceqq_s64"),
    (GreaterThan, "vcgtq_s64"),
    (GreaterEqual, "vcgeq_s64"),
    (IfThenElse, "vbslq_s64"),
    (MaskAnd, "vandq_u64"),
    (MaskOr, "vorrq_u64"),
    (MaskAndNot, "vbicq_u64"),
];

fn int(elem: ElemType, lanes: usize, vec_type: &'static str, mask_type: &'static str, table: &[(VecOp, &'static str)]) -> Profile {
    Profile::builder()
        .target(super::Target::Neon)
        .elem(elem)
        .include(INCLUDE)
        .c_type(elem.c_style())
        .scalar_type(elem.c_style())
        .tiers(vec![TierSpec::fixed(Tier::Q, lanes, vec_type, mask_type)])
        .intrinsics(tier_table(Tier::Q, table).collect())
        .fma_arg_order(FmaArgOrder::AccFirst)
        .math_suffix(elem.suffix())
        .build()
}

pub(super) fn u8() -> Profile {
    int(ElemType::UInt8, 16, "uint8x16_t", "uint8x16_t", U8_Q)
}

pub(super) fn u32() -> Profile {
    int(ElemType::UInt32, 4, "uint32x4_t", "uint32x4_t", U32_Q)
}

pub(super) fn u64() -> Profile {
    int(ElemType::UInt64, 2, "uint64x2_t", "uint64x2_t", U64_Q)
}

pub(super) fn i32() -> Profile {
    int(ElemType::Int32, 4, "int32x4_t", "uint32x4_t", S32_Q)
}

pub(super) fn i64() -> Profile {
    int(ElemType::Int64, 2, "int64x2_t", "uint64x2_t", S64_Q)
}
