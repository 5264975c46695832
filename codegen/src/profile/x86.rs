//! x86 AVX2 and AVX-512 profiles.

use simdgen_dtype::ElemType;
use simdgen_ir::VecOp::{self, *};

use super::{DotAcc, FmaArgOrder, MathStrategy, Profile, Promotion, ScalarPromotion, Target, Tier, TierSpec, helpers, tier_table};

const INCLUDE: &str = "#include <immintrin.h>";

/// F16C scalar conversions, shared by every x86 half-precision profile.
const F16C_SCALAR: ScalarPromotion = ScalarPromotion { promote: "_cvtsh_ss({0})", demote: "_cvtss_sh({0}, 0)" };

// ============================================================================
// AVX2
// ============================================================================

const AVX2_F32_YMM: &[(VecOp, &str)] = &[
    (Load, "_mm256_loadu_ps"),
    (Store, "_mm256_storeu_ps"),
    (Set, "_mm256_set1_ps"),
    (Zero, "_mm256_setzero_ps()"),
    (GetLane, "({0})[{1}]"),
    (Add, "_mm256_add_ps"),
    (Sub, "_mm256_sub_ps"),
    (Mul, "_mm256_mul_ps"),
    (Div, "_mm256_div_ps"),
    (MulAdd, "_mm256_fmadd_ps"),
    (Neg, "_mm256_sub_ps(_mm256_setzero_ps(), {0})"),
    (Abs, "_mm256_andnot_ps(_mm256_set1_ps(-0.0f), {0})"),
    (Sqrt, "_mm256_sqrt_ps"),
    (RSqrt, "_mm256_rsqrt_ps"),
    (Min, "_mm256_min_ps"),
    (Max, "_mm256_max_ps"),
    (And, "_mm256_and_ps"),
    (Or, "_mm256_or_ps"),
    (Xor, "_mm256_xor_ps"),
    (ReduceSum, "_v_reduce_sum_f32"),
    (ReduceMin, "_v_reduce_min_f32"),
    (ReduceMax, "_v_reduce_max_f32"),
    (InterleaveLower, "_mm256_unpacklo_ps"),
    (InterleaveUpper, "_mm256_unpackhi_ps"),
    (LessThan, "_mm256_cmp_ps({0}, {1}, _CMP_LT_OQ)"),
    (Equal, "_mm256_cmp_ps({0}, {1}, _CMP_EQ_OQ)"),
    (GreaterThan, "_mm256_cmp_ps({0}, {1}, _CMP_GT_OQ)"),
    (GreaterEqual, "_mm256_cmp_ps({0}, {1}, _CMP_GE_OQ)"),
    (IfThenElse, "_mm256_blendv_ps"),
    (MaskAnd, "_mm256_and_ps"),
    (MaskOr, "_mm256_or_ps"),
    (MaskAndNot, "_mm256_andnot_ps({1}, {0})"),
];

const AVX2_F32_XMM: &[(VecOp, &str)] = &[
    (Load, "_mm_loadu_ps"),
    (Store, "_mm_storeu_ps"),
    (Set, "_mm_set1_ps"),
    (Zero, "_mm_setzero_ps()"),
    (Add, "_mm_add_ps"),
    (Sub, "_mm_sub_ps"),
    (Mul, "_mm_mul_ps"),
    (Div, "_mm_div_ps"),
    (MulAdd, "_mm_fmadd_ps"),
    (Sqrt, "_mm_sqrt_ps"),
    (Min, "_mm_min_ps"),
    (Max, "_mm_max_ps"),
];

pub(super) fn avx2_f32() -> Profile {
    Profile::builder()
        .target(Target::Avx2)
        .elem(ElemType::Float32)
        .include(INCLUDE)
        .c_type("float")
        .scalar_type("float")
        .tiers(vec![
            TierSpec::fixed(Tier::Ymm, 8, "__m256", "__m256"),
            TierSpec::fixed(Tier::Xmm, 4, "__m128", "__m128"),
        ])
        .intrinsics(tier_table(Tier::Ymm, AVX2_F32_YMM).chain(tier_table(Tier::Xmm, AVX2_F32_XMM)).collect())
        .fma_arg_order(FmaArgOrder::AccLast)
        .math_suffix("f32")
        .build()
}

/// Conversion-only F16C: lanes are widened on load and narrowed on store, so every
/// operation in between is plain f32 AVX2.
pub(super) fn avx2_f16() -> Profile {
    let conversions = [
        ((Load, Tier::Ymm), "_mm256_cvtph_ps(_mm_loadu_si128({0}))"),
        ((Store, Tier::Ymm), "_mm_storeu_si128({0}, _mm256_cvtps_ph({1}, 0))"),
    ];
    let intrinsics = tier_table(Tier::Ymm, AVX2_F32_YMM)
        .filter(|((op, _), _)| !matches!(op, Load | Store))
        .chain(conversions)
        .collect();

    Profile::builder()
        .target(Target::Avx2)
        .elem(ElemType::Float16)
        .include(INCLUDE)
        .c_type("unsigned short")
        .scalar_type("float")
        .tiers(vec![TierSpec::fixed(Tier::Ymm, 8, "__m256", "__m256")])
        .intrinsics(intrinsics)
        .fma_arg_order(FmaArgOrder::AccLast)
        .cast_expr("(__m128i*)")
        .math_suffix("f32")
        .scalar_promotion(F16C_SCALAR)
        .build()
}

// ============================================================================
// AVX-512
// ============================================================================

const AVX512_F32_ZMM: &[(VecOp, &str)] = &[
    (Load, "_mm512_loadu_ps"),
    (Store, "_mm512_storeu_ps"),
    (Set, "_mm512_set1_ps"),
    (Zero, "_mm512_setzero_ps()"),
    (GetLane, "({0})[{1}]"),
    (Add, "_mm512_add_ps"),
    (Sub, "_mm512_sub_ps"),
    (Mul, "_mm512_mul_ps"),
    (Div, "_mm512_div_ps"),
    (MulAdd, "_mm512_fmadd_ps"),
    (Neg, "_mm512_sub_ps(_mm512_setzero_ps(), {0})"),
    (Abs, "_mm512_abs_ps"),
    (Sqrt, "_mm512_sqrt_ps"),
    (RSqrt, "_mm512_rsqrt14_ps"),
    (Min, "_mm512_min_ps"),
    (Max, "_mm512_max_ps"),
    (ReduceSum, "_mm512_reduce_add_ps"),
    (ReduceMin, "_mm512_reduce_min_ps"),
    (ReduceMax, "_mm512_reduce_max_ps"),
    (InterleaveLower, "_mm512_unpacklo_ps"),
    (InterleaveUpper, "_mm512_unpackhi_ps"),
    (LessThan, "_mm512_cmp_ps_mask({0}, {1}, _CMP_LT_OQ)"),
    (Equal, "_mm512_cmp_ps_mask({0}, {1}, _CMP_EQ_OQ)"),
    (GreaterThan, "_mm512_cmp_ps_mask({0}, {1}, _CMP_GT_OQ)"),
    (GreaterEqual, "_mm512_cmp_ps_mask({0}, {1}, _CMP_GE_OQ)"),
    (IfThenElse, "_mm512_mask_blend_ps({2}, {0}, {1})"),
    (MaskAnd, "_kand_mask16"),
    (MaskOr, "_kor_mask16"),
    (MaskAndNot, "_kandn_mask16({1}, {0})"),
];

pub(super) fn avx512_f32() -> Profile {
    Profile::builder()
        .target(Target::Avx512)
        .elem(ElemType::Float32)
        .include(INCLUDE)
        .c_type("float")
        .scalar_type("float")
        .tiers(vec![TierSpec::fixed(Tier::Zmm, 16, "__m512", "__mmask16")])
        .intrinsics(tier_table(Tier::Zmm, AVX512_F32_ZMM).collect())
        .fma_arg_order(FmaArgOrder::AccLast)
        .math_suffix("f32")
        .build()
}

// AVX512-FP16: native half arithmetic, 32 lanes per register.
const AVX512_F16_ZMM: &[(VecOp, &str)] = &[
    (Load, "_mm512_loadu_ph"),
    (Store, "_mm512_storeu_ph"),
    (Set, "_mm512_set1_ph"),
    (Zero, "_mm512_setzero_ph()"),
    (Add, "_mm512_add_ph"),
    (Sub, "_mm512_sub_ph"),
    (Mul, "_mm512_mul_ph"),
    (Div, "_mm512_div_ph"),
    (MulAdd, "_mm512_fmadd_ph"),
    (Neg, "_mm512_sub_ph(_mm512_setzero_ph(), {0})"),
    (Abs, "_mm512_abs_ph"),
    (Sqrt, "_mm512_sqrt_ph"),
    (Min, "_mm512_min_ph"),
    (Max, "_mm512_max_ph"),
    (ReduceSum, "_mm512_reduce_add_ph"),
    (ReduceMin, "_mm512_reduce_min_ph"),
    (ReduceMax, "_mm512_reduce_max_ph"),
    (LessThan, "_mm512_cmp_ph_mask({0}, {1}, _CMP_LT_OQ)"),
    (Equal, "_mm512_cmp_ph_mask({0}, {1}, _CMP_EQ_OQ)"),
    (GreaterThan, "_mm512_cmp_ph_mask({0}, {1}, _CMP_GT_OQ)"),
    (GreaterEqual, "_mm512_cmp_ph_mask({0}, {1}, _CMP_GE_OQ)"),
    (IfThenElse, "_mm512_mask_blend_ph({2}, {0}, {1})"),
    (MaskAnd, "_kand_mask32"),
    (MaskOr, "_kor_mask32"),
    (MaskAndNot, "_kandn_mask32({1}, {0})"),
];

pub(super) fn avx512_f16() -> Profile {
    Profile::builder()
        .target(Target::Avx512)
        .elem(ElemType::Float16)
        .include(INCLUDE)
        .c_type("unsigned short")
        .scalar_type("float")
        .tiers(vec![TierSpec::fixed(Tier::Zmm, 32, "__m512h", "__mmask32")])
        .intrinsics(tier_table(Tier::Zmm, AVX512_F16_ZMM).collect())
        .fma_arg_order(FmaArgOrder::AccLast)
        .math_suffix("f16")
        .scalar_promotion(F16C_SCALAR)
        .build()
}

// AVX512-BF16 only converts and dot-products; arithmetic goes through helpers.
const AVX512_BF16_ZMM: &[(VecOp, &str)] = &[
    (Load, "_mm256_loadu_si256"),
    (Store, "_mm256_storeu_si256"),
    (Set, "avx512_bf16_dup"),
    (Add, "avx512_bf16_add"),
    (Sub, "avx512_bf16_sub"),
    (Mul, "avx512_bf16_mul"),
    (Div, "avx512_bf16_div"),
    (MulAdd, "avx512_bf16_fma"),
    (Neg, "avx512_bf16_neg"),
    (Abs, "avx512_bf16_abs"),
    (Sqrt, "avx512_bf16_sqrt"),
    (Min, "avx512_bf16_min"),
    (Max, "avx512_bf16_max"),
    (ReduceSum, "avx512_bf16_reducesum"),
    (ReduceMin, "avx512_bf16_reducemin"),
    (ReduceMax, "avx512_bf16_reducemax"),
    (LessThan, "avx512_bf16_lt"),
    (Equal, "avx512_bf16_eq"),
    (GreaterThan, "avx512_bf16_gt"),
    (GreaterEqual, "avx512_bf16_ge"),
    (IfThenElse, "avx512_bf16_ifelse"),
    (MaskAnd, "_kand_mask16"),
    (MaskOr, "_kor_mask16"),
    (MaskAndNot, "_kandn_mask16({1}, {0})"),
    (DotAccumulate, "_mm512_dpbf16_ps"),
];

pub(super) fn avx512_bf16() -> Profile {
    Profile::builder()
        .target(Target::Avx512)
        .elem(ElemType::BFloat16)
        .include(INCLUDE)
        .c_type("unsigned short")
        .scalar_type("float")
        .tiers(vec![TierSpec::fixed(Tier::Zmm, 16, "__m256i", "__mmask16")])
        .intrinsics(tier_table(Tier::Zmm, AVX512_BF16_ZMM).collect())
        .fma_arg_order(FmaArgOrder::AccLast)
        .cast_expr("(__m256i*)")
        .math(MathStrategy::Promoted)
        .math_suffix("f32")
        .promotion(Promotion::Whole {
            promote: "avx512_bf16_promote({0})",
            demote: "avx512_bf16_demote({0})",
            promoted_vec_type: "__m512",
        })
        .scalar_promotion(ScalarPromotion { promote: "bf16_scalar_to_f32", demote: "f32_scalar_to_bf16" })
        .dot_acc(DotAcc { acc_type: "__m512", zero: "_mm512_setzero_ps()", reduce: "_mm512_reduce_add_ps" })
        .inline_helpers([helpers::BF16_SCALAR, helpers::AVX512_BF16].concat())
        .build()
}
