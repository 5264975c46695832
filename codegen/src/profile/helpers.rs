//! C definitions of the non-intrinsic names profiles call.
//!
//! Tables are ordered so a helper only calls helpers listed before it; the bf16 vector
//! tables follow [`BF16_SCALAR`] in a profile.

use super::InlineHelper;

const fn helper(name: &'static str, definition: &'static str) -> InlineHelper {
    InlineHelper { name, definition }
}

// ============================================================================
// Scalar conversions
// ============================================================================

/// Bit-level bf16 <-> f32, round to nearest even on the way down.
pub(super) const BF16_SCALAR: &[InlineHelper] = &[
    helper(
        "bf16_scalar_to_f32",
        r"static inline float bf16_scalar_to_f32(unsigned short v) {
  unsigned int bits = (unsigned int)v << 16;
  float f;
  __builtin_memcpy(&f, &bits, sizeof f);
  return f;
}",
    ),
    helper(
        "f32_scalar_to_bf16",
        r"static inline unsigned short f32_scalar_to_bf16(float f) {
  unsigned int bits;
  __builtin_memcpy(&bits, &f, sizeof bits);
  bits += 0x7FFFu + ((bits >> 16) & 1u);
  return (unsigned short)(bits >> 16);
}",
    ),
];

// ============================================================================
// NEON
// ============================================================================

pub(super) const NEON_F16: &[InlineHelper] = &[
    // Horizontal f16 add needs Armv8.4; sum the promoted halves instead.
    helper(
        "vaddvq_f16",
        "#define vaddvq_f16(v) ((float16_t)vaddvq_f32(vaddq_f32(vcvt_f32_f16(vget_low_f16(v)), vcvt_f32_f16(vget_high_f16(v)))))",
    ),
    helper(
        "f16_scalar_to_f32",
        r"static inline float f16_scalar_to_f32(unsigned short v) {
  float16_t h;
  __builtin_memcpy(&h, &v, sizeof h);
  return (float)h;
}",
    ),
    helper(
        "f32_scalar_to_f16",
        r"static inline unsigned short f32_scalar_to_f16(float f) {
  float16_t h = (float16_t)f;
  unsigned short v;
  __builtin_memcpy(&v, &h, sizeof v);
  return v;
}",
    ),
];

pub(super) const NEON_BF16: &[InlineHelper] = &[
    helper(
        "bf16_promote_lo",
        r"static inline float32x4_t bf16_promote_lo(bfloat16x8_t v) {
  return vreinterpretq_f32_u32(vshll_n_u16(vget_low_u16(vreinterpretq_u16_bf16(v)), 16));
}",
    ),
    helper(
        "bf16_promote_hi",
        r"static inline float32x4_t bf16_promote_hi(bfloat16x8_t v) {
  return vreinterpretq_f32_u32(vshll_n_u16(vget_high_u16(vreinterpretq_u16_bf16(v)), 16));
}",
    ),
    helper(
        "bf16_demote_half",
        r"static inline uint16x4_t bf16_demote_half(float32x4_t v) {
  uint32x4_t bits = vreinterpretq_u32_f32(v);
  uint32x4_t odd = vandq_u32(vshrq_n_u32(bits, 16), vdupq_n_u32(1));
  bits = vaddq_u32(bits, vaddq_u32(vdupq_n_u32(0x7FFF), odd));
  return vshrn_n_u32(bits, 16);
}",
    ),
    helper(
        "bf16_combine",
        r"static inline bfloat16x8_t bf16_combine(uint16x4_t lo, uint16x4_t hi) {
  return vreinterpretq_bf16_u16(vcombine_u16(lo, hi));
}",
    ),
    helper(
        "bf16_add_q",
        r"static inline bfloat16x8_t bf16_add_q(bfloat16x8_t a, bfloat16x8_t b) {
  return bf16_combine(bf16_demote_half(vaddq_f32(bf16_promote_lo(a), bf16_promote_lo(b))),
                      bf16_demote_half(vaddq_f32(bf16_promote_hi(a), bf16_promote_hi(b))));
}",
    ),
    helper(
        "bf16_sub_q",
        r"static inline bfloat16x8_t bf16_sub_q(bfloat16x8_t a, bfloat16x8_t b) {
  return bf16_combine(bf16_demote_half(vsubq_f32(bf16_promote_lo(a), bf16_promote_lo(b))),
                      bf16_demote_half(vsubq_f32(bf16_promote_hi(a), bf16_promote_hi(b))));
}",
    ),
    helper(
        "bf16_mul_q",
        r"static inline bfloat16x8_t bf16_mul_q(bfloat16x8_t a, bfloat16x8_t b) {
  return bf16_combine(bf16_demote_half(vmulq_f32(bf16_promote_lo(a), bf16_promote_lo(b))),
                      bf16_demote_half(vmulq_f32(bf16_promote_hi(a), bf16_promote_hi(b))));
}",
    ),
    helper(
        "bf16_div_q",
        r"static inline bfloat16x8_t bf16_div_q(bfloat16x8_t a, bfloat16x8_t b) {
  return bf16_combine(bf16_demote_half(vdivq_f32(bf16_promote_lo(a), bf16_promote_lo(b))),
                      bf16_demote_half(vdivq_f32(bf16_promote_hi(a), bf16_promote_hi(b))));
}",
    ),
    helper(
        "bf16_min_q",
        r"static inline bfloat16x8_t bf16_min_q(bfloat16x8_t a, bfloat16x8_t b) {
  return bf16_combine(bf16_demote_half(vminq_f32(bf16_promote_lo(a), bf16_promote_lo(b))),
                      bf16_demote_half(vminq_f32(bf16_promote_hi(a), bf16_promote_hi(b))));
}",
    ),
    helper(
        "bf16_max_q",
        r"static inline bfloat16x8_t bf16_max_q(bfloat16x8_t a, bfloat16x8_t b) {
  return bf16_combine(bf16_demote_half(vmaxq_f32(bf16_promote_lo(a), bf16_promote_lo(b))),
                      bf16_demote_half(vmaxq_f32(bf16_promote_hi(a), bf16_promote_hi(b))));
}",
    ),
    helper(
        "bf16_fma_q",
        r"static inline bfloat16x8_t bf16_fma_q(bfloat16x8_t acc, bfloat16x8_t a, bfloat16x8_t b) {
  return bf16_combine(
      bf16_demote_half(vfmaq_f32(bf16_promote_lo(acc), bf16_promote_lo(a), bf16_promote_lo(b))),
      bf16_demote_half(vfmaq_f32(bf16_promote_hi(acc), bf16_promote_hi(a), bf16_promote_hi(b))));
}",
    ),
    helper(
        "bf16_neg_q",
        r"static inline bfloat16x8_t bf16_neg_q(bfloat16x8_t v) {
  return vreinterpretq_bf16_u16(veorq_u16(vreinterpretq_u16_bf16(v), vdupq_n_u16(0x8000)));
}",
    ),
    helper(
        "bf16_abs_q",
        r"static inline bfloat16x8_t bf16_abs_q(bfloat16x8_t v) {
  return vreinterpretq_bf16_u16(vandq_u16(vreinterpretq_u16_bf16(v), vdupq_n_u16(0x7FFF)));
}",
    ),
    helper(
        "bf16_sqrt_q",
        r"static inline bfloat16x8_t bf16_sqrt_q(bfloat16x8_t v) {
  return bf16_combine(bf16_demote_half(vsqrtq_f32(bf16_promote_lo(v))),
                      bf16_demote_half(vsqrtq_f32(bf16_promote_hi(v))));
}",
    ),
    helper(
        "bf16_dup_q",
        r"static inline bfloat16x8_t bf16_dup_q(float x) {
  return vreinterpretq_bf16_u16(vdupq_n_u16(f32_scalar_to_bf16(x)));
}",
    ),
    helper(
        "bf16_reducesum_q",
        r"static inline float bf16_reducesum_q(bfloat16x8_t v) {
  return vaddvq_f32(vaddq_f32(bf16_promote_lo(v), bf16_promote_hi(v)));
}",
    ),
    helper(
        "bf16_reducemin_q",
        r"static inline float bf16_reducemin_q(bfloat16x8_t v) {
  return vminvq_f32(vminq_f32(bf16_promote_lo(v), bf16_promote_hi(v)));
}",
    ),
    helper(
        "bf16_reducemax_q",
        r"static inline float bf16_reducemax_q(bfloat16x8_t v) {
  return vmaxvq_f32(vmaxq_f32(bf16_promote_lo(v), bf16_promote_hi(v)));
}",
    ),
    helper(
        "bf16_lt_q",
        r"static inline uint16x8_t bf16_lt_q(bfloat16x8_t a, bfloat16x8_t b) {
  return vcombine_u16(vmovn_u32(vcltq_f32(bf16_promote_lo(a), bf16_promote_lo(b))),
                      vmovn_u32(vcltq_f32(bf16_promote_hi(a), bf16_promote_hi(b))));
}",
    ),
    helper(
        "bf16_eq_q",
        r"static inline uint16x8_t bf16_eq_q(bfloat16x8_t a, bfloat16x8_t b) {
  return vcombine_u16(vmovn_u32(vceqq_f32(bf16_promote_lo(a), bf16_promote_lo(b))),
                      vmovn_u32(vceqq_f32(bf16_promote_hi(a), bf16_promote_hi(b))));
}",
    ),
    helper(
        "bf16_gt_q",
        r"static inline uint16x8_t bf16_gt_q(bfloat16x8_t a, bfloat16x8_t b) {
  return vcombine_u16(vmovn_u32(vcgtq_f32(bf16_promote_lo(a), bf16_promote_lo(b))),
                      vmovn_u32(vcgtq_f32(bf16_promote_hi(a), bf16_promote_hi(b))));
}",
    ),
    helper(
        "bf16_ge_q",
        r"static inline uint16x8_t bf16_ge_q(bfloat16x8_t a, bfloat16x8_t b) {
  return vcombine_u16(vmovn_u32(vcgeq_f32(bf16_promote_lo(a), bf16_promote_lo(b))),
                      vmovn_u32(vcgeq_f32(bf16_promote_hi(a), bf16_promote_hi(b))));
}",
    ),
    // Select works on the raw bits.
    helper(
        "bf16_ifelse_q",
        r"static inline bfloat16x8_t bf16_ifelse_q(uint16x8_t mask, bfloat16x8_t yes, bfloat16x8_t no) {
  return vreinterpretq_bf16_u16(vbslq_u16(mask, vreinterpretq_u16_bf16(yes), vreinterpretq_u16_bf16(no)));
}",
    ),
];

// ============================================================================
// AVX-512
// ============================================================================

/// 16 bf16 lanes live in a `__m256i`; arithmetic runs on the promoted `__m512`.
pub(super) const AVX512_BF16: &[InlineHelper] = &[
    helper(
        "avx512_bf16_promote",
        r"static inline __m512 avx512_bf16_promote(__m256i v) {
  return _mm512_castsi512_ps(_mm512_slli_epi32(_mm512_cvtepu16_epi32(v), 16));
}",
    ),
    helper(
        "avx512_bf16_demote",
        r"static inline __m256i avx512_bf16_demote(__m512 v) {
  return (__m256i)_mm512_cvtneps_pbh(v);
}",
    ),
    helper(
        "avx512_bf16_add",
        r"static inline __m256i avx512_bf16_add(__m256i a, __m256i b) {
  return avx512_bf16_demote(_mm512_add_ps(avx512_bf16_promote(a), avx512_bf16_promote(b)));
}",
    ),
    helper(
        "avx512_bf16_sub",
        r"static inline __m256i avx512_bf16_sub(__m256i a, __m256i b) {
  return avx512_bf16_demote(_mm512_sub_ps(avx512_bf16_promote(a), avx512_bf16_promote(b)));
}",
    ),
    helper(
        "avx512_bf16_mul",
        r"static inline __m256i avx512_bf16_mul(__m256i a, __m256i b) {
  return avx512_bf16_demote(_mm512_mul_ps(avx512_bf16_promote(a), avx512_bf16_promote(b)));
}",
    ),
    helper(
        "avx512_bf16_div",
        r"static inline __m256i avx512_bf16_div(__m256i a, __m256i b) {
  return avx512_bf16_demote(_mm512_div_ps(avx512_bf16_promote(a), avx512_bf16_promote(b)));
}",
    ),
    helper(
        "avx512_bf16_min",
        r"static inline __m256i avx512_bf16_min(__m256i a, __m256i b) {
  return avx512_bf16_demote(_mm512_min_ps(avx512_bf16_promote(a), avx512_bf16_promote(b)));
}",
    ),
    helper(
        "avx512_bf16_max",
        r"static inline __m256i avx512_bf16_max(__m256i a, __m256i b) {
  return avx512_bf16_demote(_mm512_max_ps(avx512_bf16_promote(a), avx512_bf16_promote(b)));
}",
    ),
    // Accumulator last, like the native AVX FMAs.
    helper(
        "avx512_bf16_fma",
        r"static inline __m256i avx512_bf16_fma(__m256i a, __m256i b, __m256i acc) {
  return avx512_bf16_demote(
      _mm512_fmadd_ps(avx512_bf16_promote(a), avx512_bf16_promote(b), avx512_bf16_promote(acc)));
}",
    ),
    helper(
        "avx512_bf16_neg",
        r"static inline __m256i avx512_bf16_neg(__m256i v) {
  return _mm256_xor_si256(v, _mm256_set1_epi16((short)0x8000));
}",
    ),
    helper(
        "avx512_bf16_abs",
        r"static inline __m256i avx512_bf16_abs(__m256i v) {
  return _mm256_and_si256(v, _mm256_set1_epi16(0x7FFF));
}",
    ),
    helper(
        "avx512_bf16_sqrt",
        r"static inline __m256i avx512_bf16_sqrt(__m256i v) {
  return avx512_bf16_demote(_mm512_sqrt_ps(avx512_bf16_promote(v)));
}",
    ),
    helper(
        "avx512_bf16_dup",
        r"static inline __m256i avx512_bf16_dup(float x) {
  return _mm256_set1_epi16((short)f32_scalar_to_bf16(x));
}",
    ),
    helper(
        "avx512_bf16_reducesum",
        r"static inline float avx512_bf16_reducesum(__m256i v) {
  return _mm512_reduce_add_ps(avx512_bf16_promote(v));
}",
    ),
    helper(
        "avx512_bf16_reducemin",
        r"static inline float avx512_bf16_reducemin(__m256i v) {
  return _mm512_reduce_min_ps(avx512_bf16_promote(v));
}",
    ),
    helper(
        "avx512_bf16_reducemax",
        r"static inline float avx512_bf16_reducemax(__m256i v) {
  return _mm512_reduce_max_ps(avx512_bf16_promote(v));
}",
    ),
    helper(
        "avx512_bf16_lt",
        r"static inline __mmask16 avx512_bf16_lt(__m256i a, __m256i b) {
  return _mm512_cmp_ps_mask(avx512_bf16_promote(a), avx512_bf16_promote(b), _CMP_LT_OQ);
}",
    ),
    helper(
        "avx512_bf16_eq",
        r"static inline __mmask16 avx512_bf16_eq(__m256i a, __m256i b) {
  return _mm512_cmp_ps_mask(avx512_bf16_promote(a), avx512_bf16_promote(b), _CMP_EQ_OQ);
}",
    ),
    helper(
        "avx512_bf16_gt",
        r"static inline __mmask16 avx512_bf16_gt(__m256i a, __m256i b) {
  return _mm512_cmp_ps_mask(avx512_bf16_promote(a), avx512_bf16_promote(b), _CMP_GT_OQ);
}",
    ),
    helper(
        "avx512_bf16_ge",
        r"static inline __mmask16 avx512_bf16_ge(__m256i a, __m256i b) {
  return _mm512_cmp_ps_mask(avx512_bf16_promote(a), avx512_bf16_promote(b), _CMP_GE_OQ);
}",
    ),
    helper(
        "avx512_bf16_ifelse",
        r"static inline __m256i avx512_bf16_ifelse(__mmask16 mask, __m256i yes, __m256i no) {
  return _mm256_mask_blend_epi16(mask, no, yes);
}",
    ),
];
