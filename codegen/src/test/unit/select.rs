//! Instruction selection tests.

use proptest::prelude::*;
use strum::IntoEnumIterator;
use test_case::test_case;

use simdgen_dtype::ElemType;
use simdgen_ir::{OpCategory, VecOp};

use crate::emit::Unsupported;
use crate::profile::{ProfileTable, Target, Tier, profile};
use crate::select::{Selector, supports};

fn selector(target: Target, elem: ElemType) -> Selector<'static> {
    Selector::new(profile(target, elem).unwrap())
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[test_case(Target::Neon, "vfmaq_f32(acc, a, b)")]
#[test_case(Target::Avx2, "_mm256_fmadd_ps(a, b, acc)")]
#[test_case(Target::Avx512, "_mm512_fmadd_ps(a, b, acc)")]
#[test_case(Target::SveLinux, "svmla_f32_x(pg, acc, a, b)")]
fn test_mul_add_operand_order(target: Target, expected: &str) {
    let mut sel = selector(target, ElemType::Float32);
    assert_eq!(sel.mul_add("a", "b", "acc").unwrap(), expected);
}

#[test_case(Target::Neon, "vbslq_f32(m, yes, no)")]
#[test_case(Target::Avx2, "_mm256_blendv_ps(no, yes, m)")]
#[test_case(Target::SveDarwin, "svsel_f32(m, yes, no)")]
fn test_select_operand_order(target: Target, expected: &str) {
    let mut sel = selector(target, ElemType::Float32);
    assert_eq!(sel.if_then_else("m", "yes", "no").unwrap(), expected);
}

#[test]
fn test_sve_threads_predicate() {
    let mut sel = selector(Target::SveLinux, ElemType::Float32);
    assert_eq!(sel.load("x + i").unwrap(), "svld1_f32(pg, x + i)");
    assert_eq!(sel.store("y + i", "v").unwrap(), "svst1_f32(pg, y + i, v)");
    assert_eq!(sel.binary(VecOp::Sub, "a", "b").unwrap(), "svsub_f32_x(pg, a, b)");
    assert_eq!(sel.reduce(VecOp::ReduceSum, "v").unwrap(), "svaddv_f32(pg, v)");
    // Broadcasts take no predicate.
    assert_eq!(sel.dup("s").unwrap(), "svdup_f32(s)");
}

#[test]
fn test_sve_get_lane_template_skips_predicate() {
    let mut sel = selector(Target::SveDarwin, ElemType::Float32);
    assert_eq!(sel.get_lane("v", "3").unwrap(), "svlasta_f32(svwhilelt_b32(0, 3), v)");
}

#[test]
#[tracing_test::traced_test]
fn test_missing_binary_falls_back_to_operator() {
    let mut sel = selector(Target::Neon, ElemType::Int64);
    assert_eq!(sel.binary(VecOp::Mul, "a", "b").unwrap(), "(a) * (b)");
    assert!(logs_contain("no intrinsic, using C operator"));
}

#[test]
fn test_missing_op_without_operator_is_unsupported() {
    let mut sel = selector(Target::Neon, ElemType::UInt8);
    let Unsupported(reason) = sel.binary(VecOp::Min, "a", "b").unwrap_err();
    assert!(reason.contains("Min"), "{reason}");
    assert!(reason.contains("NEON"), "{reason}");
}

#[test]
fn test_mul_add_composed_without_fma() {
    let mut sel = selector(Target::Neon, ElemType::Int32);
    assert_eq!(sel.mul_add("a", "b", "c").unwrap(), "vaddq_s32(vmulq_s32(a, b), c)");
}

#[test]
fn test_template_compare() {
    let mut sel = selector(Target::Avx2, ElemType::Float32);
    assert_eq!(sel.compare(VecOp::LessThan, "a", "b").unwrap(), "_mm256_cmp_ps(a, b, _CMP_LT_OQ)");
    assert_eq!(sel.apply(VecOp::MaskAndNot, &strings(&["m", "n"])).unwrap(), "_mm256_andnot_ps(n, m)");
}

#[test]
fn test_clamp_is_max_of_min() {
    let mut sel = selector(Target::Neon, ElemType::Float32);
    assert_eq!(sel.clamp("v", "lo", "hi").unwrap(), "vmaxq_f32(vminq_f32(v, hi), lo)");
}

#[test]
fn test_zero_prefers_zero_entry() {
    assert_eq!(selector(Target::Avx2, ElemType::Float32).zero().unwrap(), "_mm256_setzero_ps()");
    assert_eq!(selector(Target::Neon, ElemType::Float32).zero().unwrap(), "vdupq_n_f32(0.0f)");
}

#[test]
fn test_reduce_helper_is_recorded() {
    let mut sel = selector(Target::Avx2, ElemType::Float32);
    assert_eq!(sel.reduce(VecOp::ReduceSum, "v").unwrap(), "_v_reduce_sum_f32(v)");
    assert!(sel.helpers().contains("_v_reduce_sum_f32"));
}

#[test]
fn test_math_helpers() {
    let mut sel = selector(Target::Neon, ElemType::Float32);
    assert_eq!(sel.unary(VecOp::Exp, "x").unwrap(), "_v_exp_f32(x)");
    assert_eq!(sel.binary(VecOp::Pow, "x", "y").unwrap(), "_v_pow_f32(x, y)");
    let helpers = sel.into_helpers().into_iter().collect::<Vec<_>>();
    assert_eq!(helpers, ["_v_exp_f32", "_v_pow_f32"]);
}

#[test]
fn test_promoted_math_splits_and_recombines() {
    let mut sel = selector(Target::Neon, ElemType::Float16);
    let code = sel.unary(VecOp::Exp, "x").unwrap();
    assert_eq!(
        code,
        "vcombine_f16(vcvt_f16_f32(_v_exp_f32(vcvt_f32_f16(vget_low_f16(x)))), \
         vcvt_f16_f32(_v_exp_f32(vcvt_f32_f16(vget_high_f16(x)))))"
    );
    assert!(sel.helpers().contains("_v_exp_f32"));
}

#[test_case(ElemType::Float32, VecOp::Add, &["a", "b"], "a + b")]
#[test_case(ElemType::Float32, VecOp::MulAdd, &["a", "b", "c"], "a * b + c")]
#[test_case(ElemType::Float64, VecOp::Sqrt, &["x"], "sqrt(x)")]
#[test_case(ElemType::Float32, VecOp::RSqrt, &["x"], "1.0f / sqrtf(x)")]
#[test_case(ElemType::Float32, VecOp::Clamp, &["v", "lo", "hi"], "(v < hi ? v : hi) > lo ? (v < hi ? v : hi) : lo")]
#[test_case(ElemType::Float16, VecOp::Exp, &["x"], "_s_exp_f32(x)")]
#[test_case(ElemType::Int32, VecOp::Xor, &["a", "b"], "a ^ b")]
#[test_case(ElemType::Float32, VecOp::Abs, &["a - b"], "(a - b) < 0 ? -(a - b) : (a - b)")]
#[test_case(ElemType::Float32, VecOp::Mul, &["a + b", "c"], "(a + b) * c")]
#[test_case(ElemType::Float32, VecOp::Neg, &["-x"], "-(-x)")]
#[test_case(ElemType::Float32, VecOp::Min, &["x[i + 1]", "f(a, b)"], "x[i + 1] < f(a, b) ? x[i + 1] : f(a, b)")]
fn test_scalar_forms(elem: ElemType, op: VecOp, args: &[&str], expected: &str) {
    let mut sel = selector(Target::Neon, elem);
    assert_eq!(sel.scalar(op, &strings(args)).unwrap(), expected);
}

#[test]
fn test_scalar_bitwise_on_float_is_unsupported() {
    let mut sel = selector(Target::Neon, ElemType::Float32);
    assert!(sel.scalar(VecOp::And, &strings(&["a", "b"])).is_err());
}

#[test]
fn test_apply_checks_arity() {
    let mut sel = selector(Target::Neon, ElemType::Float32);
    let Unsupported(reason) = sel.apply(VecOp::Add, &strings(&["a"])).unwrap_err();
    assert!(reason.contains("takes 2 operands, got 1"), "{reason}");
}

#[test]
fn test_narrow_tier_selector() {
    let p = profile(Target::Neon, ElemType::Float16).unwrap();
    let mut sel = Selector::at_tier(p, Tier::D).unwrap();
    assert_eq!(sel.vec_type(), "float16x4_t");
    assert_eq!(sel.binary(VecOp::Add, "a", "b").unwrap(), "vadd_f16(a, b)");
    assert!(Selector::at_tier(p, Tier::Zmm).is_none());
}

#[test]
fn test_address_cast() {
    let sel = selector(Target::Neon, ElemType::Float16);
    assert_eq!(sel.address("x", "0"), "(float16_t*)x");
    assert_eq!(sel.address("x", "i"), "(float16_t*)(x + i)");
    assert_eq!(selector(Target::Neon, ElemType::Float32).address("x", "i"), "x + i");
}

fn lowerable_ops() -> Vec<VecOp> {
    VecOp::iter().filter(|op| !matches!(op.category(), OpCategory::Tile | OpCategory::Convert)).collect()
}

proptest! {
    #[test]
    fn supported_ops_always_lower(
        index in 0usize..ProfileTable::global().len(),
        op in prop::sample::select(lowerable_ops()),
    ) {
        let p = ProfileTable::global().iter().nth(index).unwrap();
        prop_assume!(supports(p, op));

        let args = (0..op.arity()).map(|i| format!("x{i}")).collect::<Vec<_>>();
        let mut sel = Selector::new(p);
        let lowered = sel.apply(op, &args);
        prop_assert!(lowered.is_ok(), "{} {} {op}: {:?}", p.target, p.elem, lowered);
    }
}
