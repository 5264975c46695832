//! Fused-IR emission tests.

use std::collections::BTreeSet;

use test_case::test_case;

use simdgen_dtype::ElemType;
use simdgen_ir::{IRFunction, IRParam, LoopRange, NodeOp, OpKind, VecOp, kernels};

use crate::config::{CodegenConfig, FusionMode};
use crate::ir::{IrEmitter, helper_prototype};
use crate::pipeline::translate_ir;
use crate::profile::{Target, profile};
use crate::{RenderedKernel, Renderer};

fn softmax(target: Target, elem: ElemType, config: &CodegenConfig) -> RenderedKernel {
    let lanes = profile(target, elem).unwrap().primary().lanes;
    translate_ir(kernels::softmax(elem, lanes).unwrap(), target, config).unwrap()
}

fn no_fusion() -> CodegenConfig {
    CodegenConfig::builder().fusion(FusionMode::Disabled).build()
}

#[test]
fn test_softmax_neon_signature_and_prologue() {
    let kernel = softmax(Target::Neon, ElemType::Float32, &CodegenConfig::default());
    let code = &kernel.code;
    assert_eq!(kernel.entry_point, "softmax_c_f32_neon");
    assert!(code.starts_with("#include <arm_neon.h>\n#include <math.h>\n"), "{code}");
    assert!(code.contains("void softmax_c_f32_neon(float *input, float *output, long *psize) {\n  long size = *psize;\n  const long lanes = 4;\n"), "{code}");
    assert_eq!(kernel.unsupported_count(), 0, "{code}");
}

#[test]
fn test_softmax_max_reduction_loop() {
    let code = softmax(Target::Neon, ElemType::Float32, &CodegenConfig::default()).code;
    let expected = "  float maxVal;
  {
    long i = 0;
    float32x4_t acc_maxVal = vdupq_n_f32(-INFINITY);
    for (; i + lanes <= size; i += lanes) {
      float32x4_t input_i = vld1q_f32(input + i);
      acc_maxVal = vmaxq_f32(acc_maxVal, input_i);
    }
    maxVal = vmaxvq_f32(acc_maxVal);
    for (; i < size; i++) {
      float input_i = input[i];
      maxVal = input_i > maxVal ? input_i : maxVal;
    }
  }
";
    assert!(code.contains(expected), "{code}");
}

#[test]
fn test_softmax_fused_loop() {
    let code = softmax(Target::Neon, ElemType::Float32, &CodegenConfig::default()).code;

    assert!(!code.contains("shifted["), "{code}");
    assert!(!code.contains("shifted +"), "{code}");
    assert!(code.contains("// SoftmaxFusion g3: %1 %2 %7 (eliminates shifted)"), "{code}");
    assert_eq!(code.matches("i += lanes").count(), 3, "{code}");

    for line in [
        "float expSum;",
        "float32x4_t acc_expSum = vdupq_n_f32(0.0f);",
        "float32x4_t v1 = vld1q_f32(input + i);",
        "float32x4_t maxVec = vdupq_n_f32(maxVal);",
        "float32x4_t v2 = vsubq_f32(v1, maxVec);",
        "float32x4_t v4 = _v_exp_f32(v2);",
        "vst1q_f32(output + i, v4);",
        "acc_expSum = vaddq_f32(acc_expSum, v4);",
        "expSum = vaddvq_f32(acc_expSum);",
        "float v2 = v1 - maxVal;",
        "float v4 = _s_exp_f32(v2);",
        "output[i] = v4;",
        "expSum += v4;",
        "float32x4_t v6 = vdivq_f32(v5, vdupq_n_f32(expSum));",
        "float v6 = v5 / expSum;",
    ] {
        assert!(code.contains(line), "missing {line:?} in\n{code}");
    }

    // The merged loop runs after the max reduction and before normalization.
    let merged = code.find("v2 = vsubq_f32").unwrap();
    assert!(code.find("maxVal = vmaxvq_f32").unwrap() < merged, "{code}");
    assert!(merged < code.find("v6 = vdivq_f32").unwrap(), "{code}");
}

#[test]
fn test_softmax_without_fusion() {
    let kernel = softmax(Target::Neon, ElemType::Float32, &no_fusion());
    let code = &kernel.code;
    assert!(code.contains("float shifted[size];"), "{code}");
    assert!(code.contains("vst1q_f32(shifted + i, v2);"), "{code}");
    assert!(code.contains("float32x4_t v3 = vld1q_f32(shifted + i);"), "{code}");
    assert!(!code.contains("SoftmaxFusion"), "{code}");
    assert_eq!(code.matches("i += lanes").count(), 4, "{code}");
}

#[test]
fn test_scalar_tail_can_be_disabled() {
    let config = CodegenConfig::builder().scalar_tail(false).build();
    let code = softmax(Target::Neon, ElemType::Float32, &config).code;
    assert!(!code.contains("i < size; i++"), "{code}");
    assert!(code.contains("i += lanes"), "{code}");
}

#[test]
fn test_softmax_sve_linux() {
    let code = softmax(Target::SveLinux, ElemType::Float32, &CodegenConfig::default()).code;
    assert!(code.contains("void softmax_c_f32_sve_linux(float *input, float *output, long *psize) {"), "{code}");
    assert!(code.contains("  svbool_t pg = svptrue_b32();\n  const long lanes = svcntw();"), "{code}");
    assert!(code.contains("svfloat32_t v1 = svld1_f32(pg, input + i);"), "{code}");
    assert!(code.contains("svfloat32_t maxVec = svdup_f32(maxVal);"), "{code}");
    assert!(code.contains("svfloat32_t v2 = svsub_f32_x(pg, v1, maxVec);"), "{code}");
    assert!(code.contains("svst1_f32(pg, output + i, v4);"), "{code}");
    assert!(code.contains("expSum = svaddv_f32(pg, acc_expSum);"), "{code}");
}

#[test]
fn test_softmax_sve_darwin_is_streaming() {
    let code = softmax(Target::SveDarwin, ElemType::Float32, &CodegenConfig::default()).code;
    assert!(code.contains("void softmax_c_f32_sve_darwin(float *input, float *output, long *psize) __arm_streaming {"), "{code}");
    assert!(code.contains("const long lanes = 16;"), "{code}");
}

#[test]
fn test_softmax_avx2() {
    let kernel = softmax(Target::Avx2, ElemType::Float32, &CodegenConfig::default());
    let code = &kernel.code;
    assert!(code.starts_with("#include <immintrin.h>\n"), "{code}");
    assert!(code.contains("__m256 v2 = _mm256_sub_ps(v1, maxVec);"), "{code}");
    assert!(code.contains("expSum = _v_reduce_sum_f32(acc_expSum);"), "{code}");
    assert!(code.contains("maxVal = _v_reduce_max_f32(acc_maxVal);"), "{code}");
    let helpers = kernel.required_helpers.iter().map(String::as_str).collect::<Vec<_>>();
    assert_eq!(helpers, ["_s_exp_f32", "_v_exp_f32", "_v_reduce_max_f32", "_v_reduce_sum_f32"]);
}

#[test_case(Target::Neon, ElemType::Float32)]
#[test_case(Target::Neon, ElemType::Float16)]
#[test_case(Target::Avx512, ElemType::Float32)]
#[test_case(Target::SveDarwin, ElemType::Float64)]
fn test_softmax_is_deterministic(target: Target, elem: ElemType) {
    let a = softmax(target, elem, &CodegenConfig::default()).code;
    let b = softmax(target, elem, &CodegenConfig::default()).code;
    assert_eq!(a, b);
}

#[test]
fn test_exp_sum_returns_through_pointer() {
    let func = kernels::exp_sum(ElemType::Float32, 4).unwrap();
    let kernel = translate_ir(func, Target::Neon, &CodegenConfig::default()).unwrap();
    let code = &kernel.code;
    assert_eq!(kernel.entry_point, "expsum_c_f32_neon");
    assert!(code.contains("void expsum_c_f32_neon(float *input, float *output, long *psize, float *pout_result) {"), "{code}");
    assert!(code.contains("acc_result = vaddq_f32(acc_result, e);"), "{code}");
    assert!(code.contains("result = vaddvq_f32(acc_result);"), "{code}");
    assert!(code.ends_with("  *pout_result = result;\n}\n"), "{code}");
}

#[test]
fn test_exp_sum_bf16_widens_accumulator() {
    let func = kernels::exp_sum(ElemType::BFloat16, 8).unwrap();
    let code = translate_ir(func, Target::Neon, &CodegenConfig::default()).unwrap().code;
    for line in [
        "void expsum_c_bf16_neon(unsigned short *input, unsigned short *output, long *psize, float *pout_result) {",
        "float32x4_t acc_result_lo = vdupq_n_f32(0.0f);",
        "float32x4_t acc_result_hi = vdupq_n_f32(0.0f);",
        "bfloat16x8_t x = vld1q_bf16((bfloat16_t*)(input + i));",
        "acc_result_lo = vaddq_f32(acc_result_lo, bf16_promote_lo(e));",
        "bfloat16x8_t acc_result = bf16_combine(bf16_demote_half(acc_result_lo), bf16_demote_half(acc_result_hi));",
        "result = bf16_reducesum_q(acc_result);",
        "float x = bf16_scalar_to_f32(input[i]);",
        "float e = _s_exp_f32(x);",
        "output[i] = f32_scalar_to_bf16(e);",
    ] {
        assert!(code.contains(line), "missing {line:?} in\n{code}");
    }
}

/// Names of everything `code` calls.
fn calls(code: &str) -> BTreeSet<&str> {
    code.match_indices('(')
        .filter_map(|(at, _)| {
            let head = &code[..at];
            let start = head.rfind(|c: char| !(c.is_ascii_alphanumeric() || c == '_')).map_or(0, |i| i + 1);
            let name = &head[start..];
            (!name.is_empty()).then_some(name)
        })
        .collect()
}

/// Names no vendor header declares, so the generated file has to define them.
fn profile_provided(name: &str) -> bool {
    ["bf16_", "f16_", "f32_scalar_", "avx512_bf16_"].iter().any(|p| name.starts_with(p)) || name == "vaddvq_f16"
}

/// Profile-provided names `code` calls without a definition ahead of the function.
pub(super) fn undefined_helpers(code: &str) -> Vec<&str> {
    let preamble = &code[..code.find("\nvoid ").unwrap_or(0)];
    let defined = |name: &str| {
        preamble.lines().any(|line| {
            (line.starts_with("static inline ") && line.contains(&format!(" {name}(")))
                || line.starts_with(&format!("#define {name}("))
        })
    };
    calls(code).into_iter().filter(|&name| profile_provided(name) && !defined(name)).collect()
}

#[test_case(Target::Neon, ElemType::Float16, "#define vaddvq_f16(v) "; "neon f16")]
#[test_case(Target::Neon, ElemType::BFloat16, "static inline float bf16_reducesum_q(bfloat16x8_t v) {"; "neon bf16")]
#[test_case(Target::Avx512, ElemType::BFloat16, "static inline float avx512_bf16_reducesum(__m256i v) {"; "avx512 bf16")]
fn test_reduced_precision_helpers_are_defined(target: Target, elem: ElemType, definition: &str) {
    let lanes = profile(target, elem).unwrap().primary().lanes;
    let kernel = translate_ir(kernels::exp_sum(elem, lanes).unwrap(), target, &CodegenConfig::default()).unwrap();
    let code = &kernel.code;
    assert!(calls(code).into_iter().any(profile_provided), "{code}");
    assert!(undefined_helpers(code).is_empty(), "undefined {:?} in\n{code}", undefined_helpers(code));

    let at = code.find(definition).unwrap_or_else(|| panic!("missing {definition:?} in\n{code}"));
    assert!(at < code.find("\nvoid expsum_c_").unwrap(), "{code}");
    assert_eq!(code.matches(definition).count(), 1, "{code}");
}

#[test]
fn test_native_profiles_define_nothing() {
    let code = softmax(Target::Neon, ElemType::Float32, &CodegenConfig::default()).code;
    assert!(!code.contains("static inline") && !code.contains("#define"), "{code}");
}

#[test]
fn test_helper_prototypes() {
    let config = CodegenConfig::builder().helper_prototypes(true).build();
    let code = softmax(Target::Neon, ElemType::Float32, &config).code;
    assert!(code.contains("\nfloat _s_exp_f32(float x);\nfloat32x4_t _v_exp_f32(float32x4_t x);\n\nvoid softmax"), "{code}");

    let f16 = profile(Target::Neon, ElemType::Float16).unwrap();
    assert_eq!(helper_prototype(f16, "_v_exp_f32"), "float32x4_t _v_exp_f32(float32x4_t x);");
    let avx = profile(Target::Avx2, ElemType::Float32).unwrap();
    assert_eq!(helper_prototype(avx, "_v_reduce_sum_f32"), "float _v_reduce_sum_f32(__m256 v);");
    assert_eq!(helper_prototype(avx, "_s_pow_f64"), "double _s_pow_f64(double x, double y);");
}

/// `y[j] = x[j] * alpha` over a scalar range.
fn scale() -> IRFunction {
    let lr = LoopRange::scalar("j", "0", "n");
    let mut func = IRFunction::new("Scale", ElemType::Float32).with_params([
        IRParam::slice("x", ElemType::Float32),
        IRParam::slice("y", ElemType::Float32),
        IRParam::scalar("alpha", ElemType::Float32),
        IRParam::int("n"),
    ]);
    let body = func.add_node(OpKind::Loop, NodeOp::For).range(&lr).id();
    let xv = func.add_child(body, OpKind::Load, VecOp::Load).unwrap().reads(["x", "j"]).writes(["xv"]).id();
    let yv = func.add_child(body, OpKind::Elementwise, VecOp::Mul).unwrap().inputs([xv]).reads(["alpha"]).writes(["yv"]).id();
    func.add_child(body, OpKind::Store, VecOp::Store).unwrap().inputs([yv]).reads(["y", "j"]);
    func
}

#[test]
fn test_scalar_range_loop() {
    let emitter = IrEmitter::new(profile(Target::Neon, ElemType::Float32).unwrap(), CodegenConfig::default());
    let code = emitter.render(&scale()).unwrap().code;
    let expected = "void scale_c_f32_neon(float *x, float *y, float *palpha, long *pn) {
  float alpha = *palpha;
  long n = *pn;
  {
    long j = 0;
    for (; j < n; j++) {
      float xv = x[j];
      float yv = xv * alpha;
      y[j] = yv;
    }
  }
}
";
    assert!(code.ends_with(expected), "{code}");
    assert!(!code.contains("lanes"), "{code}");
}

#[test]
#[tracing_test::traced_test]
fn test_integer_slice_max_is_unsupported() {
    let lr = LoopRange::vectorized("i", "n", 4);
    let mut func = IRFunction::new("MaxI32", ElemType::Int32)
        .with_params([IRParam::slice("x", ElemType::Int32), IRParam::int("n")])
        .with_returns(["m"]);
    func.add_node(OpKind::Reduction, VecOp::ReduceMax).reads(["x"]).writes(["m"]).range(&lr);

    let kernel = translate_ir(func, Target::Neon, &CodegenConfig::default()).unwrap();
    assert_eq!(kernel.unsupported_count(), 1, "{}", kernel.code);
    assert!(kernel.code.contains("#error \"simdgen: unsupported: ReduceMax over int32 needs an identity value\""), "{}", kernel.code);
    assert!(kernel.code.contains("*pout_m = m;"), "{}", kernel.code);
    assert!(logs_contain("emitting unsupported marker"));
}

#[test]
fn test_uncomputed_return_is_marked() {
    let func = IRFunction::new("Nothing", ElemType::Float32).with_returns(["r"]);
    let kernel = translate_ir(func, Target::Neon, &CodegenConfig::default()).unwrap();
    assert!(kernel.code.contains("return value r is never computed"), "{}", kernel.code);
}

#[test]
fn test_loop_without_range_fails_validation() {
    let mut func = IRFunction::new("Broken", ElemType::Float32);
    func.add_node(OpKind::Loop, NodeOp::For);
    assert!(matches!(translate_ir(func, Target::Neon, &CodegenConfig::default()), Err(crate::Error::Ir { .. })));
}

/// `tmp[i] = x[i]` in a loop over `i`, then `out[j] = tmp[j] * 2` in a loop over `j`.
fn relay_with_distinct_loop_vars() -> IRFunction {
    let (li, lj) = (LoopRange::vectorized("i", "n", 4), LoopRange::vectorized("j", "n", 4));
    let mut func = IRFunction::new("Relay", ElemType::Float32).with_params([
        IRParam::slice("x", ElemType::Float32),
        IRParam::slice("out", ElemType::Float32),
        IRParam::int("n"),
    ]);
    func.add_node(OpKind::Alloc, NodeOp::Make).writes(["tmp"]).alloc("n", ElemType::Float32);

    let write = func.add_node(OpKind::Loop, NodeOp::For).range(&li).id();
    let a = func.add_child(write, OpKind::Load, VecOp::Load).unwrap().reads(["x", "i"]).writes(["a"]).range(&li).id();
    func.add_child(write, OpKind::Store, VecOp::Store).unwrap().inputs([a]).reads(["tmp", "i"]).range(&li);

    let read = func.add_node(OpKind::Loop, NodeOp::For).range(&lj).id();
    let b = func.add_child(read, OpKind::Load, VecOp::Load).unwrap().reads(["tmp", "j"]).writes(["b"]).range(&lj).id();
    let c = func.add_child(read, OpKind::Elementwise, VecOp::Mul).unwrap().inputs([b]).reads(["2.0f"]).writes(["c"]).range(&lj).id();
    func.add_child(read, OpKind::Store, VecOp::Store).unwrap().inputs([c]).reads(["out", "j"]).range(&lj);
    func
}

#[test]
fn test_merged_loops_index_with_the_declared_variable() {
    let kernel = translate_ir(relay_with_distinct_loop_vars(), Target::Neon, &CodegenConfig::default()).unwrap();
    let code = &kernel.code;
    assert_eq!(kernel.stats.unwrap().eliminated_allocs, 1, "{code}");
    assert_eq!(kernel.unsupported_count(), 0, "{code}");

    assert!(code.contains("long i = 0;"), "{code}");
    assert!(code.contains("float32x4_t a = vld1q_f32(x + i);"), "{code}");
    assert!(code.contains("vst1q_f32(out + i, c);"), "{code}");
    assert!(code.contains("out[i] = c;"), "{code}");
    assert!(!code.contains("tmp[") && !code.contains("tmp +"), "{code}");
    assert!(!code.contains(" j ") && !code.contains("+ j"), "{code}");
    assert!(!code.contains("[j]"), "{code}");
}

fn whole_array_max(params: Vec<IRParam>) -> IRFunction {
    let mut func = IRFunction::new("MaxOf", ElemType::Float32).with_params(params).with_returns(["m"]);
    func.add_node(OpKind::Reduction, VecOp::ReduceMax).reads(["x"]).writes(["m"]);
    func
}

#[test]
fn test_rangeless_reduction_covers_the_whole_slice() {
    let func = whole_array_max(vec![IRParam::slice("x", ElemType::Float32), IRParam::int("n")]);
    let kernel = translate_ir(func, Target::Neon, &CodegenConfig::default()).unwrap();
    let code = &kernel.code;
    assert_eq!(kernel.unsupported_count(), 0, "{code}");
    let expected = "  long n = *pn;
  const long lanes = 4;
  float m;
  {
    long i = 0;
    float32x4_t acc_m = vdupq_n_f32(-INFINITY);
    for (; i + lanes <= n; i += lanes) {
      float32x4_t x_i = vld1q_f32(x + i);
      acc_m = vmaxq_f32(acc_m, x_i);
    }
    m = vmaxvq_f32(acc_m);
    for (; i < n; i++) {
      float x_i = x[i];
      m = x_i > m ? x_i : m;
    }
  }
  *pout_m = m;
";
    assert!(code.contains(expected), "{code}");
}

#[test]
fn test_rangeless_reduction_needs_a_length() {
    let func = whole_array_max(vec![IRParam::slice("x", ElemType::Float32)]);
    let kernel = translate_ir(func, Target::Neon, &CodegenConfig::default()).unwrap();
    // The reduction, and the return value it would have computed.
    assert_eq!(kernel.unsupported_count(), 2, "{}", kernel.code);
    assert!(kernel.code.contains("has no range and no length parameter"), "{}", kernel.code);
    assert!(!kernel.code.contains("lanes"), "{}", kernel.code);
}
