//! End-to-end driver tests.

use proptest::prelude::*;

use simdgen_dtype::ElemType;
use simdgen_ir::test::property::generators::arb_pipeline;
use simdgen_ir::{FusionStats, IRFunction, VecOp, analyze, apply_fusion_rules, eliminate_allocations, kernels};

use crate::config::{CodegenConfig, FusionMode};
use crate::direct::ast::{Expr, FuncDecl, Param, Stmt, TypeRef};
use crate::pipeline::{translate_direct, translate_ir};
use crate::profile::Target;
use crate::Error;

fn softmax() -> IRFunction {
    kernels::softmax(ElemType::Float32, 4).unwrap()
}

#[test]
fn test_softmax_stats() {
    let kernel = translate_ir(softmax(), Target::Neon, &CodegenConfig::default()).unwrap();
    let stats = kernel.stats.unwrap();
    assert_eq!(stats, FusionStats { original_passes: 4, fused_passes: 2, eliminated_allocs: 1, fusion_groups: 4 });
    assert_eq!(stats.passes_saved(), 2);
    assert!(!kernel.code.contains("float shifted[size];"), "{}", kernel.code);
}

#[test]
fn test_five_pass_softmax() {
    let func = kernels::softmax_passes(ElemType::Float32, 4).unwrap();
    let kernel = translate_ir(func, Target::Neon, &CodegenConfig::default()).unwrap();
    let code = &kernel.code;
    assert_eq!(kernel.unsupported_count(), 0, "{code}");
    assert_eq!(kernel.stats.unwrap(), FusionStats { original_passes: 5, fused_passes: 3, eliminated_allocs: 1, fusion_groups: 4 });

    // Shift and exp run as one loop; sum and normalize keep their own.
    assert_eq!(code.matches("i += lanes").count(), 4, "{code}");
    assert!(!code.contains("shifted[") && !code.contains("shifted +"), "{code}");

    let at = |line: &str| code.find(line).unwrap_or_else(|| panic!("missing {line:?} in\n{code}"));
    let reduced = at("expSum = vaddvq_f32(acc_expSum);");
    let reciprocal = at("float invSum = 1.0f / expSum;");
    let normalized = at("float32x4_t v7 = vmulq_f32(v6, vdupq_n_f32(invSum));");
    assert!(reduced < reciprocal && reciprocal < normalized, "{code}");
    assert!(code.contains("float v7 = v6 * invSum;"), "{code}");
}

#[test]
fn test_disabled_fusion_keeps_every_pass() {
    let config = CodegenConfig::builder().fusion(FusionMode::Disabled).build();
    let kernel = translate_ir(softmax(), Target::Neon, &config).unwrap();
    let stats = kernel.stats.unwrap();
    assert_eq!(stats.fusion_groups, 0);
    assert_eq!(stats.eliminated_allocs, 0);
    assert_eq!(stats.fused_passes, stats.original_passes);
    assert!(kernel.code.contains("float shifted[size];"), "{}", kernel.code);
}

#[test]
#[tracing_test::traced_test]
fn test_report_stats_logs() {
    let config = CodegenConfig::builder().report_stats(true).build();
    translate_ir(softmax(), Target::Avx2, &config).unwrap();
    assert!(logs_contain("fusion stats"));
    assert!(logs_contain("4 -> 2 passes"));
}

#[test]
#[tracing_test::traced_test]
fn test_stats_are_quiet_by_default() {
    translate_ir(softmax(), Target::Neon, &CodegenConfig::default()).unwrap();
    assert!(!logs_contain("fusion stats"));
}

#[test]
fn test_missing_profile() {
    let func = kernels::softmax(ElemType::Float64, 4).unwrap();
    match translate_ir(func, Target::Avx2, &CodegenConfig::default()) {
        Err(Error::ProfileMissing { target, elem }) => {
            assert_eq!(target, Target::Avx2);
            assert_eq!(elem, ElemType::Float64);
        }
        other => panic!("expected ProfileMissing, got {other:?}"),
    }
}

#[test]
fn test_translate_direct() {
    let decl = FuncDecl {
        name: "BaseCopy".into(),
        params: vec![Param::new("src", TypeRef::slice_of(TypeRef::Elem)), Param::new("dst", TypeRef::slice_of(TypeRef::Elem))],
        returns: vec![],
        body: vec![Stmt::Expr(Expr::op(VecOp::Store, [
            Expr::op(VecOp::Load, [Expr::ident("src")]),
            Expr::ident("dst"),
        ]))],
    };
    let kernel = translate_direct(&decl, Target::Avx512, ElemType::Float32, &CodegenConfig::default()).unwrap();
    assert_eq!(kernel.entry_point, "copy_c_f32_avx512");
    assert_eq!(kernel.target, Target::Avx512);
    assert!(kernel.stats.is_none());
    assert!(kernel.code.contains("_mm512_storeu_ps(dst, _mm512_loadu_ps(src));"), "{}", kernel.code);
}

/// Buffer names of the allocations the fusion passes remove from `func`.
fn eliminated_buffers(func: &IRFunction) -> Vec<String> {
    let mut fused = func.clone();
    analyze(&mut fused);
    apply_fusion_rules(&mut fused);
    eliminate_allocations(&mut fused);
    fused
        .fusion_groups
        .iter()
        .flat_map(|g| g.eliminated_allocs.iter())
        .filter_map(|&a| fused[a].output().map(str::to_string))
        .collect()
}

proptest! {
    #[test]
    fn translation_is_deterministic(func in arb_pipeline()) {
        let config = CodegenConfig::default();
        let first = translate_ir(func.clone(), Target::Neon, &config).unwrap();
        let second = translate_ir(func, Target::Neon, &config).unwrap();
        prop_assert_eq!(first.code, second.code);
        prop_assert_eq!(first.required_helpers, second.required_helpers);
        prop_assert_eq!(first.stats, second.stats);
    }

    #[test]
    fn eliminated_buffers_are_never_touched(func in arb_pipeline()) {
        let buffers = eliminated_buffers(&func);
        let kernel = translate_ir(func, Target::Neon, &CodegenConfig::default()).unwrap();
        let stats = kernel.stats.unwrap();
        prop_assert_eq!(stats.eliminated_allocs, buffers.len());
        for name in &buffers {
            prop_assert!(!kernel.code.contains(&format!("{name}[")), "{} indexed in\n{}", name, kernel.code);
            prop_assert!(!kernel.code.contains(&format!("{name} + ")), "{} addressed in\n{}", name, kernel.code);
        }
    }

    #[test]
    fn fusion_never_adds_passes(func in arb_pipeline()) {
        let kernel = translate_ir(func, Target::Avx512, &CodegenConfig::default());
        // AVX512 has no f64 profile.
        if let Ok(kernel) = kernel {
            let stats = kernel.stats.unwrap();
            prop_assert!(stats.fused_passes <= stats.original_passes, "{}", stats);
        }
    }
}
