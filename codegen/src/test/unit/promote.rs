//! Promotion and widened-accumulator tests.

use std::collections::HashMap;

use proptest::prelude::*;

use simdgen_dtype::ElemType;
use simdgen_ir::VecOp;

use crate::emit::{Emit, Unsupported};
use crate::profile::{Target, profile};
use crate::promote::{self, Promoted, WidenedAccumulator};
use crate::select::Selector;

/// Evaluate a nested call expression over lane vectors.
///
/// Only understands the handful of NEON conversions and the exp helper; precision
/// changes are modeled as identity.
fn eval(expr: &str, env: &HashMap<&str, Vec<f32>>) -> Vec<f32> {
    let expr = expr.trim();
    let Some(open) = expr.find('(') else {
        return env[expr].clone();
    };
    let name = &expr[..open];
    let inner = &expr[open + 1..expr.len() - 1];

    let mut args = Vec::new();
    let (mut depth, mut start) = (0usize, 0usize);
    for (i, c) in inner.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                args.push(eval(&inner[start..i], env));
                start = i + 1;
            }
            _ => {}
        }
    }
    args.push(eval(&inner[start..], env));

    match name {
        "vget_low_f16" => args[0][..args[0].len() / 2].to_vec(),
        "vget_high_f16" => args[0][args[0].len() / 2..].to_vec(),
        "vcvt_f32_f16" | "vcvt_f16_f32" => args[0].clone(),
        "vcombine_f16" => args[0].iter().chain(&args[1]).copied().collect(),
        "_v_exp_f32" => args[0].iter().map(|x| x.exp()).collect(),
        "_v_log_f32" => args[0].iter().map(|x| x.ln()).collect(),
        other => panic!("unknown call {other}"),
    }
}

proptest! {
    #[test]
    fn promoted_exp_matches_lanewise_exp(lanes in prop::collection::vec(-4.0f32..4.0, 8)) {
        let mut sel = Selector::new(profile(Target::Neon, ElemType::Float16).unwrap());
        let code = sel.unary(VecOp::Exp, "x").unwrap();

        let env = HashMap::from([("x", lanes.clone())]);
        let got = eval(&code, &env);
        prop_assert_eq!(got.len(), 8);
        for (g, x) in got.iter().zip(&lanes) {
            prop_assert!((g - x.exp()).abs() <= 1e-5 * x.exp().max(1.0), "{code}: {g} vs exp({x})");
        }
    }
}

#[test]
fn test_promoted_log_keeps_lane_order() {
    let mut sel = Selector::new(profile(Target::Neon, ElemType::Float16).unwrap());
    let code = sel.unary(VecOp::Log, "x").unwrap();
    let lanes: Vec<f32> = (1..=8).map(|i| i as f32).collect();
    let got = eval(&code, &HashMap::from([("x", lanes.clone())]));
    let expected: Vec<f32> = lanes.iter().map(|x| x.ln()).collect();
    assert_eq!(got, expected, "{code}");
}

#[test]
fn test_whole_promotion_on_avx512_bf16() {
    let p = profile(Target::Avx512, ElemType::BFloat16).unwrap();
    let promoted = promote::promote(p, "x").unwrap();
    let Promoted::Whole(inner) = &promoted else {
        panic!("expected whole promotion, got {promoted:?}");
    };
    let back = promote::demote(p, promoted.clone()).unwrap();
    assert!(back.contains(inner.as_str()), "{back}");

    // No halves to split into.
    assert!(promote::split(p, "x").is_err());
    assert!(promote::demote_combine(p, "a", "b").is_err());
}

#[test]
fn test_mismatched_promoted_form_is_unsupported() {
    let p = profile(Target::Neon, ElemType::Float16).unwrap();
    let Unsupported(reason) = promote::demote(p, Promoted::Whole("x".into())).unwrap_err();
    assert!(reason.contains("does not match"), "{reason}");
}

#[test]
fn test_native_profile_has_no_promotion() {
    let p = profile(Target::Neon, ElemType::Float32).unwrap();
    assert!(promote::promote(p, "x").is_err());
    assert_eq!(promote::scalar_promote(p, "x[i]"), "x[i]");
    assert_eq!(promote::scalar_temp_type(p), "float");
    assert!(WidenedAccumulator::new(p, "acc").is_none());
}

#[test]
fn test_scalar_promotion() {
    let f16 = profile(Target::Neon, ElemType::Float16).unwrap();
    assert_eq!(promote::scalar_promote(f16, "x[i]"), "f16_scalar_to_f32(x[i])");
    assert_eq!(promote::scalar_temp_type(f16), "float");

    let bf16 = profile(Target::Neon, ElemType::BFloat16).unwrap();
    assert_eq!(promote::scalar_promote(bf16, "x[i]"), "bf16_scalar_to_f32(x[i])");
}

#[test]
fn test_widened_accumulator() {
    let p = profile(Target::Neon, ElemType::BFloat16).unwrap();
    let acc = WidenedAccumulator::new(p, "acc").unwrap();

    assert_eq!(
        acc.declare(),
        vec![Emit::stmt("float32x4_t acc_lo = vdupq_n_f32(0.0f)"), Emit::stmt("float32x4_t acc_hi = vdupq_n_f32(0.0f)")]
    );
    assert_eq!(
        acc.mul_add(p, "a", "b").unwrap(),
        vec![
            Emit::stmt("acc_lo = vfmaq_f32(acc_lo, bf16_promote_lo(a), bf16_promote_lo(b))"),
            Emit::stmt("acc_hi = vfmaq_f32(acc_hi, bf16_promote_hi(a), bf16_promote_hi(b))"),
        ]
    );
    assert_eq!(
        acc.add(p, "v").unwrap(),
        vec![
            Emit::stmt("acc_lo = vaddq_f32(acc_lo, bf16_promote_lo(v))"),
            Emit::stmt("acc_hi = vaddq_f32(acc_hi, bf16_promote_hi(v))"),
        ]
    );
    assert_eq!(acc.combined(p).unwrap(), "bf16_combine(bf16_demote_half(acc_lo), bf16_demote_half(acc_hi))");
    assert_eq!(
        acc.materialize(p, "acc").unwrap(),
        Emit::stmt("bfloat16x8_t acc = bf16_combine(bf16_demote_half(acc_lo), bf16_demote_half(acc_hi))")
    );
}
