//! Profile table tests.

use std::str::FromStr;

use test_case::test_case;

use simdgen_dtype::ElemType;
use simdgen_ir::VecOp;

use crate::Error;
use crate::emit::identifiers;
use crate::profile::{FmaArgOrder, Profile, ProfileTable, Target, Tier, TierSpec, profile};

#[test]
fn test_every_profile_validates() {
    let table = ProfileTable::global();
    assert_eq!(table.len(), 18);
    for p in table.iter() {
        if let Err(e) = p.validate() {
            panic!("{} / {}: {e}", p.target, p.elem);
        }
    }
    assert!(table.validate().is_ok());
}

#[test_case(Target::Neon, ElemType::Float32, FmaArgOrder::AccFirst)]
#[test_case(Target::Neon, ElemType::Int64, FmaArgOrder::AccFirst)]
#[test_case(Target::Avx2, ElemType::Float32, FmaArgOrder::AccLast)]
#[test_case(Target::Avx512, ElemType::BFloat16, FmaArgOrder::AccLast)]
#[test_case(Target::SveLinux, ElemType::Float64, FmaArgOrder::AccFirst)]
fn test_fma_order_per_target(target: Target, elem: ElemType, order: FmaArgOrder) {
    assert_eq!(profile(target, elem).unwrap().fma_arg_order, order);
}

#[test_case(Target::Avx2, ElemType::UInt8)]
#[test_case(Target::SveDarwin, ElemType::Float16)]
#[test_case(Target::Avx512, ElemType::Int64)]
fn test_missing_profile_is_an_error(target: Target, elem: ElemType) {
    match profile(target, elem) {
        Err(Error::ProfileMissing { target: t, elem: e }) => {
            assert_eq!((t, e), (target, elem));
        }
        other => panic!("expected ProfileMissing, got {other:?}"),
    }
}

#[test]
fn test_incomplete_profile_names_missing_ops() {
    let p = Profile::builder()
        .target(Target::Neon)
        .elem(ElemType::Float32)
        .include("#include <arm_neon.h>")
        .c_type("float")
        .scalar_type("float")
        .tiers(vec![TierSpec::fixed(Tier::Q, 4, "float32x4_t", "uint32x4_t")])
        .intrinsics([((VecOp::Load, Tier::Q), "vld1q_f32"), ((VecOp::Store, Tier::Q), "vst1q_f32")].into())
        .fma_arg_order(FmaArgOrder::AccFirst)
        .math_suffix("f32")
        .build();

    let err = p.validate().unwrap_err();
    let msg = err.to_string();
    assert!(matches!(err, Error::IncompleteProfile { .. }));
    assert!(msg.contains("Set@q"), "{msg}");
    assert!(msg.contains("MulAdd@q"), "{msg}");
    assert!(!msg.contains("Load@q"), "{msg}");
}

#[test]
fn test_narrow_tier_lookup() {
    let f16 = profile(Target::Neon, ElemType::Float16).unwrap();
    assert_eq!(f16.primary().tier, Tier::Q);
    assert_eq!(f16.intrinsic(VecOp::Add, Tier::D), Some("vadd_f16"));
    // No d-register horizontal sum.
    assert_eq!(f16.intrinsic(VecOp::ReduceSum, Tier::D), None);
}

#[test]
fn test_sve_lanes() {
    let linux = profile(Target::SveLinux, ElemType::Float32).unwrap();
    assert_eq!(linux.primary().lanes_expr(), "svcntw()");
    assert!(linux.primary().is_dynamic());

    let darwin = profile(Target::SveDarwin, ElemType::Float64).unwrap();
    assert_eq!(darwin.primary().lanes_expr(), "8");
    assert_eq!(darwin.func_attrs, Some("__arm_streaming"));
    assert_eq!(linux.func_attrs, None);
}

#[test_case("NEON", Target::Neon)]
#[test_case("AVX2", Target::Avx2)]
#[test_case("AVX512", Target::Avx512)]
#[test_case("SVE_DARWIN", Target::SveDarwin)]
#[test_case("SVE_LINUX", Target::SveLinux)]
fn test_target_names(name: &str, target: Target) {
    assert_eq!(Target::from_str(name).unwrap(), target);
    assert_eq!(target.to_string(), name);
    assert_eq!(target.lower(), name.to_lowercase());
}

#[test]
fn test_inline_helpers_only_call_earlier_entries() {
    for p in ProfileTable::global().iter() {
        for (i, helper) in p.inline_helpers.iter().enumerate() {
            let later = &p.inline_helpers[i + 1..];
            for name in identifiers(helper.definition) {
                assert!(!later.iter().any(|h| h.name == name), "{} / {}: {} calls {name} before it is defined", p.target, p.elem, helper.name);
            }
        }
    }
}

#[test]
fn test_inline_helpers_for_pulls_dependencies() {
    let bf16 = profile(Target::Neon, ElemType::BFloat16).unwrap();
    let names = |code: &str| bf16.inline_helpers_for(code).iter().map(|h| h.name).collect::<Vec<_>>();
    assert_eq!(names("x = bf16_add_q(a, b);"), ["bf16_promote_lo", "bf16_promote_hi", "bf16_demote_half", "bf16_combine", "bf16_add_q"]);
    assert_eq!(names("v = bf16_dup_q(1.0f);"), ["f32_scalar_to_bf16", "bf16_dup_q"]);
    assert!(names("x = bf16_add_qx(a);").is_empty());

    let f16 = profile(Target::Neon, ElemType::Float16).unwrap();
    let names = f16.inline_helpers_for("float s = vaddvq_f16(acc);").iter().map(|h| h.name).collect::<Vec<_>>();
    assert_eq!(names, ["vaddvq_f16"]);

    assert!(profile(Target::Neon, ElemType::Float32).unwrap().inline_helpers.is_empty());
}
