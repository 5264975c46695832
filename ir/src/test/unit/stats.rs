//! Fusion statistics tests.

use crate::kernels;
use crate::{ElemType, FusionStats, apply_fusion_rules, compute_fusion_stats, eliminate_allocations};

#[test]
fn test_unfused_softmax_counts_every_pass() {
    let func = kernels::softmax(ElemType::Float32, 4).unwrap();
    let stats = compute_fusion_stats(&func);
    assert_eq!(stats, FusionStats { original_passes: 4, fused_passes: 4, eliminated_allocs: 0, fusion_groups: 0 });
}

#[test]
fn test_fused_softmax_saves_two_passes() {
    let mut func = kernels::softmax(ElemType::Float32, 4).unwrap();
    apply_fusion_rules(&mut func);
    eliminate_allocations(&mut func);

    let stats = compute_fusion_stats(&func);
    assert_eq!(stats.original_passes, 4);
    assert_eq!(stats.fused_passes, 2);
    assert_eq!(stats.eliminated_allocs, 1);
    assert_eq!(stats.fusion_groups, 4);
    assert_eq!(stats.passes_saved(), 2);
}

#[test]
fn test_rule_groups_alone_save_nothing() {
    // Groups inside a single loop do not remove memory passes.
    let mut func = kernels::softmax(ElemType::Float32, 4).unwrap();
    apply_fusion_rules(&mut func);

    let stats = compute_fusion_stats(&func);
    assert_eq!(stats.fused_passes, stats.original_passes);
    assert_eq!(stats.fusion_groups, 3);
}

#[test]
fn test_display() {
    let stats = FusionStats { original_passes: 4, fused_passes: 2, eliminated_allocs: 1, fusion_groups: 4 };
    assert_eq!(stats.to_string(), "4 -> 2 passes (4 groups, 1 allocs eliminated)");
}
