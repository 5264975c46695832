//! Memory-pass accounting for fusion diagnostics.

use derive_more::Display;

use crate::{IRFunction, OpKind};

/// Estimated memory passes before and after fusion.
///
/// A pass is a loop or an allocation. Each group saves all but one of its loops, and
/// every eliminated allocation saves one more.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
#[display("{original_passes} -> {fused_passes} passes ({fusion_groups} groups, {eliminated_allocs} allocs eliminated)")]
pub struct FusionStats {
    pub original_passes: usize,
    pub fused_passes: usize,
    pub eliminated_allocs: usize,
    pub fusion_groups: usize,
}

impl FusionStats {
    pub fn passes_saved(&self) -> usize {
        self.original_passes - self.fused_passes
    }
}

pub fn compute_fusion_stats(func: &IRFunction) -> FusionStats {
    let original_passes = func.count_kind(OpKind::Loop) + func.count_kind(OpKind::Alloc);

    let mut merged_loops = 0;
    let mut eliminated_allocs = 0;
    for group in &func.fusion_groups {
        let loops = group.members.iter().filter(|&&m| func[m].kind == OpKind::Loop).count();
        merged_loops += loops.saturating_sub(1);
        eliminated_allocs += group.eliminated_allocs.len();
    }

    FusionStats {
        original_passes,
        fused_passes: original_passes.saturating_sub(merged_loops + eliminated_allocs),
        eliminated_allocs,
        fusion_groups: func.fusion_groups.len(),
    }
}
