//! Types for code generation.

use std::collections::BTreeSet;

use simdgen_dtype::ElemType;
use simdgen_ir::FusionStats;

use crate::profile::Target;

/// A generated C kernel.
#[derive(Debug, Clone)]
pub struct RenderedKernel {
    /// The generated C source.
    pub code: String,

    /// Name of the emitted function, e.g. `softmax_c_f32_neon`.
    pub entry_point: String,

    /// Source-level kernel name.
    pub name: String,

    pub target: Target,
    pub elem: ElemType,

    /// `_v_*` / `_s_*` math helpers the code calls; the caller links their definitions.
    pub required_helpers: BTreeSet<String>,

    /// Fusion statistics, for kernels that went through the IR passes.
    pub stats: Option<FusionStats>,
}

impl RenderedKernel {
    pub fn new(code: String, entry_point: String, name: String, target: Target, elem: ElemType) -> Self {
        Self { code, entry_point, name, target, elem, required_helpers: BTreeSet::new(), stats: None }
    }

    pub fn with_helpers(mut self, helpers: BTreeSet<String>) -> Self {
        self.required_helpers = helpers;
        self
    }

    pub fn with_stats(mut self, stats: FusionStats) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Number of `#error` markers in the code; zero means every op lowered.
    pub fn unsupported_count(&self) -> usize {
        self.code.lines().filter(|line| line.starts_with("#error")).count()
    }
}

/// Generated function name: `lower(name)` without a leading `base`, then
/// `_c_<elem suffix>_<target>`.
pub fn entry_point_name(name: &str, elem: ElemType, target: Target) -> String {
    let lower = name.to_lowercase();
    let base = lower.strip_prefix("base").unwrap_or(&lower);
    format!("{base}_c_{}_{}", elem.suffix(), target.lower())
}
