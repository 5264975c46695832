//! End-to-end translation drivers.
//!
//! ```ignore
//! use simdgen_codegen::{config::CodegenConfig, pipeline, profile::Target};
//! use simdgen_dtype::ElemType;
//!
//! let func = simdgen_ir::kernels::softmax(ElemType::Float32, 4)?;
//! let kernel = pipeline::translate_ir(func, Target::Neon, &CodegenConfig::default())?;
//! println!("{}", kernel.code);
//! ```

use snafu::ResultExt;
use tracing::{debug, info};

use simdgen_dtype::ElemType;
use simdgen_ir::{IRFunction, analyze, apply_fusion_rules, compute_fusion_stats, eliminate_allocations};

use crate::config::CodegenConfig;
use crate::direct::Translator;
use crate::direct::ast::FuncDecl;
use crate::error::{IrSnafu, Result};
use crate::ir::IrEmitter;
use crate::profile::{Target, profile};
use crate::{RenderedKernel, Renderer};

/// Run the fusion passes (unless disabled) over `func` and emit it for `target`.
///
/// The profile is looked up for the function's element type; fusion never fails, so
/// the only errors are a missing profile and a malformed function.
pub fn translate_ir(mut func: IRFunction, target: Target, config: &CodegenConfig) -> Result<RenderedKernel> {
    let profile = profile(target, func.elem_type)?;
    func.validate().context(IrSnafu)?;

    if config.fusion.is_enabled() {
        analyze(&mut func);
        apply_fusion_rules(&mut func);
        let eliminated = eliminate_allocations(&mut func);
        debug!(function = %func.name, groups = func.fusion_groups.len(), eliminated, "fusion passes done");
    } else {
        debug!(function = %func.name, "fusion disabled");
    }

    let stats = compute_fusion_stats(&func);
    if config.report_stats {
        info!(function = %func.name, %target, %stats, saved = stats.passes_saved(), "fusion stats");
    }

    let kernel = IrEmitter::new(profile, config.clone()).render(&func)?;
    Ok(kernel.with_stats(stats))
}

/// Translate a statement-subset function for `(target, elem)`.
pub fn translate_direct(decl: &FuncDecl, target: Target, elem: ElemType, config: &CodegenConfig) -> Result<RenderedKernel> {
    let profile = profile(target, elem)?;
    Translator::new(profile, config.clone()).render(decl)
}
