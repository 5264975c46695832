//! Core traits for code generation.

use simdgen_ir::VecOp;

use crate::profile::Target;
use crate::{RenderedKernel, Result};

/// Frontend-agnostic code generation interface.
///
/// Implemented once per input form: the fused IR ([`crate::ir::IrEmitter`]) and the
/// statement subset ([`crate::direct::Translator`]). Both lower through the same
/// profile, so they agree on every calling convention.
pub trait Renderer {
    /// What the renderer consumes.
    type Input: ?Sized;

    /// Render one kernel to C.
    ///
    /// Profile gaps do not fail the render; they surface as `#error` lines in the code.
    fn render(&self, input: &Self::Input) -> Result<RenderedKernel>;

    /// Target the renderer emits for.
    fn target(&self) -> Target;

    /// Whether `op` lowers without an unsupported marker on this renderer's profile.
    fn supports_op(&self, op: VecOp) -> bool;
}
