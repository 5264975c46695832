//! C code generation for vectorized kernels.
//!
//! Kernels arrive either as a fused [`simdgen_ir::IRFunction`] or as the statement subset
//! in [`direct::ast`], and leave as C source calling the target's intrinsics directly.
//!
//! # Architecture
//!
//! - **Profiles**: per (target, element type) intrinsic tables and calling conventions
//! - **Selection**: one abstract op at a time to a C expression ([`select::Selector`])
//! - **Renderers**: [`ir::IrEmitter`] and [`direct::Translator`], both behind [`Renderer`]
//! - **Pipeline**: analyze, fuse, eliminate, emit ([`pipeline`])
//!
//! # Usage
//!
//! ```ignore
//! use simdgen_codegen::{config::CodegenConfig, pipeline, profile::Target};
//!
//! let func = simdgen_ir::kernels::exp_sum(ElemType::Float32, 4)?;
//! let kernel = pipeline::translate_ir(func, Target::Neon, &CodegenConfig::default())?;
//! ```

pub mod config;
pub mod direct;
pub mod emit;
pub mod error;
pub mod ir;
pub mod pipeline;
pub mod profile;
pub mod promote;
pub mod select;
pub mod tile;
pub mod traits;
pub mod types;

#[cfg(test)]
pub mod test;

pub use error::*;
pub use traits::*;
pub use types::*;
