//! Error types for code generation.

use snafu::Snafu;

use simdgen_dtype::ElemType;

use crate::profile::Target;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur during code generation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// No profile is registered for the pair.
    #[snafu(display("no intrinsic profile for {target} / {elem}"))]
    ProfileMissing { target: Target, elem: ElemType },

    /// A registered profile cannot lower the operations kernels rely on.
    #[snafu(display("profile {target} / {elem} is incomplete: missing {missing}"))]
    IncompleteProfile { target: Target, elem: ElemType, missing: String },

    /// Parameter or return types the calling convention cannot express.
    #[snafu(display("unsupported constructs:\n  {}", errors.join("\n  ")))]
    UnsupportedConstructs { errors: Vec<String> },

    /// A statement referenced a name that was never declared.
    #[snafu(display("unknown variable {name:?}"))]
    UnknownVariable { name: String },

    /// Invalid configuration or parameters.
    #[snafu(display("Invalid configuration: {reason}"))]
    InvalidConfig { reason: String },

    /// Error from IR layer.
    #[snafu(display("IR error: {source}"))]
    Ir {
        #[snafu(source)]
        source: simdgen_ir::Error,
    },
}
