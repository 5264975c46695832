use snafu::Snafu;

use crate::{NodeId, OpKind};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Node id does not belong to this function.
    #[snafu(display("unknown node {id}"))]
    UnknownNode { id: NodeId },

    /// Children can only be nested under loops and allocations.
    #[snafu(display("node {id} of kind {kind} cannot hold children"))]
    NotAContainer { id: NodeId, kind: OpKind },

    /// A loop was declared without an iteration range.
    #[snafu(display("loop {id} has no loop range"))]
    MissingLoopRange { id: NodeId },

    /// Loop range fields are inconsistent.
    #[snafu(display("invalid loop range: {reason}"))]
    InvalidLoopRange { reason: String },
}
