use thiserror::Error;

use crate::engine::NodeId;

/// Errors raised when the graph API is misused.
///
/// Numerical trouble (division by zero, `exp` overflow) is never reported
/// here; it flows through the graph as `inf`/`NaN`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("node {id:?} belongs to epoch {node_epoch}, but the graph is at epoch {graph_epoch}; was it used after `Graph::clear`?")]
    StaleNode {
        id: NodeId,
        node_epoch: u64,
        graph_epoch: u64,
    },

    #[error("node {id:?} does not exist in this graph")]
    UnknownNode { id: NodeId },

    #[error("node {id:?} was produced by an operation that is not on the tape")]
    UnrecordedNode { id: NodeId },

    #[error("operands of `{op}` belong to different graphs")]
    ForeignGraph { op: &'static str },

    #[error("shape mismatch in {operation}: expected {expected} inputs, got {actual}")]
    ShapeMismatch {
        operation: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{operation} needs at least one input")]
    EmptyInput { operation: &'static str },
}

pub type Result<T> = std::result::Result<T, Error>;
