//! Error taxonomy for the engine (spec §7).

use std::fmt;

use crate::graph::NodeId;

/// Identifies a node in error messages without requiring a live reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeLabel {
    pub id: NodeId,
    pub op: &'static str,
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node #{} ({})", self.id.0, self.op)
    }
}

/// Fatal errors raised by the reverse-mode engine and the checkpoint subsystem.
///
/// Non-fatal conditions (missing VJP rule, forward-evaluation exceptions during
/// `compute_forward_values`) are not represented here; they are logged and the
/// caller continues, per spec §7.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A parent's activation was empty during backward and the parent was not
    /// a checkpoint, so it cannot be recomputed.
    #[error("missing activation for {producer} required by {consumer}: parent is not a checkpoint")]
    MissingActivation {
        consumer: NodeLabel,
        producer: NodeLabel,
    },

    /// `recompute_subgraph` could not restore a node's value.
    #[error("recompute failed for {node}: {reason}")]
    RecomputeFailed { node: NodeLabel, reason: String },

    /// A VJP rule raised while accumulating gradients.
    #[error("vjp rule for {node} failed: {source}")]
    VjpException {
        node: NodeLabel,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub type GraphResult<T> = Result<T, GraphError>;
