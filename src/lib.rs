//! Reverse/forward-mode automatic differentiation over a dynamic dataflow
//! graph, with activation checkpointing and on-demand recomputation.
//!
//! The distinguishing feature of this engine is that selected nodes can be
//! marked as *checkpoints*: their inputs are snapshotted, their own forward
//! value may later be discarded, and it is transparently regenerated during
//! the backward pass by re-invoking the forward evaluator with the restored
//! inputs (and, for stochastic ops, a restored RNG state).

pub mod checkpoint;
pub mod error;
pub mod graph;
pub(crate) mod hooks;
pub mod ops;
pub mod tensor;
pub mod tracer;

mod backward;
mod forward;

pub use backward::backward;
pub use checkpoint::{
    auto_checkpoint_by_depth, auto_checkpoint_every_n, capture_checkpoint_snapshots,
    compute_forward_values, ensure_value_present, evict_non_checkpoint_values,
    evict_non_checkpoint_values_with_policy, mark_node_checkpoint, recompute_subgraph,
    CheckpointOptions, DeletePolicy,
};
pub use error::{GraphError, GraphResult, NodeLabel};
pub use forward::jvp;
pub use graph::{topo_from, zero_grad, Node, NodeId, NodeRef};
pub use hooks::{pop_node_created_hook, push_node_created_hook, Hook};
pub use ops::Op;
pub use tensor::Tensor;
pub use tracer::{make_tracer, CaptureGuard, Tracer};

/// Builds a leaf node holding a fixed tensor that never requires grad.
pub fn constant(value: Tensor, name: Option<&str>) -> NodeRef {
    Node::new_leaf(value, false, name.map(str::to_owned))
}

/// Builds a leaf node holding a tensor that requires grad (a trainable
/// parameter).
pub fn param(value: Tensor, name: Option<&str>) -> NodeRef {
    Node::new_leaf(value, true, name.map(str::to_owned))
}

/// Builds a leaf node with an explicit `requires_grad` setting.
pub fn make_tensor(value: Tensor, name: Option<&str>, requires_grad: bool) -> NodeRef {
    Node::new_leaf(value, requires_grad, name.map(str::to_owned))
}
