//! Checkpoint subsystem (spec §4.5): marking, snapshotting, live-range
//! protection, eviction, recursive recomputation, and the auto-marking
//! heuristics.

mod auto;
mod base;
mod rng;

pub use auto::{auto_checkpoint_by_depth, auto_checkpoint_every_n};
pub use base::{
    capture_checkpoint_snapshots, compute_forward_values, ensure_value_present,
    evict_non_checkpoint_values, evict_non_checkpoint_values_with_policy, mark_node_checkpoint,
    recompute_subgraph, CheckpointOptions, DeletePolicy,
};
