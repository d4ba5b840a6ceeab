//! Marking, snapshotting, eviction, and recomputation (spec §4.5).

use std::collections::{HashSet, VecDeque};

use derive_new::new;

use super::rng;
use crate::error::{GraphError, GraphResult};
use crate::graph::{topo_from, NodeId, NodeRef, SavedInputSlot};
use crate::ops::forward_eval_node;
use crate::tensor::Tensor;

/// Options controlling how a node is marked as a checkpoint.
#[derive(Debug, Clone, Copy, Default, new)]
pub struct CheckpointOptions {
    pub save_rng: bool,
}

/// Opaque policy passed through to the external careful-deletion layer;
/// this crate's own eviction logic treats every variant identically (spec
/// §6: "opaque enum passed through").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletePolicy {
    #[default]
    Immediate,
    Deferred,
}

/// Marks `node` as a checkpoint. Idempotent: calling this twice on the same
/// node re-snapshots but does not change its checkpoint status a second
/// time in any observable way beyond refreshed snapshots.
pub fn mark_node_checkpoint(node: &NodeRef, options: CheckpointOptions) {
    let mut n = node.borrow_mut();
    n.is_checkpoint = true;

    let inputs = n.inputs.clone();
    n.saved_input_tensors = inputs
        .iter()
        .map(|p| p.borrow().value.clone())
        .collect();
    n.saved_inputs = inputs
        .iter()
        .map(|p| {
            if p.borrow().value.size() {
                SavedInputSlot::Recorded
            } else {
                SavedInputSlot::Empty
            }
        })
        .collect();

    if options.save_rng {
        n.has_saved_rng = true;
        n.saved_rng_blob = Some(rng::capture());
    }
}

/// After a complete forward pass, refreshes every checkpoint's saved input
/// tensors with fresh copies of its parents' current values.
pub fn capture_checkpoint_snapshots(root: &NodeRef) {
    for node in topo_from(root) {
        let is_checkpoint = node.borrow().is_checkpoint;
        if !is_checkpoint {
            continue;
        }
        let inputs = node.borrow().inputs.clone();
        let mut n = node.borrow_mut();
        n.saved_input_tensors = inputs.iter().map(|p| p.borrow().value.clone()).collect();
        n.saved_inputs = inputs
            .iter()
            .map(|p| {
                if p.borrow().value.size() {
                    SavedInputSlot::Recorded
                } else {
                    SavedInputSlot::Empty
                }
            })
            .collect();
    }
}

/// Two-phase protect/sweep eviction (spec §4.5).
pub fn evict_non_checkpoint_values(root: &NodeRef) {
    evict_non_checkpoint_values_with_policy(root, DeletePolicy::Immediate)
}

/// As [`evict_non_checkpoint_values`], but accepts a [`DeletePolicy`] for
/// alignment with an external careful-deletion layer; this crate's eviction
/// behavior does not vary by policy.
pub fn evict_non_checkpoint_values_with_policy(root: &NodeRef, _policy: DeletePolicy) {
    let protected = protected_set(root);

    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(root.clone());
    visited.insert(root.borrow().id);

    while let Some(node) = queue.pop_front() {
        let id = node.borrow().id;
        if !protected.contains(&id) {
            let mut n = node.borrow_mut();
            n.value = Tensor::empty();
            n.tape.clear();
        }
        let inputs = node.borrow().inputs.clone();
        for parent in inputs {
            let pid = parent.borrow().id;
            if visited.insert(pid) {
                queue.push_back(parent);
            }
        }
    }
}

/// Phase 1: BFS from `root`, protecting every node reached over a
/// non-checkpoint path. The root's own value is always protected (even if
/// the root is itself a checkpoint); descent never continues past a
/// checkpoint node, so a checkpoint's ancestors are left unprotected and
/// may be evicted (spec §4.5: "Everything behind a checkpoint is freed").
fn protected_set(root: &NodeRef) -> HashSet<NodeId> {
    let root_id = root.borrow().id;
    let mut protected = HashSet::new();
    protected.insert(root_id);

    let mut visited = HashSet::new();
    visited.insert(root_id);

    let mut queue = VecDeque::new();
    if !root.borrow().is_checkpoint {
        queue.push_back(root.clone());
    }

    while let Some(node) = queue.pop_front() {
        let inputs = node.borrow().inputs.clone();
        for parent in inputs {
            let pid = parent.borrow().id;
            if !visited.insert(pid) {
                continue;
            }
            if parent.borrow().is_checkpoint {
                continue;
            }
            protected.insert(pid);
            queue.push_back(parent);
        }
    }

    protected
}

/// Recursively restores a checkpoint's inputs and re-runs its forward
/// evaluator (spec §4.5 "Recomputation").
pub fn recompute_subgraph(node: &NodeRef) -> GraphResult<bool> {
    let (is_checkpoint, has_saved_inputs) = {
        let n = node.borrow();
        (n.is_checkpoint, !n.saved_inputs.is_empty())
    };
    if !is_checkpoint || !has_saved_inputs {
        return Ok(false);
    }

    let has_saved_rng = node.borrow().has_saved_rng;
    if has_saved_rng {
        let blob = node.borrow().saved_rng_blob.clone();
        if let Some(blob) = blob {
            rng::restore(&blob);
        }
    }

    let (inputs, saved_slots, saved_tensors) = {
        let n = node.borrow();
        (
            n.inputs.clone(),
            n.saved_inputs.clone(),
            n.saved_input_tensors.clone(),
        )
    };

    for (i, parent) in inputs.iter().enumerate() {
        let slot = saved_slots.get(i).copied().unwrap_or(SavedInputSlot::Empty);
        match slot {
            SavedInputSlot::Recorded => {
                if let Some(t) = saved_tensors.get(i) {
                    parent.borrow_mut().value = t.clone();
                }
            }
            SavedInputSlot::Empty => {
                let parent_empty = parent.borrow().value.numel() == 0;
                if parent_empty {
                    let parent_is_checkpoint = parent.borrow().is_checkpoint;
                    if parent_is_checkpoint {
                        let ok = recompute_subgraph(parent)?;
                        if !ok {
                            return Err(GraphError::RecomputeFailed {
                                node: node.borrow().label(),
                                reason: format!(
                                    "parent {} could not be recomputed",
                                    parent.borrow().label()
                                ),
                            });
                        }
                    } else {
                        return Err(GraphError::RecomputeFailed {
                            node: node.borrow().label(),
                            reason: format!(
                                "parent {} has no saved value and is not a checkpoint",
                                parent.borrow().label()
                            ),
                        });
                    }
                }
            }
        }
    }

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| forward_eval_node(node)));
    let output = match result {
        Ok(t) => t,
        Err(cause) => {
            let msg = if let Some(s) = cause.downcast_ref::<&str>() {
                s.to_string()
            } else {
                "forward evaluator panicked during recompute".to_string()
            };
            return Err(GraphError::RecomputeFailed {
                node: node.borrow().label(),
                reason: msg,
            });
        }
    };

    let mut n = node.borrow_mut();
    n.value = output;
    n.version += 1;
    drop(n);
    on_recomputed(node);

    Ok(true)
}

/// Notifies the version-tracking layer that `node` was just recomputed, so
/// any downstream in-place reasoning stays consistent (spec §4.5 step 5).
fn on_recomputed(node: &NodeRef) {
    log::debug!(
        "recomputed {} (version {})",
        node.borrow().label(),
        node.borrow().version
    );
}

/// True if already materialized; recomputes if missing and checkpointed;
/// false otherwise.
pub fn ensure_value_present(node: &NodeRef) -> GraphResult<bool> {
    if node.borrow().value.numel() != 0 {
        return Ok(true);
    }
    if node.borrow().is_checkpoint {
        return recompute_subgraph(node);
    }
    Ok(false)
}

/// External-facing helper mirroring spec §6: walks the graph and evaluates
/// every node whose value is missing, swallowing per-node evaluator
/// exceptions so other branches can still compute (spec §7.5 — this differs
/// from `backward`'s fail-fast posture, deliberately).
pub fn compute_forward_values(root: &NodeRef) {
    for node in topo_from(root) {
        let needs_eval = node.borrow().value.numel() == 0;
        if !needs_eval {
            continue;
        }
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| forward_eval_node(&node)));
        match result {
            Ok(value) => {
                let mut n = node.borrow_mut();
                n.value = value;
                n.version += 1;
            }
            Err(cause) => {
                let msg = if let Some(s) = cause.downcast_ref::<&str>() {
                    s.to_string()
                } else {
                    "forward evaluator panicked".to_string()
                };
                log::error!("forward evaluation failed for {}: {msg}", node.borrow().label());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;
    use crate::ops::Op;

    fn build_chain() -> (NodeRef, NodeRef, NodeRef) {
        let a = Node::new_leaf(Tensor::scalar(2.0), true, None);
        let b = Node::new(Op::Relu, vec![a.clone()], Tensor::scalar(2.0), true, None);
        let c = Node::new(Op::Relu, vec![b.clone()], Tensor::scalar(2.0), true, None);
        (a, b, c)
    }

    #[test]
    fn marking_is_idempotent_in_status() {
        let (_, b, _) = build_chain();
        mark_node_checkpoint(&b, CheckpointOptions::default());
        assert!(b.borrow().is_checkpoint);
        mark_node_checkpoint(&b, CheckpointOptions::default());
        assert!(b.borrow().is_checkpoint);
    }

    #[test]
    fn saved_input_tensor_count_matches_inputs() {
        let (_, b, _) = build_chain();
        mark_node_checkpoint(&b, CheckpointOptions::default());
        assert_eq!(b.borrow().saved_input_tensors.len(), b.borrow().inputs.len());
    }

    #[test]
    fn eviction_preserves_root_frees_checkpoint_and_its_ancestors() {
        let (a, b, c) = build_chain();
        mark_node_checkpoint(&b, CheckpointOptions::default());
        evict_non_checkpoint_values(&c);

        assert!(c.borrow().value.size(), "root value must survive eviction");
        assert!(!b.borrow().value.size(), "checkpoint boundary is evicted");
        assert!(
            !a.borrow().value.size(),
            "ancestor behind a checkpoint is freed, recoverable via the checkpoint's own snapshot"
        );
        assert!(
            b.borrow().saved_input_tensors[0].size(),
            "the checkpoint's snapshot of a survives even though a's live value does not"
        );
    }

    #[test]
    fn recompute_restores_evicted_checkpoint() {
        let (_, b, c) = build_chain();
        mark_node_checkpoint(&b, CheckpointOptions::default());
        capture_checkpoint_snapshots(&c);
        b.borrow_mut().value = Tensor::empty();

        let ok = recompute_subgraph(&b).unwrap();
        assert!(ok);
        assert!(b.borrow().value.size());
    }

    #[test]
    fn recompute_fails_for_non_checkpoint() {
        let (_, b, _) = build_chain();
        let err = recompute_subgraph(&b).unwrap();
        assert!(!err);
    }
}
