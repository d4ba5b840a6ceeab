//! Reverse-mode engine: `backward` (spec §4.2).

use crate::checkpoint::recompute_subgraph;
use crate::error::{GraphError, GraphResult};
use crate::graph::{topo_from, NodeRef};
use crate::ops::vjp_lookup;
use crate::tensor::Tensor;

/// Seeds, walks `topo_from(root)` in reverse, and dispatches each node's VJP
/// rule, accumulating into parents' `grad`.
///
/// Fails hard (stopping the walk, leaving partial state in place per spec §7)
/// on a missing non-checkpointed activation, a failed recomputation, or a
/// VJP rule exception. Warns and skips nodes with no registered VJP rule.
pub fn backward(root: &NodeRef, seed: Option<Tensor>) -> GraphResult<()> {
    let order = topo_from(root);

    {
        let mut r = root.borrow_mut();
        // A scalar (1x1) root defaults its seed to a 1x1 ones tensor; any
        // other shape defaults to ones shaped like `value` (spec §4.2 step 2,
        // §8 boundary behavior).
        let seed = seed.unwrap_or_else(|| {
            if r.value.numel() <= 1 {
                Tensor::ones(1, 1)
            } else {
                Tensor::ones_like(&r.value)
            }
        });
        r.grad = seed;
    }

    for node in order.iter().rev() {
        let requires_grad = node.borrow().requires_grad;
        if !requires_grad {
            continue;
        }

        if node.borrow().is_checkpoint && node.borrow().value.numel() == 0 {
            let ok = recompute_subgraph(node)?;
            if !ok {
                return Err(GraphError::RecomputeFailed {
                    node: node.borrow().label(),
                    reason: "recompute_subgraph returned false".into(),
                });
            }
        }

        let inputs = node.borrow().inputs.clone();
        for parent in &inputs {
            let parent_empty = parent.borrow().value.numel() == 0;
            if !parent_empty {
                continue;
            }
            let parent_is_checkpoint = parent.borrow().is_checkpoint;
            if parent_is_checkpoint {
                let ok = recompute_subgraph(parent)?;
                if !ok {
                    return Err(GraphError::RecomputeFailed {
                        node: parent.borrow().label(),
                        reason: "recompute_subgraph returned false".into(),
                    });
                }
            } else {
                return Err(GraphError::MissingActivation {
                    consumer: node.borrow().label(),
                    producer: parent.borrow().label(),
                });
            }
        }

        let gy = node.borrow().grad.clone();
        let op = node.borrow().op;
        match vjp_lookup(op) {
            Some(rule) => {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    rule(node, &gy)
                }));
                if let Err(cause) = result {
                    let msg = panic_message(&cause);
                    return Err(GraphError::VjpException {
                        node: node.borrow().label(),
                        source: msg.into(),
                    });
                }
            }
            None => {
                log::warn!(
                    "no vjp rule registered for {}; skipping, parents receive no contribution",
                    node.borrow().label()
                );
            }
        }
    }

    Ok(())
}

fn panic_message(cause: &Box<dyn std::any::Any + Send>) -> Box<dyn std::error::Error + Send + Sync> {
    let text = if let Some(s) = cause.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = cause.downcast_ref::<String>() {
        s.clone()
    } else {
        "vjp rule panicked with a non-string payload".to_string()
    };
    Box::<dyn std::error::Error + Send + Sync>::from(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;
    use crate::ops::Op;

    #[test]
    fn scalar_root_defaults_seed_to_one() {
        let a = Node::new_leaf(Tensor::scalar(2.0), true, None);
        let b = Node::new_leaf(Tensor::scalar(3.0), true, None);
        let c = Node::new(Op::Mul, vec![a.clone(), b.clone()], Tensor::scalar(6.0), true, None);

        backward(&c, None).unwrap();
        assert_eq!(a.borrow().grad.data(), &[3.0]);
        assert_eq!(b.borrow().grad.data(), &[2.0]);
    }

    #[test]
    fn missing_non_checkpointed_parent_fails() {
        let a = Node::new_leaf(Tensor::scalar(2.0), true, None);
        let b = Node::new(Op::Relu, vec![a.clone()], Tensor::scalar(2.0), true, None);
        b.borrow_mut().value = Tensor::empty();

        let err = backward(&b, None).unwrap_err();
        match err {
            GraphError::MissingActivation { consumer, producer } => {
                assert_eq!(consumer.op, "relu");
                assert_eq!(producer.op, "leaf");
            }
            other => panic!("expected MissingActivation, got {other:?}"),
        }
    }

    #[test]
    fn missing_vjp_rule_warns_and_skips() {
        let a = Node::new_leaf(Tensor::scalar(2.0), true, None);
        let leaf_with_grad = Node::new(Op::Leaf, vec![], Tensor::scalar(2.0), true, None);
        // Leaf has no VJP rule (it is a source, not an op); backward on a
        // graph containing an orphaned non-leaf parent-less Leaf node that
        // `requires_grad` exercises the warn-and-skip path without failing.
        let _ = (&a, &leaf_with_grad);
        backward(&leaf_with_grad, None).unwrap();
    }
}
