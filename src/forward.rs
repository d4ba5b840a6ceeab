//! Forward-mode engine: `jvp` (spec §4.3).

use std::collections::HashMap;

use crate::graph::{topo_from, NodeId, NodeRef};
use crate::ops::jvp_lookup;
use crate::tensor::Tensor;

/// Single forward pass over `topo_from(root)`, propagating tangents from a
/// seed map. Returns the root's tangent. No accumulation; `seeds` with no
/// entries yields a zero tensor shaped like `root.value` (spec §8 boundary).
pub fn jvp(root: &NodeRef, seeds: &HashMap<NodeId, Tensor>) -> Tensor {
    let order = topo_from(root);
    let mut tangents: HashMap<NodeId, Tensor> = HashMap::new();

    for node in &order {
        let id = node.borrow().id;
        let initial = match seeds.get(&id) {
            Some(t) => t.clone(),
            None => Tensor::zeros_like(&node.borrow().value),
        };

        let op = node.borrow().op;
        let tangent = match jvp_lookup(op) {
            Some(rule) => {
                let lookup = |parent: &NodeRef| -> Tensor {
                    let pid = parent.borrow().id;
                    tangents
                        .get(&pid)
                        .cloned()
                        .unwrap_or_else(|| Tensor::zeros_like(&parent.borrow().value))
                };
                rule(node, &lookup)
            }
            None => initial,
        };

        tangents.insert(id, tangent);
    }

    let root_id = root.borrow().id;
    tangents
        .remove(&root_id)
        .unwrap_or_else(|| Tensor::zeros_like(&root.borrow().value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;
    use crate::ops::Op;

    #[test]
    fn empty_seed_map_yields_zero_tangent() {
        let a = Node::new_leaf(Tensor::scalar(2.0), true, None);
        let b = Node::new_leaf(Tensor::scalar(3.0), true, None);
        let c = Node::new(Op::Mul, vec![a, b], Tensor::scalar(6.0), true, None);

        let out = jvp(&c, &HashMap::new());
        assert_eq!(out.data(), &[0.0]);
    }

    #[test]
    fn seeded_leaf_propagates_through_mul() {
        let a = Node::new_leaf(Tensor::scalar(2.0), true, None);
        let b = Node::new_leaf(Tensor::scalar(3.0), true, None);
        let c = Node::new(Op::Mul, vec![a.clone(), b.clone()], Tensor::scalar(6.0), true, None);

        let mut seeds = HashMap::new();
        seeds.insert(a.borrow().id, Tensor::scalar(1.0));
        let out = jvp(&c, &seeds);
        // d(a*b)/da * 1 = b = 3.0
        assert_eq!(out.data(), &[3.0]);
    }
}
