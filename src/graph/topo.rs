//! `topo_from` and `zero_grad` (spec §4.1).

use std::collections::HashSet;

use super::node::{NodeId, NodeRef};
use crate::tensor::Tensor;

/// Parents-before-children order over the subgraph reachable from `root`.
///
/// DFS from `root` over `inputs`, emitting on post-order, then reversed so
/// that parents precede children (invariant 6 of spec §3: ties broken by
/// first-seen order during the traversal).
pub fn topo_from(root: &NodeRef) -> Vec<NodeRef> {
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut post_order = Vec::new();
    visit(root, &mut visited, &mut post_order);
    post_order.reverse();
    post_order
}

fn visit(node: &NodeRef, visited: &mut HashSet<NodeId>, post_order: &mut Vec<NodeRef>) {
    let id = node.borrow().id;
    if !visited.insert(id) {
        return;
    }
    let inputs: Vec<NodeRef> = node.borrow().inputs.clone();
    for parent in &inputs {
        visit(parent, visited, post_order);
    }
    post_order.push(node.clone());
}

/// Zeros `grad` for every `requires_grad` node reachable from `root`.
pub fn zero_grad(root: &NodeRef) {
    for node in topo_from(root) {
        let mut n = node.borrow_mut();
        if n.requires_grad {
            let shape_like = n.value.clone();
            n.grad = Tensor::zeros_like(&shape_like);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::Node;
    use crate::ops::Op;
    use crate::tensor::Tensor;

    #[test]
    fn topo_lists_parents_before_children() {
        let a = Node::new_leaf(Tensor::scalar(1.0), true, None);
        let b = Node::new_leaf(Tensor::scalar(2.0), true, None);
        let c = Node::new(Op::Add, vec![a.clone(), b.clone()], Tensor::scalar(3.0), true, None);

        let order = topo_from(&c);
        let ids: Vec<_> = order.iter().map(|n| n.borrow().id).collect();
        let a_id = a.borrow().id;
        let b_id = b.borrow().id;
        let c_id = c.borrow().id;

        let pos = |id| ids.iter().position(|&x| x == id).unwrap();
        assert!(pos(a_id) < pos(c_id));
        assert!(pos(b_id) < pos(c_id));
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn topo_dedups_diamond() {
        let a = Node::new_leaf(Tensor::scalar(1.0), true, None);
        let b = Node::new(Op::Relu, vec![a.clone()], Tensor::scalar(1.0), true, None);
        let c = Node::new(Op::Relu, vec![a.clone()], Tensor::scalar(1.0), true, None);
        let d = Node::new(Op::Add, vec![b.clone(), c.clone()], Tensor::scalar(2.0), true, None);

        let order = topo_from(&d);
        assert_eq!(order.len(), 4);
    }
}
