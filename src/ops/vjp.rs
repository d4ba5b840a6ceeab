//! VJP (vector-Jacobian product) rule table (spec §4.2.d-e, §6, §9).
//!
//! Each rule reads `(n, gy)` and accumulates each parent's contribution into
//! the parent's `grad`. Dispatch is a compile-time-exhaustive `match` over
//! `Op`, with a wildcard fallback returning `None` for any op with no
//! registered rule yet (spec §9's "runtime lookup-then-warn remains the
//! dynamic fallback").

use super::{broadcast_to, gelu_grad, softmax, Op};
use crate::graph::NodeRef;
use crate::tensor::Tensor;

pub type VjpRule = fn(&NodeRef, &Tensor);

/// Returns the VJP rule for `op`, or `None` if no rule is registered.
pub fn vjp_lookup(op: Op) -> Option<VjpRule> {
    match op {
        Op::Leaf => None,
        Op::Add => Some(vjp_add),
        Op::Mul => Some(vjp_mul),
        Op::MatMul => Some(vjp_matmul),
        Op::Relu => Some(vjp_relu),
        Op::Gelu => Some(vjp_gelu),
        Op::Sum => Some(vjp_sum),
        Op::MseLoss => Some(vjp_mse_loss),
        Op::CrossEntropyWithLogits => Some(vjp_cross_entropy_with_logits),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

fn accumulate(parent: &NodeRef, contribution: Tensor) {
    let mut p = parent.borrow_mut();
    if !p.requires_grad {
        return;
    }
    let contribution = broadcast_to(&contribution, p.value.shape());
    p.grad.add_assign(&contribution);
}

fn vjp_add(n: &NodeRef, gy: &Tensor) {
    let n = n.borrow();
    accumulate(&n.inputs[0], gy.clone());
    accumulate(&n.inputs[1], gy.clone());
}

fn vjp_mul(n: &NodeRef, gy: &Tensor) {
    let n = n.borrow();
    let a = n.inputs[0].borrow().value.clone();
    let b = n.inputs[1].borrow().value.clone();
    accumulate(&n.inputs[0], gy.mul(&b));
    accumulate(&n.inputs[1], gy.mul(&a));
}

fn vjp_matmul(n: &NodeRef, gy: &Tensor) {
    let n = n.borrow();
    let a = n.inputs[0].borrow().value.clone();
    let b = n.inputs[1].borrow().value.clone();
    accumulate(&n.inputs[0], gy.matmul(&b.transpose()));
    accumulate(&n.inputs[1], a.transpose().matmul(gy));
}

fn vjp_relu(n: &NodeRef, gy: &Tensor) {
    let n = n.borrow();
    let x = n.inputs[0].borrow().value.clone();
    let mask = x.map(|v| if v > 0.0 { 1.0 } else { 0.0 });
    accumulate(&n.inputs[0], gy.mul(&mask));
}

fn vjp_gelu(n: &NodeRef, gy: &Tensor) {
    let n = n.borrow();
    let x = n.inputs[0].borrow().value.clone();
    let deriv = x.map(gelu_grad);
    accumulate(&n.inputs[0], gy.mul(&deriv));
}

fn vjp_sum(n: &NodeRef, gy: &Tensor) {
    let n = n.borrow();
    let x = n.inputs[0].borrow().value.clone();
    let broadcasted = Tensor::ones_like(&x).scale(gy.data()[0]);
    accumulate(&n.inputs[0], broadcasted);
}

fn vjp_mse_loss(n: &NodeRef, gy: &Tensor) {
    let n = n.borrow();
    let pred = n.inputs[0].borrow().value.clone();
    let target = n.inputs[1].borrow().value.clone();
    let scale = 2.0 * gy.data()[0] / pred.numel() as f64;
    let grad_pred = pred.sub(&target).scale(scale);
    accumulate(&n.inputs[0], grad_pred.clone());
    accumulate(&n.inputs[1], grad_pred.scale(-1.0));
}

fn vjp_cross_entropy_with_logits(n: &NodeRef, gy: &Tensor) {
    let n = n.borrow();
    let logits = n.inputs[0].borrow().value.clone();
    let target = n.inputs[1].borrow().value.clone();
    let probs = softmax(&logits);
    let scale = gy.data()[0] / logits.rows() as f64;
    let grad_logits = probs.sub(&target).scale(scale);
    accumulate(&n.inputs[0], grad_logits);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;

    #[test]
    fn add_distributes_gradient_to_both_parents() {
        let a = Node::new_leaf(Tensor::scalar(1.0), true, None);
        let b = Node::new_leaf(Tensor::scalar(2.0), true, None);
        let c = Node::new(Op::Add, vec![a.clone(), b.clone()], Tensor::scalar(3.0), true, None);
        vjp_add(&c, &Tensor::scalar(5.0));
        assert_eq!(a.borrow().grad.data(), &[5.0]);
        assert_eq!(b.borrow().grad.data(), &[5.0]);
    }

    #[test]
    fn relu_blocks_gradient_for_negative_input() {
        let a = Node::new_leaf(Tensor::scalar(-1.0), true, None);
        let c = Node::new(Op::Relu, vec![a.clone()], Tensor::scalar(0.0), true, None);
        vjp_relu(&c, &Tensor::scalar(5.0));
        assert_eq!(a.borrow().grad.data(), &[0.0]);
    }
}
