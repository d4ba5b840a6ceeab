//! JVP (Jacobian-vector product) rule table (spec §4.3, §6).
//!
//! Each rule reads `(n, lookup)` where `lookup` resolves a parent's current
//! tangent (defaulting to zero for unseeded leaves) and returns `n`'s own
//! tangent. Single pass, no accumulation.

use super::{gelu_grad, softmax, Op};
use crate::graph::NodeRef;
use crate::tensor::Tensor;

/// Resolves a parent's tangent tensor during a forward-mode pass.
pub type TangentLookup<'a> = dyn Fn(&NodeRef) -> Tensor + 'a;

pub type JvpRule = fn(&NodeRef, &TangentLookup) -> Tensor;

/// Returns the JVP rule for `op`, or `None` if no rule is registered.
pub fn jvp_lookup(op: Op) -> Option<JvpRule> {
    match op {
        Op::Leaf => None,
        Op::Add => Some(jvp_add),
        Op::Mul => Some(jvp_mul),
        Op::MatMul => Some(jvp_matmul),
        Op::Relu => Some(jvp_relu),
        Op::Gelu => Some(jvp_gelu),
        Op::Sum => Some(jvp_sum),
        Op::MseLoss => Some(jvp_mse_loss),
        Op::CrossEntropyWithLogits => Some(jvp_cross_entropy_with_logits),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

fn jvp_add(n: &NodeRef, t: &TangentLookup) -> Tensor {
    let n = n.borrow();
    t(&n.inputs[0]).add(&t(&n.inputs[1]))
}

fn jvp_mul(n: &NodeRef, t: &TangentLookup) -> Tensor {
    let n = n.borrow();
    let a = n.inputs[0].borrow().value.clone();
    let b = n.inputs[1].borrow().value.clone();
    t(&n.inputs[0]).mul(&b).add(&t(&n.inputs[1]).mul(&a))
}

fn jvp_matmul(n: &NodeRef, t: &TangentLookup) -> Tensor {
    let n = n.borrow();
    let a = n.inputs[0].borrow().value.clone();
    let b = n.inputs[1].borrow().value.clone();
    t(&n.inputs[0]).matmul(&b).add(&a.matmul(&t(&n.inputs[1])))
}

fn jvp_relu(n: &NodeRef, t: &TangentLookup) -> Tensor {
    let n = n.borrow();
    let x = n.inputs[0].borrow().value.clone();
    let mask = x.map(|v| if v > 0.0 { 1.0 } else { 0.0 });
    t(&n.inputs[0]).mul(&mask)
}

fn jvp_gelu(n: &NodeRef, t: &TangentLookup) -> Tensor {
    let n = n.borrow();
    let x = n.inputs[0].borrow().value.clone();
    let deriv = x.map(gelu_grad);
    t(&n.inputs[0]).mul(&deriv)
}

fn jvp_sum(n: &NodeRef, t: &TangentLookup) -> Tensor {
    let n = n.borrow();
    t(&n.inputs[0]).sum()
}

fn jvp_mse_loss(n: &NodeRef, t: &TangentLookup) -> Tensor {
    let n = n.borrow();
    let pred = n.inputs[0].borrow().value.clone();
    let target = n.inputs[1].borrow().value.clone();
    let diff = pred.sub(&target);
    let tangent_diff = t(&n.inputs[0]).sub(&t(&n.inputs[1]));
    let dot: f64 = diff
        .data()
        .iter()
        .zip(tangent_diff.data().iter())
        .map(|(d, td)| d * td)
        .sum();
    Tensor::scalar(2.0 * dot / pred.numel() as f64)
}

fn jvp_cross_entropy_with_logits(n: &NodeRef, t: &TangentLookup) -> Tensor {
    let n = n.borrow();
    let logits = n.inputs[0].borrow().value.clone();
    let target = n.inputs[1].borrow().value.clone();
    let probs = softmax(&logits);
    let grad_logits = probs.sub(&target);
    let tangent_logits = t(&n.inputs[0]);
    let mut total = 0.0;
    for r in 0..logits.rows() {
        for c in 0..logits.cols() {
            total += grad_logits.get(r, c) * tangent_logits.get(r, c);
        }
    }
    Tensor::scalar(total / logits.rows() as f64)
}
