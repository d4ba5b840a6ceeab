//! Shared helpers for the integration tests: a deterministic dense stack
//! used by the checkpointing and tracer scenarios in spec §8.

use gradflow::{compute_forward_values, constant, param, Node, NodeRef, Op, Tensor};

/// Builds an `layers`-deep stack of `relu(x @ W_i + b_i)`, all 1x4 tensors,
/// with deterministic (seeded) parameter values so two independent calls
/// produce numerically identical graphs.
pub fn build_dense_stack(layers: usize) -> (NodeRef, Vec<NodeRef>) {
    let mut cur = constant(Tensor::from_rows(vec![vec![0.5, -0.25, 0.75, 1.0]]), Some("x0"));
    let mut params = Vec::new();

    for layer in 0..layers {
        let w = param(Tensor::randn(4, 4, 1000 + layer as u64), None);
        let b = param(Tensor::randn(1, 4, 2000 + layer as u64), None);

        let pre = Node::new(Op::MatMul, vec![cur, w.clone()], Tensor::empty(), true, None);
        let biased = Node::new(Op::Add, vec![pre, b.clone()], Tensor::empty(), true, None);
        let activated = Node::new(Op::Relu, vec![biased], Tensor::empty(), true, None);

        params.push(w);
        params.push(b);
        cur = activated;
    }

    let loss = Node::new(Op::Sum, vec![cur], Tensor::empty(), true, None);
    compute_forward_values(&loss);
    (loss, params)
}

pub fn grads_close(a: &NodeRef, b: &NodeRef, tol: f64) -> bool {
    let ag = a.borrow();
    let bg = b.borrow();
    ag.grad.shape() == bg.grad.shape()
        && ag
            .grad
            .data()
            .iter()
            .zip(bg.grad.data().iter())
            .all(|(x, y)| (x - y).abs() <= tol)
}
