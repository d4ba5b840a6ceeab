//! Op library (spec §6's "consumed from the op library", concretized per
//! SPEC_FULL §4.7): the closed `Op` tag set, the pure forward evaluator, and
//! the VJP/JVP rule tables.

pub mod jvp;
pub mod vjp;

use crate::graph::NodeRef;
use crate::tensor::Tensor;

pub use jvp::{jvp_lookup, JvpRule, TangentLookup};
pub use vjp::{vjp_lookup, VjpRule};

/// Closed set of op kinds. Determines which forward evaluator, VJP rule, and
/// JVP rule apply (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Leaf,
    Add,
    Mul,
    MatMul,
    Relu,
    Gelu,
    Sum,
    MseLoss,
    CrossEntropyWithLogits,
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Leaf => "leaf",
            Op::Add => "add",
            Op::Mul => "mul",
            Op::MatMul => "matmul",
            Op::Relu => "relu",
            Op::Gelu => "gelu",
            Op::Sum => "sum",
            Op::MseLoss => "mse_loss",
            Op::CrossEntropyWithLogits => "cross_entropy_with_logits",
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Op::Leaf => 0,
            Op::Add | Op::Mul | Op::MatMul | Op::MseLoss | Op::CrossEntropyWithLogits => 2,
            Op::Relu | Op::Gelu | Op::Sum => 1,
        }
    }
}

/// Pure function of a node's `op` tag and its inputs' current `value`s.
/// Treated by the core as an external evaluator (spec §4.1), implemented
/// in-crate so the graph is exercisable end-to-end.
pub fn forward_eval_node(node: &NodeRef) -> Tensor {
    let n = node.borrow();
    let inputs: Vec<Tensor> = n.inputs.iter().map(|i| i.borrow().value.clone()).collect();
    match n.op {
        Op::Leaf => n.value.clone(),
        Op::Add => inputs[0].add(&inputs[1]),
        Op::Mul => inputs[0].mul(&inputs[1]),
        Op::MatMul => inputs[0].matmul(&inputs[1]),
        Op::Relu => relu(&inputs[0]),
        Op::Gelu => gelu(&inputs[0]),
        Op::Sum => inputs[0].sum(),
        Op::MseLoss => mse_loss(&inputs[0], &inputs[1]),
        Op::CrossEntropyWithLogits => cross_entropy_with_logits(&inputs[0], &inputs[1]),
    }
}

pub fn relu(x: &Tensor) -> Tensor {
    x.map(|v| v.max(0.0))
}

/// tanh approximation of GELU, matching the form used by most ML frameworks.
pub fn gelu(x: &Tensor) -> Tensor {
    const C: f64 = 0.7978845608028654; // sqrt(2/pi)
    x.map(|v| 0.5 * v * (1.0 + (C * (v + 0.044715 * v.powi(3))).tanh()))
}

/// d/dx tanh-approximate GELU, used by both the VJP and JVP rules.
pub fn gelu_grad(x: f64) -> f64 {
    const C: f64 = 0.7978845608028654;
    let inner = C * (x + 0.044715 * x.powi(3));
    let t = inner.tanh();
    let sech2 = 1.0 - t * t;
    0.5 * (1.0 + t) + 0.5 * x * sech2 * C * (1.0 + 3.0 * 0.044715 * x.powi(2))
}

pub fn mse_loss(pred: &Tensor, target: &Tensor) -> Tensor {
    assert_eq!(pred.shape(), target.shape(), "mse_loss shape mismatch");
    let diff = pred.sub(target);
    let sq: f64 = diff.data().iter().map(|d| d * d).sum();
    Tensor::scalar(sq / pred.numel() as f64)
}

/// Numerically-stable mean cross-entropy with integer-one-hot-style targets
/// passed as a dense probability tensor (same shape as logits).
pub fn cross_entropy_with_logits(logits: &Tensor, target: &Tensor) -> Tensor {
    assert_eq!(logits.shape(), target.shape(), "cross_entropy shape mismatch");
    let mut total = 0.0;
    for r in 0..logits.rows() {
        let row: Vec<f64> = (0..logits.cols()).map(|c| logits.get(r, c)).collect();
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let sum_exp: f64 = row.iter().map(|v| (v - max).exp()).sum();
        let log_sum_exp = sum_exp.ln() + max;
        for c in 0..logits.cols() {
            let t = target.get(r, c);
            if t != 0.0 {
                total += t * (log_sum_exp - logits.get(r, c));
            }
        }
    }
    Tensor::scalar(total / logits.rows() as f64)
}

/// log-softmax, shared by the cross-entropy VJP rule.
pub fn log_softmax(logits: &Tensor) -> Tensor {
    let mut out = Tensor::zeros(logits.rows(), logits.cols());
    for r in 0..logits.rows() {
        let row: Vec<f64> = (0..logits.cols()).map(|c| logits.get(r, c)).collect();
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let sum_exp: f64 = row.iter().map(|v| (v - max).exp()).sum();
        let log_sum_exp = sum_exp.ln() + max;
        for c in 0..logits.cols() {
            out.set(r, c, logits.get(r, c) - log_sum_exp);
        }
    }
    out
}

pub fn softmax(logits: &Tensor) -> Tensor {
    log_softmax(logits).map(f64::exp)
}

/// Reduces `grad` to `target_shape` by summing along any broadcasted
/// dimension, mirroring the teacher's `broadcast_shape` helper used to keep
/// VJP-accumulated gradients aligned with the parent's actual shape after a
/// broadcasting forward op.
pub fn broadcast_to(grad: &Tensor, target_shape: (usize, usize)) -> Tensor {
    let (target_rows, target_cols) = target_shape;
    if grad.shape() == target_shape {
        return grad.clone();
    }

    let mut result = grad.clone();
    let (rows, cols) = result.shape();
    if rows != target_rows {
        assert_eq!(
            target_rows, 1,
            "cannot reduce row count {} to {}",
            rows, target_rows
        );
        let mut summed = Tensor::zeros(1, cols);
        for r in 0..rows {
            for c in 0..cols {
                summed.set(0, c, summed.get(0, c) + result.get(r, c));
            }
        }
        result = summed;
    }

    let (rows, cols) = result.shape();
    if cols != target_cols {
        assert_eq!(
            target_cols, 1,
            "cannot reduce col count {} to {}",
            cols, target_cols
        );
        let mut summed = Tensor::zeros(rows, 1);
        for r in 0..rows {
            for c in 0..cols {
                summed.set(r, 0, summed.get(r, 0) + result.get(r, c));
            }
        }
        result = summed;
    }

    result
}
