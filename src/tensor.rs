//! Minimal dense tensor backing the graph's `value`/`grad`/tangent slots.
//!
//! Concretizes the "consumed from the tensor library" interface in spec §6:
//! `rows`, `cols`, `numel`, `size`, `zeros_like`, `ones`, `ones_like`, `randn`,
//! element-wise add, and an owned copy (`Clone`). `Tensor::empty()` is the
//! empty sentinel referred to throughout the spec as `Tensor()`.

use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};

/// A dense, row-major 2-D tensor of `f64`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Tensor {
    /// The empty sentinel: "not materialized" (spec §3, invariant 3).
    pub fn empty() -> Self {
        Tensor {
            rows: 0,
            cols: 0,
            data: Vec::new(),
        }
    }

    pub fn from_rows(rows: Vec<Vec<f64>>) -> Self {
        let r = rows.len();
        let c = rows.first().map(|row| row.len()).unwrap_or(0);
        assert!(rows.iter().all(|row| row.len() == c), "ragged rows");
        let data = rows.into_iter().flatten().collect();
        Tensor { rows: r, cols: c, data }
    }

    pub fn from_flat(rows: usize, cols: usize, data: Vec<f64>) -> Self {
        assert_eq!(rows * cols, data.len(), "shape/data length mismatch");
        Tensor { rows, cols, data }
    }

    pub fn scalar(value: f64) -> Self {
        Tensor::from_flat(1, 1, vec![value])
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn numel(&self) -> usize {
        self.rows * self.cols
    }

    /// True iff this tensor is non-empty (spec §6).
    pub fn size(&self) -> bool {
        self.numel() > 0
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn get(&self, r: usize, c: usize) -> f64 {
        self.data[r * self.cols + c]
    }

    pub fn set(&mut self, r: usize, c: usize, v: f64) {
        self.data[r * self.cols + c] = v;
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Tensor::from_flat(rows, cols, vec![0.0; rows * cols])
    }

    pub fn zeros_like(t: &Tensor) -> Self {
        Tensor::zeros(t.rows, t.cols)
    }

    pub fn ones(rows: usize, cols: usize) -> Self {
        Tensor::from_flat(rows, cols, vec![1.0; rows * cols])
    }

    pub fn ones_like(t: &Tensor) -> Self {
        Tensor::ones(t.rows, t.cols)
    }

    pub fn randn(rows: usize, cols: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let data = (0..rows * cols)
            .map(|_| StandardNormal.sample(&mut rng))
            .collect();
        Tensor::from_flat(rows, cols, data)
    }

    /// Element-wise add. One side may be a 1x1 scalar, broadcast against the other.
    pub fn add(&self, other: &Tensor) -> Tensor {
        zip_broadcast(self, other, |a, b| a + b)
    }

    /// Accumulates `other` into `self` in place (used for grad accumulation).
    pub fn add_assign(&mut self, other: &Tensor) {
        if self.numel() == 0 {
            *self = other.clone();
            return;
        }
        *self = self.add(other);
    }

    pub fn mul(&self, other: &Tensor) -> Tensor {
        zip_broadcast(self, other, |a, b| a * b)
    }

    pub fn sub(&self, other: &Tensor) -> Tensor {
        zip_broadcast(self, other, |a, b| a - b)
    }

    pub fn scale(&self, k: f64) -> Tensor {
        Tensor::from_flat(self.rows, self.cols, self.data.iter().map(|v| v * k).collect())
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Tensor {
        Tensor::from_flat(self.rows, self.cols, self.data.iter().copied().map(f).collect())
    }

    pub fn transpose(&self) -> Tensor {
        let mut out = Tensor::zeros(self.cols, self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                out.set(c, r, self.get(r, c));
            }
        }
        out
    }

    pub fn matmul(&self, other: &Tensor) -> Tensor {
        assert_eq!(self.cols, other.rows, "matmul shape mismatch");
        let mut out = Tensor::zeros(self.rows, other.cols);
        for r in 0..self.rows {
            for k in 0..self.cols {
                let a = self.get(r, k);
                if a == 0.0 {
                    continue;
                }
                for c in 0..other.cols {
                    out.set(r, c, out.get(r, c) + a * other.get(k, c));
                }
            }
        }
        out
    }

    pub fn sum(&self) -> Tensor {
        Tensor::scalar(self.data.iter().sum())
    }

    pub fn mean(&self) -> f64 {
        self.data.iter().sum::<f64>() / self.numel() as f64
    }
}

/// Broadcasts each axis independently: an axis of length 1 on either side
/// stretches to match the other side's length on that axis (e.g. a `(1,N)`
/// row bias against an `(M,N)` activation), mirroring the reduction
/// `broadcast_to` already performs on the VJP side (`src/ops/mod.rs`).
fn zip_broadcast(a: &Tensor, b: &Tensor, f: impl Fn(f64, f64) -> f64) -> Tensor {
    if a.shape() == b.shape() {
        return Tensor::from_flat(
            a.rows,
            a.cols,
            a.data.iter().zip(b.data.iter()).map(|(&x, &y)| f(x, y)).collect(),
        );
    }

    let rows = a.rows.max(b.rows);
    let cols = a.cols.max(b.cols);
    assert!(
        (a.rows == rows || a.rows == 1) && (a.cols == cols || a.cols == 1),
        "shape mismatch in broadcast op: {:?} vs {:?}",
        a.shape(),
        b.shape()
    );
    assert!(
        (b.rows == rows || b.rows == 1) && (b.cols == cols || b.cols == 1),
        "shape mismatch in broadcast op: {:?} vs {:?}",
        a.shape(),
        b.shape()
    );

    let mut data = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        for c in 0..cols {
            let ar = if a.rows == 1 { 0 } else { r };
            let ac = if a.cols == 1 { 0 } else { c };
            let br = if b.rows == 1 { 0 } else { r };
            let bc = if b.cols == 1 { 0 } else { c };
            data.push(f(a.get(ar, ac), b.get(br, bc)));
        }
    }
    Tensor::from_flat(rows, cols, data)
}
