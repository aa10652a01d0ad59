//! Differentiable operations for tensors.
//!
//! Each operation:
//! 1. Computes the forward result
//! 2. Records a `GradFn` to the computation graph (if gradient tracking is enabled)

use std::sync::Arc;

use super::grad_fn::{
    matmul_dense, AddBackward, BroadcastAddBackward, ConcatColsBackward, EdgeAggregateBackward,
    EdgeScoreBackward, EluBackward, LeakyReluBackward, MatmulBackward, MeanBackward, MulBackward,
    MulScalarBackward, NegBackward, PowBackward, PropagateBackward, ReluBackward,
    SegmentSoftmaxBackward, SigmoidBackward, SoftmaxBackward, SumBackward, TanhBackward,
};
use super::record_op;
use super::tensor::Tensor;
use crate::sparse::SparseMatrix;

fn map(x: &Tensor, f: impl Fn(f32) -> f32) -> Tensor {
    Tensor::from_vec(x.data().iter().map(|&v| f(v)).collect(), x.shape())
}

fn zip_map(x: &Tensor, y: &Tensor, op: &str, f: impl Fn(f32, f32) -> f32) -> Tensor {
    assert_eq!(
        x.shape(),
        y.shape(),
        "{op}: shape mismatch {:?} vs {:?}",
        x.shape(),
        y.shape()
    );
    let data = x.data().iter().zip(y.data()).map(|(&a, &b)| f(a, b)).collect();
    Tensor::from_vec(data, x.shape())
}

// ============================================================================
// Element-wise Operations
// ============================================================================

impl Tensor {
    /// Element-wise addition: z = self + other
    ///
    /// # Panics
    ///
    /// Panics if the shapes differ.
    #[must_use]
    pub fn add(&self, other: &Tensor) -> Tensor {
        let mut result = zip_map(self, other, "add", |a, b| a + b);
        record_op(&mut result, &[self, other], || AddBackward);
        result
    }

    /// Element-wise multiplication: z = self * other
    ///
    /// # Panics
    ///
    /// Panics if the shapes differ.
    #[must_use]
    pub fn mul(&self, other: &Tensor) -> Tensor {
        let mut result = zip_map(self, other, "mul", |a, b| a * b);
        record_op(&mut result, &[self, other], || MulBackward {
            x: self.clone(),
            y: other.clone(),
        });
        result
    }

    /// Negation: z = -self
    #[must_use]
    pub fn neg(&self) -> Tensor {
        let mut result = map(self, |v| -v);
        record_op(&mut result, &[self], || NegBackward);
        result
    }

    /// Scalar multiplication: z = self * scalar
    #[must_use]
    pub fn mul_scalar(&self, scalar: f32) -> Tensor {
        let mut result = map(self, |v| v * scalar);
        record_op(&mut result, &[self], || MulScalarBackward { scalar });
        result
    }

    /// Power: z = self^n
    #[must_use]
    pub fn pow(&self, n: f32) -> Tensor {
        let mut result = map(self, |v| v.powf(n));
        record_op(&mut result, &[self], || PowBackward { x: self.clone(), n });
        result
    }
}

// ============================================================================
// Reduction Operations
// ============================================================================

impl Tensor {
    /// Sum of all elements, as a one-element tensor.
    #[must_use]
    pub fn sum(&self) -> Tensor {
        let total: f32 = self.data().iter().sum();
        let mut result = Tensor::new(&[total], &[1]);
        record_op(&mut result, &[self], || SumBackward {
            input_shape: self.shape().to_vec(),
        });
        result
    }

    /// Mean of all elements, as a one-element tensor.
    #[must_use]
    pub fn mean(&self) -> Tensor {
        let total: f32 = self.data().iter().sum();
        let mut result = Tensor::new(&[total / self.numel().max(1) as f32], &[1]);
        record_op(&mut result, &[self], || MeanBackward {
            input_shape: self.shape().to_vec(),
        });
        result
    }
}

// ============================================================================
// Activation Functions
// ============================================================================

impl Tensor {
    /// `ReLU`: max(0, x)
    #[must_use]
    pub fn relu(&self) -> Tensor {
        let mut result = map(self, |v| v.max(0.0));
        record_op(&mut result, &[self], || ReluBackward { x: self.clone() });
        result
    }

    /// ELU: x if x > 0 else α(eˣ − 1)
    #[must_use]
    pub fn elu(&self, alpha: f32) -> Tensor {
        let mut result = map(self, |v| if v > 0.0 { v } else { alpha * v.exp_m1() });
        let output = result.detach();
        record_op(&mut result, &[self], move || EluBackward { output, alpha });
        result
    }

    /// Leaky `ReLU`: x if x > 0 else `negative_slope` * x
    #[must_use]
    pub fn leaky_relu(&self, negative_slope: f32) -> Tensor {
        let mut result = map(self, |v| if v > 0.0 { v } else { negative_slope * v });
        record_op(&mut result, &[self], || LeakyReluBackward {
            x: self.clone(),
            negative_slope,
        });
        result
    }

    /// Sigmoid: 1 / (1 + e^-x)
    #[must_use]
    pub fn sigmoid(&self) -> Tensor {
        let mut result = map(self, |v| 1.0 / (1.0 + (-v).exp()));
        let output = result.detach();
        record_op(&mut result, &[self], move || SigmoidBackward { output });
        result
    }

    /// Hyperbolic tangent.
    #[must_use]
    pub fn tanh_(&self) -> Tensor {
        let mut result = map(self, f32::tanh);
        let output = result.detach();
        record_op(&mut result, &[self], move || TanhBackward { output });
        result
    }

    /// Softmax over the last dimension of a 2D tensor.
    ///
    /// softmax(x)_i = `exp(x_i)` / `Σ_j` `exp(x_j)`, computed with max
    /// subtraction so large logits do not overflow.
    ///
    /// # Panics
    ///
    /// Panics if the tensor is not 2D.
    #[must_use]
    pub fn softmax(&self) -> Tensor {
        assert_eq!(self.ndim(), 2, "softmax only supports 2D tensors");

        let features = self.cols();
        let mut output = self.data().to_vec();
        for row in output.chunks_mut(features.max(1)) {
            softmax_in_place(row);
        }

        let mut result = Tensor::from_vec(output, self.shape());
        let saved = result.detach();
        record_op(&mut result, &[self], move || SoftmaxBackward { output: saved });
        result
    }
}

fn softmax_in_place(values: &mut [f32]) {
    let max_val = values.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max_val).exp();
        sum += *v;
    }
    for v in values.iter_mut() {
        *v /= sum;
    }
}

// ============================================================================
// Linear Algebra
// ============================================================================

impl Tensor {
    /// Matrix multiplication: z = self @ other
    ///
    /// # Panics
    ///
    /// Panics if either operand is not 2D or the inner dimensions differ.
    #[must_use]
    pub fn matmul(&self, other: &Tensor) -> Tensor {
        assert_eq!(self.ndim(), 2, "matmul requires 2D tensors");
        assert_eq!(other.ndim(), 2, "matmul requires 2D tensors");

        let (m, k1) = (self.shape()[0], self.shape()[1]);
        let (k2, n) = (other.shape()[0], other.shape()[1]);
        assert_eq!(k1, k2, "matmul dimension mismatch: {k1} vs {k2}");

        let data = matmul_dense(self.data(), other.data(), m, k1, n);
        let mut result = Tensor::from_vec(data, &[m, n]);
        record_op(&mut result, &[self, other], || MatmulBackward {
            x: self.clone(),
            y: other.clone(),
        });
        result
    }

    /// Add a 1D bias to every row: z[i, j] = self[i, j] + bias[j]
    ///
    /// # Panics
    ///
    /// Panics if `bias` length differs from the number of columns.
    #[must_use]
    pub fn broadcast_add(&self, bias: &Tensor) -> Tensor {
        let cols = self.cols();
        assert_eq!(
            bias.numel(),
            cols,
            "broadcast_add: bias has {} values for {} columns",
            bias.numel(),
            cols
        );

        let mut data = self.data().to_vec();
        for row in data.chunks_mut(cols.max(1)) {
            for (v, &b) in row.iter_mut().zip(bias.data()) {
                *v += b;
            }
        }

        let mut result = Tensor::from_vec(data, self.shape());
        record_op(&mut result, &[self, bias], || BroadcastAddBackward { cols });
        result
    }

    /// Concatenate 2D tensors with equal row counts along the columns.
    ///
    /// # Panics
    ///
    /// Panics if `parts` is empty or the row counts differ.
    #[must_use]
    pub fn concat_cols(parts: &[Tensor]) -> Tensor {
        assert!(!parts.is_empty(), "concat_cols needs at least one tensor");
        let rows = parts[0].rows();
        assert!(
            parts.iter().all(|p| p.rows() == rows),
            "concat_cols: row counts differ"
        );

        let widths: Vec<usize> = parts.iter().map(Tensor::cols).collect();
        let total: usize = widths.iter().sum();
        let mut data = Vec::with_capacity(rows * total);
        for r in 0..rows {
            for part in parts {
                data.extend_from_slice(part.row(r));
            }
        }

        let mut result = Tensor::from_vec(data, &[rows, total]);
        let inputs: Vec<&Tensor> = parts.iter().collect();
        record_op(&mut result, &inputs, || ConcatColsBackward { rows, widths });
        result
    }
}

// ============================================================================
// Sparse Graph Operations
// ============================================================================

impl Tensor {
    /// Propagate node features with a fixed sparse operator: z = A · self
    ///
    /// # Panics
    ///
    /// Panics if the operator's column count differs from the row count.
    #[must_use]
    pub fn propagate(&self, operator: &Arc<SparseMatrix>) -> Tensor {
        assert_eq!(
            operator.n_cols(),
            self.rows(),
            "propagate: operator has {} columns, features have {} rows",
            operator.n_cols(),
            self.rows()
        );

        let cols = self.cols();
        let data = operator.matmul_dense(self.data(), cols);
        let mut result = Tensor::from_vec(data, &[operator.n_rows(), cols]);
        record_op(&mut result, &[self], || PropagateBackward {
            operator: Arc::clone(operator),
            cols,
        });
        result
    }

    /// Per-entry sums `src[i] + dst[j]` for every stored entry `(i, j)` of
    /// `pattern`, in CSR order.
    ///
    /// `src` and `dst` are `N×1` column tensors.
    ///
    /// # Panics
    ///
    /// Panics if `src`/`dst` lengths differ from the pattern dimensions.
    #[must_use]
    pub fn edge_scores(src: &Tensor, dst: &Tensor, pattern: &Arc<SparseMatrix>) -> Tensor {
        assert_eq!(src.numel(), pattern.n_rows(), "edge_scores: source length");
        assert_eq!(dst.numel(), pattern.n_cols(), "edge_scores: target length");

        let mut data = Vec::with_capacity(pattern.nnz());
        for r in 0..pattern.n_rows() {
            let (cols, _) = pattern.row(r);
            data.extend(cols.iter().map(|&c| src.data()[r] + dst.data()[c]));
        }

        let mut result = Tensor::from_vec(data, &[pattern.nnz()]);
        record_op(&mut result, &[src, dst], || EdgeScoreBackward {
            pattern: Arc::clone(pattern),
        });
        result
    }

    /// Softmax of per-entry values within each row of `pattern`.
    ///
    /// Rows without stored entries contribute nothing.
    ///
    /// # Panics
    ///
    /// Panics if `self` does not hold one value per stored entry.
    #[must_use]
    pub fn segment_softmax(&self, pattern: &Arc<SparseMatrix>) -> Tensor {
        assert_eq!(self.numel(), pattern.nnz(), "segment_softmax: one value per entry");

        let mut data = self.data().to_vec();
        for r in 0..pattern.n_rows() {
            let (start, end) = (pattern.indptr()[r], pattern.indptr()[r + 1]);
            if start < end {
                softmax_in_place(&mut data[start..end]);
            }
        }

        let mut result = Tensor::from_vec(data, self.shape());
        let output = result.detach();
        record_op(&mut result, &[self], || SegmentSoftmaxBackward {
            pattern: Arc::clone(pattern),
            output,
        });
        result
    }

    /// Weighted neighbourhood sum: z[i] = Σ_k self[k] · x[col_k] over the
    /// stored entries k of row i, with `self` holding one weight per entry.
    ///
    /// # Panics
    ///
    /// Panics if the weight count or the rows of `x` do not match `pattern`.
    #[must_use]
    pub fn edge_aggregate(&self, x: &Tensor, pattern: &Arc<SparseMatrix>) -> Tensor {
        assert_eq!(self.numel(), pattern.nnz(), "edge_aggregate: one weight per entry");
        assert_eq!(x.rows(), pattern.n_cols(), "edge_aggregate: feature rows");

        let cols = x.cols();
        let mut data = vec![0.0f32; pattern.n_rows() * cols];
        for (r, dst) in data.chunks_mut(cols.max(1)).enumerate().take(pattern.n_rows()) {
            for k in pattern.indptr()[r]..pattern.indptr()[r + 1] {
                let w = self.data()[k];
                for (d, &v) in dst.iter_mut().zip(x.row(pattern.indices()[k])) {
                    *d += w * v;
                }
            }
        }

        let mut result = Tensor::from_vec(data, &[pattern.n_rows(), cols]);
        record_op(&mut result, &[self, x], || EdgeAggregateBackward {
            pattern: Arc::clone(pattern),
            weights: self.clone(),
            x: x.clone(),
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{clear_graph, get_grad, no_grad};

    /// Numerical gradient check using central differences.
    fn numerical_gradient<F>(f: F, x: &Tensor, eps: f32) -> Tensor
    where
        F: Fn(&Tensor) -> Tensor,
    {
        let mut grad_data = vec![0.0; x.numel()];

        for i in 0..x.numel() {
            let mut x_plus = x.data().to_vec();
            let mut x_minus = x.data().to_vec();
            x_plus[i] += eps;
            x_minus[i] -= eps;

            let y_plus = no_grad(|| f(&Tensor::new(&x_plus, x.shape())).item());
            let y_minus = no_grad(|| f(&Tensor::new(&x_minus, x.shape())).item());

            grad_data[i] = (y_plus - y_minus) / (2.0 * eps);
        }

        Tensor::new(&grad_data, x.shape())
    }

    fn check_gradient<F>(f: F, x: &Tensor, eps: f32, tol: f32) -> bool
    where
        F: Fn(&Tensor) -> Tensor,
    {
        clear_graph();

        let x_grad = x.clone().requires_grad();
        let x_id = x_grad.id();
        let y = f(&x_grad);
        y.backward();

        let analytical = get_grad(x_id).expect("No gradient computed");
        let numerical = numerical_gradient(&f, x, eps);
        clear_graph();

        let max_diff: f32 = analytical
            .data()
            .iter()
            .zip(numerical.data().iter())
            .map(|(a, n)| (a - n).abs())
            .fold(0.0, f32::max);

        max_diff < tol
    }

    /// Weighted sum so that every output element contributes differently.
    fn weighted_sum(t: &Tensor) -> Tensor {
        let w: Vec<f32> = (0..t.numel()).map(|i| 0.3 + 0.1 * i as f32).collect();
        t.mul(&Tensor::new(&w, t.shape())).sum()
    }

    fn triangle_with_loops() -> Arc<SparseMatrix> {
        let adj = SparseMatrix::from_edge_index(&[[0, 1], [1, 2], [0, 2]], 3)
            .expect("valid edges")
            .symmetrize()
            .add_self_loops();
        Arc::new(adj)
    }

    #[test]
    fn test_simple_sum_gradient() {
        clear_graph();

        let x = Tensor::from_slice(&[1.0, 2.0, 3.0]).requires_grad();
        x.sum().backward();

        let grad = get_grad(x.id()).expect("Gradient should exist");
        assert_eq!(grad.data(), &[1.0, 1.0, 1.0]);
        clear_graph();
    }

    #[test]
    fn test_shared_input_gradients_accumulate() {
        clear_graph();

        // d/dx (x*x + x) = 2x + 1
        let x = Tensor::from_slice(&[2.0, -1.0]).requires_grad();
        x.mul(&x).add(&x).sum().backward();

        let grad = get_grad(x.id()).expect("gradient");
        assert_eq!(grad.data(), &[5.0, -1.0]);
        clear_graph();
    }

    #[test]
    fn test_mul_gradient() {
        let x = Tensor::from_slice(&[1.0, -2.0, 3.0]);
        assert!(check_gradient(|t| weighted_sum(&t.mul(t)), &x, 1e-3, 1e-2));
    }

    #[test]
    fn test_pow_gradient() {
        let x = Tensor::from_slice(&[0.5, -1.5, 2.0]);
        assert!(check_gradient(|t| t.pow(2.0).sum(), &x, 1e-3, 1e-2));
    }

    #[test]
    fn test_mean_gradient() {
        let x = Tensor::from_slice(&[1.0, 2.0, 3.0, 4.0]);
        assert!(check_gradient(|t| t.mean(), &x, 1e-3, 1e-3));
    }

    #[test]
    fn test_activation_gradients() {
        let x = Tensor::new(&[0.7, -0.4, 1.3, -2.1, 0.2, -0.9], &[2, 3]);
        assert!(check_gradient(|t| weighted_sum(&t.relu()), &x, 1e-3, 1e-2));
        assert!(check_gradient(|t| weighted_sum(&t.elu(1.0)), &x, 1e-3, 1e-2));
        assert!(check_gradient(|t| weighted_sum(&t.leaky_relu(0.2)), &x, 1e-3, 1e-2));
        assert!(check_gradient(|t| weighted_sum(&t.sigmoid()), &x, 1e-3, 1e-2));
        assert!(check_gradient(|t| weighted_sum(&t.tanh_()), &x, 1e-3, 1e-2));
        assert!(check_gradient(|t| weighted_sum(&t.softmax()), &x, 1e-3, 1e-2));
    }

    #[test]
    fn test_elu_forward() {
        let y = Tensor::from_slice(&[1.0, 0.0, -1.0]).elu(1.0);
        assert_eq!(y.data()[0], 1.0);
        assert_eq!(y.data()[1], 0.0);
        assert!((y.data()[2] - ((-1.0f32).exp() - 1.0)).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let y = Tensor::new(&[1.0, 2.0, 3.0, 1000.0, 1000.0, -1000.0], &[2, 3]).softmax();
        for i in 0..2 {
            let s: f32 = y.row(i).iter().sum();
            assert!((s - 1.0).abs() < 1e-5);
        }
        assert!(y.is_finite());
    }

    #[test]
    fn test_matmul_forward() {
        let a = Tensor::new(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let b = Tensor::new(&[7.0, 8.0, 9.0, 10.0, 11.0, 12.0], &[3, 2]);
        let c = a.matmul(&b);
        assert_eq!(c.shape(), &[2, 2]);
        assert_eq!(c.data(), &[58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_matmul_gradients() {
        let x = Tensor::new(&[0.5, -1.0, 2.0, 0.3, 1.1, -0.7], &[3, 2]);
        let w = Tensor::new(&[0.2, -0.4, 0.9, 0.6], &[2, 2]);
        assert!(check_gradient(|t| weighted_sum(&x.matmul(t)), &w, 1e-3, 1e-2));
        assert!(check_gradient(|t| weighted_sum(&t.matmul(&w)), &x, 1e-3, 1e-2));
    }

    #[test]
    fn test_broadcast_add_bias_gradient() {
        let x = Tensor::new(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let b = Tensor::from_slice(&[0.1, -0.1]);
        assert!(check_gradient(|t| weighted_sum(&x.broadcast_add(t)), &b, 1e-3, 1e-2));
    }

    #[test]
    fn test_concat_cols() {
        let a = Tensor::new(&[1.0, 2.0], &[2, 1]);
        let b = Tensor::new(&[3.0, 4.0, 5.0, 6.0], &[2, 2]);
        let c = Tensor::concat_cols(&[a.clone(), b.clone()]);
        assert_eq!(c.shape(), &[2, 3]);
        assert_eq!(c.data(), &[1.0, 3.0, 4.0, 2.0, 5.0, 6.0]);

        assert!(check_gradient(
            |t| weighted_sum(&Tensor::concat_cols(&[a.clone(), t.clone()])),
            &b,
            1e-3,
            1e-2
        ));
    }

    #[test]
    fn test_propagate_matches_dense() {
        let op = Arc::new(SparseMatrix::from_edge_index(&[[0, 1], [1, 2]], 3).expect("edges").gcn_filter());
        let x = Tensor::new(&[1.0, 0.0, 0.0, 1.0, 1.0, 1.0], &[3, 2]);
        let y = x.propagate(&op);

        let dense = Tensor::new(&op.to_dense(), &[3, 3]);
        let expected = dense.matmul(&x);
        for (a, b) in y.data().iter().zip(expected.data()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_propagate_gradient() {
        let op = triangle_with_loops();
        let x = Tensor::new(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6], &[3, 2]);
        assert!(check_gradient(|t| weighted_sum(&t.propagate(&op)), &x, 1e-3, 1e-2));
    }

    #[test]
    fn test_edge_scores_and_gradient() {
        let pattern = triangle_with_loops();
        let src = Tensor::new(&[1.0, 2.0, 3.0], &[3, 1]);
        let dst = Tensor::new(&[10.0, 20.0, 30.0], &[3, 1]);
        let e = Tensor::edge_scores(&src, &dst, &pattern);
        assert_eq!(e.numel(), pattern.nnz());
        // First stored entry is (0, 0)
        assert_eq!(e.data()[0], 11.0);

        assert!(check_gradient(
            |t| weighted_sum(&Tensor::edge_scores(t, &dst, &pattern)),
            &src,
            1e-2,
            1e-2
        ));
        assert!(check_gradient(
            |t| weighted_sum(&Tensor::edge_scores(&src, t, &pattern)),
            &dst,
            1e-2,
            1e-2
        ));
    }

    #[test]
    fn test_segment_softmax_normalizes_rows() {
        let pattern = Arc::new(
            SparseMatrix::from_edge_index(&[[0, 1], [0, 2]], 4)
                .expect("edges")
                .add_self_loops(),
        );
        let logits = Tensor::from_vec((0..pattern.nnz()).map(|k| k as f32 * 0.5).collect(), &[pattern.nnz()]);
        let alpha = logits.segment_softmax(&pattern);

        for r in 0..pattern.n_rows() {
            let (start, end) = (pattern.indptr()[r], pattern.indptr()[r + 1]);
            let s: f32 = alpha.data()[start..end].iter().sum();
            assert!((s - 1.0).abs() < 1e-5, "row {r} sums to {s}");
        }
        // Row 3 only has its self-loop
        assert_eq!(alpha.data()[pattern.indptr()[3]], 1.0);
    }

    #[test]
    fn test_segment_softmax_gradient() {
        let pattern = triangle_with_loops();
        let logits = Tensor::from_vec(
            (0..pattern.nnz()).map(|k| (k as f32 * 0.37).sin()).collect(),
            &[pattern.nnz()],
        );
        assert!(check_gradient(
            |t| weighted_sum(&t.segment_softmax(&pattern)),
            &logits,
            1e-3,
            1e-2
        ));
    }

    #[test]
    fn test_edge_aggregate_and_gradients() {
        let pattern = triangle_with_loops();
        let weights = Tensor::from_vec(
            (0..pattern.nnz()).map(|k| 0.1 * (k + 1) as f32).collect(),
            &[pattern.nnz()],
        );
        let x = Tensor::new(&[1.0, -1.0, 0.5, 2.0, -0.3, 0.8], &[3, 2]);

        let z = weights.edge_aggregate(&x, &pattern);
        assert_eq!(z.shape(), &[3, 2]);

        assert!(check_gradient(
            |t| weighted_sum(&t.edge_aggregate(&x, &pattern)),
            &weights,
            1e-3,
            1e-2
        ));
        assert!(check_gradient(
            |t| weighted_sum(&weights.edge_aggregate(t, &pattern)),
            &x,
            1e-3,
            1e-2
        ));
    }

    #[test]
    fn test_constant_operands_receive_no_gradient() {
        clear_graph();
        let w = Tensor::new(&[1.0, 2.0], &[2, 1]).requires_grad();
        let x = Tensor::new(&[3.0, 4.0], &[1, 2]);
        x.matmul(&w).sum().backward();

        assert!(get_grad(x.id()).is_none());
        assert_eq!(get_grad(w.id()).expect("grad").data(), &[3.0, 4.0]);
        clear_graph();
    }
}
