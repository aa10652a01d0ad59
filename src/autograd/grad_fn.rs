//! Backward functions of differentiable operations.
//!
//! Each operation captures what it needs from the forward pass and maps
//! the gradient of its output to one gradient per input, in input order.

use std::sync::Arc;

use super::tensor::Tensor;
use crate::sparse::SparseMatrix;

/// Trait for functions that compute gradients during the backward pass.
///
/// For element-wise addition `z = x + y` both partial derivatives are 1,
/// so `backward(g)` returns `[g, g]`.
pub trait GradFn: Send + Sync {
    /// Gradients with respect to the inputs, in forward-pass input order.
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor>;

    /// Human-readable name for debugging.
    fn name(&self) -> &'static str;
}

// ============================================================================
// Dense products (trueno)
// ============================================================================

/// Row-major product of two matrices through trueno's SIMD matmul,
/// optionally transposing either operand first.
///
/// # Panics
///
/// Panics if a slice length does not match its shape or the inner
/// dimensions differ; callers check shapes beforehand.
#[allow(clippy::expect_used)]
fn trueno_product(
    a: &[f32],
    a_shape: (usize, usize),
    transpose_a: bool,
    b: &[f32],
    b_shape: (usize, usize),
    transpose_b: bool,
) -> Vec<f32> {
    let mut lhs = trueno::Matrix::from_vec(a_shape.0, a_shape.1, a.to_vec())
        .expect("valid matrix dimensions");
    let mut rhs = trueno::Matrix::from_vec(b_shape.0, b_shape.1, b.to_vec())
        .expect("valid matrix dimensions");
    if transpose_a {
        lhs = lhs.transpose();
    }
    if transpose_b {
        rhs = rhs.transpose();
    }
    lhs.matmul(&rhs)
        .expect("matmul inner dimensions agree")
        .as_slice()
        .to_vec()
}

/// `C = A · B` with `A: m×k`, `B: k×n`.
pub(crate) fn matmul_dense(a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Vec<f32> {
    trueno_product(a, (m, k), false, b, (k, n), false)
}

/// `C = Aᵀ · B` with `A: m×k`, `B: m×n`, giving `k×n`.
pub(crate) fn matmul_at_b(a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Vec<f32> {
    trueno_product(a, (m, k), true, b, (m, n), false)
}

/// `C = A · Bᵀ` with `A: m×n`, `B: k×n`, giving `m×k`.
pub(crate) fn matmul_a_bt(a: &[f32], b: &[f32], m: usize, n: usize, k: usize) -> Vec<f32> {
    trueno_product(a, (m, n), false, b, (k, n), true)
}

fn map_with<F>(grad_output: &Tensor, other: &Tensor, f: F) -> Tensor
where
    F: Fn(f32, f32) -> f32,
{
    let data = grad_output
        .data()
        .iter()
        .zip(other.data())
        .map(|(&g, &o)| f(g, o))
        .collect();
    Tensor::from_vec(data, grad_output.shape())
}

// ============================================================================
// Element-wise Operations
// ============================================================================

/// z = x + y (same shapes)
pub(crate) struct AddBackward;

impl GradFn for AddBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        vec![grad_output.detach(), grad_output.detach()]
    }

    fn name(&self) -> &'static str {
        "AddBackward"
    }
}

/// z = x * y (same shapes)
pub(crate) struct MulBackward {
    pub(crate) x: Tensor,
    pub(crate) y: Tensor,
}

impl GradFn for MulBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        // ∂(x*y)/∂x = y, ∂(x*y)/∂y = x
        vec![
            map_with(grad_output, &self.y, |g, y| g * y),
            map_with(grad_output, &self.x, |g, x| g * x),
        ]
    }

    fn name(&self) -> &'static str {
        "MulBackward"
    }
}

/// z = -x
pub(crate) struct NegBackward;

impl GradFn for NegBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let data = grad_output.data().iter().map(|&g| -g).collect();
        vec![Tensor::from_vec(data, grad_output.shape())]
    }

    fn name(&self) -> &'static str {
        "NegBackward"
    }
}

/// z = x * c
pub(crate) struct MulScalarBackward {
    pub(crate) scalar: f32,
}

impl GradFn for MulScalarBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let data = grad_output.data().iter().map(|&g| g * self.scalar).collect();
        vec![Tensor::from_vec(data, grad_output.shape())]
    }

    fn name(&self) -> &'static str {
        "MulScalarBackward"
    }
}

/// z = x^n
pub(crate) struct PowBackward {
    pub(crate) x: Tensor,
    pub(crate) n: f32,
}

impl GradFn for PowBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let n = self.n;
        vec![map_with(grad_output, &self.x, |g, x| g * n * x.powf(n - 1.0))]
    }

    fn name(&self) -> &'static str {
        "PowBackward"
    }
}

// ============================================================================
// Reductions
// ============================================================================

/// z = sum(x)
pub(crate) struct SumBackward {
    pub(crate) input_shape: Vec<usize>,
}

impl GradFn for SumBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        vec![Tensor::full(&self.input_shape, grad_output.item())]
    }

    fn name(&self) -> &'static str {
        "SumBackward"
    }
}

/// z = mean(x)
pub(crate) struct MeanBackward {
    pub(crate) input_shape: Vec<usize>,
}

impl GradFn for MeanBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let numel: usize = self.input_shape.iter().product();
        vec![Tensor::full(
            &self.input_shape,
            grad_output.item() / numel as f32,
        )]
    }

    fn name(&self) -> &'static str {
        "MeanBackward"
    }
}

// ============================================================================
// Activations
// ============================================================================

/// z = max(0, x)
pub(crate) struct ReluBackward {
    pub(crate) x: Tensor,
}

impl GradFn for ReluBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        vec![map_with(grad_output, &self.x, |g, x| if x > 0.0 { g } else { 0.0 })]
    }

    fn name(&self) -> &'static str {
        "ReluBackward"
    }
}

/// z = x if x > 0 else α(eˣ − 1)
pub(crate) struct EluBackward {
    pub(crate) output: Tensor,
    pub(crate) alpha: f32,
}

impl GradFn for EluBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        // For x <= 0, dz/dx = α eˣ = z + α
        let alpha = self.alpha;
        vec![map_with(grad_output, &self.output, |g, z| {
            if z > 0.0 {
                g
            } else {
                g * (z + alpha)
            }
        })]
    }

    fn name(&self) -> &'static str {
        "EluBackward"
    }
}

/// z = x if x > 0 else slope * x
pub(crate) struct LeakyReluBackward {
    pub(crate) x: Tensor,
    pub(crate) negative_slope: f32,
}

impl GradFn for LeakyReluBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let slope = self.negative_slope;
        vec![map_with(grad_output, &self.x, |g, x| {
            if x > 0.0 {
                g
            } else {
                g * slope
            }
        })]
    }

    fn name(&self) -> &'static str {
        "LeakyReluBackward"
    }
}

/// z = 1 / (1 + e^-x)
pub(crate) struct SigmoidBackward {
    pub(crate) output: Tensor,
}

impl GradFn for SigmoidBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        vec![map_with(grad_output, &self.output, |g, s| g * s * (1.0 - s))]
    }

    fn name(&self) -> &'static str {
        "SigmoidBackward"
    }
}

/// z = tanh(x)
pub(crate) struct TanhBackward {
    pub(crate) output: Tensor,
}

impl GradFn for TanhBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        vec![map_with(grad_output, &self.output, |g, t| g * (1.0 - t * t))]
    }

    fn name(&self) -> &'static str {
        "TanhBackward"
    }
}

/// Row-wise softmax of a 2D tensor.
///
/// ∂L/∂x_i = y_i (g_i − Σ_j g_j y_j)
pub(crate) struct SoftmaxBackward {
    pub(crate) output: Tensor,
}

impl GradFn for SoftmaxBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let cols = self.output.cols();
        let mut grad_input = vec![0.0f32; self.output.numel()];

        for ((g_row, y_row), dst) in grad_output
            .data()
            .chunks(cols)
            .zip(self.output.data().chunks(cols))
            .zip(grad_input.chunks_mut(cols))
        {
            let dot: f32 = g_row.iter().zip(y_row).map(|(g, y)| g * y).sum();
            for ((d, &g), &y) in dst.iter_mut().zip(g_row).zip(y_row) {
                *d = y * (g - dot);
            }
        }

        vec![Tensor::from_vec(grad_input, grad_output.shape())]
    }

    fn name(&self) -> &'static str {
        "SoftmaxBackward"
    }
}

// ============================================================================
// Linear Algebra
// ============================================================================

/// z = x @ y
pub(crate) struct MatmulBackward {
    pub(crate) x: Tensor,
    pub(crate) y: Tensor,
}

impl GradFn for MatmulBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        // ∂L/∂X = G · Yᵀ, ∂L/∂Y = Xᵀ · G
        let (m, k) = (self.x.rows(), self.x.cols());
        let n = self.y.cols();
        let g = grad_output.data();

        // Constant operands (features, fixed masks) never need a gradient.
        let grad_x = if self.x.requires_grad_enabled() {
            Tensor::from_vec(matmul_a_bt(g, self.y.data(), m, n, k), self.x.shape())
        } else {
            Tensor::zeros(&[0])
        };
        let grad_y = if self.y.requires_grad_enabled() {
            Tensor::from_vec(matmul_at_b(self.x.data(), g, m, k, n), self.y.shape())
        } else {
            Tensor::zeros(&[0])
        };

        vec![grad_x, grad_y]
    }

    fn name(&self) -> &'static str {
        "MatmulBackward"
    }
}

/// z = X + b, b broadcast over the rows of X
pub(crate) struct BroadcastAddBackward {
    pub(crate) cols: usize,
}

impl GradFn for BroadcastAddBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let mut grad_b = vec![0.0f32; self.cols];
        for row in grad_output.data().chunks(self.cols) {
            for (acc, &g) in grad_b.iter_mut().zip(row) {
                *acc += g;
            }
        }
        vec![grad_output.detach(), Tensor::from_vec(grad_b, &[self.cols])]
    }

    fn name(&self) -> &'static str {
        "BroadcastAddBackward"
    }
}

/// z = [x_1 ‖ x_2 ‖ …] along columns
pub(crate) struct ConcatColsBackward {
    pub(crate) rows: usize,
    pub(crate) widths: Vec<usize>,
}

impl GradFn for ConcatColsBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let total: usize = self.widths.iter().sum();
        let mut offset = 0;
        self.widths
            .iter()
            .map(|&w| {
                let mut data = Vec::with_capacity(self.rows * w);
                for r in 0..self.rows {
                    let start = r * total + offset;
                    data.extend_from_slice(&grad_output.data()[start..start + w]);
                }
                offset += w;
                Tensor::from_vec(data, &[self.rows, w])
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "ConcatColsBackward"
    }
}

// ============================================================================
// Sparse graph operations
// ============================================================================

/// z = A · x with a constant sparse operator A
pub(crate) struct PropagateBackward {
    pub(crate) operator: Arc<SparseMatrix>,
    pub(crate) cols: usize,
}

impl GradFn for PropagateBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let data = self
            .operator
            .transpose_matmul_dense(grad_output.data(), self.cols);
        vec![Tensor::from_vec(data, &[self.operator.n_cols(), self.cols])]
    }

    fn name(&self) -> &'static str {
        "PropagateBackward"
    }
}

/// e_k = s[row_k] + t[col_k] for every stored entry k of the pattern
pub(crate) struct EdgeScoreBackward {
    pub(crate) pattern: Arc<SparseMatrix>,
}

impl GradFn for EdgeScoreBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let n_rows = self.pattern.n_rows();
        let n_cols = self.pattern.n_cols();
        let mut grad_src = vec![0.0f32; n_rows];
        let mut grad_dst = vec![0.0f32; n_cols];
        let g = grad_output.data();

        for (r, acc) in grad_src.iter_mut().enumerate() {
            let (start, end) = (self.pattern.indptr()[r], self.pattern.indptr()[r + 1]);
            for k in start..end {
                *acc += g[k];
                grad_dst[self.pattern.indices()[k]] += g[k];
            }
        }

        vec![
            Tensor::from_vec(grad_src, &[n_rows, 1]),
            Tensor::from_vec(grad_dst, &[n_cols, 1]),
        ]
    }

    fn name(&self) -> &'static str {
        "EdgeScoreBackward"
    }
}

/// Softmax over the stored entries of each row of the pattern
pub(crate) struct SegmentSoftmaxBackward {
    pub(crate) pattern: Arc<SparseMatrix>,
    pub(crate) output: Tensor,
}

impl GradFn for SegmentSoftmaxBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let g = grad_output.data();
        let y = self.output.data();
        let mut grad = vec![0.0f32; y.len()];

        for r in 0..self.pattern.n_rows() {
            let (start, end) = (self.pattern.indptr()[r], self.pattern.indptr()[r + 1]);
            let dot: f32 = (start..end).map(|k| g[k] * y[k]).sum();
            for k in start..end {
                grad[k] = y[k] * (g[k] - dot);
            }
        }

        vec![Tensor::from_vec(grad, grad_output.shape())]
    }

    fn name(&self) -> &'static str {
        "SegmentSoftmaxBackward"
    }
}

/// z_i = Σ_k w_k · x[col_k] over the stored entries k of row i
pub(crate) struct EdgeAggregateBackward {
    pub(crate) pattern: Arc<SparseMatrix>,
    pub(crate) weights: Tensor,
    pub(crate) x: Tensor,
}

impl GradFn for EdgeAggregateBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let cols = self.x.cols();
        let g = grad_output.data();
        let x = self.x.data();
        let w = self.weights.data();
        let mut grad_w = vec![0.0f32; w.len()];
        let mut grad_x = vec![0.0f32; x.len()];

        for r in 0..self.pattern.n_rows() {
            let g_row = &g[r * cols..(r + 1) * cols];
            for k in self.pattern.indptr()[r]..self.pattern.indptr()[r + 1] {
                let c = self.pattern.indices()[k];
                let x_row = &x[c * cols..(c + 1) * cols];
                grad_w[k] = g_row.iter().zip(x_row).map(|(a, b)| a * b).sum();
                for (gx, &gr) in grad_x[c * cols..(c + 1) * cols].iter_mut().zip(g_row) {
                    *gx += w[k] * gr;
                }
            }
        }

        vec![
            Tensor::from_vec(grad_w, self.weights.shape()),
            Tensor::from_vec(grad_x, self.x.shape()),
        ]
    }

    fn name(&self) -> &'static str {
        "EdgeAggregateBackward"
    }
}

// ============================================================================
// Loss
// ============================================================================

/// Sample-weighted categorical cross-entropy on probabilities:
/// L = Σ_i w_i · −ln(clip(p[i, y_i])) / Σ_i w_i
pub(crate) struct MaskedCrossEntropyBackward {
    pub(crate) probs: Tensor,
    pub(crate) targets: Vec<usize>,
    pub(crate) weights: Vec<f32>,
    pub(crate) denom: f32,
    pub(crate) epsilon: f32,
}

impl GradFn for MaskedCrossEntropyBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let g = grad_output.item();
        let cols = self.probs.cols();
        let p = self.probs.data();
        let mut grad = vec![0.0f32; p.len()];

        if self.denom > 0.0 {
            for (i, (&t, &w)) in self.targets.iter().zip(&self.weights).enumerate() {
                if w == 0.0 {
                    continue;
                }
                let p_it = p[i * cols + t];
                // Clipped probabilities have zero gradient.
                if p_it > self.epsilon && p_it < 1.0 - self.epsilon {
                    grad[i * cols + t] = -g * w / (p_it * self.denom);
                }
            }
        }

        vec![Tensor::from_vec(grad, self.probs.shape())]
    }

    fn name(&self) -> &'static str {
        "MaskedCrossEntropyBackward"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_products() {
        // A: 2x3, B: 3x2
        let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let b = [7.0, 8.0, 9.0, 10.0, 11.0, 12.0];
        assert_eq!(matmul_dense(&a, &b, 2, 3, 2), vec![58.0, 64.0, 139.0, 154.0]);

        // Aᵀ·A: 3x3
        let ata = matmul_at_b(&a, &a, 2, 3, 3);
        assert_eq!(ata[0], 17.0);
        assert_eq!(ata[4], 29.0);

        // A·Aᵀ: 2x2
        assert_eq!(matmul_a_bt(&a, &a, 2, 3, 2), vec![14.0, 32.0, 32.0, 77.0]);

        // Non-square transposed operands: Bᵀ·Aᵀ = (A·B)ᵀ
        let ab_t = matmul_at_b(&b, &matmul_at_b(&a, &[1.0, 0.0, 0.0, 1.0], 2, 3, 2), 3, 2, 2);
        assert_eq!(ab_t.len(), 4);
        assert_eq!(ab_t, vec![58.0, 139.0, 64.0, 154.0]);
    }

    #[test]
    fn test_add_backward() {
        let g = Tensor::from_slice(&[1.0, 2.0]);
        let grads = AddBackward.backward(&g);
        assert_eq!(grads.len(), 2);
        assert_eq!(grads[0].data(), &[1.0, 2.0]);
        assert_eq!(grads[1].data(), &[1.0, 2.0]);
    }

    #[test]
    fn test_broadcast_add_backward_sums_rows() {
        let g = Tensor::new(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let grads = BroadcastAddBackward { cols: 2 }.backward(&g);
        assert_eq!(grads[1].data(), &[4.0, 6.0]);
    }

    #[test]
    fn test_concat_backward_splits() {
        let g = Tensor::new(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let grads = ConcatColsBackward {
            rows: 2,
            widths: vec![1, 2],
        }
        .backward(&g);
        assert_eq!(grads[0].data(), &[1.0, 4.0]);
        assert_eq!(grads[1].data(), &[2.0, 3.0, 5.0, 6.0]);
    }

    #[test]
    fn test_masked_ce_backward_zero_weight() {
        let probs = Tensor::new(&[0.5, 0.5, 0.2, 0.8], &[2, 2]);
        let grad_fn = MaskedCrossEntropyBackward {
            probs,
            targets: vec![0, 1],
            weights: vec![0.0, 0.0],
            denom: 0.0,
            epsilon: 1e-7,
        };
        let grads = grad_fn.backward(&Tensor::from_slice(&[1.0]));
        assert!(grads[0].data().iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_names() {
        assert_eq!(NegBackward.name(), "NegBackward");
        assert_eq!(AddBackward.name(), "AddBackward");
    }
}
