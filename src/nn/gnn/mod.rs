//! Graph convolution layers for node classification.
//!
//! Both layers take node features `X: [N, F]` and a sparse propagation
//! operator `A: [N, N]`, and return new node features `[N, F']`.
//!
//! - [`ArmaConv`]: ARMA graph filter, a combination of parallel recursive
//!   GCN stacks (Bianchi et al., 2021)
//! - [`GraphAttention`]: multi-head graph attention (Veličković et al., 2018)
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use citegnn::autograd::Tensor;
//! use citegnn::nn::gnn::{ArmaConfig, ArmaConv};
//! use citegnn::nn::GraphModule;
//! use citegnn::sparse::SparseMatrix;
//!
//! let a = SparseMatrix::from_edge_index(&[[0, 1], [1, 2]], 3)?.symmetrize();
//! let filter = Arc::new(a.gcn_filter());
//!
//! let conv = ArmaConv::new(4, ArmaConfig::new(8).with_order(2).with_seed(0))?;
//! let out = conv.forward(&Tensor::ones(&[3, 4]), &filter)?;
//! assert_eq!(out.shape(), &[3, 8]);
//! # Ok::<(), citegnn::GnnError>(())
//! ```
//!
//! # References
//!
//! - Bianchi, F. M., et al. (2021). Graph Neural Networks with convolutional
//!   ARMA filters. IEEE TPAMI.
//! - Veličković, P., et al. (2018). Graph Attention Networks. ICLR.
//! - Kipf, T. N., & Welling, M. (2017). Semi-Supervised Classification with
//!   Graph Convolutional Networks. ICLR.

mod arma;
mod gat;

pub use arma::{ArmaConfig, ArmaConv, StackCombine};
pub use gat::{GatConfig, GraphAttention};

use crate::autograd::Tensor;
use crate::error::{GnnError, Result};
use crate::sparse::SparseMatrix;

/// Check that `x` is `[N, in_features]` and `operator` is `[N, N]`.
pub(crate) fn check_inputs(
    x: &Tensor,
    operator: &SparseMatrix,
    in_features: usize,
) -> Result<()> {
    if x.ndim() != 2 {
        return Err(GnnError::shape("node feature rank", 2, x.ndim()));
    }
    if x.cols() != in_features {
        return Err(GnnError::shape("input feature width", in_features, x.cols()));
    }
    if !operator.is_square() {
        return Err(GnnError::shape(
            "square propagation operator",
            operator.n_rows(),
            operator.n_cols(),
        ));
    }
    if operator.n_rows() != x.rows() {
        return Err(GnnError::shape("operator size", x.rows(), operator.n_rows()));
    }
    Ok(())
}

/// Mean of equally shaped tensors.
pub(crate) fn mean_of(parts: &[Tensor]) -> Tensor {
    let total = parts
        .iter()
        .skip(1)
        .fold(parts[0].clone(), |acc, p| acc.add(p));
    if parts.len() == 1 {
        total
    } else {
        total.mul_scalar(1.0 / parts.len() as f32)
    }
}
