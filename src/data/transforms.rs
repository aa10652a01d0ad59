//! Dataset preprocessing.

use serde::{Deserialize, Serialize};

use super::Dataset;
use crate::autograd::Tensor;
use crate::error::Result;
use crate::sparse::SparseMatrix;

/// Layer family whose propagation operator a dataset is prepared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    /// Renormalized filter `D̃^(-1/2) (A + I) D̃^(-1/2)`
    Arma,
    /// Binary adjacency with self-loops, `A + I`
    Gat,
    /// Same filter as [`LayerKind::Arma`]
    Gcn,
}

impl LayerKind {
    /// Propagation operator this layer family expects.
    #[must_use]
    pub fn preprocess(self, adjacency: &SparseMatrix) -> SparseMatrix {
        match self {
            Self::Arma | Self::Gcn => adjacency.clone().binarize().gcn_filter(),
            Self::Gat => adjacency.clone().binarize().add_self_loops(),
        }
    }
}

/// A dataset-to-dataset preprocessing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    /// Replace the raw adjacency by the operator a layer family expects
    LayerPreprocess(LayerKind),
    /// Scale every feature row to sum to 1 (all-zero rows stay zero)
    RowNormalizeFeatures,
}

impl Transform {
    /// Apply the transform.
    ///
    /// # Errors
    ///
    /// Returns an error if the transformed dataset violates a shape invariant.
    pub fn apply(self, dataset: Dataset) -> Result<Dataset> {
        match self {
            Self::LayerPreprocess(kind) => {
                let operator = kind.preprocess(dataset.operator());
                dataset.with_operator(operator)
            }
            Self::RowNormalizeFeatures => {
                let normalized = row_normalize(dataset.features());
                dataset.with_features(normalized)
            }
        }
    }
}

fn row_normalize(x: &Tensor) -> Tensor {
    let cols = x.cols();
    let mut data = x.data().to_vec();
    for row in data.chunks_mut(cols.max(1)) {
        let sum: f32 = row.iter().sum();
        if sum != 0.0 {
            row.iter_mut().for_each(|v| *v /= sum);
        }
    }
    Tensor::from_vec(data, x.shape())
}
