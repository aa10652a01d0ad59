//! Node-classification datasets.
//!
//! A [`Dataset`] bundles the node feature matrix `X: [N, F]`, the sparse
//! propagation operator `A: [N, N]`, one integer label per node and three
//! pairwise disjoint boolean masks selecting the training, validation and
//! test nodes. Every invariant is checked once, in [`Dataset::new`].

mod citation;
pub mod synthetic;
mod transforms;

pub use citation::{Citation, PlanetoidSplit};
pub use transforms::{LayerKind, Transform};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::autograd::Tensor;
use crate::error::{GnnError, Result};
use crate::sparse::SparseMatrix;

/// Boolean node selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mask(Vec<bool>);

impl Mask {
    /// Wrap a boolean vector.
    #[must_use]
    pub fn new(values: Vec<bool>) -> Self {
        Self(values)
    }

    /// Mask of length `len` with no node selected.
    #[must_use]
    pub fn empty(len: usize) -> Self {
        Self(vec![false; len])
    }

    /// Mask of length `len` selecting `indices`.
    ///
    /// # Errors
    ///
    /// Returns `DataShape` if an index is `>= len`.
    pub fn from_indices(len: usize, indices: &[usize]) -> Result<Self> {
        let mut values = vec![false; len];
        for &i in indices {
            if i >= len {
                return Err(GnnError::shape("mask index bound", len, i));
            }
            values[i] = true;
        }
        Ok(Self(values))
    }

    /// Number of nodes covered (selected or not).
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the mask covers no nodes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of selected nodes.
    #[must_use]
    pub fn count(&self) -> usize {
        self.0.iter().filter(|&&m| m).count()
    }

    /// Indices of the selected nodes.
    #[must_use]
    pub fn indices(&self) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(i, &m)| m.then_some(i))
            .collect()
    }

    /// Whether no node is selected by both masks.
    #[must_use]
    pub fn is_disjoint(&self, other: &Mask) -> bool {
        self.0.iter().zip(&other.0).all(|(&a, &b)| !(a && b))
    }

    /// Underlying booleans.
    #[must_use]
    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }
}

/// Features, graph, labels and splits of one node-classification problem.
#[derive(Debug, Clone)]
pub struct Dataset {
    name: String,
    features: Tensor,
    operator: Arc<SparseMatrix>,
    labels: Vec<usize>,
    num_classes: usize,
    train_mask: Mask,
    val_mask: Mask,
    test_mask: Mask,
}

impl Dataset {
    /// Assemble a dataset, checking every shape and split invariant.
    ///
    /// # Errors
    ///
    /// - `DataShape` if X is not `[N, F]` with F > 0, A is not `[N, N]`,
    ///   there are not N labels, a label is `>= num_classes`, or a mask does
    ///   not have length N
    /// - `Config` if two masks overlap or `num_classes` is zero
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        features: Tensor,
        operator: SparseMatrix,
        labels: Vec<usize>,
        num_classes: usize,
        train_mask: Mask,
        val_mask: Mask,
        test_mask: Mask,
    ) -> Result<Self> {
        let dataset = Self {
            name: name.into(),
            features,
            operator: Arc::new(operator),
            labels,
            num_classes,
            train_mask,
            val_mask,
            test_mask,
        };
        dataset.validate()?;
        Ok(dataset)
    }

    fn validate(&self) -> Result<()> {
        if self.features.ndim() != 2 {
            return Err(GnnError::shape("feature matrix rank", 2, self.features.ndim()));
        }
        let n = self.features.rows();
        if self.features.cols() == 0 {
            return Err(GnnError::shape("feature width", 1, 0));
        }
        if self.operator.n_rows() != n || self.operator.n_cols() != n {
            return Err(GnnError::DataShape {
                expected: format!("propagation operator {n}x{n}"),
                actual: format!("{}x{}", self.operator.n_rows(), self.operator.n_cols()),
            });
        }
        if self.labels.len() != n {
            return Err(GnnError::shape("labels per node", n, self.labels.len()));
        }
        if self.num_classes == 0 {
            return Err(GnnError::config("num_classes", 0, "a positive integer"));
        }
        if let Some(&bad) = self.labels.iter().find(|&&y| y >= self.num_classes) {
            return Err(GnnError::shape("class index bound", self.num_classes, bad));
        }

        let masks = [
            ("train", &self.train_mask),
            ("val", &self.val_mask),
            ("test", &self.test_mask),
        ];
        for (name, mask) in masks {
            if mask.len() != n {
                return Err(GnnError::shape(&format!("{name} mask length"), n, mask.len()));
            }
        }
        for (i, (a_name, a)) in masks.iter().enumerate() {
            for (b_name, b) in &masks[i + 1..] {
                if !a.is_disjoint(b) {
                    return Err(GnnError::config(
                        "masks",
                        format!("{a_name} and {b_name} overlap"),
                        "pairwise disjoint train/val/test masks",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Dataset name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node feature matrix `[N, F]`.
    #[must_use]
    pub fn features(&self) -> &Tensor {
        &self.features
    }

    /// Propagation operator `[N, N]`.
    #[must_use]
    pub fn operator(&self) -> &Arc<SparseMatrix> {
        &self.operator
    }

    /// Class index of every node.
    #[must_use]
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// One-hot label matrix `[N, C]`.
    #[must_use]
    pub fn one_hot_labels(&self) -> Tensor {
        let c = self.num_classes;
        let mut data = vec![0.0f32; self.labels.len() * c];
        for (i, &y) in self.labels.iter().enumerate() {
            data[i * c + y] = 1.0;
        }
        Tensor::from_vec(data, &[self.labels.len(), c])
    }

    #[must_use]
    pub fn train_mask(&self) -> &Mask {
        &self.train_mask
    }

    #[must_use]
    pub fn val_mask(&self) -> &Mask {
        &self.val_mask
    }

    #[must_use]
    pub fn test_mask(&self) -> &Mask {
        &self.test_mask
    }

    /// Number of nodes N.
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.features.rows()
    }

    /// Feature width F.
    #[must_use]
    pub fn num_features(&self) -> usize {
        self.features.cols()
    }

    /// Number of classes C.
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Number of stored operator entries.
    #[must_use]
    pub fn num_edges(&self) -> usize {
        self.operator.nnz()
    }

    /// Apply transforms in order.
    ///
    /// # Errors
    ///
    /// Propagates the first transform failure.
    pub fn transform(self, transforms: &[Transform]) -> Result<Self> {
        transforms.iter().try_fold(self, |ds, t| t.apply(ds))
    }

    pub(crate) fn with_features(mut self, features: Tensor) -> Result<Self> {
        self.features = features;
        self.validate()?;
        Ok(self)
    }

    pub(crate) fn with_operator(mut self, operator: SparseMatrix) -> Result<Self> {
        self.operator = Arc::new(operator);
        self.validate()?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path4() -> SparseMatrix {
        SparseMatrix::from_edge_index(&[[0, 1], [1, 2], [2, 3]], 4)
            .unwrap()
            .symmetrize()
    }

    fn masks() -> (Mask, Mask, Mask) {
        (
            Mask::from_indices(4, &[0, 2]).unwrap(),
            Mask::from_indices(4, &[1]).unwrap(),
            Mask::from_indices(4, &[3]).unwrap(),
        )
    }

    #[test]
    fn test_mask_basics() {
        let m = Mask::from_indices(5, &[1, 3]).unwrap();
        assert_eq!(m.len(), 5);
        assert_eq!(m.count(), 2);
        assert_eq!(m.indices(), vec![1, 3]);
        assert!(m.is_disjoint(&Mask::from_indices(5, &[0, 2]).unwrap()));
        assert!(!m.is_disjoint(&Mask::from_indices(5, &[3]).unwrap()));
        assert!(Mask::from_indices(2, &[2]).is_err());
        assert_eq!(Mask::empty(3).count(), 0);
    }

    #[test]
    fn test_valid_dataset() {
        let (tr, va, te) = masks();
        let ds = Dataset::new("path", Tensor::ones(&[4, 3]), path4(), vec![0, 0, 1, 1], 2, tr, va, te)
            .unwrap();
        assert_eq!(ds.num_nodes(), 4);
        assert_eq!(ds.num_features(), 3);
        assert_eq!(ds.num_classes(), 2);
        assert_eq!(ds.num_edges(), 6);

        let y = ds.one_hot_labels();
        assert_eq!(y.shape(), &[4, 2]);
        assert_eq!(y.row(2), &[0.0, 1.0]);
    }

    #[test]
    fn test_overlapping_masks_rejected() {
        let (tr, _, te) = masks();
        let val = Mask::from_indices(4, &[0]).unwrap();
        let err = Dataset::new("path", Tensor::ones(&[4, 3]), path4(), vec![0, 0, 1, 1], 2, tr, val, te)
            .unwrap_err();
        assert!(matches!(err, GnnError::Config { .. }));
    }

    #[test]
    fn test_shape_mismatches_rejected() {
        let (tr, va, te) = masks();
        let bad_rows = Dataset::new(
            "path",
            Tensor::ones(&[3, 3]),
            path4(),
            vec![0, 0, 1, 1],
            2,
            tr.clone(),
            va.clone(),
            te.clone(),
        );
        assert!(matches!(bad_rows, Err(GnnError::DataShape { .. })));

        let bad_label = Dataset::new(
            "path",
            Tensor::ones(&[4, 3]),
            path4(),
            vec![0, 0, 1, 2],
            2,
            tr.clone(),
            va.clone(),
            te.clone(),
        );
        assert!(matches!(bad_label, Err(GnnError::DataShape { .. })));

        let bad_mask = Dataset::new(
            "path",
            Tensor::ones(&[4, 3]),
            path4(),
            vec![0, 0, 1, 1],
            2,
            Mask::empty(3),
            va,
            te,
        );
        assert!(matches!(bad_mask, Err(GnnError::DataShape { .. })));
    }
}
