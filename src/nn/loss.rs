//! Masked losses and metrics for semi-supervised node classification.
//!
//! Only a subset of nodes is labelled for training, so every node carries a
//! sample weight (1 inside the mask, 0 outside) and the loss is averaged
//! over the mask cardinality.

use crate::autograd::grad_fn::MaskedCrossEntropyBackward;
use crate::autograd::{record_op, Tensor};
use crate::error::{GnnError, Result};

/// Probabilities are clipped to `[EPSILON, 1 - EPSILON]` before the log.
pub const EPSILON: f32 = 1e-7;

/// Sample-weighted categorical cross-entropy on class probabilities.
///
/// ```text
/// L = Σ_i w_i · −ln(clip(p[i, y_i])) / Σ_i w_i
/// ```
///
/// With all weights zero the loss is exactly 0 and no gradient flows.
#[derive(Debug, Clone, Copy)]
pub struct CategoricalCrossEntropy {
    epsilon: f32,
}

impl CategoricalCrossEntropy {
    /// Cross-entropy with the default clipping epsilon.
    #[must_use]
    pub fn new() -> Self {
        Self { epsilon: EPSILON }
    }

    /// Set the clipping epsilon.
    #[must_use]
    pub fn epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Weighted loss of `probs` (`[N, C]`, rows on the simplex).
    ///
    /// # Errors
    ///
    /// Returns `DataShape` if `labels` or `weights` do not have one entry per
    /// row, or a label is not a valid class index.
    pub fn forward(&self, probs: &Tensor, labels: &[usize], weights: &[f32]) -> Result<Tensor> {
        let (rows, classes) = (probs.rows(), probs.cols());
        if labels.len() != rows {
            return Err(GnnError::shape("labels per node", rows, labels.len()));
        }
        if weights.len() != rows {
            return Err(GnnError::shape("sample weights per node", rows, weights.len()));
        }
        if let Some(&bad) = labels.iter().find(|&&y| y >= classes) {
            return Err(GnnError::shape("class index bound", classes, bad));
        }

        let denom: f32 = weights.iter().sum();
        let mut total = 0.0f32;
        if denom > 0.0 {
            for (i, (&y, &w)) in labels.iter().zip(weights).enumerate() {
                if w != 0.0 {
                    let p = probs.data()[i * classes + y].clamp(self.epsilon, 1.0 - self.epsilon);
                    total -= w * p.ln();
                }
            }
            total /= denom;
        }

        let mut loss = Tensor::new(&[total], &[1]);
        record_op(&mut loss, &[probs], || MaskedCrossEntropyBackward {
            probs: probs.clone(),
            targets: labels.to_vec(),
            weights: weights.to_vec(),
            denom,
            epsilon: self.epsilon,
        });
        Ok(loss)
    }
}

impl Default for CategoricalCrossEntropy {
    fn default() -> Self {
        Self::new()
    }
}

/// 0/1 sample weights from a boolean mask.
#[must_use]
pub fn mask_weights(mask: &[bool]) -> Vec<f32> {
    mask.iter().map(|&m| if m { 1.0 } else { 0.0 }).collect()
}

/// Cross-entropy averaged over the nodes selected by `mask`.
///
/// # Errors
///
/// Returns `DataShape` on length mismatches or invalid labels.
pub fn masked_cross_entropy(probs: &Tensor, labels: &[usize], mask: &[bool]) -> Result<Tensor> {
    CategoricalCrossEntropy::new().forward(probs, labels, &mask_weights(mask))
}

/// Fraction of masked nodes whose arg-max prediction equals the label.
///
/// Returns 0 for an empty mask.
///
/// # Errors
///
/// Returns `DataShape` if `labels` or `mask` do not have one entry per row.
pub fn masked_accuracy(probs: &Tensor, labels: &[usize], mask: &[bool]) -> Result<f32> {
    let rows = probs.rows();
    if labels.len() != rows {
        return Err(GnnError::shape("labels per node", rows, labels.len()));
    }
    if mask.len() != rows {
        return Err(GnnError::shape("mask length", rows, mask.len()));
    }

    let (correct, total) = probs
        .argmax_rows()
        .iter()
        .zip(labels)
        .zip(mask)
        .filter(|(_, &m)| m)
        .fold((0usize, 0usize), |(c, t), ((pred, label), _)| {
            (c + usize::from(pred == label), t + 1)
        });

    Ok(if total == 0 {
        0.0
    } else {
        correct as f32 / total as f32
    })
}

/// L2 weight penalty `coefficient · Σ w²` over `params`.
///
/// Returns `None` when the coefficient is zero or there is nothing to
/// penalize.
#[must_use]
pub fn l2_penalty(params: &[&Tensor], coefficient: f32) -> Option<Tensor> {
    if coefficient == 0.0 {
        return None;
    }
    params
        .iter()
        .map(|p| p.pow(2.0).sum())
        .reduce(|acc, s| acc.add(&s))
        .map(|total| total.mul_scalar(coefficient))
}

/// Sum optional penalty terms.
pub(crate) fn sum_penalties(terms: impl IntoIterator<Item = Option<Tensor>>) -> Option<Tensor> {
    terms.into_iter().flatten().reduce(|acc, t| acc.add(&t))
}
