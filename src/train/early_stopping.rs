//! Early stopping on a monitored loss with best-weight restoration.

use crate::autograd::Tensor;

/// Copy of parameter values at one epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSnapshot {
    values: Vec<Vec<f32>>,
}

impl ParameterSnapshot {
    /// Capture the current values of `params`.
    #[must_use]
    pub fn capture(params: &[&Tensor]) -> Self {
        Self {
            values: params.iter().map(|p| p.data().to_vec()).collect(),
        }
    }

    /// Write the captured values back.
    ///
    /// Parameters must be passed in capture order; extra or differently
    /// sized tensors are left untouched.
    pub fn restore(&self, params: &mut [&mut Tensor]) {
        for (param, values) in params.iter_mut().zip(&self.values) {
            if param.numel() == values.len() {
                param.data_mut().copy_from_slice(values);
            }
        }
    }

    /// Number of captured tensors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Stop when the monitored loss has not improved for `patience` epochs.
///
/// An epoch improves when `loss < best − min_delta`. After an improvement
/// at epoch `b`, a loss that never improves again stops training at epoch
/// `b + patience`.
///
/// # Example
///
/// ```
/// use citegnn::train::EarlyStopping;
///
/// let mut stopper = EarlyStopping::new(2);
/// assert!(!stopper.update(0, 1.0, &[]));
/// assert!(!stopper.update(1, 1.5, &[]));
/// assert!(stopper.update(2, 1.2, &[]));
/// assert_eq!(stopper.best_epoch(), Some(0));
/// ```
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    min_delta: f32,
    best_loss: Option<f32>,
    best_epoch: Option<usize>,
    epochs_without_improvement: usize,
    stopped_epoch: Option<usize>,
    best_snapshot: Option<ParameterSnapshot>,
}

impl EarlyStopping {
    /// Stopper with the given patience and `min_delta = 0`.
    #[must_use]
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            min_delta: 0.0,
            best_loss: None,
            best_epoch: None,
            epochs_without_improvement: 0,
            stopped_epoch: None,
            best_snapshot: None,
        }
    }

    /// Minimum decrease that counts as an improvement.
    #[must_use]
    pub fn min_delta(mut self, min_delta: f32) -> Self {
        self.min_delta = min_delta;
        self
    }

    /// Record the loss of `epoch`; returns `true` when training should stop.
    ///
    /// On improvement the current `params` are captured as the best snapshot.
    pub fn update(&mut self, epoch: usize, loss: f32, params: &[&Tensor]) -> bool {
        let improved = match self.best_loss {
            None => loss.is_finite(),
            Some(best) => loss < best - self.min_delta,
        };

        if improved {
            self.best_loss = Some(loss);
            self.best_epoch = Some(epoch);
            self.epochs_without_improvement = 0;
            self.best_snapshot = Some(ParameterSnapshot::capture(params));
        } else {
            self.epochs_without_improvement += 1;
        }

        if self.epochs_without_improvement >= self.patience {
            self.stopped_epoch = Some(epoch);
        }
        self.should_stop()
    }

    /// Whether the patience has run out.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.stopped_epoch.is_some()
    }

    /// Restore the best snapshot into `params`; returns whether one existed.
    pub fn restore_best(&self, params: &mut [&mut Tensor]) -> bool {
        match &self.best_snapshot {
            Some(snapshot) => {
                snapshot.restore(params);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn patience(&self) -> usize {
        self.patience
    }

    #[must_use]
    pub fn best_loss(&self) -> Option<f32> {
        self.best_loss
    }

    #[must_use]
    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    /// Epoch at which patience ran out.
    #[must_use]
    pub fn stopped_epoch(&self) -> Option<usize> {
        self.stopped_epoch
    }

    #[must_use]
    pub fn epochs_without_improvement(&self) -> usize {
        self.epochs_without_improvement
    }
}
