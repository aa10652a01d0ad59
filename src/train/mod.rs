//! Full-batch semi-supervised training and evaluation.
//!
//! One epoch is one forward pass over the whole graph in training mode,
//! the cross-entropy on the training mask plus the model's weight penalty,
//! one backward pass and one Adam step, followed by a validation pass in
//! inference mode. Early stopping monitors the validation loss and the
//! parameters of the best epoch are restored when training ends.

mod early_stopping;

pub use early_stopping::{EarlyStopping, ParameterSnapshot};

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::autograd::{clear_graph, no_grad, Tensor};
use crate::data::{Dataset, Mask};
use crate::error::{check_positive, GnnError, Result};
use crate::model::NodeClassifier;
use crate::nn::loss::{mask_weights, masked_accuracy, CategoricalCrossEntropy};
use crate::nn::Adam;

/// Training hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Maximum number of epochs
    pub epochs: usize,
    /// Epochs without validation improvement before stopping
    pub patience: usize,
    /// Minimum validation-loss decrease that counts as improvement
    pub min_delta: f32,
    pub learning_rate: f32,
    /// Log an `info` line every this many epochs (0 disables)
    pub log_every: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 20_000,
            patience: 100,
            min_delta: 0.0,
            learning_rate: 1e-2,
            log_every: 50,
        }
    }
}

impl TrainConfig {
    #[must_use]
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    #[must_use]
    pub fn with_patience(mut self, patience: usize) -> Self {
        self.patience = patience;
        self
    }

    #[must_use]
    pub fn with_learning_rate(mut self, lr: f32) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Check every hyperparameter range.
    ///
    /// # Errors
    ///
    /// Returns `Config` naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        check_positive("epochs", self.epochs)?;
        check_positive("patience", self.patience)?;
        if !(self.min_delta.is_finite() && self.min_delta >= 0.0) {
            return Err(GnnError::config("min_delta", self.min_delta, "finite and >= 0"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(GnnError::config(
                "learning_rate",
                self.learning_rate,
                "finite and > 0",
            ));
        }
        Ok(())
    }
}

/// Lifecycle of a [`Trainer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingState {
    Initialized,
    Training,
    /// Patience ran out at `epoch`
    EarlyStopped { epoch: usize, best_epoch: usize },
    /// All configured epochs ran
    EpochLimitReached,
    /// A test-set evaluation has been run
    Evaluated,
}

/// Metrics of one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochLog {
    pub epoch: usize,
    pub loss: f32,
    pub accuracy: f32,
    pub val_loss: f32,
    pub val_accuracy: f32,
}

/// Per-epoch metrics of a `fit` run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub epochs: Vec<EpochLog>,
    /// Epoch whose parameters were restored
    pub best_epoch: Option<usize>,
    pub stopped_early: bool,
}

impl History {
    /// Number of completed epochs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// Metrics of the last completed epoch.
    #[must_use]
    pub fn last(&self) -> Option<&EpochLog> {
        self.epochs.last()
    }

    /// Metrics of the restored epoch.
    #[must_use]
    pub fn best(&self) -> Option<&EpochLog> {
        self.best_epoch.and_then(|b| self.epochs.get(b))
    }

    /// Write the history as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns `Json` or `Io` if serialization or the write fails.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Read a history written by [`History::save_json`].
    ///
    /// # Errors
    ///
    /// Returns `Io` or `Json` if the file cannot be read or parsed.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}

/// Loss and accuracy on one mask.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub loss: f32,
    pub accuracy: f32,
}

/// Drives fitting and evaluation of a [`NodeClassifier`].
#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainConfig,
    state: TrainingState,
    loss_fn: CategoricalCrossEntropy,
}

impl Trainer {
    /// Create a trainer.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration is invalid.
    pub fn new(config: TrainConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: TrainingState::Initialized,
            loss_fn: CategoricalCrossEntropy::new(),
        })
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TrainingState {
        self.state
    }

    #[must_use]
    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Train on the training mask with early stopping on the validation mask.
    ///
    /// When training ends, by early stopping or by the epoch limit, the
    /// parameters of the epoch with the lowest validation loss are restored.
    ///
    /// # Errors
    ///
    /// - `DataShape` if the model does not fit the dataset
    /// - `Config` if the training or validation mask is empty
    /// - `Convergence` if a loss becomes NaN or infinite
    pub fn fit(&mut self, model: &mut dyn NodeClassifier, dataset: &Dataset) -> Result<History> {
        if model.num_classes() != dataset.num_classes() {
            return Err(GnnError::shape(
                "model classes",
                dataset.num_classes(),
                model.num_classes(),
            ));
        }
        if dataset.train_mask().count() == 0 {
            return Err(GnnError::config("train_mask", 0, "at least one training node"));
        }
        if dataset.val_mask().count() == 0 {
            return Err(GnnError::config("val_mask", 0, "at least one validation node"));
        }

        let mut optimizer = Adam::new(self.config.learning_rate)?
            .betas(0.9, 0.999)
            .eps(1e-7);
        let mut stopper = EarlyStopping::new(self.config.patience).min_delta(self.config.min_delta);
        let mut history = History::default();
        let train_weights = mask_weights(dataset.train_mask().as_slice());

        info!(
            dataset = dataset.name(),
            nodes = dataset.num_nodes(),
            params = model.num_parameters(),
            epochs = self.config.epochs,
            patience = self.config.patience,
            lr = self.config.learning_rate,
            "training started"
        );
        self.state = TrainingState::Training;

        for epoch in 0..self.config.epochs {
            let (loss, accuracy) =
                self.train_step(model, dataset, &train_weights, &mut optimizer, epoch)?;
            let val = self.score(model, dataset, dataset.val_mask())?;
            if !val.loss.is_finite() {
                warn!(epoch, val_loss = val.loss, "validation loss is not finite");
                return Err(GnnError::Convergence {
                    epoch,
                    loss: val.loss,
                });
            }

            let log = EpochLog {
                epoch,
                loss,
                accuracy,
                val_loss: val.loss,
                val_accuracy: val.accuracy,
            };
            history.epochs.push(log);
            debug!(epoch, loss, accuracy, val_loss = val.loss, val_accuracy = val.accuracy, "epoch");
            if self.config.log_every > 0 && epoch % self.config.log_every == 0 {
                info!(
                    epoch,
                    loss, accuracy, val_loss = val.loss, val_accuracy = val.accuracy, "progress"
                );
            }

            if stopper.update(epoch, val.loss, &model.parameters()) {
                let best_epoch = stopper.best_epoch().unwrap_or(0);
                info!(epoch, best_epoch, best_val_loss = ?stopper.best_loss(), "early stopping");
                self.state = TrainingState::EarlyStopped { epoch, best_epoch };
                history.stopped_early = true;
                break;
            }
        }

        if !history.stopped_early {
            self.state = TrainingState::EpochLimitReached;
        }
        if stopper.restore_best(&mut model.parameters_mut()) {
            history.best_epoch = stopper.best_epoch();
        }
        model.eval();

        info!(
            epochs = history.len(),
            best_epoch = ?history.best_epoch,
            best_val_loss = ?stopper.best_loss(),
            "training finished"
        );
        Ok(history)
    }

    /// Score the model on `mask` in inference mode.
    ///
    /// # Errors
    ///
    /// Returns `DataShape` if the model or mask does not fit the dataset.
    pub fn evaluate(
        &mut self,
        model: &mut dyn NodeClassifier,
        dataset: &Dataset,
        mask: &Mask,
    ) -> Result<Evaluation> {
        let evaluation = self.score(model, dataset, mask)?;
        self.state = TrainingState::Evaluated;
        info!(
            loss = evaluation.loss,
            accuracy = evaluation.accuracy,
            nodes = mask.count(),
            "evaluation"
        );
        Ok(evaluation)
    }

    /// Class probabilities of every node in inference mode.
    ///
    /// # Errors
    ///
    /// Returns `DataShape` if the model does not fit the dataset.
    pub fn predict(model: &mut dyn NodeClassifier, dataset: &Dataset) -> Result<Tensor> {
        model.eval();
        no_grad(|| model.forward(dataset.features(), dataset.operator()))
    }

    fn train_step(
        &self,
        model: &mut dyn NodeClassifier,
        dataset: &Dataset,
        weights: &[f32],
        optimizer: &mut Adam,
        epoch: usize,
    ) -> Result<(f32, f32)> {
        clear_graph();
        model.train();

        let probs = model.forward(dataset.features(), dataset.operator())?;
        let data_loss = self.loss_fn.forward(&probs, dataset.labels(), weights)?;
        let loss = match model.regularization_loss() {
            Some(penalty) => data_loss.add(&penalty),
            None => data_loss,
        };

        let value = loss.item();
        if !value.is_finite() {
            clear_graph();
            warn!(epoch, loss = value, "training loss is not finite");
            return Err(GnnError::Convergence { epoch, loss: value });
        }

        loss.backward();
        optimizer.step_with_params(&mut model.parameters_mut());
        clear_graph();

        let accuracy = masked_accuracy(&probs, dataset.labels(), dataset.train_mask().as_slice())?;
        Ok((value, accuracy))
    }

    fn score(
        &self,
        model: &mut dyn NodeClassifier,
        dataset: &Dataset,
        mask: &Mask,
    ) -> Result<Evaluation> {
        if mask.len() != dataset.num_nodes() {
            return Err(GnnError::shape("mask length", dataset.num_nodes(), mask.len()));
        }
        model.eval();
        no_grad(|| {
            let probs = model.forward(dataset.features(), dataset.operator())?;
            let mut loss = self
                .loss_fn
                .forward(&probs, dataset.labels(), &mask_weights(mask.as_slice()))?
                .item();
            if let Some(penalty) = model.regularization_loss() {
                loss += penalty.item();
            }
            let accuracy = masked_accuracy(&probs, dataset.labels(), mask.as_slice())?;
            Ok(Evaluation { loss, accuracy })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{synthetic, LayerKind, Transform};
    use crate::model::{ArmaNetConfig, ModelConfig};

    fn path_dataset() -> Dataset {
        synthetic::path_graph(4, 3, 2, 0)
            .unwrap()
            .transform(&[Transform::LayerPreprocess(LayerKind::Arma)])
            .unwrap()
    }

    fn arma(seed: u64) -> ModelConfig {
        ModelConfig::Arma(ArmaNetConfig {
            seed: Some(seed),
            ..ArmaNetConfig::default()
        })
    }

    #[test]
    fn test_invalid_train_config() {
        assert!(Trainer::new(TrainConfig::default().with_epochs(0)).is_err());
        assert!(Trainer::new(TrainConfig::default().with_patience(0)).is_err());
        assert!(Trainer::new(TrainConfig::default().with_learning_rate(-1.0)).is_err());
    }

    #[test]
    fn test_state_machine() {
        let ds = path_dataset();
        let mut model = arma(0).build(3, 2).unwrap();
        let mut trainer = Trainer::new(TrainConfig::default().with_epochs(3)).unwrap();
        assert_eq!(trainer.state(), TrainingState::Initialized);

        let history = trainer.fit(model.as_mut(), &ds).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(trainer.state(), TrainingState::EpochLimitReached);
        assert!(history.best_epoch.is_some());

        trainer.evaluate(model.as_mut(), &ds, ds.test_mask()).unwrap();
        assert_eq!(trainer.state(), TrainingState::Evaluated);
    }

    #[test]
    fn test_restores_best_epoch_parameters() {
        let ds = path_dataset();
        let mut model = arma(3).build(3, 2).unwrap();
        let mut trainer = Trainer::new(TrainConfig::default().with_epochs(30)).unwrap();
        let history = trainer.fit(model.as_mut(), &ds).unwrap();

        // Restored weights reproduce the best validation loss
        let best = history.best().expect("best epoch");
        let again = trainer.evaluate(model.as_mut(), &ds, ds.val_mask()).unwrap();
        let min = history
            .epochs
            .iter()
            .map(|e| e.val_loss)
            .fold(f32::INFINITY, f32::min);
        assert_eq!(best.val_loss, min);
        assert!((again.loss - best.val_loss).abs() < 1e-6);
    }

    #[test]
    fn test_class_count_mismatch() {
        let ds = path_dataset();
        let mut model = arma(0).build(3, 3).unwrap();
        let mut trainer = Trainer::new(TrainConfig::default().with_epochs(1)).unwrap();
        assert!(matches!(
            trainer.fit(model.as_mut(), &ds),
            Err(GnnError::DataShape { .. })
        ));
    }

    #[test]
    fn test_predict_rows_sum_to_one() {
        let ds = path_dataset();
        let mut model = arma(1).build(3, 2).unwrap();
        let probs = Trainer::predict(model.as_mut(), &ds).unwrap();
        for i in 0..4 {
            assert!((probs.row(i).iter().sum::<f32>() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_history_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let history = History {
            epochs: vec![EpochLog {
                epoch: 0,
                loss: 0.7,
                accuracy: 0.5,
                val_loss: 0.69,
                val_accuracy: 1.0,
            }],
            best_epoch: Some(0),
            stopped_early: false,
        };
        history.save_json(&path).unwrap();
        assert_eq!(History::load_json(&path).unwrap(), history);
    }
}
