//! End-to-end experiment: load a dataset, build a model, train, evaluate.
//!
//! An [`ExperimentConfig`] is plain data and can be stored as JSON:
//!
//! ```json
//! {
//!   "dataset": { "source": "citation", "dir": "data/cora", "name": "cora" },
//!   "model": { "type": "gat", "heads": 8 },
//!   "train": { "learning_rate": 0.005, "patience": 100 }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::synthetic::PlantedPartition;
use crate::data::{Citation, Dataset, PlanetoidSplit, Transform};
use crate::error::{GnnError, Result};
use crate::model::{ArmaNetConfig, GatNetConfig, ModelConfig};
use crate::train::{Evaluation, History, TrainConfig, Trainer, TrainingState};

/// Where the graph comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DatasetConfig {
    /// LINQS files `<dir>/<name>.content` and `<dir>/<name>.cites`
    Citation {
        dir: PathBuf,
        name: String,
        #[serde(default)]
        normalize_features: bool,
        #[serde(default)]
        split: PlanetoidSplit,
    },
    /// Generated planted-partition graph
    Synthetic(PlantedPartition),
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self::Citation {
            dir: PathBuf::from("data/cora"),
            name: "cora".to_string(),
            normalize_features: false,
            split: PlanetoidSplit::default(),
        }
    }
}

impl DatasetConfig {
    /// Load the dataset and apply `transforms` after the configured ones.
    ///
    /// # Errors
    ///
    /// Returns the loader's `Io`, `Parse` or `Config` errors.
    pub fn load(&self, transforms: &[Transform]) -> Result<Dataset> {
        match self {
            Self::Citation {
                dir,
                name,
                normalize_features,
                split,
            } => {
                let mut all = Vec::with_capacity(transforms.len() + 1);
                if *normalize_features {
                    all.push(Transform::RowNormalizeFeatures);
                }
                all.extend_from_slice(transforms);
                Citation::new(dir, name).with_split(*split).read(&all)
            }
            Self::Synthetic(generator) => generator.generate()?.transform(transforms),
        }
    }
}

/// Dataset, model and training settings of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub dataset: DatasetConfig,
    pub model: ModelConfig,
    pub train: TrainConfig,
}

impl ExperimentConfig {
    /// ARMA defaults on Cora.
    #[must_use]
    pub fn arma() -> Self {
        let model = ModelConfig::Arma(ArmaNetConfig::default());
        let train = TrainConfig::default().with_learning_rate(model.default_learning_rate());
        Self {
            dataset: DatasetConfig::default(),
            model,
            train,
        }
    }

    /// GAT defaults on Cora.
    #[must_use]
    pub fn gat() -> Self {
        let model = ModelConfig::Gat(GatNetConfig::default());
        let train = TrainConfig::default().with_learning_rate(model.default_learning_rate());
        Self {
            dataset: DatasetConfig::default(),
            model,
            train,
        }
    }

    /// Read a JSON config; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read, `Json` if it is malformed,
    /// `Config` if a value is out of range.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = serde_json::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns `Json` or `Io` if serialization or the write fails.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Check the model and training settings.
    ///
    /// # Errors
    ///
    /// Returns `Config` naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        self.train.validate()
    }

    /// Run the experiment.
    ///
    /// # Errors
    ///
    /// Returns any loading, configuration, shape or convergence error.
    pub fn run(&self) -> Result<ExperimentReport> {
        self.validate()?;
        let dataset = self
            .dataset
            .load(&[Transform::LayerPreprocess(self.model.layer_kind())])?;

        let mut model = self
            .model
            .build(dataset.num_features(), dataset.num_classes())?;
        let summary = model.summary();
        info!("\n{summary}");

        let mut trainer = Trainer::new(self.train.clone())?;
        let history = trainer.fit(model.as_mut(), &dataset)?;
        let stopped = trainer.state();
        let test = trainer.evaluate(model.as_mut(), &dataset, dataset.test_mask())?;

        Ok(ExperimentReport {
            dataset: dataset.name().to_string(),
            summary,
            history,
            stopped,
            test,
        })
    }
}

/// Outcome of [`ExperimentConfig::run`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentReport {
    pub dataset: String,
    /// Model summary table
    pub summary: String,
    pub history: History,
    /// How training ended
    pub stopped: TrainingState,
    /// Loss and accuracy on the test mask
    pub test: Evaluation,
}

impl ExperimentReport {
    /// One-line result, e.g. `Done. Test loss: 0.712. Test accuracy: 0.81`.
    #[must_use]
    pub fn headline(&self) -> String {
        format!(
            "Done. Test loss: {:.4}. Test accuracy: {:.4}",
            self.test.loss, self.test.accuracy
        )
    }
}

/// Parse a citation dataset name given on the command line.
///
/// Only the LINQS `.content`/`.cites` datasets are readable.
///
/// # Errors
///
/// Returns `Config` for names other than `cora` and `citeseer`.
pub fn citation_name(name: &str) -> Result<String> {
    let lower = name.to_ascii_lowercase();
    match lower.as_str() {
        "cora" | "citeseer" => Ok(lower),
        _ => Err(GnnError::config("dataset", name, "one of cora, citeseer")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_synthetic() -> DatasetConfig {
        DatasetConfig::Synthetic(PlantedPartition {
            nodes_per_class: 15,
            num_classes: 2,
            num_features: 8,
            train_per_class: 5,
            num_val: 10,
            seed: 2,
            ..PlantedPartition::default()
        })
    }

    #[test]
    fn test_family_defaults() {
        assert_eq!(ExperimentConfig::arma().train.learning_rate, 1e-2);
        assert_eq!(ExperimentConfig::gat().train.learning_rate, 5e-3);
        assert!(matches!(ExperimentConfig::gat().model, ModelConfig::Gat(_)));
        assert_eq!(ExperimentConfig::arma().train.patience, 100);
    }

    #[test]
    fn test_json_with_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exp.json");
        fs::write(
            &path,
            r#"{
                "dataset": { "source": "citation", "dir": "d", "name": "citeseer" },
                "model": { "type": "gat", "heads": 4 },
                "train": { "patience": 10 }
            }"#,
        )
        .unwrap();

        let cfg = ExperimentConfig::from_json_file(&path).unwrap();
        match &cfg.model {
            ModelConfig::Gat(g) => {
                assert_eq!(g.heads, 4);
                assert_eq!(g.channels, 8);
            }
            ModelConfig::Arma(_) => panic!("expected gat"),
        }
        assert_eq!(cfg.train.patience, 10);
        assert_eq!(cfg.train.epochs, 20_000);
        assert!(matches!(
            cfg.dataset,
            DatasetConfig::Citation { ref name, normalize_features: false, .. } if name == "citeseer"
        ));
    }

    #[test]
    fn test_invalid_json_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exp.json");
        fs::write(&path, r#"{ "model": { "type": "gat", "heads": 0 } }"#).unwrap();
        assert!(matches!(
            ExperimentConfig::from_json_file(&path),
            Err(GnnError::Config { .. })
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exp.json");
        let mut cfg = ExperimentConfig::arma();
        cfg.dataset = small_synthetic();
        cfg.save_json(&path).unwrap();
        assert_eq!(ExperimentConfig::from_json_file(&path).unwrap(), cfg);
    }

    #[test]
    fn test_run_synthetic() {
        let mut cfg = ExperimentConfig::arma();
        cfg.dataset = small_synthetic();
        cfg.model.set_seed(0);
        cfg.train = cfg.train.with_epochs(5);

        let report = cfg.run().unwrap();
        assert_eq!(report.dataset, "planted_partition");
        assert_eq!(report.history.len(), 5);
        assert_eq!(report.stopped, TrainingState::EpochLimitReached);
        assert!((0.0..=1.0).contains(&report.test.accuracy));
        assert!(report.headline().starts_with("Done. Test loss:"));
        assert!(report.summary.contains("Total params:"));
    }

    #[test]
    fn test_citation_name() {
        assert_eq!(citation_name("Cora").unwrap(), "cora");
        assert_eq!(citation_name("CITESEER").unwrap(), "citeseer");
        assert!(citation_name("imagenet").is_err());
        // PubMed ships in a different file layout
        assert!(matches!(citation_name("pubmed"), Err(GnnError::Config { .. })));
    }
}
