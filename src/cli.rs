//! Command-line flags shared by the `citation-arma` and `citation-gat` programs.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::data::synthetic::PlantedPartition;
use crate::data::PlanetoidSplit;
use crate::error::Result;
use crate::experiment::{citation_name, DatasetConfig, ExperimentConfig};

/// Semi-supervised node classification on a citation network.
#[derive(Parser, Debug, Clone)]
#[command(version)]
pub struct Args {
    /// JSON experiment config; flags below override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory holding `<dataset>.content` and `<dataset>.cites`
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Dataset name (cora, citeseer)
    #[arg(short, long)]
    pub dataset: Option<String>,

    /// Train on a generated planted-partition graph instead of files
    #[arg(long, conflicts_with_all = ["data_dir", "dataset"])]
    pub synthetic: bool,

    /// Row-normalize node features after loading
    #[arg(long)]
    pub normalize_features: bool,

    /// Maximum number of epochs
    #[arg(long)]
    pub epochs: Option<usize>,

    /// Epochs without validation improvement before stopping
    #[arg(long)]
    pub patience: Option<usize>,

    #[arg(long)]
    pub learning_rate: Option<f32>,

    /// Seed for parameter initialization, dropout and the data split
    #[arg(long)]
    pub seed: Option<u64>,

    /// Write the training history to this JSON file
    #[arg(long)]
    pub history: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Build the experiment: the config file (or `base`), then the flags.
    ///
    /// # Errors
    ///
    /// Returns `Io`, `Json` or `Config` if the config file or a flag is invalid.
    pub fn experiment(&self, base: ExperimentConfig) -> Result<ExperimentConfig> {
        let mut config = match &self.config {
            Some(path) => ExperimentConfig::from_json_file(path)?,
            None => base,
        };

        if self.synthetic {
            config.dataset = DatasetConfig::Synthetic(PlantedPartition::default());
        } else if self.data_dir.is_some() || self.dataset.is_some() || self.normalize_features {
            let (mut dir, mut name, mut normalize, split) = match config.dataset {
                DatasetConfig::Citation {
                    dir,
                    name,
                    normalize_features,
                    split,
                } => (dir, name, normalize_features, split),
                DatasetConfig::Synthetic(_) => (
                    PathBuf::from("data/cora"),
                    "cora".to_string(),
                    false,
                    PlanetoidSplit::default(),
                ),
            };
            if let Some(d) = &self.data_dir {
                dir.clone_from(d);
            }
            if let Some(n) = &self.dataset {
                name = citation_name(n)?;
            }
            normalize |= self.normalize_features;
            config.dataset = DatasetConfig::Citation {
                dir,
                name,
                normalize_features: normalize,
                split,
            };
        }

        if let Some(epochs) = self.epochs {
            config.train.epochs = epochs;
        }
        if let Some(patience) = self.patience {
            config.train.patience = patience;
        }
        if let Some(lr) = self.learning_rate {
            config.train.learning_rate = lr;
        }
        if let Some(seed) = self.seed {
            config.model.set_seed(seed);
            match &mut config.dataset {
                DatasetConfig::Citation { split, .. } => split.seed = seed,
                DatasetConfig::Synthetic(generator) => generator.seed = seed,
            }
        }

        config.validate()?;
        Ok(config)
    }
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
