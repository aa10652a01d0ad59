//! citegnn: semi-supervised node classification on citation networks.
//!
//! Two graph neural network families, ARMA convolutions and graph
//! attention, trained full-batch on a single graph with a tape-based
//! autograd engine and sparse propagation operators.
//!
//! # Quick Start
//!
//! ```
//! use citegnn::data::{synthetic, LayerKind, Transform};
//! use citegnn::model::{ArmaNetConfig, ModelConfig};
//! use citegnn::train::{TrainConfig, Trainer};
//!
//! let dataset = synthetic::path_graph(8, 4, 2, 0)?
//!     .transform(&[Transform::LayerPreprocess(LayerKind::Arma)])?;
//! let mut model = ModelConfig::Arma(ArmaNetConfig::default())
//!     .build(dataset.num_features(), dataset.num_classes())?;
//!
//! let mut trainer = Trainer::new(TrainConfig::default().with_epochs(10))?;
//! let history = trainer.fit(model.as_mut(), &dataset)?;
//! let test = trainer.evaluate(model.as_mut(), &dataset, dataset.test_mask())?;
//! assert_eq!(history.len(), 10);
//! assert!((0.0..=1.0).contains(&test.accuracy));
//! # Ok::<(), citegnn::GnnError>(())
//! ```
//!
//! # Modules
//!
//! - [`autograd`]: Tensors and reverse-mode differentiation
//! - [`sparse`]: CSR adjacency matrices and graph operators
//! - [`nn`]: Layers (ARMA, GAT), dropout, losses, Adam
//! - [`data`]: Citation loader, transforms, synthetic graphs
//! - [`model`]: Two-layer node classifiers
//! - [`train`]: Trainer, early stopping, history
//! - [`experiment`]: Config-driven end-to-end runs
//! - [`cli`]: Flags shared by the programs

pub mod autograd;
pub mod cli;
pub mod data;
pub mod error;
pub mod experiment;
pub mod model;
pub mod nn;
pub mod sparse;
pub mod train;

pub use error::{GnnError, Result};
