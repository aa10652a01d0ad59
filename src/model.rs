//! Two-layer node classifiers.
//!
//! Both models map `(X, A)` to an `N × C` matrix of class probabilities:
//!
//! ```text
//! ArmaNet:  X → ArmaConv(hidden) → dropout → ArmaConv(C, softmax)
//! GatNet:   X → dropout → GAT(hidden × heads) → dropout → GAT(C, 1 head, softmax)
//! ```
//!
//! [`ModelConfig`] selects the family and builds a boxed [`NodeClassifier`].

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::autograd::Tensor;
use crate::data::LayerKind;
use crate::error::{check_l2, check_positive, check_rate, Result};
use crate::nn::gnn::{ArmaConfig, ArmaConv, GatConfig, GraphAttention};
use crate::nn::loss::sum_penalties;
use crate::nn::{Activation, Dropout, GraphModule};
use crate::sparse::SparseMatrix;

/// A model producing per-node class probabilities.
pub trait NodeClassifier: GraphModule {
    /// Number of output classes C.
    fn num_classes(&self) -> usize;

    /// Layer-by-layer description with parameter counts.
    fn summary(&self) -> String;
}

fn summary_table(title: &str, rows: &[(String, String, usize)]) -> String {
    let rule = "-".repeat(56);
    let total: usize = rows.iter().map(|r| r.2).sum();
    let mut lines = Vec::with_capacity(rows.len() + 5);
    lines.push(format!("Model: {title}"));
    lines.push(format!("{:<28} {:<16} {:>10}", "Layer", "Output", "Params"));
    lines.push(rule.clone());
    lines.extend(
        rows.iter()
            .map(|(layer, shape, params)| format!("{layer:<28} {shape:<16} {params:>10}")),
    );
    lines.push(rule);
    lines.push(format!("Total params: {total}"));
    lines.join("\n")
}

/// Seed for the next component, or `None` when unseeded.
fn next_seed(rng: &mut Option<StdRng>) -> Option<u64> {
    rng.as_mut().map(|r| r.gen())
}

fn dropout(rate: f32, seed: Option<u64>) -> Result<Dropout> {
    match seed {
        Some(s) => Dropout::with_seed(rate, s),
        None => Dropout::new(rate),
    }
}

// ============================================================================
// ARMA
// ============================================================================

/// Hyperparameters of [`ArmaNet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmaNetConfig {
    /// Hidden width
    pub channels: usize,
    /// Stacks K of the hidden layer
    pub order: usize,
    /// Stack depth T of the hidden layer
    pub iterations: usize,
    pub share_weights: bool,
    /// Skip-connection dropout inside both layers
    pub skip_dropout: f32,
    /// Dropout between the two layers
    pub dropout: f32,
    /// L2 coefficient on every kernel
    pub l2_reg: f32,
    /// Hidden layer outer activation
    pub activation: Activation,
    /// Hidden layer stack activation
    pub gcn_activation: Activation,
    pub seed: Option<u64>,
}

impl Default for ArmaNetConfig {
    fn default() -> Self {
        Self {
            channels: 16,
            order: 2,
            iterations: 1,
            share_weights: true,
            skip_dropout: 0.75,
            dropout: 0.5,
            l2_reg: 5e-5,
            activation: Activation::Elu,
            gcn_activation: Activation::Elu,
            seed: None,
        }
    }
}

impl ArmaNetConfig {
    /// Check every hyperparameter range.
    ///
    /// # Errors
    ///
    /// Returns `Config` naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        check_positive("channels", self.channels)?;
        check_positive("order", self.order)?;
        check_positive("iterations", self.iterations)?;
        check_rate("skip_dropout", self.skip_dropout)?;
        check_rate("dropout", self.dropout)?;
        check_l2("l2_reg", self.l2_reg)
    }
}

/// Two ARMA layers with dropout in between.
#[derive(Debug)]
pub struct ArmaNet {
    hidden: ArmaConv,
    dropout: Dropout,
    output: ArmaConv,
    num_classes: usize,
}

impl ArmaNet {
    /// Build the network for `num_features` inputs and `num_classes` outputs.
    ///
    /// # Errors
    ///
    /// Returns `Config` if a hyperparameter or size is invalid.
    pub fn new(config: &ArmaNetConfig, num_features: usize, num_classes: usize) -> Result<Self> {
        config.validate()?;
        check_positive("num_classes", num_classes)?;
        let mut rng = config.seed.map(StdRng::seed_from_u64);

        let hidden_cfg = ArmaConfig {
            channels: config.channels,
            order: config.order,
            iterations: config.iterations,
            share_weights: config.share_weights,
            dropout_rate: config.skip_dropout,
            activation: config.activation,
            gcn_activation: config.gcn_activation,
            kernel_l2: config.l2_reg,
            seed: next_seed(&mut rng),
            ..ArmaConfig::default()
        };
        let hidden = ArmaConv::new(num_features, hidden_cfg)?;
        let dropout = dropout(config.dropout, next_seed(&mut rng))?;

        let output_cfg = ArmaConfig {
            channels: num_classes,
            order: 1,
            iterations: 1,
            share_weights: config.share_weights,
            dropout_rate: config.skip_dropout,
            activation: Activation::Softmax,
            gcn_activation: Activation::Linear,
            kernel_l2: config.l2_reg,
            seed: next_seed(&mut rng),
            ..ArmaConfig::default()
        };
        let output = ArmaConv::new(hidden.out_features(), output_cfg)?;

        Ok(Self {
            hidden,
            dropout,
            output,
            num_classes,
        })
    }
}

impl GraphModule for ArmaNet {
    fn forward(&self, x: &Tensor, operator: &Arc<SparseMatrix>) -> Result<Tensor> {
        let h = self.hidden.forward(x, operator)?;
        self.output.forward(&self.dropout.forward(&h), operator)
    }

    fn parameters(&self) -> Vec<&Tensor> {
        let mut params = self.hidden.parameters();
        params.extend(self.output.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.hidden.parameters_mut();
        params.extend(self.output.parameters_mut());
        params
    }

    fn regularization_loss(&self) -> Option<Tensor> {
        sum_penalties([
            self.hidden.regularization_loss(),
            self.output.regularization_loss(),
        ])
    }

    fn train(&mut self) {
        self.hidden.train();
        self.dropout.train();
        self.output.train();
    }

    fn eval(&mut self) {
        self.hidden.eval();
        self.dropout.eval();
        self.output.eval();
    }

    fn training(&self) -> bool {
        self.hidden.training()
    }
}

impl NodeClassifier for ArmaNet {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn summary(&self) -> String {
        let h = self.hidden.config();
        summary_table(
            "ArmaNet",
            &[
                (
                    format!("arma_conv (K={}, T={})", h.order, h.iterations),
                    format!("[N, {}]", self.hidden.out_features()),
                    self.hidden.num_parameters(),
                ),
                (
                    format!("dropout (p={})", self.dropout.probability()),
                    format!("[N, {}]", self.hidden.out_features()),
                    0,
                ),
                (
                    "arma_conv (K=1, T=1)".to_string(),
                    format!("[N, {}]", self.num_classes),
                    self.output.num_parameters(),
                ),
            ],
        )
    }
}

// ============================================================================
// GAT
// ============================================================================

/// Hyperparameters of [`GatNet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatNetConfig {
    /// Width of every hidden head
    pub channels: usize,
    /// Hidden heads, concatenated
    pub heads: usize,
    /// Input, feature and attention dropout
    pub dropout: f32,
    /// L2 coefficient on kernels and attention kernels
    pub l2_reg: f32,
    pub activation: Activation,
    pub seed: Option<u64>,
}

impl Default for GatNetConfig {
    fn default() -> Self {
        Self {
            channels: 8,
            heads: 8,
            dropout: 0.6,
            l2_reg: 5e-6,
            activation: Activation::Elu,
            seed: None,
        }
    }
}

impl GatNetConfig {
    /// Check every hyperparameter range.
    ///
    /// # Errors
    ///
    /// Returns `Config` naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        check_positive("channels", self.channels)?;
        check_positive("heads", self.heads)?;
        check_rate("dropout", self.dropout)?;
        check_l2("l2_reg", self.l2_reg)
    }
}

/// Two graph attention layers with dropout before each.
#[derive(Debug)]
pub struct GatNet {
    input_dropout: Dropout,
    hidden: GraphAttention,
    dropout: Dropout,
    output: GraphAttention,
    num_classes: usize,
}

impl GatNet {
    /// Build the network for `num_features` inputs and `num_classes` outputs.
    ///
    /// # Errors
    ///
    /// Returns `Config` if a hyperparameter or size is invalid.
    pub fn new(config: &GatNetConfig, num_features: usize, num_classes: usize) -> Result<Self> {
        config.validate()?;
        check_positive("num_classes", num_classes)?;
        let mut rng = config.seed.map(StdRng::seed_from_u64);

        let input_dropout = dropout(config.dropout, next_seed(&mut rng))?;
        let hidden_cfg = GatConfig {
            channels: config.channels,
            heads: config.heads,
            concat_heads: true,
            dropout_rate: config.dropout,
            activation: config.activation,
            kernel_l2: config.l2_reg,
            attn_kernel_l2: config.l2_reg,
            seed: next_seed(&mut rng),
            ..GatConfig::default()
        };
        let hidden = GraphAttention::new(num_features, hidden_cfg)?;
        let dropout = dropout(config.dropout, next_seed(&mut rng))?;

        let output_cfg = GatConfig {
            channels: num_classes,
            heads: 1,
            concat_heads: false,
            dropout_rate: config.dropout,
            activation: Activation::Softmax,
            kernel_l2: config.l2_reg,
            attn_kernel_l2: config.l2_reg,
            seed: next_seed(&mut rng),
            ..GatConfig::default()
        };
        let output = GraphAttention::new(hidden.out_features(), output_cfg)?;

        Ok(Self {
            input_dropout,
            hidden,
            dropout,
            output,
            num_classes,
        })
    }

    /// Hidden attention layer, for inspecting attention coefficients.
    #[must_use]
    pub fn hidden_layer(&self) -> &GraphAttention {
        &self.hidden
    }
}

impl GraphModule for GatNet {
    fn forward(&self, x: &Tensor, operator: &Arc<SparseMatrix>) -> Result<Tensor> {
        let h = self
            .hidden
            .forward(&self.input_dropout.forward(x), operator)?;
        self.output.forward(&self.dropout.forward(&h), operator)
    }

    fn parameters(&self) -> Vec<&Tensor> {
        let mut params = self.hidden.parameters();
        params.extend(self.output.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.hidden.parameters_mut();
        params.extend(self.output.parameters_mut());
        params
    }

    fn regularization_loss(&self) -> Option<Tensor> {
        sum_penalties([
            self.hidden.regularization_loss(),
            self.output.regularization_loss(),
        ])
    }

    fn train(&mut self) {
        self.input_dropout.train();
        self.hidden.train();
        self.dropout.train();
        self.output.train();
    }

    fn eval(&mut self) {
        self.input_dropout.eval();
        self.hidden.eval();
        self.dropout.eval();
        self.output.eval();
    }

    fn training(&self) -> bool {
        self.hidden.training()
    }
}

impl NodeClassifier for GatNet {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn summary(&self) -> String {
        let p = self.input_dropout.probability();
        let hidden_width = self.hidden.out_features();
        summary_table(
            "GatNet",
            &[
                (format!("dropout (p={p})"), "[N, F]".to_string(), 0),
                (
                    format!("graph_attention (H={})", self.hidden.config().heads),
                    format!("[N, {hidden_width}]"),
                    self.hidden.num_parameters(),
                ),
                (
                    format!("dropout (p={})", self.dropout.probability()),
                    format!("[N, {hidden_width}]"),
                    0,
                ),
                (
                    "graph_attention (H=1)".to_string(),
                    format!("[N, {}]", self.num_classes),
                    self.output.num_parameters(),
                ),
            ],
        )
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Model family and its hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelConfig {
    Arma(ArmaNetConfig),
    Gat(GatNetConfig),
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::Arma(ArmaNetConfig::default())
    }
}

impl ModelConfig {
    /// Build the model.
    ///
    /// # Errors
    ///
    /// Returns `Config` if a hyperparameter or size is invalid.
    pub fn build(&self, num_features: usize, num_classes: usize) -> Result<Box<dyn NodeClassifier>> {
        Ok(match self {
            Self::Arma(cfg) => Box::new(ArmaNet::new(cfg, num_features, num_classes)?),
            Self::Gat(cfg) => Box::new(GatNet::new(cfg, num_features, num_classes)?),
        })
    }

    /// Propagation operator the family expects.
    #[must_use]
    pub fn layer_kind(&self) -> LayerKind {
        match self {
            Self::Arma(_) => LayerKind::Arma,
            Self::Gat(_) => LayerKind::Gat,
        }
    }

    /// Learning rate used with this family by default.
    #[must_use]
    pub fn default_learning_rate(&self) -> f32 {
        match self {
            Self::Arma(_) => 1e-2,
            Self::Gat(_) => 5e-3,
        }
    }

    /// Override the seed of the selected family.
    pub fn set_seed(&mut self, seed: u64) {
        match self {
            Self::Arma(cfg) => cfg.seed = Some(seed),
            Self::Gat(cfg) => cfg.seed = Some(seed),
        }
    }

    /// Check every hyperparameter range.
    ///
    /// # Errors
    ///
    /// Returns `Config` naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Arma(cfg) => cfg.validate(),
            Self::Gat(cfg) => cfg.validate(),
        }
    }
}
