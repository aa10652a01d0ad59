//! Multi-head graph attention.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{check_inputs, mean_of};
use crate::autograd::{no_grad, Tensor};
use crate::error::{check_l2, check_positive, check_rate, GnnError, Result};
use crate::nn::loss::{l2_penalty, sum_penalties};
use crate::nn::{init, Activation, Dropout, GraphModule};
use crate::sparse::SparseMatrix;

/// Configuration of a [`GraphAttention`] layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatConfig {
    /// Output width of every head
    pub channels: usize,
    pub heads: usize,
    /// Concatenate head outputs (`channels · heads`) instead of averaging
    pub concat_heads: bool,
    /// Dropout on attention weights and on transformed features
    pub dropout_rate: f32,
    pub activation: Activation,
    /// Slope of the LeakyReLU applied to attention logits
    pub negative_slope: f32,
    pub kernel_l2: f32,
    pub attn_kernel_l2: f32,
    pub use_bias: bool,
    /// RNG seed for initialization and dropout (entropy when `None`)
    pub seed: Option<u64>,
}

impl Default for GatConfig {
    fn default() -> Self {
        Self {
            channels: 8,
            heads: 1,
            concat_heads: true,
            dropout_rate: 0.5,
            activation: Activation::Linear,
            negative_slope: 0.2,
            kernel_l2: 0.0,
            attn_kernel_l2: 0.0,
            use_bias: true,
            seed: None,
        }
    }
}

impl GatConfig {
    /// Defaults with the given per-head width.
    #[must_use]
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_heads(mut self, heads: usize) -> Self {
        self.heads = heads;
        self
    }

    #[must_use]
    pub fn with_concat_heads(mut self, concat: bool) -> Self {
        self.concat_heads = concat;
        self
    }

    #[must_use]
    pub fn with_dropout(mut self, rate: f32) -> Self {
        self.dropout_rate = rate;
        self
    }

    #[must_use]
    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    #[must_use]
    pub fn with_negative_slope(mut self, slope: f32) -> Self {
        self.negative_slope = slope;
        self
    }

    /// Same L2 coefficient for kernels and attention kernels.
    #[must_use]
    pub fn with_l2(mut self, l2: f32) -> Self {
        self.kernel_l2 = l2;
        self.attn_kernel_l2 = l2;
        self
    }

    #[must_use]
    pub fn with_bias(mut self, use_bias: bool) -> Self {
        self.use_bias = use_bias;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check every hyperparameter range.
    ///
    /// # Errors
    ///
    /// Returns `Config` naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        check_positive("channels", self.channels)?;
        check_positive("heads", self.heads)?;
        check_rate("dropout_rate", self.dropout_rate)?;
        if !(self.negative_slope.is_finite() && self.negative_slope >= 0.0) {
            return Err(GnnError::config(
                "negative_slope",
                self.negative_slope,
                "must be finite and >= 0",
            ));
        }
        check_l2("kernel_l2", self.kernel_l2)?;
        check_l2("attn_kernel_l2", self.attn_kernel_l2)
    }

    /// Width of the layer output.
    #[must_use]
    pub fn output_width(&self) -> usize {
        if self.concat_heads {
            self.channels * self.heads
        } else {
            self.channels
        }
    }
}

/// Parameters of one attention head.
#[derive(Debug, Clone)]
struct AttentionHead {
    /// `[F, C]`
    kernel: Tensor,
    /// `[C, 1]`, scores the receiving node
    attn_self: Tensor,
    /// `[C, 1]`, scores the neighbour
    attn_neigh: Tensor,
    bias: Option<Tensor>,
}

impl AttentionHead {
    fn new(in_features: usize, config: &GatConfig, rng: &mut StdRng) -> Self {
        let c = config.channels;
        Self {
            kernel: init::kernel(in_features, c, rng),
            attn_self: init::kernel(c, 1, rng),
            attn_neigh: init::kernel(c, 1, rng),
            bias: config.use_bias.then(|| init::bias(c)),
        }
    }

    /// Normalized attention weights, one per stored entry of `pattern`.
    fn attention(&self, xh: &Tensor, pattern: &Arc<SparseMatrix>, slope: f32) -> Tensor {
        let s = xh.matmul(&self.attn_self);
        let t = xh.matmul(&self.attn_neigh);
        Tensor::edge_scores(&s, &t, pattern)
            .leaky_relu(slope)
            .segment_softmax(pattern)
    }
}

/// Multi-head graph attention layer (Veličković et al., 2018).
///
/// For every head h and every edge (i, j) of A plus self-loops:
///
/// ```text
/// Xh     = X·W_h
/// e_ij   = LeakyReLU(a_self·Xh_i + a_neigh·Xh_j)
/// α_ij   = softmax_j(e_ij)          over the neighbours of i
/// Yh_i   = Σ_j α_ij · Xh_j + b_h
/// ```
///
/// Pairs outside the graph are never scored, so their weight is exactly 0.
/// During training dropout is applied to `Xh` and to the weights `α`.
/// Heads are concatenated or averaged, then `activation` is applied.
pub struct GraphAttention {
    in_features: usize,
    config: GatConfig,
    heads: Vec<AttentionHead>,
    feature_dropout: Dropout,
    attention_dropout: Dropout,
    training: bool,
}

impl GraphAttention {
    /// Create a layer with Glorot-uniform kernels and zero biases.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration is invalid.
    pub fn new(in_features: usize, config: GatConfig) -> Result<Self> {
        config.validate()?;
        check_positive("in_features", in_features)?;

        let mut rng = config
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        let heads = (0..config.heads)
            .map(|_| AttentionHead::new(in_features, &config, &mut rng))
            .collect();
        let feature_dropout = Dropout::with_seed(config.dropout_rate, rng.gen())?;
        let attention_dropout = Dropout::with_seed(config.dropout_rate, rng.gen())?;

        Ok(Self {
            in_features,
            config,
            heads,
            feature_dropout,
            attention_dropout,
            training: true,
        })
    }

    /// Layer configuration.
    #[must_use]
    pub fn config(&self) -> &GatConfig {
        &self.config
    }

    /// Input feature width.
    #[must_use]
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    /// Output feature width.
    #[must_use]
    pub fn out_features(&self) -> usize {
        self.config.output_width()
    }

    /// Normalized attention matrix of every head, computed without dropout
    /// and without gradient tracking.
    ///
    /// Each matrix has the sparsity pattern of A plus self-loops and rows
    /// that sum to 1.
    ///
    /// # Errors
    ///
    /// Returns `DataShape` on input shape mismatches.
    pub fn attention_coefficients(
        &self,
        x: &Tensor,
        operator: &Arc<SparseMatrix>,
    ) -> Result<Vec<SparseMatrix>> {
        check_inputs(x, operator, self.in_features)?;
        let pattern = attention_pattern(operator);

        no_grad(|| {
            self.heads
                .iter()
                .map(|head| {
                    let xh = x.matmul(&head.kernel);
                    let alpha = head.attention(&xh, &pattern, self.config.negative_slope);
                    pattern.with_values(alpha.data().to_vec())
                })
                .collect()
        })
    }
}

/// Structure of `operator` with every diagonal entry present.
fn attention_pattern(operator: &Arc<SparseMatrix>) -> Arc<SparseMatrix> {
    let n = operator.n_rows();
    if (0..n).all(|i| operator.contains(i, i)) {
        Arc::clone(operator)
    } else {
        Arc::new(operator.add_self_loops())
    }
}

impl GraphModule for GraphAttention {
    fn forward(&self, x: &Tensor, operator: &Arc<SparseMatrix>) -> Result<Tensor> {
        check_inputs(x, operator, self.in_features)?;
        let pattern = attention_pattern(operator);

        let outputs: Vec<Tensor> = self
            .heads
            .iter()
            .map(|head| {
                let xh = x.matmul(&head.kernel);
                let alpha = head.attention(&xh, &pattern, self.config.negative_slope);
                let alpha = self.attention_dropout.forward(&alpha);
                let xh = self.feature_dropout.forward(&xh);
                let out = alpha.edge_aggregate(&xh, &pattern);
                match &head.bias {
                    Some(b) => out.broadcast_add(b),
                    None => out,
                }
            })
            .collect();

        let combined = if self.config.concat_heads {
            Tensor::concat_cols(&outputs)
        } else {
            mean_of(&outputs)
        };
        Ok(self.config.activation.apply(&combined))
    }

    fn parameters(&self) -> Vec<&Tensor> {
        self.heads
            .iter()
            .flat_map(|h| {
                [Some(&h.kernel), Some(&h.attn_self), Some(&h.attn_neigh), h.bias.as_ref()]
                    .into_iter()
                    .flatten()
            })
            .collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.heads
            .iter_mut()
            .flat_map(|h| {
                [
                    Some(&mut h.kernel),
                    Some(&mut h.attn_self),
                    Some(&mut h.attn_neigh),
                    h.bias.as_mut(),
                ]
                .into_iter()
                .flatten()
            })
            .collect()
    }

    fn regularization_loss(&self) -> Option<Tensor> {
        let kernels: Vec<&Tensor> = self.heads.iter().map(|h| &h.kernel).collect();
        let attn: Vec<&Tensor> = self
            .heads
            .iter()
            .flat_map(|h| [&h.attn_self, &h.attn_neigh])
            .collect();
        sum_penalties([
            l2_penalty(&kernels, self.config.kernel_l2),
            l2_penalty(&attn, self.config.attn_kernel_l2),
        ])
    }

    fn train(&mut self) {
        self.training = true;
        self.feature_dropout.train();
        self.attention_dropout.train();
    }

    fn eval(&mut self) {
        self.training = false;
        self.feature_dropout.eval();
        self.attention_dropout.eval();
    }

    fn training(&self) -> bool {
        self.training
    }
}

impl std::fmt::Debug for GraphAttention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphAttention")
            .field("in_features", &self.in_features)
            .field("config", &self.config)
            .field("training", &self.training)
            .finish_non_exhaustive()
    }
}
