//! ARMA graph convolution.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{check_inputs, mean_of};
use crate::autograd::Tensor;
use crate::error::{check_l2, check_positive, check_rate, Result};
use crate::nn::loss::l2_penalty;
use crate::nn::{init, Activation, Dropout, GraphModule};
use crate::sparse::SparseMatrix;

/// How the K parallel stacks are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackCombine {
    /// Average the stack outputs (width `channels`)
    #[default]
    Mean,
    /// Concatenate the stack outputs (width `channels · order`)
    Concat,
}

/// Configuration of an [`ArmaConv`] layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmaConfig {
    /// Output width of every stack
    pub channels: usize,
    /// Number of parallel stacks K
    pub order: usize,
    /// Depth T of every stack
    pub iterations: usize,
    /// Share one set of parameters across all K stacks
    pub share_weights: bool,
    /// Dropout on the skip connection `X·V`
    pub dropout_rate: f32,
    /// Applied to the combined stack outputs
    pub activation: Activation,
    /// Applied inside every stack iteration
    pub gcn_activation: Activation,
    pub stack_combine: StackCombine,
    /// L2 coefficient on the kernels
    pub kernel_l2: f32,
    pub use_bias: bool,
    /// RNG seed for initialization and dropout (entropy when `None`)
    pub seed: Option<u64>,
}

impl Default for ArmaConfig {
    fn default() -> Self {
        Self {
            channels: 16,
            order: 1,
            iterations: 1,
            share_weights: false,
            dropout_rate: 0.0,
            activation: Activation::Linear,
            gcn_activation: Activation::Relu,
            stack_combine: StackCombine::Mean,
            kernel_l2: 0.0,
            use_bias: true,
            seed: None,
        }
    }
}

impl ArmaConfig {
    /// Defaults with the given output width.
    #[must_use]
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_order(mut self, order: usize) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    #[must_use]
    pub fn with_share_weights(mut self, share: bool) -> Self {
        self.share_weights = share;
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
    pub fn with_gcn_activation(mut self, activation: Activation) -> Self {
        self.gcn_activation = activation;
        self
    }

    #[must_use]
    pub fn with_stack_combine(mut self, combine: StackCombine) -> Self {
        self.stack_combine = combine;
        self
    }

    #[must_use]
    pub fn with_kernel_l2(mut self, l2: f32) -> Self {
        self.kernel_l2 = l2;
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
        check_positive("order", self.order)?;
        check_positive("iterations", self.iterations)?;
        check_rate("dropout_rate", self.dropout_rate)?;
        check_l2("kernel_l2", self.kernel_l2)
    }

    /// Width of the layer output.
    #[must_use]
    pub fn output_width(&self) -> usize {
        match self.stack_combine {
            StackCombine::Mean => self.channels,
            StackCombine::Concat => self.channels * self.order,
        }
    }
}

/// Parameters of one recursive stack.
#[derive(Debug, Clone)]
struct ArmaStack {
    /// Initial kernel W₀ `[F, C]`
    w0: Tensor,
    b0: Option<Tensor>,
    /// Recurrent kernel W₁ `[C, C]`, present when T > 1
    w1: Option<Tensor>,
    /// Skip kernel V `[F, C]`, present when T > 1
    v: Option<Tensor>,
    b1: Option<Tensor>,
}

impl ArmaStack {
    fn new(in_features: usize, config: &ArmaConfig, rng: &mut StdRng) -> Self {
        let c = config.channels;
        let recurrent = config.iterations > 1;
        let bias = |on: bool| (config.use_bias && on).then(|| init::bias(c));

        Self {
            w0: init::kernel(in_features, c, rng),
            b0: bias(true),
            w1: recurrent.then(|| init::kernel(c, c, rng)),
            v: recurrent.then(|| init::kernel(in_features, c, rng)),
            b1: bias(recurrent),
        }
    }

    fn kernels(&self) -> Vec<&Tensor> {
        std::iter::once(&self.w0)
            .chain(self.w1.as_ref())
            .chain(self.v.as_ref())
            .collect()
    }

    fn parameters(&self) -> Vec<&Tensor> {
        [
            Some(&self.w0),
            self.b0.as_ref(),
            self.w1.as_ref(),
            self.v.as_ref(),
            self.b1.as_ref(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        [
            Some(&mut self.w0),
            self.b0.as_mut(),
            self.w1.as_mut(),
            self.v.as_mut(),
            self.b1.as_mut(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// ARMA graph convolution (Bianchi et al., 2021).
///
/// Each of the K stacks computes
///
/// ```text
/// h₁     = σ(A·X·W₀ + b₀)
/// h_{t+1} = σ(A·h_t·W₁ + dropout(X·V) + b₁)     for t = 1 … T−1
/// ```
///
/// with σ the `gcn_activation`. The K outputs are averaged or concatenated
/// and passed through `activation`. With `order = 1` and `iterations = 1`
/// the layer is a single GCN step.
pub struct ArmaConv {
    in_features: usize,
    config: ArmaConfig,
    /// One entry when weights are shared, otherwise one per stack
    stacks: Vec<ArmaStack>,
    skip_dropout: Dropout,
    training: bool,
}

impl ArmaConv {
    /// Create a layer with Glorot-uniform kernels and zero biases.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration is invalid.
    pub fn new(in_features: usize, config: ArmaConfig) -> Result<Self> {
        config.validate()?;
        check_positive("in_features", in_features)?;

        let mut rng = config
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        let n_stacks = if config.share_weights { 1 } else { config.order };
        let stacks = (0..n_stacks)
            .map(|_| ArmaStack::new(in_features, &config, &mut rng))
            .collect();
        let skip_dropout = Dropout::with_seed(config.dropout_rate, rng.gen())?;

        Ok(Self {
            in_features,
            config,
            stacks,
            skip_dropout,
            training: true,
        })
    }

    /// Layer configuration.
    #[must_use]
    pub fn config(&self) -> &ArmaConfig {
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

    fn stack(&self, k: usize) -> &ArmaStack {
        &self.stacks[k.min(self.stacks.len() - 1)]
    }

    fn run_stack(&self, params: &ArmaStack, x: &Tensor, operator: &Arc<SparseMatrix>) -> Tensor {
        let sigma = self.config.gcn_activation;
        let with_bias = |t: Tensor, b: Option<&Tensor>| match b {
            Some(b) => t.broadcast_add(b),
            None => t,
        };

        let mut h = sigma.apply(&with_bias(
            x.matmul(&params.w0).propagate(operator),
            params.b0.as_ref(),
        ));

        if let (Some(w1), Some(v)) = (&params.w1, &params.v) {
            for _ in 1..self.config.iterations {
                let skip = self.skip_dropout.forward(&x.matmul(v));
                let pre = h.matmul(w1).propagate(operator).add(&skip);
                h = sigma.apply(&with_bias(pre, params.b1.as_ref()));
            }
        }
        h
    }
}

impl GraphModule for ArmaConv {
    fn forward(&self, x: &Tensor, operator: &Arc<SparseMatrix>) -> Result<Tensor> {
        check_inputs(x, operator, self.in_features)?;

        let outputs: Vec<Tensor> = (0..self.config.order)
            .map(|k| self.run_stack(self.stack(k), x, operator))
            .collect();

        let combined = match self.config.stack_combine {
            StackCombine::Mean => mean_of(&outputs),
            StackCombine::Concat => Tensor::concat_cols(&outputs),
        };
        Ok(self.config.activation.apply(&combined))
    }

    fn parameters(&self) -> Vec<&Tensor> {
        self.stacks.iter().flat_map(ArmaStack::parameters).collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.stacks
            .iter_mut()
            .flat_map(ArmaStack::parameters_mut)
            .collect()
    }

    fn regularization_loss(&self) -> Option<Tensor> {
        let kernels: Vec<&Tensor> = self.stacks.iter().flat_map(ArmaStack::kernels).collect();
        l2_penalty(&kernels, self.config.kernel_l2)
    }

    fn train(&mut self) {
        self.training = true;
        self.skip_dropout.train();
    }

    fn eval(&mut self) {
        self.training = false;
        self.skip_dropout.eval();
    }

    fn training(&self) -> bool {
        self.training
    }
}

impl std::fmt::Debug for ArmaConv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArmaConv")
            .field("in_features", &self.in_features)
            .field("config", &self.config)
            .field("training", &self.training)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{clear_graph, get_grad, no_grad};

    fn path3_filter() -> Arc<SparseMatrix> {
        let a = SparseMatrix::from_edge_index(&[[0, 1], [1, 2]], 3)
            .unwrap()
            .symmetrize();
        Arc::new(a.gcn_filter())
    }

    #[test]
    fn test_validate_rejects_zero_order() {
        assert!(ArmaConfig::new(4).with_order(0).validate().is_err());
        assert!(ArmaConfig::new(4).with_iterations(0).validate().is_err());
        assert!(ArmaConfig::new(0).validate().is_err());
        assert!(ArmaConfig::new(4).with_dropout(1.0).validate().is_err());
        assert!(ArmaConfig::new(4).with_kernel_l2(-1.0).validate().is_err());
        assert!(ArmaConv::new(3, ArmaConfig::new(4).with_order(0)).is_err());
    }

    #[test]
    fn test_single_step_matches_gcn() {
        // order=1, iterations=1: relu(A·X·W₀ + b₀) computed by hand
        let filter = path3_filter();
        let mut conv = ArmaConv::new(2, ArmaConfig::new(2).with_seed(3)).unwrap();
        let w0 = Tensor::new(&[1.0, -1.0, 0.5, 2.0], &[2, 2]);
        let b0 = Tensor::from_slice(&[0.1, -0.2]);
        {
            let mut params = conv.parameters_mut();
            assert_eq!(params.len(), 2);
            params[0].data_mut().copy_from_slice(w0.data());
            params[1].data_mut().copy_from_slice(b0.data());
        }
        conv.eval();

        let x = Tensor::new(&[1.0, 0.0, 0.0, 1.0, 1.0, 1.0], &[3, 2]);
        let out = no_grad(|| conv.forward(&x, &filter)).unwrap();

        let dense = filter.to_dense();
        let xw = x.matmul(&w0);
        for i in 0..3 {
            for c in 0..2 {
                let agg: f32 = (0..3).map(|j| dense[i * 3 + j] * xw.data()[j * 2 + c]).sum();
                let expected = (agg + b0.data()[c]).max(0.0);
                assert!((out.data()[i * 2 + c] - expected).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_two_iterations_by_hand() {
        // T = 2, linear σ, no bias: W₀ = I, W₁ = 0.5·I, V = 2·I
        // h₁ = A·X, h₂ = A·h₁·W₁ + X·V = 0.5·A·A·X + 2·X
        let filter = path3_filter();
        let mut conv = ArmaConv::new(
            2,
            ArmaConfig::new(2)
                .with_iterations(2)
                .with_gcn_activation(Activation::Linear)
                .with_bias(false)
                .with_seed(5),
        )
        .unwrap();
        {
            let mut params = conv.parameters_mut();
            assert_eq!(params.len(), 3);
            params[0].data_mut().copy_from_slice(&[1.0, 0.0, 0.0, 1.0]);
            params[1].data_mut().copy_from_slice(&[0.5, 0.0, 0.0, 0.5]);
            params[2].data_mut().copy_from_slice(&[2.0, 0.0, 0.0, 2.0]);
        }
        conv.eval();

        let x = Tensor::new(&[1.0, -1.0, 0.5, 2.0, -0.3, 0.7], &[3, 2]);
        let out = no_grad(|| conv.forward(&x, &filter)).unwrap();

        let ax = filter.matmul_dense(x.data(), 2);
        let aax = filter.matmul_dense(&ax, 2);
        for (i, &got) in out.data().iter().enumerate() {
            let expected = 0.5 * aax[i] + 2.0 * x.data()[i];
            assert!((got - expected).abs() < 1e-5, "entry {i}: {got} vs {expected}");
        }
    }

    #[test]
    fn test_output_widths() {
        let filter = path3_filter();
        let x = Tensor::ones(&[3, 4]);

        let mean = ArmaConv::new(4, ArmaConfig::new(5).with_order(3).with_seed(0)).unwrap();
        assert_eq!(mean.forward(&x, &filter).unwrap().shape(), &[3, 5]);

        let concat = ArmaConv::new(
            4,
            ArmaConfig::new(5)
                .with_order(3)
                .with_stack_combine(StackCombine::Concat)
                .with_seed(0),
        )
        .unwrap();
        assert_eq!(concat.out_features(), 15);
        assert_eq!(concat.forward(&x, &filter).unwrap().shape(), &[3, 15]);
    }

    #[test]
    fn test_parameter_counts() {
        // Independent stacks, T = 2: W₀, b₀, W₁, V, b₁ per stack
        let conv = ArmaConv::new(
            4,
            ArmaConfig::new(3).with_order(2).with_iterations(2).with_seed(1),
        )
        .unwrap();
        assert_eq!(conv.parameters().len(), 10);
        assert_eq!(conv.num_parameters(), 2 * (4 * 3 + 3 + 3 * 3 + 4 * 3 + 3));

        let shared = ArmaConv::new(
            4,
            ArmaConfig::new(3)
                .with_order(2)
                .with_iterations(2)
                .with_share_weights(true)
                .with_seed(1),
        )
        .unwrap();
        assert_eq!(shared.parameters().len(), 5);
    }

    #[test]
    fn test_shared_stacks_agree_in_eval() {
        let filter = path3_filter();
        let mut concat = ArmaConv::new(
            2,
            ArmaConfig::new(2)
                .with_order(2)
                .with_iterations(3)
                .with_share_weights(true)
                .with_dropout(0.5)
                .with_stack_combine(StackCombine::Concat)
                .with_seed(4),
        )
        .unwrap();
        concat.eval();

        let x = Tensor::new(&[0.3, -0.2, 0.9, 0.1, -0.5, 0.4], &[3, 2]);
        let out = no_grad(|| concat.forward(&x, &filter)).unwrap();
        for i in 0..3 {
            let row = out.row(i);
            assert!((row[0] - row[2]).abs() < 1e-6);
            assert!((row[1] - row[3]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_regularization_covers_kernels_only() {
        let mut conv = ArmaConv::new(2, ArmaConfig::new(2).with_kernel_l2(0.5).with_seed(2)).unwrap();
        {
            let mut params = conv.parameters_mut();
            params[0].data_mut().copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);
            params[1].data_mut().copy_from_slice(&[10.0, 10.0]);
        }
        let penalty = conv.regularization_loss().expect("penalty");
        assert!((penalty.item() - 2.0).abs() < 1e-6);

        let plain = ArmaConv::new(2, ArmaConfig::new(2).with_seed(2)).unwrap();
        assert!(plain.regularization_loss().is_none());
    }

    #[test]
    fn test_gradients_reach_all_parameters() {
        clear_graph();
        let filter = path3_filter();
        let conv = ArmaConv::new(
            2,
            ArmaConfig::new(2)
                .with_iterations(2)
                .with_gcn_activation(Activation::Tanh)
                .with_seed(8),
        )
        .unwrap();
        let x = Tensor::new(&[0.3, -0.2, 0.9, 0.1, -0.5, 0.4], &[3, 2]);
        conv.forward(&x, &filter).unwrap().sum().backward();

        for p in conv.parameters() {
            assert!(get_grad(p.id()).is_some());
        }
        clear_graph();
    }

    #[test]
    fn test_shape_mismatch() {
        let filter = path3_filter();
        let conv = ArmaConv::new(4, ArmaConfig::new(2).with_seed(0)).unwrap();
        assert!(conv.forward(&Tensor::ones(&[3, 3]), &filter).is_err());
        assert!(conv.forward(&Tensor::ones(&[4, 4]), &filter).is_err());
    }
}
