//! Dropout regularization.
//!
//! Dropout randomly zeroes elements during training to prevent co-adaptation
//! of neurons and reduce overfitting.
//!
//! # Reference
//!
//! - Srivastava, N., et al. (2014). Dropout: A simple way to prevent neural
//!   networks from overfitting. JMLR.

use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::autograd::Tensor;
use crate::error::{check_rate, Result};

/// Inverted dropout.
///
/// During training, zeroes each element with probability `p` and scales
/// the survivors by `1/(1-p)`; during evaluation returns the input.
/// The mask is applied with a differentiable multiply, so gradients flow
/// through the kept elements.
pub struct Dropout {
    /// Probability of an element being zeroed
    p: f32,

    /// Whether in training mode
    training: bool,

    /// Random number generator (Mutex for thread safety)
    rng: Mutex<StdRng>,
}

impl Dropout {
    /// Create a dropout layer seeded from entropy.
    ///
    /// # Errors
    ///
    /// Returns `Config` if `p` is not in [0, 1).
    pub fn new(p: f32) -> Result<Self> {
        Self::build(p, StdRng::from_entropy())
    }

    /// Create a dropout layer with a fixed seed.
    ///
    /// # Errors
    ///
    /// Returns `Config` if `p` is not in [0, 1).
    pub fn with_seed(p: f32, seed: u64) -> Result<Self> {
        Self::build(p, StdRng::seed_from_u64(seed))
    }

    fn build(p: f32, rng: StdRng) -> Result<Self> {
        check_rate("dropout", p)?;
        Ok(Self {
            p,
            training: true,
            rng: Mutex::new(rng),
        })
    }

    /// Dropout probability.
    #[must_use]
    pub fn probability(&self) -> f32 {
        self.p
    }

    /// Apply dropout (identity in inference mode or when `p == 0`).
    #[must_use]
    pub fn forward(&self, input: &Tensor) -> Tensor {
        if !self.training || self.p == 0.0 {
            return input.clone();
        }

        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let scale = 1.0 / (1.0 - self.p);
        let mask: Vec<f32> = (0..input.numel())
            .map(|_| if rng.gen::<f32>() < self.p { 0.0 } else { scale })
            .collect();

        input.mul(&Tensor::from_vec(mask, input.shape()))
    }

    /// Switch to training mode.
    pub fn train(&mut self) {
        self.training = true;
    }

    /// Switch to inference mode.
    pub fn eval(&mut self) {
        self.training = false;
    }

    /// Whether in training mode.
    #[must_use]
    pub fn training(&self) -> bool {
        self.training
    }
}

impl std::fmt::Debug for Dropout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dropout")
            .field("p", &self.p)
            .field("training", &self.training)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{clear_graph, get_grad};

    #[test]
    fn test_invalid_probability() {
        assert!(Dropout::new(1.0).is_err());
        assert!(Dropout::new(-0.1).is_err());
        assert!(Dropout::new(0.0).is_ok());
    }

    #[test]
    fn test_eval_is_identity() {
        let mut dropout = Dropout::with_seed(0.5, 7).unwrap();
        dropout.eval();
        let x = Tensor::ones(&[4, 4]);
        assert_eq!(dropout.forward(&x).data(), x.data());
    }

    #[test]
    fn test_training_zeroes_and_scales() {
        let dropout = Dropout::with_seed(0.5, 42).unwrap();
        let y = dropout.forward(&Tensor::ones(&[100, 10]));

        let zeros = y.data().iter().filter(|&&v| v == 0.0).count();
        assert!(zeros > 350 && zeros < 650, "zeros = {zeros}");
        assert!(y.data().iter().all(|&v| v == 0.0 || (v - 2.0).abs() < 1e-6));
    }

    #[test]
    fn test_seeded_masks_repeat() {
        let a = Dropout::with_seed(0.3, 9).unwrap().forward(&Tensor::ones(&[5, 5]));
        let b = Dropout::with_seed(0.3, 9).unwrap().forward(&Tensor::ones(&[5, 5]));
        assert_eq!(a.data(), b.data());
    }

    #[test]
    fn test_gradient_flows_through_kept_elements() {
        clear_graph();
        let dropout = Dropout::with_seed(0.5, 3).unwrap();
        let w = Tensor::ones(&[20]).requires_grad();
        let y = dropout.forward(&w);
        y.sum().backward();

        let grad = get_grad(w.id()).expect("gradient");
        for (g, v) in grad.data().iter().zip(y.data()) {
            assert_eq!(g, v);
        }
        clear_graph();
    }
}
