//! Adam optimizer (Kingma & Ba, 2015).
//!
//! ```text
//! m_t = β₁ m_{t-1} + (1 − β₁) g
//! v_t = β₂ v_{t-1} + (1 − β₂) g²
//! θ  -= lr · m̂_t / (√v̂_t + ε)
//! ```
//!
//! Gradients are read from the autograd graph by parameter id, so a step
//! must run after `backward` and before the graph is cleared.

use crate::autograd::{get_grad, Tensor};
use crate::error::{GnnError, Result};

/// Adam with bias-corrected moment estimates.
#[derive(Debug, Clone)]
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    /// First moment estimates
    m: Vec<Vec<f32>>,
    /// Second moment estimates
    v: Vec<Vec<f32>>,
    /// Current timestep for bias correction
    t: usize,
}

impl Adam {
    /// Create an optimizer with β₁=0.9, β₂=0.999, ε=1e-7.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the learning rate is not positive and finite.
    pub fn new(lr: f32) -> Result<Self> {
        if !(lr.is_finite() && lr > 0.0) {
            return Err(GnnError::config("learning_rate", lr, "must be positive"));
        }
        Ok(Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-7,
            m: Vec::new(),
            v: Vec::new(),
            t: 0,
        })
    }

    /// Set beta parameters.
    #[must_use]
    pub fn betas(mut self, beta1: f32, beta2: f32) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }

    /// Set epsilon for numerical stability.
    #[must_use]
    pub fn eps(mut self, eps: f32) -> Self {
        self.eps = eps;
        self
    }

    /// Learning rate.
    #[must_use]
    pub fn lr(&self) -> f32 {
        self.lr
    }

    /// Number of steps taken.
    #[must_use]
    pub fn steps(&self) -> usize {
        self.t
    }

    /// One update of every parameter that received a gradient.
    ///
    /// Parameters must be passed in the same order on every call.
    pub fn step_with_params(&mut self, params: &mut [&mut Tensor]) {
        self.t += 1;
        if self.m.len() != params.len() {
            self.m = params.iter().map(|p| vec![0.0; p.numel()]).collect();
            self.v = params.iter().map(|p| vec![0.0; p.numel()]).collect();
        }
        for (idx, param) in params.iter_mut().enumerate() {
            self.update_param(param, idx);
        }
    }

    fn update_param(&mut self, param: &mut Tensor, idx: usize) {
        let Some(grad) = get_grad(param.id()) else {
            return;
        };

        let bias_correction1 = 1.0 - self.beta1.powi(self.t as i32);
        let bias_correction2 = 1.0 - self.beta2.powi(self.t as i32);
        let m = &mut self.m[idx];
        let v = &mut self.v[idx];

        for (i, (p, &g)) in param.data_mut().iter_mut().zip(grad.data()).enumerate() {
            m[i] = self.beta1 * m[i] + (1.0 - self.beta1) * g;
            v[i] = self.beta2 * v[i] + (1.0 - self.beta2) * g * g;

            let m_hat = m[i] / bias_correction1;
            let v_hat = v[i] / bias_correction2;
            *p -= self.lr * m_hat / (v_hat.sqrt() + self.eps);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::clear_graph;

    #[test]
    fn test_invalid_learning_rate() {
        assert!(Adam::new(0.0).is_err());
        assert!(Adam::new(f32::NAN).is_err());
    }

    #[test]
    fn test_first_step_moves_by_lr() {
        clear_graph();
        let mut w = Tensor::from_slice(&[1.0, -1.0]).requires_grad();
        w.mul(&Tensor::from_slice(&[2.0, -3.0])).sum().backward();

        let mut adam = Adam::new(0.1).unwrap();
        adam.step_with_params(&mut [&mut w]);
        clear_graph();

        // m̂/√v̂ = sign(g) on the first step
        assert!((w.data()[0] - 0.9).abs() < 1e-4);
        assert!((w.data()[1] + 0.9).abs() < 1e-4);
        assert_eq!(adam.steps(), 1);
    }

    #[test]
    fn test_minimizes_quadratic() {
        let mut w = Tensor::from_slice(&[3.0, -2.0]).requires_grad();
        let mut adam = Adam::new(0.1).unwrap();

        for _ in 0..300 {
            clear_graph();
            w.pow(2.0).sum().backward();
            adam.step_with_params(&mut [&mut w]);
        }
        clear_graph();

        assert!(w.data().iter().all(|v| v.abs() < 0.1), "{:?}", w.data());
    }

    #[test]
    fn test_parameter_without_gradient_is_untouched() {
        clear_graph();
        let mut used = Tensor::from_slice(&[1.0]).requires_grad();
        let mut unused = Tensor::from_slice(&[5.0]).requires_grad();
        used.sum().backward();

        Adam::new(0.1)
            .unwrap()
            .step_with_params(&mut [&mut used, &mut unused]);
        clear_graph();

        assert_eq!(unused.data(), &[5.0]);
        assert!(used.data()[0] < 1.0);
    }
}
