//! Weight initialization functions.
//!
//! Kernels use Xavier/Glorot uniform initialization (Glorot & Bengio,
//! 2010); biases start at zero. Every initializer draws from a caller-owned
//! RNG so a seeded model is reproducible.
//!
//! # References
//!
//! - Glorot, X., & Bengio, Y. (2010). Understanding the difficulty of training
//!   deep feedforward neural networks. AISTATS.

use rand::Rng;

use crate::autograd::Tensor;

/// Xavier uniform initialization (Glorot & Bengio, 2010).
///
/// Samples from U(-a, a) where a = sqrt(6 / (`fan_in` + `fan_out`)).
///
/// # Example
///
/// ```
/// use citegnn::nn::init::xavier_uniform;
/// use rand::SeedableRng;
///
/// let mut rng = rand::rngs::StdRng::seed_from_u64(0);
/// let w = xavier_uniform(&[64, 16], 64, 16, &mut rng);
/// let a = (6.0f32 / 80.0).sqrt();
/// assert!(w.data().iter().all(|v| v.abs() <= a));
/// ```
#[must_use]
pub fn xavier_uniform<R: Rng + ?Sized>(
    shape: &[usize],
    fan_in: usize,
    fan_out: usize,
    rng: &mut R,
) -> Tensor {
    let a = (6.0 / (fan_in + fan_out).max(1) as f32).sqrt();
    uniform(shape, -a, a, rng)
}

/// Uniform initialization: U(low, high).
#[must_use]
pub fn uniform<R: Rng + ?Sized>(shape: &[usize], low: f32, high: f32, rng: &mut R) -> Tensor {
    let numel: usize = shape.iter().product();
    let data: Vec<f32> = (0..numel).map(|_| rng.gen_range(low..=high)).collect();
    Tensor::from_vec(data, shape)
}

/// Trainable kernel `[fan_in, fan_out]` with Glorot-uniform values.
pub(crate) fn kernel<R: Rng + ?Sized>(fan_in: usize, fan_out: usize, rng: &mut R) -> Tensor {
    xavier_uniform(&[fan_in, fan_out], fan_in, fan_out, rng).requires_grad()
}

/// Trainable zero bias of length `n`.
pub(crate) fn bias(n: usize) -> Tensor {
    Tensor::zeros(&[n]).requires_grad()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_xavier_bounds_and_spread() {
        let mut rng = StdRng::seed_from_u64(1);
        let w = xavier_uniform(&[100, 100], 100, 100, &mut rng);
        let a = (6.0f32 / 200.0).sqrt();
        assert!(w.data().iter().all(|v| v.abs() <= a));

        let mean: f32 = w.data().iter().sum::<f32>() / w.numel() as f32;
        assert!(mean.abs() < 0.02);
    }

    #[test]
    fn test_seeded_reproducible() {
        let a = xavier_uniform(&[3, 4], 3, 4, &mut StdRng::seed_from_u64(5));
        let b = xavier_uniform(&[3, 4], 3, 4, &mut StdRng::seed_from_u64(5));
        assert_eq!(a.data(), b.data());
    }

    #[test]
    fn test_kernel_and_bias_are_trainable() {
        let mut rng = StdRng::seed_from_u64(0);
        let k = kernel(3, 2, &mut rng);
        assert_eq!(k.shape(), &[3, 2]);
        assert!(k.requires_grad_enabled());

        let b = bias(2);
        assert!(b.requires_grad_enabled());
        assert!(b.data().iter().all(|&v| v == 0.0));
    }
}
