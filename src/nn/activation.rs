//! Activation functions selectable from configuration.

use serde::{Deserialize, Serialize};

use crate::autograd::Tensor;

/// Negative slope used by [`Activation::LeakyRelu`].
const LEAKY_SLOPE: f32 = 0.2;

/// Element-wise (or row-wise, for softmax) activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// Identity
    #[default]
    Linear,
    /// max(0, x)
    Relu,
    /// x if x > 0 else eˣ − 1
    Elu,
    /// x if x > 0 else 0.2x
    LeakyRelu,
    /// 1 / (1 + e^-x)
    Sigmoid,
    /// tanh(x)
    Tanh,
    /// Row-wise softmax; rows sum to 1
    Softmax,
}

impl Activation {
    /// Apply the activation.
    #[must_use]
    pub fn apply(self, x: &Tensor) -> Tensor {
        match self {
            Self::Linear => x.clone(),
            Self::Relu => x.relu(),
            Self::Elu => x.elu(1.0),
            Self::LeakyRelu => x.leaky_relu(LEAKY_SLOPE),
            Self::Sigmoid => x.sigmoid(),
            Self::Tanh => x.tanh_(),
            Self::Softmax => x.softmax(),
        }
    }

    /// Lower-case name, as written in configuration files.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Relu => "relu",
            Self::Elu => "elu",
            Self::LeakyRelu => "leaky_relu",
            Self::Sigmoid => "sigmoid",
            Self::Tanh => "tanh",
            Self::Softmax => "softmax",
        }
    }
}

impl std::fmt::Display for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_is_identity() {
        let x = Tensor::new(&[-1.0, 2.0], &[1, 2]);
        assert_eq!(Activation::Linear.apply(&x).data(), x.data());
    }

    #[test]
    fn test_softmax_rows() {
        let y = Activation::Softmax.apply(&Tensor::new(&[1.0, 1.0, 0.0, 5.0], &[2, 2]));
        assert!((y.data()[0] - 0.5).abs() < 1e-6);
        assert!((y.row(1).iter().sum::<f32>() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&Activation::LeakyRelu).unwrap();
        assert_eq!(json, "\"leaky_relu\"");
        let back: Activation = serde_json::from_str("\"elu\"").unwrap();
        assert_eq!(back, Activation::Elu);
        assert_eq!(Activation::Softmax.to_string(), "softmax");
    }
}
