//! Error types for graph learning operations.
//!
//! Every failure the pipeline can hit (bad hyperparameters, inconsistent
//! dataset shapes, a diverging loss, unreadable dataset files) is surfaced
//! through [`GnnError`]. Nothing is silently swallowed.

use thiserror::Error;

/// Main error type for citegnn operations.
///
/// # Examples
///
/// ```
/// use citegnn::error::GnnError;
///
/// let err = GnnError::DataShape {
///     expected: "X rows = 4".to_string(),
///     actual: "3".to_string(),
/// };
/// assert!(err.to_string().contains("shape mismatch"));
/// ```
#[derive(Debug, Error)]
pub enum GnnError {
    /// Invalid hyperparameter or dataset configuration
    /// (e.g. non-disjoint masks, zero attention heads).
    #[error("invalid configuration: {param} = {value}, expected {constraint}")]
    Config {
        /// Parameter name
        param: String,
        /// Provided value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// The training loss became NaN or infinite.
    #[error("training diverged at epoch {epoch}: loss = {loss}")]
    Convergence {
        /// Epoch (0-based) at which the non-finite loss was observed
        epoch: usize,
        /// The offending loss value
        loss: f32,
    },

    /// Dimensions of X, A, labels, masks or parameters disagree.
    #[error("data shape mismatch: expected {expected}, got {actual}")]
    DataShape {
        /// Expected dimensions description
        expected: String,
        /// Actual dimensions found
        actual: String,
    },

    /// I/O error while reading a dataset or writing a report.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed dataset file.
    #[error("parse error in {file} at line {line}: {message}")]
    Parse {
        /// File being parsed
        file: String,
        /// 1-based line number
        line: usize,
        /// What went wrong
        message: String,
    },

    /// Malformed JSON configuration or history file.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GnnError {
    /// Create a configuration error.
    #[must_use]
    pub fn config(param: &str, value: impl ToString, constraint: &str) -> Self {
        Self::Config {
            param: param.to_string(),
            value: value.to_string(),
            constraint: constraint.to_string(),
        }
    }

    /// Create a shape mismatch error with descriptive context.
    #[must_use]
    pub fn shape(context: &str, expected: usize, actual: usize) -> Self {
        Self::DataShape {
            expected: format!("{context} = {expected}"),
            actual: actual.to_string(),
        }
    }

    /// Check whether this error stops training because of divergence.
    #[must_use]
    pub fn is_convergence(&self) -> bool {
        matches!(self, Self::Convergence { .. })
    }
}

/// Convenience type alias for Results.
pub type Result<T> = std::result::Result<T, GnnError>;

/// Validate that `value` lies in `[0, 1)`, the admissible range of a dropout rate.
pub(crate) fn check_rate(param: &str, value: f32) -> Result<()> {
    if (0.0..1.0).contains(&value) {
        Ok(())
    } else {
        Err(GnnError::config(param, value, "a rate in [0, 1)"))
    }
}

/// Validate that `value` is strictly positive.
pub(crate) fn check_positive(param: &str, value: usize) -> Result<()> {
    if value > 0 {
        Ok(())
    } else {
        Err(GnnError::config(param, value, "a positive integer"))
    }
}

/// Validate that an L2 coefficient is finite and non-negative.
pub(crate) fn check_l2(param: &str, value: f32) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(GnnError::config(param, value, "a finite coefficient >= 0"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_display() {
        let err = GnnError::config("order", 0, "a positive integer");
        let msg = err.to_string();
        assert!(msg.contains("order"));
        assert!(msg.contains("positive"));
    }

    #[test]
    fn test_convergence_display() {
        let err = GnnError::Convergence {
            epoch: 7,
            loss: f32::NAN,
        };
        assert!(err.to_string().contains("epoch 7"));
        assert!(err.is_convergence());
    }

    #[test]
    fn test_shape_helper() {
        let err = GnnError::shape("A rows", 4, 3);
        assert!(err.to_string().contains("A rows = 4"));
        assert!(!err.is_convergence());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: GnnError = io.into();
        assert!(matches!(err, GnnError::Io(_)));
    }

    #[test]
    fn test_check_rate() {
        assert!(check_rate("dropout", 0.0).is_ok());
        assert!(check_rate("dropout", 0.75).is_ok());
        assert!(check_rate("dropout", 1.0).is_err());
        assert!(check_rate("dropout", -0.1).is_err());
        assert!(check_rate("dropout", f32::NAN).is_err());
    }

    #[test]
    fn test_check_positive_and_l2() {
        assert!(check_positive("heads", 1).is_ok());
        assert!(check_positive("heads", 0).is_err());
        assert!(check_l2("l2", 5e-5).is_ok());
        assert!(check_l2("l2", -1.0).is_err());
        assert!(check_l2("l2", f32::INFINITY).is_err());
    }
}
