//! Base trait for graph neural network modules.

use std::sync::Arc;

use crate::autograd::Tensor;
use crate::error::Result;
use crate::sparse::SparseMatrix;

/// A layer or model that maps node features over a fixed graph.
///
/// Every call receives the propagation operator explicitly; modules never
/// cache graph structure between calls.
pub trait GraphModule {
    /// Forward pass: `[num_nodes, in] -> [num_nodes, out]`.
    ///
    /// # Errors
    ///
    /// Returns `DataShape` if the feature width or the operator size does
    /// not match the module.
    fn forward(&self, x: &Tensor, operator: &Arc<SparseMatrix>) -> Result<Tensor>;

    /// All learnable parameters, in a stable order.
    fn parameters(&self) -> Vec<&Tensor>;

    /// Mutable access to the parameters, in the same order as [`parameters`](Self::parameters).
    fn parameters_mut(&mut self) -> Vec<&mut Tensor>;

    /// Weight penalty added to the training objective, if any.
    fn regularization_loss(&self) -> Option<Tensor> {
        None
    }

    /// Switch to training mode (dropout active).
    fn train(&mut self) {}

    /// Switch to inference mode (dropout disabled).
    fn eval(&mut self) {}

    /// Whether the module is in training mode.
    fn training(&self) -> bool {
        false
    }

    /// Total number of scalar parameters.
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.numel()).sum()
    }
}
