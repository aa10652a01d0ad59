//! Computation tape for automatic differentiation.
//!
//! Operations are appended to the tape during the forward pass and replayed
//! in reverse during the backward pass.

use std::collections::HashMap;
use std::sync::Arc;

use super::grad_fn::GradFn;
use super::tensor::{Tensor, TensorId};

/// One recorded operation.
#[derive(Clone)]
pub(crate) struct TapeEntry {
    pub output_id: TensorId,
    pub grad_fn: Arc<dyn GradFn>,
    pub input_ids: Vec<TensorId>,
}

/// Tape of recorded operations plus the leaf tensors that receive gradients.
///
/// Each thread owns its own graph (see the parent module), so a full-batch
/// training step never contends on a lock.
#[allow(missing_debug_implementations)]
pub struct ComputationGraph {
    tape: Vec<TapeEntry>,
    /// Leaf tensors that require gradients, keyed by id
    leaves: HashMap<TensorId, Tensor>,
}

impl ComputationGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tape: Vec::new(),
            leaves: HashMap::new(),
        }
    }

    /// Forget all recorded operations and gradients.
    pub fn clear(&mut self) {
        self.tape.clear();
        self.leaves.clear();
    }

    /// Register a tensor so it can receive a gradient.
    ///
    /// Only leaves that require gradients are kept; intermediate results
    /// and constants are never stored.
    pub fn register_tensor(&mut self, tensor: &Tensor) {
        if tensor.is_leaf() && tensor.requires_grad_enabled() {
            self.leaves.entry(tensor.id()).or_insert_with(|| {
                let mut slot = tensor.clone();
                slot.clear_grad();
                slot
            });
        }
    }

    /// Append an operation to the tape.
    pub fn record(&mut self, output_id: TensorId, grad_fn: Arc<dyn GradFn>, input_ids: Vec<TensorId>) {
        self.tape.push(TapeEntry {
            output_id,
            grad_fn,
            input_ids,
        });
    }

    /// Reverse-mode sweep from `output_id`.
    ///
    /// Gradients of tensors used several times are summed; the final
    /// gradient of every registered leaf is accumulated into its slot.
    pub fn backward(&mut self, output_id: TensorId, grad_output: Tensor) {
        let mut grads: HashMap<TensorId, Tensor> = HashMap::new();
        grads.insert(output_id, grad_output);

        for entry in self.tape.iter().rev() {
            let Some(grad_out) = grads.remove(&entry.output_id) else {
                continue;
            };

            let input_grads = entry.grad_fn.backward(&grad_out);
            for (input_id, input_grad) in entry.input_ids.iter().zip(input_grads) {
                match grads.get_mut(input_id) {
                    Some(existing) => {
                        for (a, b) in existing.data_mut().iter_mut().zip(input_grad.data()) {
                            *a += b;
                        }
                    }
                    None => {
                        grads.insert(*input_id, input_grad);
                    }
                }
            }
        }

        for (id, grad) in grads {
            if let Some(leaf) = self.leaves.get_mut(&id) {
                leaf.accumulate_grad(grad);
            }
        }
    }

    /// Number of recorded operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tape.len()
    }

    /// Whether the tape is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tape.is_empty()
    }

    /// Gradient of a registered leaf, after `backward`.
    #[must_use]
    pub fn get_grad(&self, id: TensorId) -> Option<Tensor> {
        self.leaves.get(&id).and_then(|t| t.grad().cloned())
    }

    /// Drop the gradient of a registered leaf.
    pub fn clear_grad(&mut self, id: TensorId) {
        if let Some(tensor) = self.leaves.get_mut(&id) {
            tensor.clear_grad();
        }
    }
}

impl Default for ComputationGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::grad_fn::NegBackward;

    #[test]
    fn test_graph_creation() {
        let graph = ComputationGraph::new();
        assert!(graph.is_empty());
        assert_eq!(graph.len(), 0);
    }

    #[test]
    fn test_only_tracked_leaves_registered() {
        let mut graph = ComputationGraph::new();
        let tracked = Tensor::from_slice(&[1.0]).requires_grad();
        let constant = Tensor::from_slice(&[2.0]);

        graph.register_tensor(&tracked);
        graph.register_tensor(&constant);

        assert!(graph.leaves.contains_key(&tracked.id()));
        assert!(!graph.leaves.contains_key(&constant.id()));
    }

    #[test]
    fn test_backward_simple() {
        let mut graph = ComputationGraph::new();
        let input = Tensor::from_slice(&[1.0, 2.0]).requires_grad();
        let output = Tensor::from_slice(&[-1.0, -2.0]);
        graph.register_tensor(&input);
        graph.record(output.id(), Arc::new(NegBackward), vec![input.id()]);

        graph.backward(output.id(), Tensor::from_slice(&[1.0, 1.0]));

        let grad = graph.get_grad(input.id()).expect("gradient for input");
        assert_eq!(grad.data(), &[-1.0, -1.0]);
    }

    #[test]
    fn test_backward_unknown_output_is_noop() {
        let mut graph = ComputationGraph::new();
        graph.backward(TensorId::new(), Tensor::from_slice(&[1.0]));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut graph = ComputationGraph::new();
        let t = Tensor::from_slice(&[1.0]).requires_grad();
        graph.register_tensor(&t);
        graph.record(TensorId::new(), Arc::new(NegBackward), vec![t.id()]);
        graph.clear();
        assert!(graph.is_empty());
        assert!(graph.leaves.is_empty());
    }

    #[test]
    fn test_clear_grad() {
        let mut graph = ComputationGraph::new();
        let t = Tensor::from_slice(&[1.0]).requires_grad();
        let out = Tensor::from_slice(&[-1.0]);
        graph.register_tensor(&t);
        graph.record(out.id(), Arc::new(NegBackward), vec![t.id()]);
        graph.backward(out.id(), Tensor::from_slice(&[1.0]));
        assert!(graph.get_grad(t.id()).is_some());

        graph.clear_grad(t.id());
        assert!(graph.get_grad(t.id()).is_none());
    }
}
