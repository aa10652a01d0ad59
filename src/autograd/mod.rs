//! Reverse-mode automatic differentiation.
//!
//! A define-by-run tape: every differentiable operation on a tensor that
//! requires gradients appends its backward function to a thread-local
//! [`ComputationGraph`]; [`Tensor::backward`] replays the tape in reverse
//! and deposits gradients on the parameter leaves.
//!
//! Besides the dense element-wise and linear-algebra operations the tape
//! knows the sparse primitives graph convolutions need: propagation with
//! a fixed operator, per-edge attention scores, per-node softmax over
//! edges and attention-weighted aggregation.
//!
//! # Example
//!
//! ```
//! use citegnn::autograd::{clear_graph, get_grad, Tensor};
//!
//! let w = Tensor::from_slice(&[0.5, -1.0]).requires_grad();
//! let x = Tensor::from_slice(&[2.0, 3.0]);
//! let loss = w.mul(&x).sum();
//! loss.backward();
//!
//! let grad = get_grad(w.id()).expect("gradient recorded");
//! assert_eq!(grad.data(), &[2.0, 3.0]);
//! clear_graph();
//! ```
//!
//! # References
//!
//! - Baydin, A. G., et al. (2018). Automatic differentiation in machine learning: a survey. JMLR.
//! - Griewank, A., & Walther, A. (2008). Evaluating derivatives. SIAM.

pub(crate) mod grad_fn;
mod graph;
mod ops;
mod tensor;

pub use grad_fn::GradFn;
pub use graph::ComputationGraph;
pub use tensor::{Tensor, TensorId};

use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    /// Computation graph of the current thread.
    static GRAPH: RefCell<ComputationGraph> = RefCell::new(ComputationGraph::new());

    /// Whether operations are currently recorded.
    static GRAD_ENABLED: RefCell<bool> = const { RefCell::new(true) };
}

/// Run a closure without recording operations.
///
/// Used for validation and test-time forward passes.
pub fn no_grad<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    GRAD_ENABLED.with(|enabled| {
        let prev = enabled.replace(false);
        let result = f();
        *enabled.borrow_mut() = prev;
        result
    })
}

/// Check if gradient tracking is currently enabled.
#[must_use]
pub fn is_grad_enabled() -> bool {
    GRAD_ENABLED.with(|enabled| *enabled.borrow())
}

pub(crate) fn with_graph<F, R>(f: F) -> R
where
    F: FnOnce(&mut ComputationGraph) -> R,
{
    GRAPH.with(|graph| f(&mut graph.borrow_mut()))
}

/// Record `result = op(inputs)` if any input is tracked.
///
/// Marks `result` as requiring gradients and attaches `grad_fn`. The
/// closure building the backward function only runs when recording.
pub(crate) fn record_op<G, F>(result: &mut Tensor, inputs: &[&Tensor], make_grad_fn: F)
where
    G: GradFn + 'static,
    F: FnOnce() -> G,
{
    if !is_grad_enabled() || !inputs.iter().any(|t| t.requires_grad_enabled()) {
        return;
    }

    let grad_fn: Arc<dyn GradFn> = Arc::new(make_grad_fn());
    result.requires_grad_(true);
    result.set_grad_fn(Arc::clone(&grad_fn));

    with_graph(|graph| {
        for input in inputs {
            graph.register_tensor(input);
        }
        graph.record(
            result.id(),
            grad_fn,
            inputs.iter().map(|t| t.id()).collect(),
        );
    });
}

/// Clear the computation graph (called after each optimizer step).
pub fn clear_graph() {
    GRAPH.with(|graph| graph.borrow_mut().clear());
}

/// Gradient of a tracked leaf, after `backward`.
#[must_use]
pub fn get_grad(id: TensorId) -> Option<Tensor> {
    with_graph(|graph| graph.get_grad(id))
}

/// Clear the gradient of a tracked leaf.
pub fn clear_grad(id: TensorId) {
    with_graph(|graph| graph.clear_grad(id));
}

/// Number of operations currently on this thread's tape.
#[must_use]
pub fn tape_len() -> usize {
    with_graph(|graph| graph.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_grad_context() {
        assert!(is_grad_enabled());
        no_grad(|| assert!(!is_grad_enabled()));
        assert!(is_grad_enabled());
    }

    #[test]
    fn test_nested_no_grad() {
        no_grad(|| {
            no_grad(|| assert!(!is_grad_enabled()));
            assert!(!is_grad_enabled());
        });
        assert!(is_grad_enabled());
    }

    #[test]
    fn test_no_grad_skips_recording() {
        clear_graph();
        let w = Tensor::from_slice(&[1.0, 2.0]).requires_grad();
        let y = no_grad(|| w.mul_scalar(2.0));
        assert!(!y.requires_grad_enabled());
        assert_eq!(tape_len(), 0);
    }

    #[test]
    fn test_untracked_inputs_skip_recording() {
        clear_graph();
        let a = Tensor::from_slice(&[1.0]);
        let b = Tensor::from_slice(&[2.0]);
        let c = a.add(&b);
        assert!(!c.requires_grad_enabled());
        assert_eq!(tape_len(), 0);
    }

    #[test]
    fn test_clear_grad_by_id() {
        clear_graph();
        let w = Tensor::from_slice(&[1.0]).requires_grad();
        w.mul_scalar(3.0).sum().backward();
        assert!(get_grad(w.id()).is_some());
        clear_grad(w.id());
        assert!(get_grad(w.id()).is_none());
        clear_graph();
    }
}
