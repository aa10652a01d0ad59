//! Neural network building blocks for graph models.
//!
//! The nn module is organized around the [`GraphModule`] trait, which
//! defines the interface shared by graph layers and whole models:
//!
//! - **Graph layers**: [`gnn::ArmaConv`], [`gnn::GraphAttention`]
//! - **Activations**: [`Activation`]
//! - **Regularization**: [`Dropout`], [`loss::l2_penalty`]
//! - **Losses and metrics**: [`loss::CategoricalCrossEntropy`],
//!   [`loss::masked_accuracy`]
//! - **Optimization**: [`Adam`]
//! - **Initialization**: [`init::xavier_uniform`]
//!
//! # References
//!
//! - Paszke, A., et al. (2019). `PyTorch`: An imperative style, high-performance
//!   deep learning library. `NeurIPS`.
//! - Kingma, D. P., & Ba, J. (2015). Adam: A method for stochastic
//!   optimization. ICLR.

mod activation;
mod dropout;
pub mod gnn;
pub mod init;
pub mod loss;
mod module;
mod optim;

pub use activation::Activation;
pub use dropout::Dropout;
pub use module::GraphModule;
pub use optim::Adam;
