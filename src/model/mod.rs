//! The per-subject feature-extraction model.

mod activation;
mod mlp;

pub use activation::Activation;
pub(crate) use activation::sigmoid;
pub use mlp::{DenseLayer, ForwardTrace, LayerGrads, Mlp};
