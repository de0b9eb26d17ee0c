//! Normalization operations.

mod batch_norm;
mod layer_norm;

pub use batch_norm::BatchNorm;
pub use layer_norm::LayerNorm;
