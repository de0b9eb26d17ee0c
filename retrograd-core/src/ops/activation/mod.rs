//! Elementwise activation operations.
//!
//! Forward applies a closed-form scalar function; backward applies the
//! function's exact derivative multiplied into the upstream gradient, with
//! guarded branches where the function's extremes could overflow.

mod elu;
mod glu;
mod leaky_relu;
mod sigmoid;
mod softplus;
mod swish;
mod tanh;

pub use elu::Elu;
pub use glu::Glu;
pub use leaky_relu::LeakyRelu;
pub use sigmoid::Sigmoid;
pub use softplus::Softplus;
pub use swish::Swish;
pub use tanh::Tanh;
