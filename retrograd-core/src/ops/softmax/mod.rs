//! Softmax-family operations.
//!
//! All members share the declared scale: every (non-excluded) output row
//! sums to exactly 1.

mod masked;
#[allow(clippy::module_inception)]
mod softmax;

pub use masked::MaskedSoftmax;
pub use softmax::Softmax;
