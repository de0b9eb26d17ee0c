//! Attention and vector-geometry operations.
//!
//! The hand-derived multi-step chain rules live here; these are the
//! backward passes most prone to silent bugs, and every one of them is
//! property-tested against finite differences.

mod graph_attention;
mod polar;

pub use graph_attention::GraphAttention;
pub use polar::{PolarCombine, PolarDecompose};
