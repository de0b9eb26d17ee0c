//! # retrograd-core
//!
//! Reverse-mode automatic differentiation over explicit graphs of matrix
//! operations. Every primitive implements the same four-call contract —
//! forward, backward, store, restore — so a graph executor can run a
//! forward pass, replay any step from a checkpoint, and route the
//! role-tagged gradients of the backward pass to the right producers.
//!
//! The crate splits into:
//! - the numeric containers ([`Matrix`], [`DeepMatrix`], [`Tensor`]),
//! - the autodiff substrate ([`op`], [`result`], [`checkpoint`],
//!   [`grad_check`]),
//! - the concrete operation library ([`ops`]),
//! - the injectable accelerator contract ([`backend`]).

pub mod backend;
pub mod checkpoint;
pub mod deep;
pub mod error;
pub mod grad_check;
pub mod init;
pub mod matrix;
pub mod op;
pub mod ops;
pub mod result;
pub mod tensor;

pub use backend::{ComputeBackend, HostBackend};
pub use checkpoint::CheckpointId;
pub use deep::DeepMatrix;
pub use error::GradError;
pub use matrix::Matrix;
pub use op::{DeepOperation, Operation};
pub use ops::{instantiate, OpConfig, OpKind};
pub use result::{BackwardResult, BackwardResultBuilder, Gradient, Role};
pub use tensor::Tensor;
