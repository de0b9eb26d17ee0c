//! The uniform operation contract.
//!
//! Every mathematical primitive exposes the same four calls so a graph
//! executor can treat them identically: `forward` consumes operands and
//! produces an output container, `backward` consumes the upstream gradient
//! and produces a [`BackwardResult`], and `store`/`restore` snapshot and
//! reinstate forward-pass state for operations replayed across time steps.
//!
//! Per instance the calls form a small state machine:
//! uninitialized → forwarded → (stored)* → backward-ready. `backward` before
//! any forward or restore is a programmer error and fails with
//! [`GradError::InvalidState`](crate::error::GradError::InvalidState). A new
//! forward discards the current state but never invalidates stored
//! snapshots.

use std::fmt::Debug;

use crate::deep::DeepMatrix;
use crate::error::GradError;
use crate::matrix::Matrix;
use crate::result::BackwardResult;

pub use crate::checkpoint::CheckpointId;

/// Uniform calling convention for a differentiable primitive over matrices.
///
/// Implementations must not mutate operand containers: operands are
/// read-shared and may be consumed by sibling forward calls on other
/// threads.
pub trait Operation: Debug {
    /// Runs the forward computation. Deterministic given identical operand
    /// values; records whatever state the backward pass will need.
    fn forward(&mut self, operands: &[&Matrix]) -> Result<Matrix, GradError>;

    /// Runs the backward computation for the most recent forward (or
    /// restored) state. `upstream` must have the forward output's shape.
    /// Produces one `Input(k)` gradient per differentiable operand, in
    /// forward operand order, plus any owned parameter gradients.
    fn backward(&mut self, upstream: &Matrix) -> Result<BackwardResult, GradError>;

    /// Snapshots current forward state under `id`, overwriting any prior
    /// snapshot for that id.
    fn store(&mut self, id: CheckpointId) -> Result<(), GradError>;

    /// Replaces current forward state with the snapshot stored under `id`.
    fn restore(&mut self, id: CheckpointId) -> Result<(), GradError>;

    /// Learnable parameters owned by the operation, weights before biases.
    /// The order matches the order of weight/bias entries its backward
    /// emits. Default: none.
    fn parameters(&self) -> Vec<&Matrix> {
        Vec::new()
    }

    /// Mutable access to the same parameters, in the same order.
    fn parameters_mut(&mut self) -> Vec<&mut Matrix> {
        Vec::new()
    }
}

/// The same contract over depth-stacked containers.
pub trait DeepOperation: Debug {
    fn forward(&mut self, operands: &[&DeepMatrix]) -> Result<DeepMatrix, GradError>;

    fn backward(&mut self, upstream: &DeepMatrix) -> Result<BackwardResult, GradError>;

    fn store(&mut self, id: CheckpointId) -> Result<(), GradError>;

    fn restore(&mut self, id: CheckpointId) -> Result<(), GradError>;
}

/// Validates the operand count at an operation's boundary.
pub(crate) fn expect_operands(
    operands: &[&Matrix],
    expected: usize,
    operation: &str,
) -> Result<(), GradError> {
    if operands.len() != expected {
        return Err(GradError::OperandCountMismatch {
            expected,
            actual: operands.len(),
            operation: operation.to_string(),
        });
    }
    Ok(())
}

/// Validates that the upstream gradient matches the forward output's shape.
pub(crate) fn expect_upstream_shape(
    upstream: &Matrix,
    rows: usize,
    cols: usize,
    operation: &str,
) -> Result<(), GradError> {
    if upstream.rows() != rows || upstream.cols() != cols {
        return Err(GradError::ShapeMismatch {
            expected: vec![rows, cols],
            actual: vec![upstream.rows(), upstream.cols()],
            operation: operation.to_string(),
        });
    }
    Ok(())
}
