//! Depth-stack wrapper lifting a matrix operation to a [`DeepOperation`].

use rayon::prelude::*;

use crate::deep::DeepMatrix;
use crate::error::GradError;
use crate::matrix::Matrix;
use crate::op::{CheckpointId, DeepOperation, Operation};
use crate::result::{BackwardResult, Gradient};

/// Applies one inner operation instance per depth slice, partitioning the
/// slices across the thread pool.
///
/// Intended for single-operand operations whose backward emits exactly one
/// input gradient (activations, softmax, the normalizations). Parameter
/// gradients of the inner instances are re-emitted depth-major: all of
/// slice 0's weight then bias entries, then slice 1's, and so on — so a
/// `Batched<LayerNorm>` is the depth-stacked normalization variant with
/// independently trained per-slice gains. Checkpointing delegates to every
/// inner instance, so a stored id snapshots the whole stack.
#[derive(Debug)]
pub struct Batched<O> {
    ops: Vec<O>,
}

impl<O: Operation + Send> Batched<O> {
    /// Wraps one pre-built operation per depth slice.
    ///
    /// # Errors
    /// Returns [`GradError::EmptyMatrixList`] for an empty vector.
    pub fn new(ops: Vec<O>) -> Result<Self, GradError> {
        if ops.is_empty() {
            return Err(GradError::EmptyMatrixList);
        }
        Ok(Batched { ops })
    }

    /// Builds `depth` inner instances from a factory.
    pub fn from_factory(depth: usize, factory: impl Fn() -> O) -> Result<Self, GradError> {
        Self::new((0..depth).map(|_| factory()).collect())
    }

    pub fn depth(&self) -> usize {
        self.ops.len()
    }
}

impl<O: Operation + Send> DeepOperation for Batched<O> {
    fn forward(&mut self, operands: &[&DeepMatrix]) -> Result<DeepMatrix, GradError> {
        if operands.len() != 1 {
            return Err(GradError::OperandCountMismatch {
                expected: 1,
                actual: operands.len(),
                operation: "Batched::forward".to_string(),
            });
        }
        let input = operands[0];
        if input.depth() != self.ops.len() {
            return Err(GradError::DimensionMismatch {
                expected: self.ops.len(),
                actual: input.depth(),
                operation: "Batched::forward".to_string(),
            });
        }
        let outputs: Result<Vec<Matrix>, GradError> = self
            .ops
            .par_iter_mut()
            .zip(input.slices().par_iter())
            .map(|(op, slice)| op.forward(&[slice]))
            .collect();
        DeepMatrix::stack(outputs?)
    }

    fn backward(&mut self, upstream: &DeepMatrix) -> Result<BackwardResult, GradError> {
        if upstream.depth() != self.ops.len() {
            return Err(GradError::ShapeMismatch {
                expected: vec![self.ops.len(), upstream.rows(), upstream.cols()],
                actual: vec![upstream.depth(), upstream.rows(), upstream.cols()],
                operation: "Batched::backward".to_string(),
            });
        }
        let per_slice: Result<Vec<BackwardResult>, GradError> = self
            .ops
            .par_iter_mut()
            .zip(upstream.slices().par_iter())
            .map(|(op, slice_upstream)| op.backward(slice_upstream))
            .collect();
        let per_slice = per_slice?;

        let mut input_slices = Vec::with_capacity(per_slice.len());
        for result in &per_slice {
            let gradient = result
                .input(0)
                .and_then(Gradient::as_matrix)
                .cloned()
                .ok_or_else(|| GradError::InvalidState {
                    operation: "Batched::backward".to_string(),
                    reason: "inner operation produced no input gradient".to_string(),
                })?;
            input_slices.push(gradient);
        }

        let mut builder = BackwardResult::builder()
            .deep_input_gradient(DeepMatrix::stack(input_slices)?);
        // Parameter gradients re-emitted depth-major, weights before biases
        // within each slice.
        for result in &per_slice {
            for gradient in result.weights().filter_map(Gradient::as_matrix) {
                builder = builder.weight_gradient(gradient.clone());
            }
            for gradient in result.biases().filter_map(Gradient::as_matrix) {
                builder = builder.bias_gradient(gradient.clone());
            }
        }
        Ok(builder.finish())
    }

    fn store(&mut self, id: CheckpointId) -> Result<(), GradError> {
        for op in &mut self.ops {
            op.store(id)?;
        }
        Ok(())
    }

    fn restore(&mut self, id: CheckpointId) -> Result<(), GradError> {
        for op in &mut self.ops {
            op.restore(id)?;
        }
        Ok(())
    }
}
