use crate::checkpoint::Checkpoints;
use crate::error::GradError;
use crate::matrix::Matrix;
use crate::op::{expect_operands, expect_upstream_shape, CheckpointId, Operation};
use crate::ops::activation::sigmoid::sigmoid;
use crate::result::BackwardResult;

#[derive(Debug, Clone)]
struct GluState {
    /// Value half of the input (left columns).
    value: Matrix,
    /// sigma over the gate half (right columns), retained from forward.
    gate: Matrix,
}

/// Gated linear unit.
///
/// The input's columns are split in half: `y = value ⊙ sigma(gate)` where
/// `value` is the left half and `gate` the right half. The output has half
/// the input's columns.
#[derive(Debug)]
pub struct Glu {
    state: Checkpoints<GluState>,
}

impl Default for Glu {
    fn default() -> Self {
        Self::new()
    }
}

impl Glu {
    pub fn new() -> Self {
        Glu {
            state: Checkpoints::new(),
        }
    }

    pub fn apply(&mut self, input: &Matrix) -> Result<Matrix, GradError> {
        if input.cols() % 2 != 0 {
            return Err(GradError::DimensionMismatch {
                expected: input.cols() + 1,
                actual: input.cols(),
                operation: "Glu::forward (column count must be even)".to_string(),
            });
        }
        let half = input.cols() / 2;
        let (rows, cols) = (input.rows(), input.cols());

        let mut value = Matrix::zeros(rows, half);
        let mut gate = Matrix::zeros(rows, half);
        for i in 0..rows {
            for j in 0..half {
                let v = input.data()[i * cols + j];
                let b = input.data()[i * cols + half + j];
                value.data_mut()[i * half + j] = v;
                gate.data_mut()[i * half + j] = sigmoid(b);
            }
        }

        let output = value.mul_elem(&gate)?;
        self.state.record(GluState { value, gate });
        Ok(output)
    }
}

impl Operation for Glu {
    fn forward(&mut self, operands: &[&Matrix]) -> Result<Matrix, GradError> {
        expect_operands(operands, 1, "Glu::forward")?;
        self.apply(operands[0])
    }

    fn backward(&mut self, upstream: &Matrix) -> Result<BackwardResult, GradError> {
        let state = self.state.current("Glu::backward")?;
        let (rows, half) = (state.value.rows(), state.value.cols());
        expect_upstream_shape(upstream, rows, half, "Glu::backward")?;

        let mut gradient = Matrix::zeros(rows, 2 * half);
        for i in 0..rows {
            for j in 0..half {
                let g = upstream.data()[i * half + j];
                let v = state.value.data()[i * half + j];
                let s = state.gate.data()[i * half + j];
                gradient.data_mut()[i * 2 * half + j] = g * s;
                gradient.data_mut()[i * 2 * half + half + j] = g * v * s * (1.0 - s);
            }
        }
        Ok(BackwardResult::builder().input_gradient(gradient).finish())
    }

    fn store(&mut self, id: CheckpointId) -> Result<(), GradError> {
        self.state.store(id, "Glu::store")
    }

    fn restore(&mut self, id: CheckpointId) -> Result<(), GradError> {
        self.state.restore(id)
    }
}
