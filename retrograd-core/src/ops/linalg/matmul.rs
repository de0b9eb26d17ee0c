use crate::checkpoint::Checkpoints;
use crate::error::GradError;
use crate::matrix::Matrix;
use crate::op::{expect_operands, expect_upstream_shape, CheckpointId, Operation};
use crate::result::BackwardResult;

#[derive(Debug, Clone)]
struct MatMulState {
    lhs: Matrix,
    rhs: Matrix,
}

/// Matrix product with two differentiable operands.
///
/// For `C = A · B` and upstream gradient `G`: `dA = G · Bᵀ` and
/// `dB = Aᵀ · G`.
#[derive(Debug)]
pub struct MatMul {
    state: Checkpoints<MatMulState>,
}

impl Default for MatMul {
    fn default() -> Self {
        Self::new()
    }
}

impl MatMul {
    pub fn new() -> Self {
        MatMul {
            state: Checkpoints::new(),
        }
    }

    pub fn apply(&mut self, lhs: &Matrix, rhs: &Matrix) -> Result<Matrix, GradError> {
        let output = lhs.matmul(rhs)?;
        self.state.record(MatMulState {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        });
        Ok(output)
    }
}

impl Operation for MatMul {
    fn forward(&mut self, operands: &[&Matrix]) -> Result<Matrix, GradError> {
        expect_operands(operands, 2, "MatMul::forward")?;
        self.apply(operands[0], operands[1])
    }

    fn backward(&mut self, upstream: &Matrix) -> Result<BackwardResult, GradError> {
        let state = self.state.current("MatMul::backward")?;
        expect_upstream_shape(
            upstream,
            state.lhs.rows(),
            state.rhs.cols(),
            "MatMul::backward",
        )?;
        let lhs_grad = upstream.matmul(&state.rhs.transpose())?;
        let rhs_grad = state.lhs.transpose().matmul(upstream)?;
        Ok(BackwardResult::builder()
            .input_gradient(lhs_grad)
            .input_gradient(rhs_grad)
            .finish())
    }

    fn store(&mut self, id: CheckpointId) -> Result<(), GradError> {
        self.state.store(id, "MatMul::store")
    }

    fn restore(&mut self, id: CheckpointId) -> Result<(), GradError> {
        self.state.restore(id)
    }
}

#[cfg(test)]
#[path = "matmul_test.rs"]
mod tests; // Link to the test file
