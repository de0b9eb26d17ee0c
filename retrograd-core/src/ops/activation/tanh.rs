use crate::checkpoint::Checkpoints;
use crate::error::GradError;
use crate::matrix::Matrix;
use crate::op::{expect_operands, expect_upstream_shape, CheckpointId, Operation};
use crate::result::BackwardResult;

#[derive(Debug, Clone)]
struct TanhState {
    output: Matrix,
}

/// Hyperbolic tangent activation.
#[derive(Debug)]
pub struct Tanh {
    state: Checkpoints<TanhState>,
}

impl Default for Tanh {
    fn default() -> Self {
        Self::new()
    }
}

impl Tanh {
    pub fn new() -> Self {
        Tanh {
            state: Checkpoints::new(),
        }
    }

    pub fn apply(&mut self, input: &Matrix) -> Result<Matrix, GradError> {
        let output = input.map(f64::tanh);
        self.state.record(TanhState {
            output: output.clone(),
        });
        Ok(output)
    }
}

impl Operation for Tanh {
    fn forward(&mut self, operands: &[&Matrix]) -> Result<Matrix, GradError> {
        expect_operands(operands, 1, "Tanh::forward")?;
        self.apply(operands[0])
    }

    fn backward(&mut self, upstream: &Matrix) -> Result<BackwardResult, GradError> {
        let state = self.state.current("Tanh::backward")?;
        expect_upstream_shape(
            upstream,
            state.output.rows(),
            state.output.cols(),
            "Tanh::backward",
        )?;
        let gradient = state
            .output
            .zip_map(upstream, "Tanh::backward", |y, g| (1.0 - y * y) * g)?;
        Ok(BackwardResult::builder().input_gradient(gradient).finish())
    }

    fn store(&mut self, id: CheckpointId) -> Result<(), GradError> {
        self.state.store(id, "Tanh::store")
    }

    fn restore(&mut self, id: CheckpointId) -> Result<(), GradError> {
        self.state.restore(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grad_check::check_operation_gradients;

    #[test]
    fn test_gradients_match_finite_differences() {
        let mut op = Tanh::new();
        let x = Matrix::new(2, 3, vec![-2.0, -0.5, 0.0, 0.5, 1.0, 2.5]).unwrap();
        let upstream = Matrix::new(2, 3, vec![1.0, -1.0, 0.5, 0.5, 2.0, -0.25]).unwrap();
        check_operation_gradients(&mut op, &[&x], &upstream, 1e-6, 1e-3).unwrap();
    }
}
