use crate::checkpoint::Checkpoints;
use crate::error::GradError;
use crate::matrix::Matrix;
use crate::op::{expect_operands, expect_upstream_shape, CheckpointId, Operation};
use crate::ops::activation::sigmoid::sigmoid;
use crate::result::BackwardResult;

#[derive(Debug, Clone)]
struct SoftplusState {
    input: Matrix,
}

/// Smooth rectifier, `ln(1 + e^x)`.
///
/// Evaluated in the branch that keeps the exponent non-positive, so large
/// arguments of either sign cannot overflow.
#[derive(Debug)]
pub struct Softplus {
    state: Checkpoints<SoftplusState>,
}

fn softplus(x: f64) -> f64 {
    if x > 0.0 {
        x + (-x).exp().ln_1p()
    } else {
        x.exp().ln_1p()
    }
}

impl Default for Softplus {
    fn default() -> Self {
        Self::new()
    }
}

impl Softplus {
    pub fn new() -> Self {
        Softplus {
            state: Checkpoints::new(),
        }
    }

    pub fn apply(&mut self, input: &Matrix) -> Result<Matrix, GradError> {
        let output = input.map(softplus);
        self.state.record(SoftplusState {
            input: input.clone(),
        });
        Ok(output)
    }
}

impl Operation for Softplus {
    fn forward(&mut self, operands: &[&Matrix]) -> Result<Matrix, GradError> {
        expect_operands(operands, 1, "Softplus::forward")?;
        self.apply(operands[0])
    }

    fn backward(&mut self, upstream: &Matrix) -> Result<BackwardResult, GradError> {
        let state = self.state.current("Softplus::backward")?;
        expect_upstream_shape(
            upstream,
            state.input.rows(),
            state.input.cols(),
            "Softplus::backward",
        )?;
        let gradient = state
            .input
            .zip_map(upstream, "Softplus::backward", |x, g| sigmoid(x) * g)?;
        Ok(BackwardResult::builder().input_gradient(gradient).finish())
    }

    fn store(&mut self, id: CheckpointId) -> Result<(), GradError> {
        self.state.store(id, "Softplus::store")
    }

    fn restore(&mut self, id: CheckpointId) -> Result<(), GradError> {
        self.state.restore(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grad_check::check_operation_gradients;
    use approx::assert_relative_eq;

    #[test]
    fn test_forward_is_stable_for_large_arguments() {
        let mut op = Softplus::new();
        let x = Matrix::new(1, 4, vec![-800.0, -1.0, 1.0, 800.0]).unwrap();
        let y = op.apply(&x).unwrap();
        assert!(y.all_finite());
        assert_relative_eq!(y.data()[1], (1.0 + (-1.0f64).exp()).ln());
        assert_relative_eq!(y.data()[3], 800.0, max_relative = 1e-12);
    }

    #[test]
    fn test_gradients_match_finite_differences() {
        let mut op = Softplus::new();
        let x = Matrix::new(1, 4, vec![-2.0, -0.3, 0.6, 1.9]).unwrap();
        let upstream = Matrix::new(1, 4, vec![1.0, 2.0, -1.0, 0.5]).unwrap();
        check_operation_gradients(&mut op, &[&x], &upstream, 1e-6, 1e-3).unwrap();
    }
}
