use crate::checkpoint::Checkpoints;
use crate::error::GradError;
use crate::matrix::Matrix;
use crate::op::{expect_operands, expect_upstream_shape, CheckpointId, Operation};
use crate::result::BackwardResult;

#[derive(Debug, Clone)]
struct LeakyReluState {
    input: Matrix,
}

/// Leaky rectifier: `f(x) = x` for `x >= 0`, `slope * x` below.
///
/// The derivative at zero is taken on the linear side (`1`).
#[derive(Debug)]
pub struct LeakyRelu {
    slope: f64,
    state: Checkpoints<LeakyReluState>,
}

impl LeakyRelu {
    pub fn new(slope: f64) -> Self {
        LeakyRelu {
            slope,
            state: Checkpoints::new(),
        }
    }

    /// Applies the rectifier elementwise.
    pub fn apply(&mut self, input: &Matrix) -> Result<Matrix, GradError> {
        let slope = self.slope;
        let output = input.map(|x| if x >= 0.0 { x } else { slope * x });
        self.state.record(LeakyReluState {
            input: input.clone(),
        });
        Ok(output)
    }

    fn input_gradient(&self, upstream: &Matrix) -> Result<Matrix, GradError> {
        let state = self.state.current("LeakyRelu::backward")?;
        expect_upstream_shape(
            upstream,
            state.input.rows(),
            state.input.cols(),
            "LeakyRelu::backward",
        )?;
        let slope = self.slope;
        // local gradient × upstream
        state.input.zip_map(upstream, "LeakyRelu::backward", |x, g| {
            if x >= 0.0 {
                g
            } else {
                slope * g
            }
        })
    }
}

impl Operation for LeakyRelu {
    fn forward(&mut self, operands: &[&Matrix]) -> Result<Matrix, GradError> {
        expect_operands(operands, 1, "LeakyRelu::forward")?;
        self.apply(operands[0])
    }

    fn backward(&mut self, upstream: &Matrix) -> Result<BackwardResult, GradError> {
        let gradient = self.input_gradient(upstream)?;
        Ok(BackwardResult::builder().input_gradient(gradient).finish())
    }

    fn store(&mut self, id: CheckpointId) -> Result<(), GradError> {
        self.state.store(id, "LeakyRelu::store")
    }

    fn restore(&mut self, id: CheckpointId) -> Result<(), GradError> {
        self.state.restore(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grad_check::check_operation_gradients;
    use crate::result::Gradient;

    #[test]
    fn test_forward_with_slope() {
        let mut op = LeakyRelu::new(0.01);
        let x = Matrix::new(1, 5, vec![-2.0, -1.0, 0.0, 1.0, 2.0]).unwrap();
        let y = op.apply(&x).unwrap();
        assert_eq!(y.data(), &[-0.02, -0.01, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_backward_all_ones_upstream() {
        let mut op = LeakyRelu::new(0.01);
        let x = Matrix::new(1, 5, vec![-2.0, -1.0, 0.0, 1.0, 2.0]).unwrap();
        op.forward(&[&x]).unwrap();
        let upstream = Matrix::ones(1, 5);
        let result = op.backward(&upstream).unwrap();
        let grad = result.input(0).and_then(Gradient::as_matrix).unwrap();
        assert_eq!(grad.data(), &[0.01, 0.01, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_backward_before_forward_fails() {
        let mut op = LeakyRelu::new(0.2);
        let upstream = Matrix::ones(1, 1);
        assert!(matches!(
            op.backward(&upstream),
            Err(GradError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_gradients_match_finite_differences() {
        let mut op = LeakyRelu::new(0.1);
        // Keep elements away from the kink at zero.
        let x = Matrix::new(2, 3, vec![-1.4, -0.6, 0.8, 1.7, -2.2, 0.4]).unwrap();
        let upstream = Matrix::new(2, 3, vec![0.5, -1.0, 2.0, 1.0, -0.3, 0.7]).unwrap();
        check_operation_gradients(&mut op, &[&x], &upstream, 1e-6, 1e-3).unwrap();
    }
}
