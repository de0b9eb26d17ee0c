use crate::checkpoint::Checkpoints;
use crate::error::GradError;
use crate::matrix::Matrix;
use crate::op::{expect_operands, expect_upstream_shape, CheckpointId, Operation};
use crate::result::BackwardResult;

#[derive(Debug, Clone)]
struct EluState {
    input: Matrix,
}

/// Exponential linear unit: `x` for `x >= 0`, `alpha * (e^x - 1)` below.
#[derive(Debug)]
pub struct Elu {
    alpha: f64,
    state: Checkpoints<EluState>,
}

impl Elu {
    pub fn new(alpha: f64) -> Self {
        Elu {
            alpha,
            state: Checkpoints::new(),
        }
    }

    pub fn apply(&mut self, input: &Matrix) -> Result<Matrix, GradError> {
        let alpha = self.alpha;
        let output = input.map(|x| if x >= 0.0 { x } else { alpha * (x.exp() - 1.0) });
        self.state.record(EluState {
            input: input.clone(),
        });
        Ok(output)
    }
}

impl Operation for Elu {
    fn forward(&mut self, operands: &[&Matrix]) -> Result<Matrix, GradError> {
        expect_operands(operands, 1, "Elu::forward")?;
        self.apply(operands[0])
    }

    fn backward(&mut self, upstream: &Matrix) -> Result<BackwardResult, GradError> {
        let state = self.state.current("Elu::backward")?;
        expect_upstream_shape(
            upstream,
            state.input.rows(),
            state.input.cols(),
            "Elu::backward",
        )?;
        let alpha = self.alpha;
        // The negative-side derivative alpha * e^x is recomputed exactly as
        // forward computed it.
        let gradient = state.input.zip_map(upstream, "Elu::backward", |x, g| {
            if x >= 0.0 {
                g
            } else {
                alpha * x.exp() * g
            }
        })?;
        Ok(BackwardResult::builder().input_gradient(gradient).finish())
    }

    fn store(&mut self, id: CheckpointId) -> Result<(), GradError> {
        self.state.store(id, "Elu::store")
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
    fn test_forward_values() {
        let mut op = Elu::new(1.0);
        let x = Matrix::new(1, 3, vec![-1.0, 0.0, 2.0]).unwrap();
        let y = op.apply(&x).unwrap();
        assert_relative_eq!(y.data()[0], (-1.0f64).exp() - 1.0);
        assert_relative_eq!(y.data()[1], 0.0);
        assert_relative_eq!(y.data()[2], 2.0);
    }

    #[test]
    fn test_gradients_match_finite_differences() {
        let mut op = Elu::new(0.7);
        let x = Matrix::new(2, 2, vec![-1.5, 0.3, 2.1, -0.4]).unwrap();
        let upstream = Matrix::new(2, 2, vec![1.0, -0.5, 0.25, 2.0]).unwrap();
        check_operation_gradients(&mut op, &[&x], &upstream, 1e-6, 1e-3).unwrap();
    }
}
