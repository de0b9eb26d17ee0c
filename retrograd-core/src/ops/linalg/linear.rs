use rand::Rng;

use crate::checkpoint::Checkpoints;
use crate::error::GradError;
use crate::init;
use crate::matrix::Matrix;
use crate::op::{expect_operands, expect_upstream_shape, CheckpointId, Operation};
use crate::result::BackwardResult;

#[derive(Debug, Clone)]
struct LinearState {
    input: Matrix,
}

/// Affine transform with owned parameters: `y = x · W + b`.
///
/// `W` is `in_features × out_features`, `b` is `1 × out_features`
/// broadcast across rows. Backward emits the input gradient plus weight
/// and bias gradients for the parameter-update step.
#[derive(Debug)]
pub struct Linear {
    in_features: usize,
    out_features: usize,
    weight: Matrix,
    bias: Matrix,
    state: Checkpoints<LinearState>,
}

impl Linear {
    /// Parameters start at zero; call [`Self::init_parameters`] before
    /// training.
    pub fn new(in_features: usize, out_features: usize) -> Self {
        Linear {
            in_features,
            out_features,
            weight: Matrix::zeros(in_features, out_features),
            bias: Matrix::zeros(1, out_features),
            state: Checkpoints::new(),
        }
    }

    /// Variance-scaled weight fill; the bias stays zero.
    pub fn init_parameters<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), GradError> {
        init::glorot_uniform(&mut self.weight, rng)
    }

    pub fn weight(&self) -> &Matrix {
        &self.weight
    }

    pub fn bias(&self) -> &Matrix {
        &self.bias
    }

    pub fn apply(&mut self, input: &Matrix) -> Result<Matrix, GradError> {
        if input.cols() != self.in_features {
            return Err(GradError::DimensionMismatch {
                expected: self.in_features,
                actual: input.cols(),
                operation: "Linear::forward".to_string(),
            });
        }
        let mut output = input.matmul(&self.weight)?;
        let c = self.out_features;
        for row in output.data_mut().chunks_mut(c.max(1)) {
            for (o, &b) in row.iter_mut().zip(self.bias.data()) {
                *o += b;
            }
        }
        self.state.record(LinearState {
            input: input.clone(),
        });
        Ok(output)
    }
}

impl Operation for Linear {
    fn forward(&mut self, operands: &[&Matrix]) -> Result<Matrix, GradError> {
        expect_operands(operands, 1, "Linear::forward")?;
        self.apply(operands[0])
    }

    fn backward(&mut self, upstream: &Matrix) -> Result<BackwardResult, GradError> {
        let state = self.state.current("Linear::backward")?;
        expect_upstream_shape(
            upstream,
            state.input.rows(),
            self.out_features,
            "Linear::backward",
        )?;
        let input_grad = upstream.matmul(&self.weight.transpose())?;
        let weight_grad = state.input.transpose().matmul(upstream)?;
        let bias_grad = upstream.column_sums();
        Ok(BackwardResult::builder()
            .input_gradient(input_grad)
            .weight_gradient(weight_grad)
            .bias_gradient(bias_grad)
            .finish())
    }

    fn store(&mut self, id: CheckpointId) -> Result<(), GradError> {
        self.state.store(id, "Linear::store")
    }

    fn restore(&mut self, id: CheckpointId) -> Result<(), GradError> {
        self.state.restore(id)
    }

    fn parameters(&self) -> Vec<&Matrix> {
        vec![&self.weight, &self.bias]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Matrix> {
        vec![&mut self.weight, &mut self.bias]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grad_check::{check_operation_gradients, check_parameter_gradients};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sample_op() -> Linear {
        let mut op = Linear::new(3, 2);
        op.init_parameters(&mut StdRng::seed_from_u64(11)).unwrap();
        op
    }

    #[test]
    fn test_forward_applies_bias() {
        let mut op = Linear::new(2, 2);
        op.parameters_mut()[1].data_mut().copy_from_slice(&[10.0, 20.0]);
        let x = Matrix::new(2, 2, vec![0.0, 0.0, 0.0, 0.0]).unwrap();
        let y = op.apply(&x).unwrap();
        assert_eq!(y.data(), &[10.0, 20.0, 10.0, 20.0]);
    }

    #[test]
    fn test_input_width_checked() {
        let mut op = sample_op();
        let x = Matrix::zeros(2, 4);
        assert!(matches!(
            op.forward(&[&x]),
            Err(GradError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_input_gradients_match_finite_differences() {
        let mut op = sample_op();
        let x = Matrix::new(2, 3, vec![0.4, -1.1, 0.7, 1.3, -0.2, 0.9]).unwrap();
        let upstream = Matrix::new(2, 2, vec![1.0, -0.5, 0.7, 0.2]).unwrap();
        check_operation_gradients(&mut op, &[&x], &upstream, 1e-6, 1e-3).unwrap();
    }

    #[test]
    fn test_parameter_gradients_match_finite_differences() {
        let mut op = sample_op();
        let x = Matrix::new(2, 3, vec![0.4, -1.1, 0.7, 1.3, -0.2, 0.9]).unwrap();
        let upstream = Matrix::new(2, 2, vec![1.0, -0.5, 0.7, 0.2]).unwrap();
        check_parameter_gradients(&mut op, &[&x], &upstream, 1e-6, 1e-3).unwrap();
    }
}
