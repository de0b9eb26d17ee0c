use crate::checkpoint::Checkpoints;
use crate::error::GradError;
use crate::matrix::Matrix;
use crate::op::{expect_operands, expect_upstream_shape, CheckpointId, Operation};
use crate::result::BackwardResult;

#[derive(Debug, Clone)]
struct LayerNormState {
    input: Matrix,
    /// Per-row mean.
    mean: Vec<f64>,
    /// Per-row biased variance.
    variance: Vec<f64>,
    count: usize,
}

/// Layer normalization over the column (feature) axis.
///
/// Each row is normalized by its own mean and variance, then scaled and
/// shifted by the per-column `gain`/`shift` parameters shared across rows.
#[derive(Debug)]
pub struct LayerNorm {
    features: usize,
    epsilon: f64,
    gain: Matrix,
    shift: Matrix,
    state: Checkpoints<LayerNormState>,
}

impl LayerNorm {
    pub fn new(features: usize, epsilon: f64) -> Self {
        LayerNorm {
            features,
            epsilon,
            gain: Matrix::ones(1, features),
            shift: Matrix::zeros(1, features),
            state: Checkpoints::new(),
        }
    }

    pub fn apply(&mut self, input: &Matrix) -> Result<Matrix, GradError> {
        if input.cols() != self.features {
            return Err(GradError::DimensionMismatch {
                expected: self.features,
                actual: input.cols(),
                operation: "LayerNorm::forward".to_string(),
            });
        }
        if self.features == 0 {
            return Err(GradError::DimensionMismatch {
                expected: 1,
                actual: 0,
                operation: "LayerNorm::forward (no features)".to_string(),
            });
        }
        let (n, c) = (input.rows(), self.features);
        let c_f = c as f64;

        let mut mean = vec![0.0; n];
        let mut variance = vec![0.0; n];
        let mut output = Matrix::zeros(n, c);
        for i in 0..n {
            let row = &input.data()[i * c..(i + 1) * c];
            let m: f64 = row.iter().sum::<f64>() / c_f;
            let v: f64 = row.iter().map(|&x| (x - m) * (x - m)).sum::<f64>() / c_f;
            mean[i] = m;
            variance[i] = v;
            let inv_std = 1.0 / (v + self.epsilon).sqrt();
            for j in 0..c {
                let xhat = (row[j] - m) * inv_std;
                output.data_mut()[i * c + j] =
                    self.gain.data()[j] * xhat + self.shift.data()[j];
            }
        }

        self.state.record(LayerNormState {
            input: input.clone(),
            mean,
            variance,
            count: n,
        });
        Ok(output)
    }
}

impl Operation for LayerNorm {
    fn forward(&mut self, operands: &[&Matrix]) -> Result<Matrix, GradError> {
        expect_operands(operands, 1, "LayerNorm::forward")?;
        self.apply(operands[0])
    }

    fn backward(&mut self, upstream: &Matrix) -> Result<BackwardResult, GradError> {
        let state = self.state.current("LayerNorm::backward")?;
        let (n, c) = (state.count, self.features);
        expect_upstream_shape(upstream, n, c, "LayerNorm::backward")?;
        let c_f = c as f64;

        let mut gain_grad = Matrix::zeros(1, c);
        let mut shift_grad = Matrix::zeros(1, c);
        let mut input_grad = Matrix::zeros(n, c);
        for i in 0..n {
            let inv_std = 1.0 / (state.variance[i] + self.epsilon).sqrt();
            // Reconstruct xhat from the retained statistics.
            let xhat_at =
                |j: usize| (state.input.data()[i * c + j] - state.mean[i]) * inv_std;
            let mut sum_dxhat = 0.0;
            let mut sum_dxhat_xhat = 0.0;
            for j in 0..c {
                let g = upstream.data()[i * c + j];
                let xhat = xhat_at(j);
                gain_grad.data_mut()[j] += g * xhat;
                shift_grad.data_mut()[j] += g;
                let dxhat = g * self.gain.data()[j];
                sum_dxhat += dxhat;
                sum_dxhat_xhat += dxhat * xhat;
            }
            for j in 0..c {
                let g = upstream.data()[i * c + j];
                let xhat = xhat_at(j);
                let dxhat = g * self.gain.data()[j];
                input_grad.data_mut()[i * c + j] =
                    (inv_std / c_f) * (c_f * dxhat - sum_dxhat - xhat * sum_dxhat_xhat);
            }
        }

        Ok(BackwardResult::builder()
            .input_gradient(input_grad)
            .weight_gradient(gain_grad)
            .bias_gradient(shift_grad)
            .finish())
    }

    fn store(&mut self, id: CheckpointId) -> Result<(), GradError> {
        self.state.store(id, "LayerNorm::store")
    }

    fn restore(&mut self, id: CheckpointId) -> Result<(), GradError> {
        self.state.restore(id)
    }

    fn parameters(&self) -> Vec<&Matrix> {
        vec![&self.gain, &self.shift]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Matrix> {
        vec![&mut self.gain, &mut self.shift]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grad_check::{check_operation_gradients, check_parameter_gradients};
    use approx::assert_relative_eq;

    #[test]
    fn test_rows_are_normalized_independently() {
        let mut op = LayerNorm::new(4, 1e-8);
        let x = Matrix::new(2, 4, vec![1.0, 2.0, 3.0, 4.0, 100.0, 200.0, 300.0, 400.0]).unwrap();
        let y = op.apply(&x).unwrap();
        for i in 0..2 {
            let row = &y.data()[i * 4..(i + 1) * 4];
            let mean: f64 = row.iter().sum::<f64>() / 4.0;
            assert_relative_eq!(mean, 0.0, epsilon = 1e-9);
        }
        // Both rows normalize to the same profile despite the scale gap.
        for j in 0..4 {
            assert_relative_eq!(y.data()[j], y.data()[4 + j], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_input_gradients_match_finite_differences() {
        let mut op = LayerNorm::new(3, 1e-6);
        let x = Matrix::new(2, 3, vec![0.5, -1.2, 0.8, 1.5, 0.3, -0.7]).unwrap();
        let upstream = Matrix::new(2, 3, vec![1.0, -0.5, 0.7, 0.2, 1.5, -1.0]).unwrap();
        check_operation_gradients(&mut op, &[&x], &upstream, 1e-5, 1e-3).unwrap();
    }

    #[test]
    fn test_parameter_gradients_match_finite_differences() {
        let mut op = LayerNorm::new(3, 1e-6);
        let x = Matrix::new(2, 3, vec![0.5, -1.2, 0.8, 1.5, 0.3, -0.7]).unwrap();
        let upstream = Matrix::new(2, 3, vec![1.0, -0.5, 0.7, 0.2, 1.5, -1.0]).unwrap();
        check_parameter_gradients(&mut op, &[&x], &upstream, 1e-5, 1e-3).unwrap();
    }
}
