use crate::checkpoint::Checkpoints;
use crate::error::GradError;
use crate::matrix::Matrix;
use crate::op::{expect_operands, expect_upstream_shape, CheckpointId, Operation};
use crate::result::BackwardResult;

#[derive(Debug, Clone)]
struct BatchNormState {
    input: Matrix,
    /// Per-column batch mean.
    mean: Vec<f64>,
    /// Per-column biased batch variance.
    variance: Vec<f64>,
    /// Rows in the batch.
    count: usize,
}

/// Batch normalization over the row (batch) axis.
///
/// Each column is normalized by its batch mean and variance, then scaled
/// and shifted by the learned per-column `gain`/`shift` parameters. The
/// backward pass depends on all three retained statistics — mean, variance
/// and count — because every input element influences the statistics of
/// its whole column.
#[derive(Debug)]
pub struct BatchNorm {
    features: usize,
    epsilon: f64,
    gain: Matrix,
    shift: Matrix,
    state: Checkpoints<BatchNormState>,
}

impl BatchNorm {
    /// `features` is the column count of the inputs; `epsilon` guards the
    /// variance denominator.
    pub fn new(features: usize, epsilon: f64) -> Self {
        BatchNorm {
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
                operation: "BatchNorm::forward".to_string(),
            });
        }
        let n = input.rows();
        if n == 0 {
            return Err(GradError::DimensionMismatch {
                expected: 1,
                actual: 0,
                operation: "BatchNorm::forward (empty batch)".to_string(),
            });
        }
        let c = self.features;

        let mut mean = vec![0.0; c];
        for row in input.data().chunks(c) {
            for (m, &x) in mean.iter_mut().zip(row) {
                *m += x;
            }
        }
        for m in &mut mean {
            *m /= n as f64;
        }

        let mut variance = vec![0.0; c];
        for row in input.data().chunks(c) {
            for ((v, &m), &x) in variance.iter_mut().zip(&mean).zip(row) {
                let d = x - m;
                *v += d * d;
            }
        }
        for v in &mut variance {
            *v /= n as f64;
        }

        let mut output = Matrix::zeros(n, c);
        for i in 0..n {
            for j in 0..c {
                let inv_std = 1.0 / (variance[j] + self.epsilon).sqrt();
                let xhat = (input.data()[i * c + j] - mean[j]) * inv_std;
                output.data_mut()[i * c + j] =
                    self.gain.data()[j] * xhat + self.shift.data()[j];
            }
        }

        self.state.record(BatchNormState {
            input: input.clone(),
            mean,
            variance,
            count: n,
        });
        Ok(output)
    }
}

impl Operation for BatchNorm {
    fn forward(&mut self, operands: &[&Matrix]) -> Result<Matrix, GradError> {
        expect_operands(operands, 1, "BatchNorm::forward")?;
        self.apply(operands[0])
    }

    fn backward(&mut self, upstream: &Matrix) -> Result<BackwardResult, GradError> {
        let state = self.state.current("BatchNorm::backward")?;
        let (n, c) = (state.count, self.features);
        expect_upstream_shape(upstream, n, c, "BatchNorm::backward")?;

        // Reconstruct xhat from the retained statistics, exactly as forward
        // computed it.
        let xhat_at = |i: usize, j: usize| {
            (state.input.data()[i * c + j] - state.mean[j])
                / (state.variance[j] + self.epsilon).sqrt()
        };

        let mut gain_grad = Matrix::zeros(1, c);
        let mut shift_grad = Matrix::zeros(1, c);
        // Per-column sums of d_xhat and of d_xhat * xhat, needed by every
        // element of that column.
        let mut sum_dxhat = vec![0.0; c];
        let mut sum_dxhat_xhat = vec![0.0; c];
        for i in 0..n {
            for j in 0..c {
                let g = upstream.data()[i * c + j];
                let xhat = xhat_at(i, j);
                gain_grad.data_mut()[j] += g * xhat;
                shift_grad.data_mut()[j] += g;
                let dxhat = g * self.gain.data()[j];
                sum_dxhat[j] += dxhat;
                sum_dxhat_xhat[j] += dxhat * xhat;
            }
        }

        let mut input_grad = Matrix::zeros(n, c);
        let n_f = n as f64;
        for i in 0..n {
            for j in 0..c {
                let g = upstream.data()[i * c + j];
                let xhat = xhat_at(i, j);
                let dxhat = g * self.gain.data()[j];
                let inv_std = 1.0 / (state.variance[j] + self.epsilon).sqrt();
                input_grad.data_mut()[i * c + j] = (inv_std / n_f)
                    * (n_f * dxhat - sum_dxhat[j] - xhat * sum_dxhat_xhat[j]);
            }
        }

        Ok(BackwardResult::builder()
            .input_gradient(input_grad)
            .weight_gradient(gain_grad)
            .bias_gradient(shift_grad)
            .finish())
    }

    fn store(&mut self, id: CheckpointId) -> Result<(), GradError> {
        self.state.store(id, "BatchNorm::store")
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
#[path = "batch_norm_test.rs"]
mod tests; // Link to the test file
