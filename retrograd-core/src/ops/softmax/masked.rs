use crate::checkpoint::Checkpoints;
use crate::error::GradError;
use crate::matrix::Matrix;
use crate::op::{expect_operands, expect_upstream_shape, CheckpointId, Operation};
use crate::result::BackwardResult;

#[derive(Debug, Clone)]
struct MaskedSoftmaxState {
    output: Matrix,
}

/// Row-wise softmax restricted to masked-in entries.
///
/// Takes two operands: the scores and a same-shaped mask. Entries whose
/// mask value is zero are excluded — their probability is exactly 0 and
/// they receive a zero gradient. The surviving entries of each row sum to
/// 1; a fully masked-out row is all zeros. Only the scores operand is
/// differentiable, so backward emits a single input gradient.
#[derive(Debug)]
pub struct MaskedSoftmax {
    temperature: f64,
    state: Checkpoints<MaskedSoftmaxState>,
}

impl MaskedSoftmax {
    pub fn new(temperature: f64) -> Self {
        MaskedSoftmax {
            temperature,
            state: Checkpoints::new(),
        }
    }

    pub fn apply(&mut self, scores: &Matrix, mask: &Matrix) -> Result<Matrix, GradError> {
        if !(self.temperature.is_finite() && self.temperature > 0.0) {
            return Err(GradError::InvalidState {
                operation: "MaskedSoftmax::forward".to_string(),
                reason: format!("temperature must be positive, got {}", self.temperature),
            });
        }
        scores.check_same_shape(mask, "MaskedSoftmax::forward")?;
        let t = self.temperature;
        let (n, c) = (scores.rows(), scores.cols());

        let mut output = Matrix::zeros(n, c);
        for i in 0..n {
            let s_row = &scores.data()[i * c..(i + 1) * c];
            let m_row = &mask.data()[i * c..(i + 1) * c];

            let max = s_row
                .iter()
                .zip(m_row)
                .filter(|(_, &m)| m != 0.0)
                .fold(f64::NEG_INFINITY, |a, (&x, _)| a.max(x / t));
            if max == f64::NEG_INFINITY {
                continue; // fully masked row stays zero
            }

            let mut total = 0.0;
            for j in 0..c {
                if m_row[j] != 0.0 {
                    let e = (s_row[j] / t - max).exp();
                    output.data_mut()[i * c + j] = e;
                    total += e;
                }
            }
            for j in 0..c {
                output.data_mut()[i * c + j] /= total;
            }
        }

        self.state.record(MaskedSoftmaxState {
            output: output.clone(),
        });
        Ok(output)
    }
}

impl Operation for MaskedSoftmax {
    fn forward(&mut self, operands: &[&Matrix]) -> Result<Matrix, GradError> {
        expect_operands(operands, 2, "MaskedSoftmax::forward")?;
        self.apply(operands[0], operands[1])
    }

    fn backward(&mut self, upstream: &Matrix) -> Result<BackwardResult, GradError> {
        let t = self.temperature;
        let state = self.state.current("MaskedSoftmax::backward")?;
        let (n, c) = (state.output.rows(), state.output.cols());
        expect_upstream_shape(upstream, n, c, "MaskedSoftmax::backward")?;

        let mut gradient = Matrix::zeros(n, c);
        for i in 0..n {
            let s_row = &state.output.data()[i * c..(i + 1) * c];
            let g_row = &upstream.data()[i * c..(i + 1) * c];
            // Masked entries hold s = 0, so they vanish from the dot and
            // get a zero gradient without a separate branch.
            let dot: f64 = g_row.iter().zip(s_row).map(|(&g, &s)| g * s).sum();
            for j in 0..c {
                gradient.data_mut()[i * c + j] = s_row[j] * (g_row[j] - dot) / t;
            }
        }
        Ok(BackwardResult::builder().input_gradient(gradient).finish())
    }

    fn store(&mut self, id: CheckpointId) -> Result<(), GradError> {
        self.state.store(id, "MaskedSoftmax::store")
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
    use approx::assert_relative_eq;

    #[test]
    fn test_masked_entries_get_zero_probability() {
        let mut op = MaskedSoftmax::new(1.0);
        let scores = Matrix::new(1, 4, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let mask = Matrix::new(1, 4, vec![1.0, 0.0, 1.0, 0.0]).unwrap();
        let y = op.apply(&scores, &mask).unwrap();

        assert_eq!(y.data()[1], 0.0);
        assert_eq!(y.data()[3], 0.0);
        let z = 1.0f64.exp() + 3.0f64.exp();
        assert_relative_eq!(y.data()[0], 1.0f64.exp() / z, epsilon = 1e-12);
        assert_relative_eq!(y.data()[2], 3.0f64.exp() / z, epsilon = 1e-12);
        assert_relative_eq!(y.data().iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_fully_masked_row_is_zero() {
        let mut op = MaskedSoftmax::new(1.0);
        let scores = Matrix::new(2, 2, vec![5.0, 6.0, 7.0, 8.0]).unwrap();
        let mask = Matrix::new(2, 2, vec![0.0, 0.0, 1.0, 1.0]).unwrap();
        let y = op.apply(&scores, &mask).unwrap();
        assert_eq!(&y.data()[..2], &[0.0, 0.0]);
        assert_relative_eq!(y.data()[2] + y.data()[3], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_masked_entries_get_zero_gradient() {
        let mut op = MaskedSoftmax::new(1.0);
        let scores = Matrix::new(1, 3, vec![0.5, -0.5, 1.5]).unwrap();
        let mask = Matrix::new(1, 3, vec![1.0, 0.0, 1.0]).unwrap();
        op.forward(&[&scores, &mask]).unwrap();
        let result = op.backward(&Matrix::ones(1, 3)).unwrap();
        let grad = result.input(0).and_then(Gradient::as_matrix).unwrap();
        assert_eq!(grad.data()[1], 0.0);
        assert_eq!(result.input_count(), 1, "mask is not differentiable");
    }

    #[test]
    fn test_gradients_match_finite_differences() {
        let mut op = MaskedSoftmax::new(1.2);
        let scores = Matrix::new(2, 3, vec![0.2, -0.8, 1.1, -0.4, 0.9, 0.3]).unwrap();
        let mask = Matrix::new(2, 3, vec![1.0, 0.0, 1.0, 1.0, 1.0, 0.0]).unwrap();
        let upstream = Matrix::new(2, 3, vec![1.0, -0.5, 0.7, 0.2, 1.5, -1.0]).unwrap();
        check_operation_gradients(&mut op, &[&scores, &mask], &upstream, 1e-6, 1e-3).unwrap();
    }
}
