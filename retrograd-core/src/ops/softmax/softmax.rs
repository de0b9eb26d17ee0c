use rayon::prelude::*;

use crate::checkpoint::Checkpoints;
use crate::error::GradError;
use crate::matrix::Matrix;
use crate::op::{expect_operands, expect_upstream_shape, CheckpointId, Operation};
use crate::result::BackwardResult;

#[derive(Debug, Clone)]
struct SoftmaxState {
    output: Matrix,
}

/// Temperature-scaled row-wise softmax.
///
/// Each row of the output is `exp(x / t)` normalized by its own sum, after
/// subtracting the row maximum for numeric stability. Every output row
/// sums to exactly 1 — the declared scale of this operation family.
///
/// Backward contracts the full Jacobian `s_i (delta_ij - s_j) / t` with
/// the upstream gradient; the off-diagonal cross terms are what couple the
/// elements of a row.
#[derive(Debug)]
pub struct Softmax {
    temperature: f64,
    state: Checkpoints<SoftmaxState>,
}

impl Softmax {
    pub fn new(temperature: f64) -> Self {
        Softmax {
            temperature,
            state: Checkpoints::new(),
        }
    }

    pub fn apply(&mut self, input: &Matrix) -> Result<Matrix, GradError> {
        if !(self.temperature.is_finite() && self.temperature > 0.0) {
            return Err(GradError::InvalidState {
                operation: "Softmax::forward".to_string(),
                reason: format!("temperature must be positive, got {}", self.temperature),
            });
        }
        let t = self.temperature;
        let cols = input.cols();
        let mut output = Matrix::zeros(input.rows(), cols);
        output
            .data_mut()
            .par_chunks_mut(cols.max(1))
            .zip(input.data().par_chunks(cols.max(1)))
            .for_each(|(out_row, in_row)| {
                let max = in_row.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b / t));
                let mut total = 0.0;
                for (o, &x) in out_row.iter_mut().zip(in_row) {
                    *o = (x / t - max).exp();
                    total += *o;
                }
                for o in out_row.iter_mut() {
                    *o /= total;
                }
            });
        self.state.record(SoftmaxState {
            output: output.clone(),
        });
        Ok(output)
    }
}

impl Operation for Softmax {
    fn forward(&mut self, operands: &[&Matrix]) -> Result<Matrix, GradError> {
        expect_operands(operands, 1, "Softmax::forward")?;
        self.apply(operands[0])
    }

    fn backward(&mut self, upstream: &Matrix) -> Result<BackwardResult, GradError> {
        let t = self.temperature;
        let state = self.state.current("Softmax::backward")?;
        let (n, c) = (state.output.rows(), state.output.cols());
        expect_upstream_shape(upstream, n, c, "Softmax::backward")?;

        let mut gradient = Matrix::zeros(n, c);
        gradient
            .data_mut()
            .par_chunks_mut(c.max(1))
            .zip(state.output.data().par_chunks(c.max(1)))
            .zip(upstream.data().par_chunks(c.max(1)))
            .for_each(|((grad_row, s_row), g_row)| {
                // dot = sum_j g_j s_j, the contribution of the off-diagonal
                // Jacobian terms.
                let dot: f64 = g_row.iter().zip(s_row).map(|(&g, &s)| g * s).sum();
                for ((d, &s), &g) in grad_row.iter_mut().zip(s_row).zip(g_row) {
                    *d = s * (g - dot) / t;
                }
            });
        Ok(BackwardResult::builder().input_gradient(gradient).finish())
    }

    fn store(&mut self, id: CheckpointId) -> Result<(), GradError> {
        self.state.store(id, "Softmax::store")
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
    fn test_closed_form_unit_temperature() {
        let mut op = Softmax::new(1.0);
        let x = Matrix::new(1, 4, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let y = op.apply(&x).unwrap();

        let z: f64 = (1..=4).map(|k| (k as f64).exp()).sum();
        for (j, &v) in y.data().iter().enumerate() {
            assert_relative_eq!(v, ((j + 1) as f64).exp() / z, epsilon = 1e-6);
        }
        // Monotone in the input.
        assert!(y.data().windows(2).all(|w| w[0] < w[1]));
        assert_relative_eq!(y.data().iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rows_sum_to_declared_scale() {
        let mut op = Softmax::new(2.5);
        let x = Matrix::new(3, 4, (0..12).map(|i| (i as f64) * 0.7 - 4.0).collect()).unwrap();
        let y = op.apply(&x).unwrap();
        for row in y.data().chunks(4) {
            assert!(row.iter().all(|&v| v >= 0.0));
            assert_relative_eq!(row.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_large_inputs_are_stabilized() {
        let mut op = Softmax::new(1.0);
        let x = Matrix::new(1, 3, vec![1000.0, 1001.0, 1002.0]).unwrap();
        let y = op.apply(&x).unwrap();
        assert!(y.all_finite());
        assert_relative_eq!(y.data().iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_gradients_match_finite_differences() {
        let mut op = Softmax::new(1.7);
        let x = Matrix::new(2, 3, vec![0.2, -0.8, 1.1, -0.4, 0.9, 0.3]).unwrap();
        let upstream = Matrix::new(2, 3, vec![1.0, -0.5, 0.7, 0.2, 1.5, -1.0]).unwrap();
        check_operation_gradients(&mut op, &[&x], &upstream, 1e-6, 1e-3).unwrap();
    }

    #[test]
    fn test_nonpositive_temperature_rejected() {
        let mut op = Softmax::new(0.0);
        let x = Matrix::zeros(1, 2);
        assert!(matches!(
            op.apply(&x),
            Err(GradError::InvalidState { .. })
        ));
    }
}
