use rayon::prelude::*;

use crate::checkpoint::Checkpoints;
use crate::error::GradError;
use crate::matrix::Matrix;
use crate::op::{expect_operands, expect_upstream_shape, CheckpointId, Operation};
use crate::result::BackwardResult;

#[derive(Debug, Clone)]
struct GraphAttentionState {
    /// Raw scores, needed to pick the rectifier branch in backward.
    scores: Matrix,
    /// Normalized attention coefficients (zero where masked out).
    coefficients: Matrix,
}

/// Graph attention coefficients.
///
/// Operands: a square score matrix and a same-shaped adjacency mask. Each
/// score is passed through a leaky rectifier, then every row is normalized
/// with a softmax restricted to that node's neighbors (nonzero adjacency
/// entries). Masked-out pairs get coefficient 0; a node with no neighbors
/// gets an all-zero row.
///
/// Backward chains the restricted softmax Jacobian through the rectifier
/// slope. Only the score operand is differentiable. A non-finite value in
/// either direction fails fast rather than propagating garbage
/// coefficients.
#[derive(Debug)]
pub struct GraphAttention {
    slope: f64,
    state: Checkpoints<GraphAttentionState>,
}

impl GraphAttention {
    /// `slope` is the leaky-rectifier slope applied to raw scores.
    pub fn new(slope: f64) -> Self {
        GraphAttention {
            slope,
            state: Checkpoints::new(),
        }
    }

    pub fn apply(&mut self, scores: &Matrix, adjacency: &Matrix) -> Result<Matrix, GradError> {
        scores.check_same_shape(adjacency, "GraphAttention::forward")?;
        let slope = self.slope;
        let c = scores.cols();

        let mut coefficients = Matrix::zeros(scores.rows(), c);
        coefficients
            .data_mut()
            .par_chunks_mut(c.max(1))
            .zip(scores.data().par_chunks(c.max(1)))
            .zip(adjacency.data().par_chunks(c.max(1)))
            .for_each(|((out_row, s_row), a_row)| {
                let rectified =
                    |x: f64| if x >= 0.0 { x } else { slope * x };
                let max = s_row
                    .iter()
                    .zip(a_row)
                    .filter(|(_, &a)| a != 0.0)
                    .fold(f64::NEG_INFINITY, |m, (&x, _)| m.max(rectified(x)));
                if max == f64::NEG_INFINITY {
                    return; // isolated node
                }
                let mut total = 0.0;
                for ((o, &x), &a) in out_row.iter_mut().zip(s_row).zip(a_row) {
                    if a != 0.0 {
                        *o = (rectified(x) - max).exp();
                        total += *o;
                    }
                }
                for o in out_row.iter_mut() {
                    *o /= total;
                }
            });

        if !coefficients.all_finite() {
            return Err(GradError::NonFiniteValue {
                operation: "GraphAttention::forward".to_string(),
            });
        }
        self.state.record(GraphAttentionState {
            scores: scores.clone(),
            coefficients: coefficients.clone(),
        });
        Ok(coefficients)
    }
}

impl Operation for GraphAttention {
    fn forward(&mut self, operands: &[&Matrix]) -> Result<Matrix, GradError> {
        expect_operands(operands, 2, "GraphAttention::forward")?;
        self.apply(operands[0], operands[1])
    }

    fn backward(&mut self, upstream: &Matrix) -> Result<BackwardResult, GradError> {
        let slope = self.slope;
        let state = self.state.current("GraphAttention::backward")?;
        let (n, c) = (state.coefficients.rows(), state.coefficients.cols());
        expect_upstream_shape(upstream, n, c, "GraphAttention::backward")?;

        let mut gradient = Matrix::zeros(n, c);
        gradient
            .data_mut()
            .par_chunks_mut(c.max(1))
            .enumerate()
            .for_each(|(i, grad_row)| {
                let alpha_row = &state.coefficients.data()[i * c..(i + 1) * c];
                let score_row = &state.scores.data()[i * c..(i + 1) * c];
                let g_row = &upstream.data()[i * c..(i + 1) * c];

                // Softmax JVP restricted to the neighbor set; alpha is zero
                // on non-neighbors so they drop out of both terms.
                let dot: f64 = g_row.iter().zip(alpha_row).map(|(&g, &a)| g * a).sum();
                for j in 0..c {
                    let d_rectified = alpha_row[j] * (g_row[j] - dot);
                    grad_row[j] = if score_row[j] >= 0.0 {
                        d_rectified
                    } else {
                        slope * d_rectified
                    };
                }
            });

        if !gradient.all_finite() {
            return Err(GradError::NonFiniteValue {
                operation: "GraphAttention::backward".to_string(),
            });
        }
        Ok(BackwardResult::builder().input_gradient(gradient).finish())
    }

    fn store(&mut self, id: CheckpointId) -> Result<(), GradError> {
        self.state.store(id, "GraphAttention::store")
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
    fn test_neighbor_rows_normalize() {
        let mut op = GraphAttention::new(0.2);
        let scores = Matrix::new(3, 3, vec![0.5, -1.0, 2.0, 1.0, 0.0, -0.5, 0.3, 0.7, 0.1]).unwrap();
        let adjacency =
            Matrix::new(3, 3, vec![1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0]).unwrap();
        let alpha = op.apply(&scores, &adjacency).unwrap();

        assert_relative_eq!(alpha.data()[0] + alpha.data()[1], 1.0, epsilon = 1e-12);
        assert_eq!(alpha.data()[2], 0.0);
        assert_relative_eq!(alpha.data()[4] + alpha.data()[5], 1.0, epsilon = 1e-12);
        // Isolated node: all-zero row.
        assert_eq!(&alpha.data()[6..9], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_gradients_match_finite_differences() {
        let mut op = GraphAttention::new(0.2);
        // Scores away from the rectifier kink at zero.
        let scores =
            Matrix::new(3, 3, vec![0.5, -1.0, 2.0, 1.2, 0.4, -0.6, 0.3, 0.7, 0.1]).unwrap();
        let adjacency =
            Matrix::new(3, 3, vec![1.0, 1.0, 1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 1.0]).unwrap();
        let upstream =
            Matrix::new(3, 3, vec![1.0, -0.5, 0.7, 0.2, 1.5, -1.0, 0.9, -0.3, 0.6]).unwrap();
        check_operation_gradients(&mut op, &[&scores, &adjacency], &upstream, 1e-6, 1e-3)
            .unwrap();
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let mut op = GraphAttention::new(0.2);
        let scores = Matrix::zeros(3, 3);
        let adjacency = Matrix::zeros(2, 3);
        assert!(matches!(
            op.apply(&scores, &adjacency),
            Err(GradError::ShapeMismatch { .. })
        ));
    }
}
