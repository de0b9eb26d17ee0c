//! Magnitude/angle vector geometry.
//!
//! Rows are 2D vectors. [`PolarDecompose`] turns Cartesian `(x, y)` rows
//! into `(magnitude, angle)` rows; [`PolarCombine`] sums two polar operand
//! matrices by recombining through Cartesian components. Both backwards
//! re-derive the multi-step chain rule by hand — angle to components,
//! components to combined magnitude/angle — and divide by
//! `magnitude + epsilon` denominators, with the epsilon exposed in the
//! constructor rather than hard-coded. Non-finite gradients fail fast.

use crate::checkpoint::Checkpoints;
use crate::error::GradError;
use crate::matrix::Matrix;
use crate::op::{expect_operands, expect_upstream_shape, CheckpointId, Operation};
use crate::result::BackwardResult;

fn expect_pair_columns(m: &Matrix, operation: &str) -> Result<(), GradError> {
    if m.cols() != 2 {
        return Err(GradError::DimensionMismatch {
            expected: 2,
            actual: m.cols(),
            operation: operation.to_string(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct DecomposeState {
    input: Matrix,
    /// Per-row magnitudes computed in forward.
    radii: Vec<f64>,
}

/// Cartesian-to-polar row transform: `(x, y)` to `(r, theta)`.
#[derive(Debug)]
pub struct PolarDecompose {
    epsilon: f64,
    state: Checkpoints<DecomposeState>,
}

impl PolarDecompose {
    /// `epsilon` guards the `1/r` and `1/r^2` factors of the backward pass.
    pub fn new(epsilon: f64) -> Self {
        PolarDecompose {
            epsilon,
            state: Checkpoints::new(),
        }
    }

    pub fn apply(&mut self, input: &Matrix) -> Result<Matrix, GradError> {
        expect_pair_columns(input, "PolarDecompose::forward")?;
        let n = input.rows();
        let mut output = Matrix::zeros(n, 2);
        let mut radii = vec![0.0; n];
        for i in 0..n {
            let (x, y) = (input.data()[i * 2], input.data()[i * 2 + 1]);
            let r = x.hypot(y);
            radii[i] = r;
            output.data_mut()[i * 2] = r;
            output.data_mut()[i * 2 + 1] = y.atan2(x);
        }
        self.state.record(DecomposeState {
            input: input.clone(),
            radii,
        });
        Ok(output)
    }
}

impl Operation for PolarDecompose {
    fn forward(&mut self, operands: &[&Matrix]) -> Result<Matrix, GradError> {
        expect_operands(operands, 1, "PolarDecompose::forward")?;
        self.apply(operands[0])
    }

    fn backward(&mut self, upstream: &Matrix) -> Result<BackwardResult, GradError> {
        let eps = self.epsilon;
        let state = self.state.current("PolarDecompose::backward")?;
        let n = state.input.rows();
        expect_upstream_shape(upstream, n, 2, "PolarDecompose::backward")?;

        let mut gradient = Matrix::zeros(n, 2);
        for i in 0..n {
            let (x, y) = (state.input.data()[i * 2], state.input.data()[i * 2 + 1]);
            let r = state.radii[i];
            let (g_r, g_theta) = (upstream.data()[i * 2], upstream.data()[i * 2 + 1]);

            // dr/dx = x/r, dr/dy = y/r; dtheta/dx = -y/r^2, dtheta/dy = x/r^2
            let inv_r = 1.0 / (r + eps);
            let inv_r2 = 1.0 / (r * r + eps);
            gradient.data_mut()[i * 2] = g_r * x * inv_r - g_theta * y * inv_r2;
            gradient.data_mut()[i * 2 + 1] = g_r * y * inv_r + g_theta * x * inv_r2;
        }

        if !gradient.all_finite() {
            return Err(GradError::NonFiniteValue {
                operation: "PolarDecompose::backward".to_string(),
            });
        }
        Ok(BackwardResult::builder().input_gradient(gradient).finish())
    }

    fn store(&mut self, id: CheckpointId) -> Result<(), GradError> {
        self.state.store(id, "PolarDecompose::store")
    }

    fn restore(&mut self, id: CheckpointId) -> Result<(), GradError> {
        self.state.restore(id)
    }
}

#[derive(Debug, Clone)]
struct CombineState {
    lhs: Matrix,
    rhs: Matrix,
    /// Combined Cartesian components and magnitude per row, retained so
    /// backward walks the same intermediates forward produced.
    sum_x: Vec<f64>,
    sum_y: Vec<f64>,
    radii: Vec<f64>,
}

/// Polar vector addition: two `(r, theta)` operand matrices combine
/// through Cartesian components into one `(r, theta)` output.
#[derive(Debug)]
pub struct PolarCombine {
    epsilon: f64,
    state: Checkpoints<CombineState>,
}

impl PolarCombine {
    pub fn new(epsilon: f64) -> Self {
        PolarCombine {
            epsilon,
            state: Checkpoints::new(),
        }
    }

    pub fn apply(&mut self, lhs: &Matrix, rhs: &Matrix) -> Result<Matrix, GradError> {
        expect_pair_columns(lhs, "PolarCombine::forward")?;
        lhs.check_same_shape(rhs, "PolarCombine::forward")?;
        let n = lhs.rows();

        let mut output = Matrix::zeros(n, 2);
        let mut sum_x = vec![0.0; n];
        let mut sum_y = vec![0.0; n];
        let mut radii = vec![0.0; n];
        for i in 0..n {
            let (r1, t1) = (lhs.data()[i * 2], lhs.data()[i * 2 + 1]);
            let (r2, t2) = (rhs.data()[i * 2], rhs.data()[i * 2 + 1]);
            let x = r1 * t1.cos() + r2 * t2.cos();
            let y = r1 * t1.sin() + r2 * t2.sin();
            let r = x.hypot(y);
            sum_x[i] = x;
            sum_y[i] = y;
            radii[i] = r;
            output.data_mut()[i * 2] = r;
            output.data_mut()[i * 2 + 1] = y.atan2(x);
        }

        self.state.record(CombineState {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
            sum_x,
            sum_y,
            radii,
        });
        Ok(output)
    }
}

impl Operation for PolarCombine {
    fn forward(&mut self, operands: &[&Matrix]) -> Result<Matrix, GradError> {
        expect_operands(operands, 2, "PolarCombine::forward")?;
        self.apply(operands[0], operands[1])
    }

    fn backward(&mut self, upstream: &Matrix) -> Result<BackwardResult, GradError> {
        let eps = self.epsilon;
        let state = self.state.current("PolarCombine::backward")?;
        let n = state.lhs.rows();
        expect_upstream_shape(upstream, n, 2, "PolarCombine::backward")?;

        let mut lhs_grad = Matrix::zeros(n, 2);
        let mut rhs_grad = Matrix::zeros(n, 2);
        for i in 0..n {
            let (x, y, r) = (state.sum_x[i], state.sum_y[i], state.radii[i]);
            let (g_r, g_theta) = (upstream.data()[i * 2], upstream.data()[i * 2 + 1]);

            // Combined magnitude/angle back to Cartesian components.
            let inv_r = 1.0 / (r + eps);
            let inv_r2 = 1.0 / (r * r + eps);
            let g_x = g_r * x * inv_r - g_theta * y * inv_r2;
            let g_y = g_r * y * inv_r + g_theta * x * inv_r2;

            // Components back to each operand's magnitude and angle:
            // dx/dr = cos t, dx/dt = -r sin t; dy/dr = sin t, dy/dt = r cos t.
            for (operand, grad) in [
                (&state.lhs, lhs_grad.data_mut()),
                (&state.rhs, rhs_grad.data_mut()),
            ] {
                let (rk, tk) = (operand.data()[i * 2], operand.data()[i * 2 + 1]);
                let (sin, cos) = tk.sin_cos();
                grad[i * 2] = g_x * cos + g_y * sin;
                grad[i * 2 + 1] = -g_x * rk * sin + g_y * rk * cos;
            }
        }

        if !lhs_grad.all_finite() || !rhs_grad.all_finite() {
            return Err(GradError::NonFiniteValue {
                operation: "PolarCombine::backward".to_string(),
            });
        }
        Ok(BackwardResult::builder()
            .input_gradient(lhs_grad)
            .input_gradient(rhs_grad)
            .finish())
    }

    fn store(&mut self, id: CheckpointId) -> Result<(), GradError> {
        self.state.store(id, "PolarCombine::store")
    }

    fn restore(&mut self, id: CheckpointId) -> Result<(), GradError> {
        self.state.restore(id)
    }
}
