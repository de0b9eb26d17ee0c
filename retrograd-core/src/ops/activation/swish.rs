use crate::checkpoint::Checkpoints;
use crate::error::GradError;
use crate::matrix::Matrix;
use crate::op::{expect_operands, expect_upstream_shape, CheckpointId, Operation};
use crate::ops::activation::sigmoid::sigmoid;
use crate::result::BackwardResult;

#[derive(Debug, Clone)]
struct SwishState {
    input: Matrix,
    /// sigma(beta * x), retained from forward so backward reuses the exact
    /// same values.
    gate: Matrix,
}

/// Swish activation, `x * sigma(beta * x)`, with a trainable-adjacent gate
/// sharpness `beta`.
///
/// Backward emits the input gradient plus a scalar gradient for `beta`
/// (`dL/dbeta = sum g * x^2 * sigma' (beta x)`), tagged
/// [`Role::Scalar`](crate::result::Role::Scalar).
#[derive(Debug)]
pub struct Swish {
    beta: f64,
    state: Checkpoints<SwishState>,
}

impl Swish {
    pub fn new(beta: f64) -> Self {
        Swish {
            beta,
            state: Checkpoints::new(),
        }
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Adjusts the gate sharpness (the parameter-update step applies the
    /// scalar gradient here).
    pub fn set_beta(&mut self, beta: f64) {
        self.beta = beta;
    }

    pub fn apply(&mut self, input: &Matrix) -> Result<Matrix, GradError> {
        let beta = self.beta;
        let gate = input.map(|x| sigmoid(beta * x));
        let output = input.mul_elem(&gate)?;
        self.state.record(SwishState {
            input: input.clone(),
            gate,
        });
        Ok(output)
    }
}

impl Operation for Swish {
    fn forward(&mut self, operands: &[&Matrix]) -> Result<Matrix, GradError> {
        expect_operands(operands, 1, "Swish::forward")?;
        self.apply(operands[0])
    }

    fn backward(&mut self, upstream: &Matrix) -> Result<BackwardResult, GradError> {
        let beta = self.beta;
        let state = self.state.current("Swish::backward")?;
        expect_upstream_shape(
            upstream,
            state.input.rows(),
            state.input.cols(),
            "Swish::backward",
        )?;

        let mut input_grad = Matrix::zeros(state.input.rows(), state.input.cols());
        let mut beta_grad = 0.0;
        for (((dst, &x), &s), &g) in input_grad
            .data_mut()
            .iter_mut()
            .zip(state.input.data())
            .zip(state.gate.data())
            .zip(upstream.data())
        {
            let gate_slope = s * (1.0 - s);
            // d/dx [x * sigma(beta x)] = sigma + beta x sigma'
            *dst = g * (s + beta * x * gate_slope);
            // d/dbeta [x * sigma(beta x)] = x^2 sigma'
            beta_grad += g * x * x * gate_slope;
        }

        Ok(BackwardResult::builder()
            .input_gradient(input_grad)
            .scalar_gradient(beta_grad)
            .finish())
    }

    fn store(&mut self, id: CheckpointId) -> Result<(), GradError> {
        self.state.store(id, "Swish::store")
    }

    fn restore(&mut self, id: CheckpointId) -> Result<(), GradError> {
        self.state.restore(id)
    }
}
