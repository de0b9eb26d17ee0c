use crate::checkpoint::Checkpoints;
use crate::error::GradError;
use crate::matrix::Matrix;
use crate::op::{expect_operands, expect_upstream_shape, CheckpointId, Operation};
use crate::result::BackwardResult;

/// Arguments beyond this magnitude are pinned before exponentiation; the
/// function is saturated far earlier, so only the overflow is removed.
pub(crate) const EXP_ARG_BOUND: f64 = 500.0;

/// Numerically-guarded logistic function.
pub(crate) fn sigmoid(x: f64) -> f64 {
    let x = x.clamp(-EXP_ARG_BOUND, EXP_ARG_BOUND);
    1.0 / (1.0 + (-x).exp())
}

#[derive(Debug, Clone)]
struct SigmoidState {
    output: Matrix,
}

/// Logistic activation, `1 / (1 + e^-x)`.
#[derive(Debug)]
pub struct Sigmoid {
    state: Checkpoints<SigmoidState>,
}

impl Default for Sigmoid {
    fn default() -> Self {
        Self::new()
    }
}

impl Sigmoid {
    pub fn new() -> Self {
        Sigmoid {
            state: Checkpoints::new(),
        }
    }

    pub fn apply(&mut self, input: &Matrix) -> Result<Matrix, GradError> {
        let output = input.map(sigmoid);
        self.state.record(SigmoidState {
            output: output.clone(),
        });
        Ok(output)
    }
}

impl Operation for Sigmoid {
    fn forward(&mut self, operands: &[&Matrix]) -> Result<Matrix, GradError> {
        expect_operands(operands, 1, "Sigmoid::forward")?;
        self.apply(operands[0])
    }

    fn backward(&mut self, upstream: &Matrix) -> Result<BackwardResult, GradError> {
        let state = self.state.current("Sigmoid::backward")?;
        expect_upstream_shape(
            upstream,
            state.output.rows(),
            state.output.cols(),
            "Sigmoid::backward",
        )?;
        // sigma' = sigma * (1 - sigma), read off the retained output
        let gradient = state
            .output
            .zip_map(upstream, "Sigmoid::backward", |y, g| y * (1.0 - y) * g)?;
        Ok(BackwardResult::builder().input_gradient(gradient).finish())
    }

    fn store(&mut self, id: CheckpointId) -> Result<(), GradError> {
        self.state.store(id, "Sigmoid::store")
    }

    fn restore(&mut self, id: CheckpointId) -> Result<(), GradError> {
        self.state.restore(id)
    }
}
