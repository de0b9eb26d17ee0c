//! Additive Gaussian noise injection.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::checkpoint::Checkpoints;
use crate::error::GradError;
use crate::matrix::Matrix;
use crate::op::{expect_operands, expect_upstream_shape, CheckpointId, Operation};
use crate::result::BackwardResult;

#[derive(Debug, Clone)]
struct NoiseState {
    rows: usize,
    cols: usize,
}

/// Adds `ratio`-scaled standard-normal noise to its operand.
///
/// The noise is additive, so the gradient is the identity: backward passes
/// the upstream gradient through unchanged. The random source is owned by
/// the instance; seed it for reproducible draws.
#[derive(Debug)]
pub struct GaussianNoise {
    ratio: f64,
    rng: StdRng,
    state: Checkpoints<NoiseState>,
}

impl GaussianNoise {
    /// Deterministic instance drawing from a seeded source.
    pub fn seeded(ratio: f64, seed: u64) -> Self {
        Self::with_rng(ratio, StdRng::seed_from_u64(seed))
    }

    /// Instance drawing from operating-system entropy.
    pub fn from_entropy(ratio: f64) -> Self {
        Self::with_rng(ratio, StdRng::from_entropy())
    }

    pub fn with_rng(ratio: f64, rng: StdRng) -> Self {
        GaussianNoise {
            ratio,
            rng,
            state: Checkpoints::new(),
        }
    }

    pub fn apply(&mut self, input: &Matrix) -> Result<Matrix, GradError> {
        let normal = Normal::new(0.0, 1.0).map_err(|_| GradError::NonFiniteValue {
            operation: "GaussianNoise::forward".to_string(),
        })?;
        let mut output = input.clone();
        for value in output.data_mut() {
            *value += self.ratio * normal.sample(&mut self.rng);
        }
        self.state.record(NoiseState {
            rows: input.rows(),
            cols: input.cols(),
        });
        Ok(output)
    }
}

impl Operation for GaussianNoise {
    fn forward(&mut self, operands: &[&Matrix]) -> Result<Matrix, GradError> {
        expect_operands(operands, 1, "GaussianNoise::forward")?;
        self.apply(operands[0])
    }

    fn backward(&mut self, upstream: &Matrix) -> Result<BackwardResult, GradError> {
        let state = self.state.current("GaussianNoise::backward")?;
        expect_upstream_shape(upstream, state.rows, state.cols, "GaussianNoise::backward")?;
        Ok(BackwardResult::builder()
            .input_gradient(upstream.clone())
            .finish())
    }

    fn store(&mut self, id: CheckpointId) -> Result<(), GradError> {
        self.state.store(id, "GaussianNoise::store")
    }

    fn restore(&mut self, id: CheckpointId) -> Result<(), GradError> {
        self.state.restore(id)
    }
}
