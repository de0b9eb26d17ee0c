//! Concrete operation library.
//!
//! Every operation here is a thin specialization of the
//! [`Operation`](crate::op::Operation) contract: a typed inherent entry
//! point (`apply`), the uniform trait impl, a state bundle held in
//! [`Checkpoints`](crate::checkpoint::Checkpoints), and a hand-derived
//! backward pass checked against finite differences in its tests.

pub mod activation;
pub mod attention;
mod batched;
pub mod linalg;
mod noise;
pub mod norm;
pub mod softmax;

pub use batched::Batched;
pub use noise::GaussianNoise;

use crate::op::Operation;

/// Closed set of factory-constructible operations.
///
/// Dimensioned layers (`Linear`, the norms, `Batched`) carry structural
/// arguments beyond hyperparameters and are built directly instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    LeakyRelu,
    Elu,
    Sigmoid,
    Tanh,
    Softplus,
    Swish,
    Glu,
    Softmax,
    MaskedSoftmax,
    MatMul,
    GraphAttention,
    PolarDecompose,
    PolarCombine,
    GaussianNoise,
}

/// Hyperparameters consumed by [`instantiate`].
///
/// Only the fields an operation understands apply to it; the rest are
/// ignored. `epsilon` is the guarded-denominator constant of the geometric
/// operations — a tunable, not a universal truth, which is why it lives
/// here instead of being hard-coded per call site.
#[derive(Debug, Clone)]
pub struct OpConfig {
    /// Leaky-rectifier slope (also the graph-attention rectifier slope).
    pub slope: f64,
    /// ELU saturation scale.
    pub alpha: f64,
    /// Swish gate sharpness.
    pub beta: f64,
    /// Softmax-family temperature.
    pub temperature: f64,
    /// Additive guard for magnitude denominators.
    pub epsilon: f64,
    /// Gaussian-noise scale.
    pub noise_ratio: f64,
    /// Seed for operations that draw randomness; `None` uses OS entropy.
    pub seed: Option<u64>,
}

impl Default for OpConfig {
    fn default() -> Self {
        OpConfig {
            slope: 0.01,
            alpha: 1.0,
            beta: 1.0,
            temperature: 1.0,
            epsilon: 1e-12,
            noise_ratio: 0.0,
            seed: None,
        }
    }
}

/// Builds a ready operation instance from a kind and a configuration.
pub fn instantiate(kind: OpKind, config: &OpConfig) -> Box<dyn Operation> {
    match kind {
        OpKind::LeakyRelu => Box::new(activation::LeakyRelu::new(config.slope)),
        OpKind::Elu => Box::new(activation::Elu::new(config.alpha)),
        OpKind::Sigmoid => Box::new(activation::Sigmoid::new()),
        OpKind::Tanh => Box::new(activation::Tanh::new()),
        OpKind::Softplus => Box::new(activation::Softplus::new()),
        OpKind::Swish => Box::new(activation::Swish::new(config.beta)),
        OpKind::Glu => Box::new(activation::Glu::new()),
        OpKind::Softmax => Box::new(softmax::Softmax::new(config.temperature)),
        OpKind::MaskedSoftmax => Box::new(softmax::MaskedSoftmax::new(config.temperature)),
        OpKind::MatMul => Box::new(linalg::MatMul::new()),
        OpKind::GraphAttention => Box::new(attention::GraphAttention::new(config.slope)),
        OpKind::PolarDecompose => Box::new(attention::PolarDecompose::new(config.epsilon)),
        OpKind::PolarCombine => Box::new(attention::PolarCombine::new(config.epsilon)),
        OpKind::GaussianNoise => Box::new(match config.seed {
            Some(seed) => GaussianNoise::seeded(config.noise_ratio, seed),
            None => GaussianNoise::from_entropy(config.noise_ratio),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Matrix;

    #[test]
    fn test_factory_builds_working_instances() {
        let config = OpConfig {
            slope: 0.1,
            seed: Some(5),
            ..OpConfig::default()
        };
        let unary = [
            OpKind::LeakyRelu,
            OpKind::Elu,
            OpKind::Sigmoid,
            OpKind::Tanh,
            OpKind::Softplus,
            OpKind::Swish,
            OpKind::Softmax,
            OpKind::GaussianNoise,
        ];
        let x = Matrix::new(2, 4, vec![0.5, -1.0, 2.0, 0.1, -0.3, 1.2, -2.0, 0.8]).unwrap();
        for kind in unary {
            let mut op = instantiate(kind, &config);
            let y = op.forward(&[&x]).unwrap();
            assert_eq!((y.rows(), y.cols()), (2, 4), "{kind:?}");
            let result = op.backward(&Matrix::ones(2, 4)).unwrap();
            assert!(result.input_count() >= 1, "{kind:?}");
        }
    }

    #[test]
    fn test_factory_respects_hyperparameters() {
        let config = OpConfig {
            slope: 0.5,
            ..OpConfig::default()
        };
        let mut op = instantiate(OpKind::LeakyRelu, &config);
        let x = Matrix::new(1, 1, vec![-2.0]).unwrap();
        assert_eq!(op.forward(&[&x]).unwrap().data(), &[-1.0]);
    }
}
