//! Finite-difference gradient checking.
//!
//! Compares an operation's analytic gradients against central finite
//! differences of its forward pass: for a scalar loss `L = Σ upstream ⊙
//! forward(x)`, the numeric gradient of element `e` is
//! `(L(x + ε e) − L(x − ε e)) / 2ε`. Every differentiable operand element
//! and every parameter element is checked.
//!
//! The checker drives the operation through repeated forward passes, so it
//! leaves the instance in the forwarded state of the last perturbation —
//! callers run it on throwaway instances.

use approx::relative_eq;
use thiserror::Error;

use crate::error::GradError;
use crate::matrix::Matrix;
use crate::op::Operation;
use crate::result::Gradient;

/// Error type for gradient-check failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GradCheckError {
    #[error("Gradient mismatch for operand {operand_index}, element {element_index}: analytic {analytical} != numeric {numerical} (difference {difference})")]
    InputMismatch {
        operand_index: usize,
        element_index: usize,
        analytical: f64,
        numerical: f64,
        difference: f64,
    },

    #[error("Gradient mismatch for parameter {parameter_index}, element {element_index}: analytic {analytical} != numeric {numerical} (difference {difference})")]
    ParameterMismatch {
        parameter_index: usize,
        element_index: usize,
        analytical: f64,
        numerical: f64,
        difference: f64,
    },

    #[error("Backward produced an input gradient for operand {operand_index} that is not a matrix")]
    NonMatrixInputGradient { operand_index: usize },

    #[error("Backward emitted {actual} parameter gradient(s) but the operation owns {expected} parameter(s)")]
    ParameterCountMismatch { expected: usize, actual: usize },

    #[error("Non-finite loss while perturbing operand {operand_index}, element {element_index}")]
    NonFiniteLoss {
        operand_index: usize,
        element_index: usize,
    },

    #[error("Engine error during gradient check: {0}")]
    Engine(#[from] GradError),
}

fn weighted_loss(output: &Matrix, upstream: &Matrix) -> Result<f64, GradError> {
    output.check_same_shape(upstream, "grad_check::weighted_loss")?;
    Ok(output
        .data()
        .iter()
        .zip(upstream.data())
        .map(|(&o, &u)| o * u)
        .sum())
}

fn compare(analytical: f64, numerical: f64, tolerance: f64) -> Option<f64> {
    if relative_eq!(
        analytical,
        numerical,
        epsilon = tolerance,
        max_relative = tolerance
    ) {
        None
    } else {
        Some((analytical - numerical).abs())
    }
}

/// Checks the analytic gradients of every differentiable operand.
///
/// The first `input_count` operands are taken to be the differentiable
/// ones (trailing operands such as masks carry no gradient entries).
pub fn check_operation_gradients(
    op: &mut dyn Operation,
    operands: &[&Matrix],
    upstream: &Matrix,
    epsilon: f64,
    tolerance: f64,
) -> Result<(), GradCheckError> {
    op.forward(operands)?;
    let result = op.backward(upstream)?;

    let mut analytic = Vec::new();
    for k in 0..result.input_count() {
        let gradient = result
            .input(k)
            .and_then(Gradient::as_matrix)
            .ok_or(GradCheckError::NonMatrixInputGradient { operand_index: k })?;
        analytic.push(gradient.data().to_vec());
    }

    for (k, analytic_k) in analytic.iter().enumerate() {
        for e in 0..operands[k].numel() {
            let mut loss = [0.0; 2];
            for (side, sign) in [1.0, -1.0].into_iter().enumerate() {
                let mut owned: Vec<Matrix> = operands.iter().map(|m| (*m).clone()).collect();
                owned[k].data_mut()[e] += sign * epsilon;
                let refs: Vec<&Matrix> = owned.iter().collect();
                let output = op.forward(&refs)?;
                loss[side] = weighted_loss(&output, upstream)?;
            }
            let numerical = (loss[0] - loss[1]) / (2.0 * epsilon);
            if !numerical.is_finite() {
                return Err(GradCheckError::NonFiniteLoss {
                    operand_index: k,
                    element_index: e,
                });
            }
            if let Some(difference) = compare(analytic_k[e], numerical, tolerance) {
                return Err(GradCheckError::InputMismatch {
                    operand_index: k,
                    element_index: e,
                    analytical: analytic_k[e],
                    numerical,
                    difference,
                });
            }
        }
    }
    Ok(())
}

/// Checks the analytic gradients of every operation-owned parameter.
///
/// Weight gradients are matched to `parameters()` entries in order,
/// followed by bias gradients (the contract stated on
/// [`Operation::parameters`]).
pub fn check_parameter_gradients(
    op: &mut dyn Operation,
    operands: &[&Matrix],
    upstream: &Matrix,
    epsilon: f64,
    tolerance: f64,
) -> Result<(), GradCheckError> {
    op.forward(operands)?;
    let result = op.backward(upstream)?;

    let analytic: Vec<Vec<f64>> = result
        .weights()
        .chain(result.biases())
        .filter_map(Gradient::as_matrix)
        .map(|m| m.data().to_vec())
        .collect();
    let expected = op.parameters().len();
    if analytic.len() != expected {
        return Err(GradCheckError::ParameterCountMismatch {
            expected,
            actual: analytic.len(),
        });
    }

    for (p, analytic_p) in analytic.iter().enumerate() {
        for e in 0..analytic_p.len() {
            let mut loss = [0.0; 2];
            for (side, sign) in [1.0, -1.0].into_iter().enumerate() {
                op.parameters_mut()[p].data_mut()[e] += sign * epsilon;
                let output = op.forward(operands)?;
                loss[side] = weighted_loss(&output, upstream)?;
                // Undo the perturbation before the next evaluation.
                op.parameters_mut()[p].data_mut()[e] -= sign * epsilon;
            }
            let numerical = (loss[0] - loss[1]) / (2.0 * epsilon);
            if !numerical.is_finite() {
                return Err(GradCheckError::NonFiniteLoss {
                    operand_index: usize::MAX,
                    element_index: e,
                });
            }
            if let Some(difference) = compare(analytic_p[e], numerical, tolerance) {
                return Err(GradCheckError::ParameterMismatch {
                    parameter_index: p,
                    element_index: e,
                    analytical: analytic_p[e],
                    numerical,
                    difference,
                });
            }
        }
    }
    Ok(())
}
