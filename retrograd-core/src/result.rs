//! Gradient aggregation: the ordered, role-tagged bundle a backward pass
//! produces.
//!
//! A graph executor routes each `Input(k)` gradient to the producer of the
//! k-th forward operand; weight/bias/scalar gradients stay with the
//! operation for the parameter-update step. The builder freezes into an
//! immutable [`BackwardResult`] — order and tags exactly mirror the operand
//! order and roles of the matching forward call.

use crate::deep::DeepMatrix;
use crate::matrix::Matrix;

/// One gradient payload.
#[derive(Debug, Clone)]
pub enum Gradient {
    Matrix(Matrix),
    Deep(DeepMatrix),
    Scalar(f64),
}

impl Gradient {
    pub fn as_matrix(&self) -> Option<&Matrix> {
        match self {
            Gradient::Matrix(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_deep(&self) -> Option<&DeepMatrix> {
        match self {
            Gradient::Deep(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Gradient::Scalar(s) => Some(*s),
            _ => None,
        }
    }
}

/// Semantic role of a gradient entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Gradient of the k-th differentiable forward operand.
    Input(usize),
    /// Gradient of an operation-owned weight parameter.
    Weight,
    /// Gradient of an operation-owned bias parameter.
    Bias,
    /// Gradient of a scalar hyperparameter (e.g. a gate beta).
    Scalar,
}

/// Immutable ordered collection of role-tagged gradients.
#[derive(Debug)]
pub struct BackwardResult {
    entries: Vec<(Role, Gradient)>,
}

impl BackwardResult {
    /// Starts building a result.
    pub fn builder() -> BackwardResultBuilder {
        BackwardResultBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in append order.
    pub fn entries(&self) -> &[(Role, Gradient)] {
        &self.entries
    }

    /// Number of input-gradient entries.
    pub fn input_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(role, _)| matches!(role, Role::Input(_)))
            .count()
    }

    /// Gradient of the k-th forward operand.
    pub fn input(&self, k: usize) -> Option<&Gradient> {
        self.entries.iter().find_map(|(role, g)| match role {
            Role::Input(i) if *i == k => Some(g),
            _ => None,
        })
    }

    /// Input gradients in operand order.
    pub fn inputs(&self) -> impl Iterator<Item = &Gradient> {
        self.entries.iter().filter_map(|(role, g)| match role {
            Role::Input(_) => Some(g),
            _ => None,
        })
    }

    /// Weight gradients in append order.
    pub fn weights(&self) -> impl Iterator<Item = &Gradient> {
        self.entries.iter().filter_map(|(role, g)| match role {
            Role::Weight => Some(g),
            _ => None,
        })
    }

    /// Bias gradients in append order.
    pub fn biases(&self) -> impl Iterator<Item = &Gradient> {
        self.entries.iter().filter_map(|(role, g)| match role {
            Role::Bias => Some(g),
            _ => None,
        })
    }

    /// Scalar-hyperparameter gradients in append order.
    pub fn scalars(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().filter_map(|(role, g)| match (role, g) {
            (Role::Scalar, Gradient::Scalar(s)) => Some(*s),
            _ => None,
        })
    }
}

/// Accumulates gradients via role-specific append calls.
#[derive(Debug, Default)]
pub struct BackwardResultBuilder {
    entries: Vec<(Role, Gradient)>,
    inputs: usize,
}

impl BackwardResultBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the gradient of the next forward operand. Call order must
    /// match forward operand order.
    pub fn input_gradient(mut self, gradient: Matrix) -> Self {
        let k = self.inputs;
        self.inputs += 1;
        self.entries.push((Role::Input(k), Gradient::Matrix(gradient)));
        self
    }

    /// Depth-stacked flavor of [`Self::input_gradient`].
    pub fn deep_input_gradient(mut self, gradient: DeepMatrix) -> Self {
        let k = self.inputs;
        self.inputs += 1;
        self.entries.push((Role::Input(k), Gradient::Deep(gradient)));
        self
    }

    /// Appends a weight-parameter gradient.
    pub fn weight_gradient(mut self, gradient: Matrix) -> Self {
        self.entries.push((Role::Weight, Gradient::Matrix(gradient)));
        self
    }

    /// Appends a bias-parameter gradient.
    pub fn bias_gradient(mut self, gradient: Matrix) -> Self {
        self.entries.push((Role::Bias, Gradient::Matrix(gradient)));
        self
    }

    /// Appends a scalar-hyperparameter gradient.
    pub fn scalar_gradient(mut self, gradient: f64) -> Self {
        self.entries.push((Role::Scalar, Gradient::Scalar(gradient)));
        self
    }

    /// Freezes into an immutable result.
    pub fn finish(self) -> BackwardResult {
        BackwardResult {
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_and_order() {
        let result = BackwardResult::builder()
            .input_gradient(Matrix::zeros(1, 2))
            .input_gradient(Matrix::zeros(3, 4))
            .weight_gradient(Matrix::zeros(2, 2))
            .bias_gradient(Matrix::zeros(1, 2))
            .scalar_gradient(0.5)
            .finish();

        assert_eq!(result.len(), 5);
        assert_eq!(result.input_count(), 2);
        assert_eq!(
            result.input(0).and_then(Gradient::as_matrix).unwrap().cols(),
            2
        );
        assert_eq!(
            result.input(1).and_then(Gradient::as_matrix).unwrap().rows(),
            3
        );
        assert!(result.input(2).is_none());
        assert_eq!(result.weights().count(), 1);
        assert_eq!(result.biases().count(), 1);
        assert_eq!(result.scalars().collect::<Vec<_>>(), vec![0.5]);

        let roles: Vec<Role> = result.entries().iter().map(|(r, _)| *r).collect();
        assert_eq!(
            roles,
            vec![
                Role::Input(0),
                Role::Input(1),
                Role::Weight,
                Role::Bias,
                Role::Scalar
            ]
        );
    }
}
