//! Depth-indexed stack of same-shaped matrices.
//!
//! `DeepMatrix` models a batch or channel dimension: an ordered stack of
//! [`Matrix`] values sharing row/column dimensions, indexed by depth.

use crate::error::GradError;
use crate::matrix::Matrix;

/// Ordered stack of matrices with identical dimensions.
#[derive(Debug, Clone)]
pub struct DeepMatrix {
    rows: usize,
    cols: usize,
    slices: Vec<Matrix>,
}

impl DeepMatrix {
    /// Stacks matrices into a depth container.
    ///
    /// # Errors
    /// Returns [`GradError::EmptyMatrixList`] for an empty input and
    /// [`GradError::ShapeMismatch`] when any matrix disagrees with the
    /// first one's dimensions.
    pub fn stack(slices: Vec<Matrix>) -> Result<Self, GradError> {
        let first = slices.first().ok_or(GradError::EmptyMatrixList)?;
        let (rows, cols) = (first.rows(), first.cols());
        for m in &slices {
            if m.rows() != rows || m.cols() != cols {
                return Err(GradError::ShapeMismatch {
                    expected: vec![rows, cols],
                    actual: vec![m.rows(), m.cols()],
                    operation: "DeepMatrix::stack".to_string(),
                });
            }
        }
        Ok(DeepMatrix { rows, cols, slices })
    }

    /// Depth stack of zero matrices.
    pub fn zeros(depth: usize, rows: usize, cols: usize) -> Result<Self, GradError> {
        if depth == 0 {
            return Err(GradError::EmptyMatrixList);
        }
        DeepMatrix::stack((0..depth).map(|_| Matrix::zeros(rows, cols)).collect())
    }

    /// Unstacks into the underlying matrices, in depth order.
    pub fn unstack(self) -> Vec<Matrix> {
        self.slices
    }

    pub fn depth(&self) -> usize {
        self.slices.len()
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Borrow of one depth slice.
    ///
    /// # Errors
    /// Returns [`GradError::IndexOutOfBounds`] for a depth past the end.
    pub fn slice(&self, depth: usize) -> Result<&Matrix, GradError> {
        self.slices.get(depth).ok_or(GradError::IndexOutOfBounds {
            index: vec![depth],
            shape: vec![self.slices.len(), self.rows, self.cols],
        })
    }

    /// Mutable borrow of one depth slice.
    pub fn slice_mut(&mut self, depth: usize) -> Result<&mut Matrix, GradError> {
        let shape = vec![self.slices.len(), self.rows, self.cols];
        self.slices.get_mut(depth).ok_or(GradError::IndexOutOfBounds {
            index: vec![depth],
            shape,
        })
    }

    pub fn slices(&self) -> &[Matrix] {
        &self.slices
    }

    /// Applies `f` to every slice, producing a new stack.
    pub fn map(&self, f: impl Fn(&Matrix) -> Matrix) -> Result<DeepMatrix, GradError> {
        DeepMatrix::stack(self.slices.iter().map(f).collect())
    }

    /// Sum across depth, slicewise.
    pub fn depth_sum(&self) -> Result<Matrix, GradError> {
        let mut acc = Matrix::zeros(self.rows, self.cols);
        for m in &self.slices {
            acc.add_assign(m)?;
        }
        Ok(acc)
    }

    pub(crate) fn check_same_shape(
        &self,
        other: &DeepMatrix,
        operation: &str,
    ) -> Result<(), GradError> {
        if self.depth() != other.depth() || self.rows != other.rows || self.cols != other.cols {
            return Err(GradError::ShapeMismatch {
                expected: vec![self.depth(), self.rows, self.cols],
                actual: vec![other.depth(), other.rows, other.cols],
                operation: operation.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_unstack_preserves_contents() {
        let originals: Vec<Matrix> = (0..3)
            .map(|d| {
                Matrix::new(2, 2, vec![d as f64, 1.0, 2.0, 3.0 + d as f64]).unwrap()
            })
            .collect();
        let kept: Vec<Vec<f64>> = originals.iter().map(|m| m.data().to_vec()).collect();

        let deep = DeepMatrix::stack(originals).unwrap();
        assert_eq!(deep.depth(), 3);
        assert_eq!(deep.rows(), 2);

        let back = deep.unstack();
        assert_eq!(back.len(), 3);
        for (m, expected) in back.iter().zip(&kept) {
            assert_eq!(m.data(), expected.as_slice());
        }
    }

    #[test]
    fn test_stack_rejects_mixed_shapes() {
        let err =
            DeepMatrix::stack(vec![Matrix::zeros(2, 2), Matrix::zeros(2, 3)]).unwrap_err();
        assert!(matches!(err, GradError::ShapeMismatch { .. }));
        assert!(matches!(
            DeepMatrix::stack(Vec::new()),
            Err(GradError::EmptyMatrixList)
        ));
    }

    #[test]
    fn test_depth_sum() {
        let deep = DeepMatrix::stack(vec![
            Matrix::new(1, 2, vec![1.0, 2.0]).unwrap(),
            Matrix::new(1, 2, vec![10.0, 20.0]).unwrap(),
        ])
        .unwrap();
        assert_eq!(deep.depth_sum().unwrap().data(), &[11.0, 22.0]);
    }
}
