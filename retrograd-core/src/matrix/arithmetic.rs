//! Checked elementwise, scalar and matrix-product arithmetic.
//!
//! Shape compatibility is validated at the boundary of every call; the
//! matrix product partitions its output rows across the rayon pool so each
//! worker writes a disjoint range.

use rayon::prelude::*;

use crate::error::GradError;
use crate::matrix::Matrix;

impl Matrix {
    /// Elementwise sum. Fails with [`GradError::ShapeMismatch`] on
    /// differing dimensions.
    pub fn add(&self, other: &Matrix) -> Result<Matrix, GradError> {
        self.zip_map(other, "Matrix::add", |a, b| a + b)
    }

    /// Elementwise difference.
    pub fn sub(&self, other: &Matrix) -> Result<Matrix, GradError> {
        self.zip_map(other, "Matrix::sub", |a, b| a - b)
    }

    /// Elementwise (Hadamard) product.
    pub fn mul_elem(&self, other: &Matrix) -> Result<Matrix, GradError> {
        self.zip_map(other, "Matrix::mul_elem", |a, b| a * b)
    }

    /// Multiplies every element by `factor`.
    pub fn scale(&self, factor: f64) -> Matrix {
        self.map(|x| x * factor)
    }

    /// Adds `value` to every element.
    pub fn add_scalar(&self, value: f64) -> Matrix {
        self.map(|x| x + value)
    }

    /// Accumulates `other` into `self` elementwise.
    ///
    /// Used by gradient accumulation; contents change, identity does not.
    pub fn add_assign(&mut self, other: &Matrix) -> Result<(), GradError> {
        self.check_same_shape(other, "Matrix::add_assign")?;
        for (a, b) in self.data_mut().iter_mut().zip(other.data().iter()) {
            *a += b;
        }
        Ok(())
    }

    /// Matrix product `self · other`.
    ///
    /// Output rows are partitioned across the thread pool; each worker owns
    /// a disjoint row range of the result.
    ///
    /// # Errors
    /// Returns [`GradError::IncompatibleShapes`] unless
    /// `self.cols == other.rows`.
    pub fn matmul(&self, other: &Matrix) -> Result<Matrix, GradError> {
        if self.cols() != other.rows() {
            return Err(GradError::IncompatibleShapes {
                shape1: vec![self.rows(), self.cols()],
                shape2: vec![other.rows(), other.cols()],
                operation: "Matrix::matmul".to_string(),
            });
        }
        let (n, k, m) = (self.rows(), self.cols(), other.cols());
        let lhs = self.data();
        let rhs = other.data();

        let mut out = vec![0.0; n * m];
        out.par_chunks_mut(m).enumerate().for_each(|(i, out_row)| {
            for p in 0..k {
                let a = lhs[i * k + p];
                if a != 0.0 {
                    let rhs_row = &rhs[p * m..(p + 1) * m];
                    for (o, &b) in out_row.iter_mut().zip(rhs_row) {
                        *o += a * b;
                    }
                }
            }
        });
        Matrix::new(n, m, out)
    }

    /// Transposed copy.
    pub fn transpose(&self) -> Matrix {
        let (n, m) = (self.rows(), self.cols());
        let src = self.data();
        let mut out = vec![0.0; n * m];
        for i in 0..n {
            for j in 0..m {
                out[j * n + i] = src[i * m + j];
            }
        }
        // Shape invariants hold by construction.
        Matrix::new(m, n, out).expect("transpose preserves element count")
    }
}
