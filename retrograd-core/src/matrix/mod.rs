//! Dense 2D matrix container.
//!
//! `Matrix` is the workhorse container every operation consumes and produces:
//! a row-major `Vec<f64>` with explicit row/column counts, a process-unique
//! identifier, and a logical shape descriptor. Identity (the id) never
//! changes; contents may. Equality compares ids, not values — two matrices
//! holding the same numbers are still distinct containers. Use `data()` for
//! value-level comparisons.

mod arithmetic;
mod reductions;
pub mod serialize;

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::GradError;

static NEXT_MATRIX_ID: AtomicU64 = AtomicU64::new(1);

fn next_matrix_id() -> u64 {
    NEXT_MATRIX_ID.fetch_add(1, Ordering::Relaxed)
}

/// Called when deserializing a matrix carrying an id from another process,
/// so locally-created matrices never collide with it.
pub(crate) fn reserve_matrix_id(id: u64) {
    NEXT_MATRIX_ID.fetch_max(id.saturating_add(1), Ordering::Relaxed);
}

/// 2D dense `f64` container with row-major storage.
#[derive(Debug)]
pub struct Matrix {
    id: u64,
    rows: usize,
    cols: usize,
    /// Logical shape; its product always equals `rows * cols`. Lets a matrix
    /// carry higher-rank data flattened into its columns.
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl Matrix {
    /// Creates a matrix from row-major data.
    ///
    /// # Errors
    /// Returns [`GradError::CreationError`] if `data.len() != rows * cols`.
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, GradError> {
        if data.len() != rows * cols {
            return Err(GradError::CreationError {
                data_len: data.len(),
                shape: vec![rows, cols],
            });
        }
        Ok(Matrix {
            id: next_matrix_id(),
            rows,
            cols,
            shape: vec![rows, cols],
            data,
        })
    }

    pub(crate) fn with_id(
        id: u64,
        rows: usize,
        cols: usize,
        data: Vec<f64>,
    ) -> Result<Self, GradError> {
        let mut m = Matrix::new(rows, cols, data)?;
        reserve_matrix_id(id);
        m.id = id;
        Ok(m)
    }

    /// All-zero matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Matrix {
            id: next_matrix_id(),
            rows,
            cols,
            shape: vec![rows, cols],
            data: vec![0.0; rows * cols],
        }
    }

    /// All-one matrix.
    pub fn ones(rows: usize, cols: usize) -> Self {
        Self::full(rows, cols, 1.0)
    }

    /// Matrix filled with `value`.
    pub fn full(rows: usize, cols: usize, value: f64) -> Self {
        Matrix {
            id: next_matrix_id(),
            rows,
            cols,
            shape: vec![rows, cols],
            data: vec![value; rows * cols],
        }
    }

    /// Builds a matrix from explicit rows.
    ///
    /// # Errors
    /// Returns [`GradError::EmptyMatrixList`] for an empty slice and
    /// [`GradError::DimensionMismatch`] if row lengths are not uniform.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, GradError> {
        let first = rows.first().ok_or(GradError::EmptyMatrixList)?;
        let cols = first.len();
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            if row.len() != cols {
                return Err(GradError::DimensionMismatch {
                    expected: cols,
                    actual: row.len(),
                    operation: "Matrix::from_rows".to_string(),
                });
            }
            data.extend_from_slice(row);
        }
        Matrix::new(rows.len(), cols, data)
    }

    /// Replaces the logical shape descriptor.
    ///
    /// # Errors
    /// Returns [`GradError::CreationError`] if the new shape's product does
    /// not equal the element count.
    pub fn set_shape(&mut self, shape: Vec<usize>) -> Result<(), GradError> {
        if shape.iter().product::<usize>() != self.data.len() {
            return Err(GradError::CreationError {
                data_len: self.data.len(),
                shape,
            });
        }
        self.shape = shape;
        Ok(())
    }

    /// Opaque process-unique identifier. Identity-based equality and caching
    /// key; never recycled within a process.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Logical shape descriptor (product equals `numel`).
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Row-major backing store.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Mutable access to the backing store. Contents are mutable; identity
    /// is not — the id stays put.
    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Element read with bounds checking.
    ///
    /// # Errors
    /// Returns [`GradError::IndexOutOfBounds`] if `(row, col)` lies outside
    /// the matrix.
    pub fn get(&self, row: usize, col: usize) -> Result<f64, GradError> {
        if row >= self.rows || col >= self.cols {
            return Err(GradError::IndexOutOfBounds {
                index: vec![row, col],
                shape: vec![self.rows, self.cols],
            });
        }
        Ok(self.data[row * self.cols + col])
    }

    /// Element write with bounds checking.
    ///
    /// # Errors
    /// Returns [`GradError::IndexOutOfBounds`] if `(row, col)` lies outside
    /// the matrix.
    pub fn set(&mut self, row: usize, col: usize, value: f64) -> Result<(), GradError> {
        if row >= self.rows || col >= self.cols {
            return Err(GradError::IndexOutOfBounds {
                index: vec![row, col],
                shape: vec![self.rows, self.cols],
            });
        }
        self.data[row * self.cols + col] = value;
        Ok(())
    }

    /// Borrow of one row.
    ///
    /// # Errors
    /// Returns [`GradError::IndexOutOfBounds`] for a row past the end.
    pub fn row(&self, row: usize) -> Result<&[f64], GradError> {
        if row >= self.rows {
            return Err(GradError::IndexOutOfBounds {
                index: vec![row, 0],
                shape: vec![self.rows, self.cols],
            });
        }
        Ok(&self.data[row * self.cols..(row + 1) * self.cols])
    }

    /// Applies `f` to every element, producing a fresh matrix.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Matrix {
        let data = self.data.iter().map(|&x| f(x)).collect();
        Matrix {
            id: next_matrix_id(),
            rows: self.rows,
            cols: self.cols,
            shape: vec![self.rows, self.cols],
            data,
        }
    }

    /// Combines two same-shaped matrices elementwise.
    ///
    /// # Errors
    /// Returns [`GradError::ShapeMismatch`] if dimensions differ.
    pub fn zip_map(
        &self,
        other: &Matrix,
        operation: &str,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<Matrix, GradError> {
        self.check_same_shape(other, operation)?;
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(&a, &b)| f(a, b))
            .collect();
        Matrix::new(self.rows, self.cols, data)
    }

    /// True when every element is finite (no NaN, no infinities).
    pub fn all_finite(&self) -> bool {
        self.data.iter().all(|x| x.is_finite())
    }

    pub(crate) fn check_same_shape(
        &self,
        other: &Matrix,
        operation: &str,
    ) -> Result<(), GradError> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(GradError::ShapeMismatch {
                expected: vec![self.rows, self.cols],
                actual: vec![other.rows, other.cols],
                operation: operation.to_string(),
            });
        }
        Ok(())
    }
}

impl Clone for Matrix {
    /// Deep-copies contents under a fresh identity. A clone is a new
    /// container, so it never compares equal to its source.
    fn clone(&self) -> Self {
        Matrix {
            id: next_matrix_id(),
            rows: self.rows,
            cols: self.cols,
            shape: self.shape.clone(),
            data: self.data.clone(),
        }
    }
}

impl PartialEq for Matrix {
    /// Identity-based equality: two matrices are equal only when they are
    /// the same container. Compare `data()` slices for value equality.
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Matrix {}
