//! Reductions over matrix contents.
//!
//! Every reduction runs as independent per-row partial reductions merged in
//! row order, so results are reproducible across runs regardless of how the
//! pool schedules the partials.

use rayon::prelude::*;

use crate::matrix::Matrix;

impl Matrix {
    /// Sum of all elements.
    pub fn sum(&self) -> f64 {
        let partials: Vec<f64> = self
            .data()
            .par_chunks(self.cols().max(1))
            .map(|row| row.iter().sum())
            .collect();
        // Merge in row order for a deterministic result.
        partials.iter().sum()
    }

    /// Arithmetic mean of all elements; 0 for an empty matrix.
    pub fn mean(&self) -> f64 {
        if self.numel() == 0 {
            return 0.0;
        }
        self.sum() / self.numel() as f64
    }

    /// Frobenius norm, `sqrt(sum of squares)`.
    pub fn frobenius_norm(&self) -> f64 {
        let partials: Vec<f64> = self
            .data()
            .par_chunks(self.cols().max(1))
            .map(|row| row.iter().map(|x| x * x).sum())
            .collect();
        partials.iter().sum::<f64>().sqrt()
    }

    /// Per-column sums as a `1 × cols` matrix.
    pub fn column_sums(&self) -> Matrix {
        let mut sums = vec![0.0; self.cols()];
        for row in self.data().chunks(self.cols().max(1)) {
            for (s, &x) in sums.iter_mut().zip(row) {
                *s += x;
            }
        }
        Matrix::new(1, self.cols(), sums).expect("column sum shape is fixed")
    }

    /// Per-row sums as a `rows × 1` matrix.
    pub fn row_sums(&self) -> Matrix {
        let sums: Vec<f64> = self
            .data()
            .par_chunks(self.cols().max(1))
            .map(|row| row.iter().sum())
            .collect();
        Matrix::new(self.rows(), 1, sums).expect("row sum shape is fixed")
    }
}
