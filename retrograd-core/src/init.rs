//! Variance-scaled random initialization.
//!
//! Both fills draw from a caller-supplied random source, so seeding the
//! source makes them deterministic. Fan-in is the row count and fan-out the
//! column count of the matrix being filled (inputs-by-outputs weight
//! layout).

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::GradError;
use crate::matrix::Matrix;

/// Fills `matrix` uniformly in `±sqrt(6 / (fan_in + fan_out))`.
///
/// # Errors
/// Returns [`GradError::DimensionMismatch`] for an empty matrix.
pub fn glorot_uniform<R: Rng + ?Sized>(
    matrix: &mut Matrix,
    rng: &mut R,
) -> Result<(), GradError> {
    let fan_in = matrix.rows();
    let fan_out = matrix.cols();
    if fan_in + fan_out == 0 {
        return Err(GradError::DimensionMismatch {
            expected: 1,
            actual: 0,
            operation: "init::glorot_uniform".to_string(),
        });
    }
    let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
    for value in matrix.data_mut() {
        *value = rng.gen_range(-limit..=limit);
    }
    Ok(())
}

/// Fills `matrix` from a normal distribution with standard deviation
/// `sqrt(2 / fan_in)`.
///
/// # Errors
/// Returns [`GradError::DimensionMismatch`] for a matrix with no rows.
pub fn he_normal<R: Rng + ?Sized>(matrix: &mut Matrix, rng: &mut R) -> Result<(), GradError> {
    let fan_in = matrix.rows();
    if fan_in == 0 {
        return Err(GradError::DimensionMismatch {
            expected: 1,
            actual: 0,
            operation: "init::he_normal".to_string(),
        });
    }
    let std_dev = (2.0 / fan_in as f64).sqrt();
    let normal = Normal::new(0.0, std_dev).map_err(|_| GradError::NonFiniteValue {
        operation: "init::he_normal".to_string(),
    })?;
    for value in matrix.data_mut() {
        *value = normal.sample(rng);
    }
    Ok(())
}

#[cfg(test)]
#[path = "init_test.rs"]
mod tests; // Link to the test file
