//! N-dimensional dense container.
//!
//! `Tensor` is a flat `f64` backing array plus a shape vector. The backing
//! length equals the shape product at all times; every transform that could
//! violate that invariant fails instead. Storage is strideless — transforms
//! materialize their result rather than aliasing views.

mod view;

use crate::error::GradError;

/// N-dimensional dense `f64` container.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f64>,
}

/// Contiguous row-major strides for `shape`.
pub(crate) fn contiguous_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![0; shape.len()];
    if shape.is_empty() {
        return strides;
    }
    strides[shape.len() - 1] = 1;
    for i in (0..shape.len() - 1).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

impl Tensor {
    /// Creates a tensor from flat row-major data.
    ///
    /// # Errors
    /// Returns [`GradError::CreationError`] if `data.len()` differs from the
    /// shape product.
    pub fn new(data: Vec<f64>, shape: Vec<usize>) -> Result<Self, GradError> {
        let numel: usize = shape.iter().product();
        if data.len() != numel {
            return Err(GradError::CreationError {
                data_len: data.len(),
                shape,
            });
        }
        Ok(Tensor { shape, data })
    }

    /// All-zero tensor of the given shape.
    pub fn zeros(shape: Vec<usize>) -> Self {
        let numel = shape.iter().product();
        Tensor {
            shape,
            data: vec![0.0; numel],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Flat offset of a multi-dimensional index.
    ///
    /// # Errors
    /// Returns [`GradError::IndexOutOfBounds`] if the index has the wrong
    /// rank or any coordinate is out of range.
    pub fn flat_index(&self, index: &[usize]) -> Result<usize, GradError> {
        if index.len() != self.shape.len()
            || index.iter().zip(&self.shape).any(|(&i, &d)| i >= d)
        {
            return Err(GradError::IndexOutOfBounds {
                index: index.to_vec(),
                shape: self.shape.clone(),
            });
        }
        let strides = contiguous_strides(&self.shape);
        Ok(index.iter().zip(&strides).map(|(&i, &s)| i * s).sum())
    }

    /// Element read with bounds checking.
    pub fn get(&self, index: &[usize]) -> Result<f64, GradError> {
        Ok(self.data[self.flat_index(index)?])
    }

    /// Element write with bounds checking.
    pub fn set(&mut self, index: &[usize], value: f64) -> Result<(), GradError> {
        let flat = self.flat_index(index)?;
        self.data[flat] = value;
        Ok(())
    }

    /// Applies `f` elementwise.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Tensor {
        Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&x| f(x)).collect(),
        }
    }

    /// Combines two same-shaped tensors elementwise.
    ///
    /// # Errors
    /// Returns [`GradError::ShapeMismatch`] if shapes differ.
    pub fn zip_map(
        &self,
        other: &Tensor,
        operation: &str,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<Tensor, GradError> {
        if self.shape != other.shape {
            return Err(GradError::ShapeMismatch {
                expected: self.shape.clone(),
                actual: other.shape.clone(),
                operation: operation.to_string(),
            });
        }
        Ok(Tensor {
            shape: self.shape.clone(),
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        })
    }

    /// Elementwise sum.
    pub fn add(&self, other: &Tensor) -> Result<Tensor, GradError> {
        self.zip_map(other, "Tensor::add", |a, b| a + b)
    }

    /// Elementwise difference.
    pub fn sub(&self, other: &Tensor) -> Result<Tensor, GradError> {
        self.zip_map(other, "Tensor::sub", |a, b| a - b)
    }

    /// Elementwise product.
    pub fn mul_elem(&self, other: &Tensor) -> Result<Tensor, GradError> {
        self.zip_map(other, "Tensor::mul_elem", |a, b| a * b)
    }

    /// Multiplies every element by `factor`.
    pub fn scale(&self, factor: f64) -> Tensor {
        self.map(|x| x * factor)
    }

    /// Sum of all elements.
    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Mean of all elements; 0 for an empty tensor.
    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.sum() / self.data.len() as f64
    }
}
