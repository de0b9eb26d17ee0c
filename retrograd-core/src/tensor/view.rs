//! Shape transforms for [`Tensor`].
//!
//! Transforms only redefine indexing; the copies they perform are exactly
//! what the transform requires. Each validates its arguments at the call
//! boundary and leaves the backing-length/shape-product invariant intact.

use crate::error::GradError;
use crate::tensor::{contiguous_strides, Tensor};

/// Splits `shape` at `axis` into (outer, axis_dim, inner) block extents.
fn axis_blocks(shape: &[usize], axis: usize) -> (usize, usize, usize) {
    let outer: usize = shape[..axis].iter().product();
    let inner: usize = shape[axis + 1..].iter().product();
    (outer, shape[axis], inner)
}

fn check_axis(shape: &[usize], axis: usize, operation: &str) -> Result<(), GradError> {
    if axis >= shape.len() {
        return Err(GradError::DimensionMismatch {
            expected: shape.len(),
            actual: axis,
            operation: operation.to_string(),
        });
    }
    Ok(())
}

impl Tensor {
    /// Reshapes to `dims`, where at most one entry may be `-1` ("infer").
    ///
    /// # Errors
    /// Returns [`GradError::CreationError`] when the element counts
    /// disagree, more than one dimension is `-1`, or a dimension is
    /// otherwise negative.
    pub fn reshape(&self, dims: &[isize]) -> Result<Tensor, GradError> {
        let mut infer = None;
        let mut known: usize = 1;
        for (i, &d) in dims.iter().enumerate() {
            if d == -1 {
                if infer.is_some() {
                    return Err(GradError::CreationError {
                        data_len: self.numel(),
                        shape: dims.iter().map(|&d| d.max(0) as usize).collect(),
                    });
                }
                infer = Some(i);
            } else if d < 0 {
                return Err(GradError::CreationError {
                    data_len: self.numel(),
                    shape: dims.iter().map(|&d| d.max(0) as usize).collect(),
                });
            } else {
                known *= d as usize;
            }
        }

        let mut shape: Vec<usize> = dims.iter().map(|&d| d.max(0) as usize).collect();
        if let Some(i) = infer {
            if known == 0 || self.numel() % known != 0 {
                return Err(GradError::CreationError {
                    data_len: self.numel(),
                    shape,
                });
            }
            shape[i] = self.numel() / known;
        } else if known != self.numel() {
            return Err(GradError::CreationError {
                data_len: self.numel(),
                shape,
            });
        }
        Tensor::new(self.data().to_vec(), shape)
    }

    /// Permutes axes. `perm` must be a bijection over `0..rank`.
    ///
    /// # Errors
    /// Returns [`GradError::InvalidPermutation`] otherwise.
    pub fn transpose(&self, perm: &[usize]) -> Result<Tensor, GradError> {
        let rank = self.rank();
        let mut seen = vec![false; rank];
        if perm.len() != rank
            || perm.iter().any(|&p| {
                if p >= rank || seen[p] {
                    true
                } else {
                    seen[p] = true;
                    false
                }
            })
        {
            return Err(GradError::InvalidPermutation {
                dims: perm.to_vec(),
                rank,
            });
        }

        let out_shape: Vec<usize> = perm.iter().map(|&p| self.shape()[p]).collect();
        let out_strides = contiguous_strides(&out_shape);
        let mut out = vec![0.0; self.numel()];
        let mut index = vec![0usize; rank];
        for &value in self.data() {
            let mut flat = 0;
            for (axis, &p) in perm.iter().enumerate() {
                flat += index[p] * out_strides[axis];
            }
            out[flat] = value;

            // Advance the row-major counter over the input shape.
            for axis in (0..rank).rev() {
                index[axis] += 1;
                if index[axis] < self.shape()[axis] {
                    break;
                }
                index[axis] = 0;
            }
        }
        Tensor::new(out, out_shape)
    }

    /// Takes the half-open range `start..end` along `axis`.
    ///
    /// # Errors
    /// Returns [`GradError::SliceError`] for an empty or out-of-range
    /// window.
    pub fn slice(&self, axis: usize, start: usize, end: usize) -> Result<Tensor, GradError> {
        check_axis(self.shape(), axis, "Tensor::slice")?;
        let (outer, dim, inner) = axis_blocks(self.shape(), axis);
        if start >= end || end > dim {
            return Err(GradError::SliceError {
                message: format!("range {start}..{end} invalid for axis of size {dim}"),
            });
        }
        let width = end - start;
        let mut out = Vec::with_capacity(outer * width * inner);
        for o in 0..outer {
            let base = o * dim * inner;
            out.extend_from_slice(&self.data()[base + start * inner..base + end * inner]);
        }
        let mut shape = self.shape().to_vec();
        shape[axis] = width;
        Tensor::new(out, shape)
    }

    /// Gathers `indices` along `axis`, in order (repeats allowed).
    ///
    /// # Errors
    /// Returns [`GradError::IndexOutOfBounds`] for any index past the axis
    /// extent.
    pub fn gather(&self, axis: usize, indices: &[usize]) -> Result<Tensor, GradError> {
        check_axis(self.shape(), axis, "Tensor::gather")?;
        let (outer, dim, inner) = axis_blocks(self.shape(), axis);
        if let Some(&bad) = indices.iter().find(|&&i| i >= dim) {
            return Err(GradError::IndexOutOfBounds {
                index: vec![bad],
                shape: self.shape().to_vec(),
            });
        }
        let mut out = Vec::with_capacity(outer * indices.len() * inner);
        for o in 0..outer {
            let base = o * dim * inner;
            for &i in indices {
                out.extend_from_slice(&self.data()[base + i * inner..base + (i + 1) * inner]);
            }
        }
        let mut shape = self.shape().to_vec();
        shape[axis] = indices.len();
        Tensor::new(out, shape)
    }

    /// Repeats the tensor `times` times along `axis`.
    pub fn tile(&self, axis: usize, times: usize) -> Result<Tensor, GradError> {
        check_axis(self.shape(), axis, "Tensor::tile")?;
        if times == 0 {
            return Err(GradError::SliceError {
                message: "tile count must be positive".to_string(),
            });
        }
        let (outer, dim, inner) = axis_blocks(self.shape(), axis);
        let mut out = Vec::with_capacity(self.numel() * times);
        for o in 0..outer {
            let block = &self.data()[o * dim * inner..(o + 1) * dim * inner];
            for _ in 0..times {
                out.extend_from_slice(block);
            }
        }
        let mut shape = self.shape().to_vec();
        shape[axis] = dim * times;
        Tensor::new(out, shape)
    }

    /// Concatenates `self` and `others` along `axis`. All non-`axis`
    /// extents must agree.
    pub fn concat(&self, others: &[&Tensor], axis: usize) -> Result<Tensor, GradError> {
        check_axis(self.shape(), axis, "Tensor::concat")?;
        let mut parts: Vec<&Tensor> = Vec::with_capacity(others.len() + 1);
        parts.push(self);
        parts.extend_from_slice(others);

        let mut axis_total = 0;
        for t in &parts {
            let mut expected = self.shape().to_vec();
            let mut actual = t.shape().to_vec();
            if expected.len() != actual.len() {
                return Err(GradError::ShapeMismatch {
                    expected,
                    actual,
                    operation: "Tensor::concat".to_string(),
                });
            }
            expected[axis] = 0;
            actual[axis] = 0;
            if expected != actual {
                return Err(GradError::ShapeMismatch {
                    expected: self.shape().to_vec(),
                    actual: t.shape().to_vec(),
                    operation: "Tensor::concat".to_string(),
                });
            }
            axis_total += t.shape()[axis];
        }

        let (outer, _, inner) = axis_blocks(self.shape(), axis);
        let mut out = Vec::with_capacity(outer * axis_total * inner);
        for o in 0..outer {
            for t in &parts {
                let dim = t.shape()[axis];
                out.extend_from_slice(&t.data()[o * dim * inner..(o + 1) * dim * inner]);
            }
        }
        let mut shape = self.shape().to_vec();
        shape[axis] = axis_total;
        Tensor::new(out, shape)
    }

    /// Splits along `axis` into parts of the given sizes, which must sum to
    /// the axis extent.
    pub fn split(&self, axis: usize, sizes: &[usize]) -> Result<Vec<Tensor>, GradError> {
        check_axis(self.shape(), axis, "Tensor::split")?;
        let dim = self.shape()[axis];
        if sizes.iter().sum::<usize>() != dim || sizes.iter().any(|&s| s == 0) {
            return Err(GradError::SliceError {
                message: format!("split sizes {sizes:?} do not partition axis of size {dim}"),
            });
        }
        let mut parts = Vec::with_capacity(sizes.len());
        let mut start = 0;
        for &s in sizes {
            parts.push(self.slice(axis, start, start + s)?);
            start += s;
        }
        Ok(parts)
    }

    /// Stacks same-shaped tensors along a new leading axis.
    pub fn stack(tensors: &[&Tensor]) -> Result<Tensor, GradError> {
        let first = tensors.first().ok_or(GradError::EmptyMatrixList)?;
        let mut out = Vec::with_capacity(first.numel() * tensors.len());
        for t in tensors {
            if t.shape() != first.shape() {
                return Err(GradError::ShapeMismatch {
                    expected: first.shape().to_vec(),
                    actual: t.shape().to_vec(),
                    operation: "Tensor::stack".to_string(),
                });
            }
            out.extend_from_slice(t.data());
        }
        let mut shape = vec![tensors.len()];
        shape.extend_from_slice(first.shape());
        Tensor::new(out, shape)
    }

    /// Splits the leading axis back into individual tensors.
    pub fn unstack(&self) -> Result<Vec<Tensor>, GradError> {
        if self.rank() == 0 {
            return Err(GradError::DimensionMismatch {
                expected: 1,
                actual: 0,
                operation: "Tensor::unstack".to_string(),
            });
        }
        let count = self.shape()[0];
        let rest: Vec<usize> = self.shape()[1..].to_vec();
        let chunk: usize = rest.iter().product();
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            out.push(Tensor::new(
                self.data()[i * chunk..(i + 1) * chunk].to_vec(),
                rest.clone(),
            )?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iota(shape: Vec<usize>) -> Tensor {
        let numel = shape.iter().product();
        Tensor::new((0..numel).map(|i| i as f64).collect(), shape).unwrap()
    }

    #[test]
    fn test_reshape_with_infer() {
        let t = iota(vec![2, 3, 4]);
        let r = t.reshape(&[6, -1]).unwrap();
        assert_eq!(r.shape(), &[6, 4]);
        assert_eq!(r.data(), t.data());

        assert!(t.reshape(&[5, -1]).is_err());
        assert!(t.reshape(&[-1, -1]).is_err());
        assert!(t.reshape(&[7, 4]).is_err());
    }

    #[test]
    fn test_transpose_permutation() {
        let t = iota(vec![2, 3]);
        let p = t.transpose(&[1, 0]).unwrap();
        assert_eq!(p.shape(), &[3, 2]);
        assert_eq!(p.data(), &[0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);

        assert!(matches!(
            t.transpose(&[0, 0]),
            Err(GradError::InvalidPermutation { .. })
        ));
        assert!(t.transpose(&[0]).is_err());
        assert!(t.transpose(&[0, 2]).is_err());
    }

    #[test]
    fn test_transpose_three_axes() {
        let t = iota(vec![2, 3, 4]);
        let p = t.transpose(&[2, 0, 1]).unwrap();
        assert_eq!(p.shape(), &[4, 2, 3]);
        for i in 0..2 {
            for j in 0..3 {
                for k in 0..4 {
                    assert_eq!(
                        p.get(&[k, i, j]).unwrap(),
                        t.get(&[i, j, k]).unwrap()
                    );
                }
            }
        }
    }

    #[test]
    fn test_slice_and_gather() {
        let t = iota(vec![2, 4]);
        let s = t.slice(1, 1, 3).unwrap();
        assert_eq!(s.shape(), &[2, 2]);
        assert_eq!(s.data(), &[1.0, 2.0, 5.0, 6.0]);
        assert!(t.slice(1, 3, 3).is_err());
        assert!(t.slice(1, 2, 5).is_err());

        let g = t.gather(1, &[3, 0, 3]).unwrap();
        assert_eq!(g.shape(), &[2, 3]);
        assert_eq!(g.data(), &[3.0, 0.0, 3.0, 7.0, 4.0, 7.0]);
        assert!(t.gather(1, &[4]).is_err());
    }

    #[test]
    fn test_concat_split_round_trip() {
        let t = iota(vec![2, 6]);
        let parts = t.split(1, &[2, 3, 1]).unwrap();
        assert_eq!(parts[0].shape(), &[2, 2]);
        assert_eq!(parts[2].shape(), &[2, 1]);
        let refs: Vec<&Tensor> = parts[1..].iter().collect();
        let back = parts[0].concat(&refs, 1).unwrap();
        assert_eq!(back, t);

        assert!(t.split(1, &[2, 2]).is_err());
    }

    #[test]
    fn test_stack_unstack_round_trip() {
        let a = iota(vec![2, 2]);
        let b = a.scale(10.0);
        let stacked = Tensor::stack(&[&a, &b]).unwrap();
        assert_eq!(stacked.shape(), &[2, 2, 2]);
        let back = stacked.unstack().unwrap();
        assert_eq!(back[0], a);
        assert_eq!(back[1], b);
    }

    #[test]
    fn test_tile() {
        let t = iota(vec![1, 2]);
        let tiled = t.tile(0, 3).unwrap();
        assert_eq!(tiled.shape(), &[3, 2]);
        assert_eq!(tiled.data(), &[0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
    }
}
