//! Fixed-layout binary codec for `Matrix`.
//!
//! Layout, in order, little-endian:
//!
//! | bytes        | field                                      |
//! |--------------|--------------------------------------------|
//! | 1            | transpose flag (0 = row-major, 1 = transposed) |
//! | 8            | unique identifier (`u64`)                  |
//! | 8            | row count (`u64`)                          |
//! | 8            | column count (`u64`)                       |
//! | 8 × numel    | `f64` values                               |
//!
//! With flag 1 the value sequence is written in column-major (transposed)
//! order while the dimension fields still describe the logical matrix. The
//! layout is byte-exact for interop with external persistence; decoding
//! preserves the serialized identity and reserves it against the local id
//! counter.

use crate::error::GradError;
use crate::matrix::Matrix;

const HEADER_LEN: usize = 1 + 8 + 8 + 8;

impl Matrix {
    /// Encodes the matrix in row-major order (transpose flag 0).
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode(false)
    }

    /// Encodes the matrix with the value sequence transposed (flag 1).
    pub fn to_bytes_transposed(&self) -> Vec<u8> {
        self.encode(true)
    }

    fn encode(&self, transposed: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + 8 * self.numel());
        out.push(u8::from(transposed));
        out.extend_from_slice(&self.id().to_le_bytes());
        out.extend_from_slice(&(self.rows() as u64).to_le_bytes());
        out.extend_from_slice(&(self.cols() as u64).to_le_bytes());
        if transposed {
            for j in 0..self.cols() {
                for i in 0..self.rows() {
                    out.extend_from_slice(&self.data()[i * self.cols() + j].to_le_bytes());
                }
            }
        } else {
            for value in self.data() {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
        out
    }

    /// Decodes a matrix previously encoded with [`Matrix::to_bytes`] or
    /// [`Matrix::to_bytes_transposed`].
    ///
    /// # Errors
    /// Returns [`GradError::Deserialize`] on a short buffer, an invalid flag
    /// byte, or a length disagreeing with the encoded dimensions.
    pub fn from_bytes(bytes: &[u8]) -> Result<Matrix, GradError> {
        if bytes.len() < HEADER_LEN {
            return Err(GradError::Deserialize {
                message: format!("buffer too short for header: {} bytes", bytes.len()),
            });
        }
        let transposed = match bytes[0] {
            0 => false,
            1 => true,
            flag => {
                return Err(GradError::Deserialize {
                    message: format!("invalid transpose flag byte {flag}"),
                })
            }
        };
        let id = u64::from_le_bytes(read_8(bytes, 1));
        let rows = u64::from_le_bytes(read_8(bytes, 9)) as usize;
        let cols = u64::from_le_bytes(read_8(bytes, 17)) as usize;

        let body = &bytes[HEADER_LEN..];
        let numel = rows.checked_mul(cols).ok_or_else(|| GradError::Deserialize {
            message: format!("dimension overflow: {rows} x {cols}"),
        })?;
        if body.len() != numel * 8 {
            return Err(GradError::Deserialize {
                message: format!(
                    "value section holds {} bytes, expected {} for {rows} x {cols}",
                    body.len(),
                    numel * 8
                ),
            });
        }

        let mut data = vec![0.0; numel];
        for (k, chunk) in body.chunks_exact(8).enumerate() {
            let value = f64::from_le_bytes(read_8(chunk, 0));
            if transposed {
                // Stored column-major: k walks columns of the logical matrix.
                let (j, i) = (k / rows, k % rows);
                data[i * cols + j] = value;
            } else {
                data[k] = value;
            }
        }
        Matrix::with_id(id, rows, cols, data)
    }
}

fn read_8(bytes: &[u8], offset: usize) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&bytes[offset..offset + 8]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_preserves_layout_and_identity() {
        let m = Matrix::new(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let bytes = m.to_bytes();
        assert_eq!(bytes.len(), HEADER_LEN + 6 * 8);
        assert_eq!(bytes[0], 0);

        let back = Matrix::from_bytes(&bytes).unwrap();
        assert_eq!(back.id(), m.id());
        assert_eq!(back.rows(), 2);
        assert_eq!(back.cols(), 3);
        assert_eq!(back.data(), m.data());
        // Re-encoding is byte-exact.
        assert_eq!(back.to_bytes(), bytes);
    }

    #[test]
    fn test_transposed_round_trip() {
        let m = Matrix::new(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let bytes = m.to_bytes_transposed();
        assert_eq!(bytes[0], 1);
        let back = Matrix::from_bytes(&bytes).unwrap();
        assert_eq!(back.data(), m.data());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            Matrix::from_bytes(&[0u8; 4]),
            Err(GradError::Deserialize { .. })
        ));

        let m = Matrix::zeros(2, 2);
        let mut bytes = m.to_bytes();
        bytes[0] = 7; // bad flag
        assert!(Matrix::from_bytes(&bytes).is_err());

        let mut truncated = m.to_bytes();
        truncated.pop();
        assert!(Matrix::from_bytes(&truncated).is_err());
    }

    #[test]
    fn test_deserialized_id_is_reserved() {
        let m = Matrix::zeros(1, 1);
        let foreign_id = m.id() + 1000;
        let mut bytes = m.to_bytes();
        bytes[1..9].copy_from_slice(&foreign_id.to_le_bytes());
        let back = Matrix::from_bytes(&bytes).unwrap();
        assert_eq!(back.id(), foreign_id);
        // New local matrices must not collide with the imported identity.
        let fresh = Matrix::zeros(1, 1);
        assert!(fresh.id() > foreign_id);
    }
}
