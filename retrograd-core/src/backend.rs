//! Accelerator compute backend contract.
//!
//! A subset of operations may delegate elementwise or reduction math to an
//! accelerator. The contract is the explicit five-step ritual: allocate a
//! device buffer, copy operands host→device, launch a kernel, synchronize,
//! copy results device→host, release the buffer. Nothing is retained on
//! the device across calls; a stalled kernel is fatal to that call.
//!
//! The trait is injectable so CPU-only test environments can substitute
//! [`HostBackend`], which services the same contract from host memory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use log::debug;

use crate::error::GradError;
use crate::matrix::Matrix;

/// Handle to a device buffer.
pub type BufferId = u64;

/// Kernels an accelerator implementation must service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    /// `out[i] = a[i] + b[i]`
    ElementwiseAdd {
        a: BufferId,
        b: BufferId,
        out: BufferId,
    },
    /// `out[i] = a[i] * b[i]`
    ElementwiseMul {
        a: BufferId,
        b: BufferId,
        out: BufferId,
    },
    /// `out[0] = Σ a[i]`
    Sum { a: BufferId, out: BufferId },
}

/// Five-call device contract: alloc, upload, launch, synchronize/download,
/// free.
pub trait ComputeBackend: std::fmt::Debug + Send + Sync {
    /// Allocates a zeroed device buffer of `len` elements.
    fn alloc(&self, len: usize) -> Result<BufferId, GradError>;

    /// Copies `host` into the device buffer, which must have been allocated
    /// with exactly `host.len()` elements.
    fn upload(&self, buffer: BufferId, host: &[f64]) -> Result<(), GradError>;

    /// Enqueues a kernel over previously-uploaded buffers.
    fn launch(&self, kernel: Kernel) -> Result<(), GradError>;

    /// Blocks until all launched kernels complete.
    fn synchronize(&self) -> Result<(), GradError>;

    /// Copies the device buffer back into `host` (same length rule as
    /// [`Self::upload`]). Call only after [`Self::synchronize`].
    fn download(&self, buffer: BufferId, host: &mut [f64]) -> Result<(), GradError>;

    /// Releases the device buffer.
    fn free(&self, buffer: BufferId) -> Result<(), GradError>;
}

/// Host-memory implementation of the device contract, for CPU-only
/// environments and tests.
#[derive(Debug, Default)]
pub struct HostBackend {
    buffers: RwLock<HashMap<BufferId, Vec<f64>>>,
    next_id: AtomicU64,
}

impl HostBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unfreed) buffers.
    pub fn live_buffers(&self) -> usize {
        self.buffers.read().expect("backend buffers poisoned").len()
    }

    fn with_buffer<T>(
        &self,
        buffer: BufferId,
        operation: &str,
        f: impl FnOnce(&mut Vec<f64>) -> Result<T, GradError>,
    ) -> Result<T, GradError> {
        let mut buffers = self.buffers.write().expect("backend buffers poisoned");
        let buf = buffers.get_mut(&buffer).ok_or_else(|| GradError::Backend {
            message: format!("{operation}: unknown buffer {buffer}"),
        })?;
        f(buf)
    }
}

impl ComputeBackend for HostBackend {
    fn alloc(&self, len: usize) -> Result<BufferId, GradError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.buffers
            .write()
            .expect("backend buffers poisoned")
            .insert(id, vec![0.0; len]);
        debug!("host backend: alloc buffer {id} ({len} elements)");
        Ok(id)
    }

    fn upload(&self, buffer: BufferId, host: &[f64]) -> Result<(), GradError> {
        self.with_buffer(buffer, "upload", |buf| {
            if buf.len() != host.len() {
                return Err(GradError::Backend {
                    message: format!(
                        "upload length {} does not match buffer length {}",
                        host.len(),
                        buf.len()
                    ),
                });
            }
            buf.copy_from_slice(host);
            Ok(())
        })
    }

    fn launch(&self, kernel: Kernel) -> Result<(), GradError> {
        let mut buffers = self.buffers.write().expect("backend buffers poisoned");
        let fetch = |buffers: &HashMap<BufferId, Vec<f64>>, id: BufferId| {
            buffers.get(&id).cloned().ok_or_else(|| GradError::Backend {
                message: format!("launch: unknown buffer {id}"),
            })
        };
        match kernel {
            Kernel::ElementwiseAdd { a, b, out } | Kernel::ElementwiseMul { a, b, out } => {
                let av = fetch(&buffers, a)?;
                let bv = fetch(&buffers, b)?;
                if av.len() != bv.len() {
                    return Err(GradError::Backend {
                        message: format!(
                            "launch: operand lengths {} and {} differ",
                            av.len(),
                            bv.len()
                        ),
                    });
                }
                let mul = matches!(kernel, Kernel::ElementwiseMul { .. });
                let result: Vec<f64> = av
                    .iter()
                    .zip(&bv)
                    .map(|(&x, &y)| if mul { x * y } else { x + y })
                    .collect();
                let dst = buffers.get_mut(&out).ok_or_else(|| GradError::Backend {
                    message: format!("launch: unknown buffer {out}"),
                })?;
                if dst.len() != result.len() {
                    return Err(GradError::Backend {
                        message: format!(
                            "launch: output length {} does not match operand length {}",
                            dst.len(),
                            result.len()
                        ),
                    });
                }
                dst.copy_from_slice(&result);
            }
            Kernel::Sum { a, out } => {
                let av = fetch(&buffers, a)?;
                let total: f64 = av.iter().sum();
                let dst = buffers.get_mut(&out).ok_or_else(|| GradError::Backend {
                    message: format!("launch: unknown buffer {out}"),
                })?;
                if dst.len() != 1 {
                    return Err(GradError::Backend {
                        message: format!("launch: sum output must hold 1 element, has {}", dst.len()),
                    });
                }
                dst[0] = total;
            }
        }
        Ok(())
    }

    fn synchronize(&self) -> Result<(), GradError> {
        // Host kernels run eagerly inside launch; nothing pending.
        Ok(())
    }

    fn download(&self, buffer: BufferId, host: &mut [f64]) -> Result<(), GradError> {
        self.with_buffer(buffer, "download", |buf| {
            if buf.len() != host.len() {
                return Err(GradError::Backend {
                    message: format!(
                        "download length {} does not match buffer length {}",
                        host.len(),
                        buf.len()
                    ),
                });
            }
            host.copy_from_slice(buf);
            Ok(())
        })
    }

    fn free(&self, buffer: BufferId) -> Result<(), GradError> {
        let removed = self
            .buffers
            .write()
            .expect("backend buffers poisoned")
            .remove(&buffer);
        if removed.is_none() {
            return Err(GradError::Backend {
                message: format!("free: unknown buffer {buffer}"),
            });
        }
        debug!("host backend: freed buffer {buffer}");
        Ok(())
    }
}

/// Elementwise sum of two matrices through a compute backend, running the
/// full alloc/upload/launch/synchronize/download/free ritual.
pub fn offloaded_add(
    backend: &dyn ComputeBackend,
    a: &Matrix,
    b: &Matrix,
) -> Result<Matrix, GradError> {
    a.check_same_shape(b, "backend::offloaded_add")?;

    let buf_a = backend.alloc(a.numel())?;
    let buf_b = backend.alloc(b.numel())?;
    let buf_out = backend.alloc(a.numel())?;

    let run = (|| {
        backend.upload(buf_a, a.data())?;
        backend.upload(buf_b, b.data())?;
        backend.launch(Kernel::ElementwiseAdd {
            a: buf_a,
            b: buf_b,
            out: buf_out,
        })?;
        backend.synchronize()?;
        let mut host = vec![0.0; a.numel()];
        backend.download(buf_out, &mut host)?;
        Matrix::new(a.rows(), a.cols(), host)
    })();

    // Buffers are released whether or not the computation succeeded.
    for buf in [buf_a, buf_b, buf_out] {
        backend.free(buf)?;
    }
    run
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offloaded_add_matches_host_add() {
        let backend = HostBackend::new();
        let a = Matrix::new(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Matrix::new(2, 2, vec![10.0, 20.0, 30.0, 40.0]).unwrap();

        let sum = offloaded_add(&backend, &a, &b).unwrap();
        assert_eq!(sum.data(), a.add(&b).unwrap().data());
        assert_eq!(backend.live_buffers(), 0, "no buffers retained across calls");
    }

    #[test]
    fn test_unknown_buffer_is_an_error() {
        let backend = HostBackend::new();
        assert!(matches!(
            backend.upload(99, &[1.0]),
            Err(GradError::Backend { .. })
        ));
        assert!(backend.free(99).is_err());
    }

    #[test]
    fn test_upload_length_checked() {
        let backend = HostBackend::new();
        let buf = backend.alloc(2).unwrap();
        assert!(backend.upload(buf, &[1.0, 2.0, 3.0]).is_err());
        backend.free(buf).unwrap();
    }

    #[test]
    fn test_sum_kernel() {
        let backend = HostBackend::new();
        let a = backend.alloc(4).unwrap();
        let out = backend.alloc(1).unwrap();
        backend.upload(a, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        backend.launch(Kernel::Sum { a, out }).unwrap();
        backend.synchronize().unwrap();
        let mut host = [0.0];
        backend.download(out, &mut host).unwrap();
        assert_eq!(host[0], 10.0);
        backend.free(a).unwrap();
        backend.free(out).unwrap();
    }
}
