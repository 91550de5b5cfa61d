//! Device-resident storage with high-water-mark capacity.
//!
//! A [`DeviceBuffer`] is the device half of a [`Tensor`](crate::Tensor). It
//! is allocated with a fixed element capacity and never resized in place:
//! the owning tensor replaces it only when a reset asks for more elements
//! than it holds.
//!
//! # Storage
//!
//! - Host backend: a separate `Vec<f32>` behind a lock, so host and device
//!   copies stay independent exactly as on an accelerator.
//! - Wgpu backend: a `STORAGE | COPY_SRC | COPY_DST` buffer.
//!
//! # Epochs
//!
//! Every buffer carries an epoch counter that the owning tensor bumps on each
//! reset. A [`TensorView`](crate::tensor::TensorView) records the epoch it was
//! taken at and refuses to resolve once it has moved on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};

use crate::error::{FfnetError, FfnetResult};

/// Maximum size of a single device buffer (2GB).
pub const MAX_BUFFER_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Maximum number of `f32` elements in a single device buffer.
pub const MAX_BUFFER_ELEMENTS: usize = (MAX_BUFFER_BYTES / std::mem::size_of::<f32>() as u64) as usize;

/// Backend-specific storage.
pub(crate) enum Storage {
    Host(RwLock<Vec<f32>>),
    #[cfg(feature = "gpu")]
    Wgpu(wgpu::Buffer),
}

/// A device allocation holding up to `capacity` `f32` elements.
pub struct DeviceBuffer {
    storage: Storage,
    capacity: usize,
    epoch: AtomicU64,
}

impl DeviceBuffer {
    pub(crate) fn new(storage: Storage, capacity: usize) -> Self {
        Self {
            storage,
            capacity,
            epoch: AtomicU64::new(0),
        }
    }

    /// Allocates zeroed host-backend storage.
    pub(crate) fn host(capacity: usize) -> Self {
        // Physical storage is never empty so that zero-sized tensors stay bindable.
        Self::new(Storage::Host(RwLock::new(vec![0.0; capacity.max(1)])), capacity)
    }

    /// Returns the logical capacity in elements.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the physical allocation size in bytes.
    #[inline]
    pub fn size_bytes(&self) -> u64 {
        (self.capacity.max(1) * std::mem::size_of::<f32>()) as u64
    }

    /// Returns the current epoch.
    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Invalidates every view taken before this call.
    pub(crate) fn bump_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Returns true if this buffer lives in host memory.
    pub fn is_host(&self) -> bool {
        matches!(self.storage, Storage::Host(_))
    }

    /// Locks host storage for reading.
    pub(crate) fn host_read(&self) -> FfnetResult<RwLockReadGuard<'_, Vec<f32>>> {
        match &self.storage {
            Storage::Host(lock) => lock.try_read().map_err(lock_error),
            #[cfg(feature = "gpu")]
            Storage::Wgpu(_) => Err(FfnetError::device_mismatch(
                "wgpu buffer passed to the host backend",
            )),
        }
    }

    /// Locks host storage for writing.
    pub(crate) fn host_write(&self) -> FfnetResult<RwLockWriteGuard<'_, Vec<f32>>> {
        match &self.storage {
            Storage::Host(lock) => lock.try_write().map_err(lock_error),
            #[cfg(feature = "gpu")]
            Storage::Wgpu(_) => Err(FfnetError::device_mismatch(
                "wgpu buffer passed to the host backend",
            )),
        }
    }

    /// Returns the underlying wgpu buffer.
    #[cfg(feature = "gpu")]
    pub(crate) fn wgpu_buffer(&self) -> FfnetResult<&wgpu::Buffer> {
        match &self.storage {
            Storage::Wgpu(buffer) => Ok(buffer),
            Storage::Host(_) => Err(FfnetError::device_mismatch(
                "host buffer passed to the wgpu backend",
            )),
        }
    }
}

fn lock_error<G>(err: TryLockError<G>) -> FfnetError {
    match err {
        TryLockError::Poisoned(_) => FfnetError::host_buffer("buffer lock poisoned"),
        TryLockError::WouldBlock => {
            FfnetError::host_buffer("buffer is already borrowed by another operand")
        }
    }
}

/// Checks that `elements` fits in one device buffer.
pub(crate) fn check_capacity(elements: usize) -> FfnetResult<()> {
    elements
        .checked_mul(std::mem::size_of::<f32>())
        .ok_or_else(|| FfnetError::overflow(format!("{elements} f32 elements overflow usize bytes")))?;
    if elements > MAX_BUFFER_ELEMENTS {
        return Err(FfnetError::AllocationTooLarge {
            requested: elements,
            limit: MAX_BUFFER_ELEMENTS,
        });
    }
    Ok(())
}

impl std::fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("backend", &if self.is_host() { "host" } else { "wgpu" })
            .field("capacity", &self.capacity)
            .field("epoch", &self.epoch())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_buffer_zeroed() {
        let buf = DeviceBuffer::host(16);
        assert_eq!(buf.capacity(), 16);
        assert!(buf.host_read().unwrap().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_empty_buffer_has_physical_storage() {
        let buf = DeviceBuffer::host(0);
        assert_eq!(buf.capacity(), 0);
        assert_eq!(buf.host_read().unwrap().len(), 1);
        assert_eq!(buf.size_bytes(), 4);
    }

    #[test]
    fn test_epoch_bump() {
        let buf = DeviceBuffer::host(4);
        assert_eq!(buf.epoch(), 0);
        buf.bump_epoch();
        buf.bump_epoch();
        assert_eq!(buf.epoch(), 2);
    }

    #[test]
    fn test_aliased_write_is_rejected() {
        let buf = DeviceBuffer::host(4);
        let _read = buf.host_read().unwrap();
        assert!(matches!(buf.host_write(), Err(FfnetError::HostBuffer(_))));
    }

    #[test]
    fn test_check_capacity() {
        assert!(check_capacity(1024).is_ok());
        assert!(matches!(
            check_capacity(MAX_BUFFER_ELEMENTS + 1),
            Err(FfnetError::AllocationTooLarge { .. })
        ));
        assert!(matches!(check_capacity(usize::MAX), Err(FfnetError::Overflow(_))));
    }
}
