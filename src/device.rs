//! Compute device handles.
//!
//! A [`Device`] decides where tensor storage lives and where kernels run.
//! It is a cheap, clonable handle: every [`Tensor`](crate::Tensor) and layer
//! keeps a clone of the device it was created on.
//!
//! # Backends
//!
//! | Backend | Constructor | Storage | Kernels |
//! |---------|-------------|---------|---------|
//! | Host | [`Device::host`] | separate host allocation | rayon, one work item per output element |
//! | Wgpu | [`Device::wgpu`] | wgpu storage buffer | WGSL compute shaders on one queue |
//!
//! The host backend keeps the host/device split intact: a tensor's host
//! mirror and its device buffer are still distinct copies reconciled only by
//! `push` and `pull`. It runs without an accelerator and serves as the
//! numeric reference for the GPU kernels.
//!
//! # Example
//!
//! ```rust
//! use ffnet::{Device, DeviceKind};
//!
//! let device = Device::host();
//! assert_eq!(device.kind(), DeviceKind::Host);
//! assert!(device.same_device(&device.clone()));
//! ```

use std::sync::Arc;

use crate::buffer::{check_capacity, DeviceBuffer};
use crate::error::{FfnetError, FfnetResult};

#[cfg(feature = "gpu")]
use crate::buffer::Storage;
#[cfg(feature = "gpu")]
use crate::gpu::{memory, GpuContext, WgpuOptions};

/// Which backend a [`Device`] runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Host reference backend.
    Host,
    /// wgpu compute backend.
    Wgpu,
}

pub(crate) enum Backend {
    Host,
    #[cfg(feature = "gpu")]
    Wgpu(GpuContext),
}

/// Handle to a compute device.
#[derive(Clone)]
pub struct Device {
    inner: Arc<Backend>,
}

impl Device {
    /// Creates a host reference device.
    pub fn host() -> Self {
        Self {
            inner: Arc::new(Backend::Host),
        }
    }

    /// Creates a GPU device, selecting an adapter according to `options` and
    /// compiling every kernel.
    ///
    /// # Errors
    ///
    /// Returns an error if no adapter matches, the adapter is below the
    /// required limits, or device creation fails.
    #[cfg(feature = "gpu")]
    pub fn wgpu(options: WgpuOptions) -> FfnetResult<Self> {
        Ok(Self {
            inner: Arc::new(Backend::Wgpu(GpuContext::new(options)?)),
        })
    }

    /// Returns the backend kind.
    pub fn kind(&self) -> DeviceKind {
        match *self.inner {
            Backend::Host => DeviceKind::Host,
            #[cfg(feature = "gpu")]
            Backend::Wgpu(_) => DeviceKind::Wgpu,
        }
    }

    /// Returns true if both handles refer to the same device.
    pub fn same_device(&self, other: &Device) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns the adapter info of a GPU device.
    #[cfg(feature = "gpu")]
    pub fn adapter_info(&self) -> Option<&wgpu::AdapterInfo> {
        match &*self.inner {
            Backend::Wgpu(ctx) => Some(ctx.backend().adapter_info()),
            Backend::Host => None,
        }
    }

    pub(crate) fn backend(&self) -> &Backend {
        &self.inner
    }

    /// Fails with `DeviceMismatch` unless `other` is this device.
    pub(crate) fn ensure_same(&self, other: &Device, what: &str) -> FfnetResult<()> {
        if self.same_device(other) {
            Ok(())
        } else {
            Err(FfnetError::device_mismatch(format!(
                "{} lives on a different device",
                what
            )))
        }
    }

    /// Allocates a zeroed buffer of `capacity` elements.
    pub(crate) fn alloc(&self, capacity: usize) -> FfnetResult<DeviceBuffer> {
        check_capacity(capacity)?;
        match &*self.inner {
            Backend::Host => Ok(DeviceBuffer::host(capacity)),
            #[cfg(feature = "gpu")]
            Backend::Wgpu(ctx) => {
                let buffer = memory::alloc(ctx.backend(), capacity)?;
                Ok(DeviceBuffer::new(Storage::Wgpu(buffer), capacity))
            }
        }
    }

    /// Copies `data` into the front of `buffer`, blocking until it lands.
    pub(crate) fn upload(&self, buffer: &DeviceBuffer, data: &[f32]) -> FfnetResult<()> {
        if data.len() > buffer.capacity() {
            return Err(FfnetError::shape_mismatch(&[buffer.capacity()], &[data.len()]));
        }
        match &*self.inner {
            Backend::Host => {
                buffer.host_write()?[..data.len()].copy_from_slice(data);
                Ok(())
            }
            #[cfg(feature = "gpu")]
            Backend::Wgpu(ctx) => memory::upload(ctx.backend(), buffer.wgpu_buffer()?, data),
        }
    }

    /// Reads the first `len` elements of `buffer`, blocking until outstanding
    /// work has finished.
    pub(crate) fn download(&self, buffer: &DeviceBuffer, len: usize) -> FfnetResult<Vec<f32>> {
        if len > buffer.capacity() {
            return Err(FfnetError::shape_mismatch(&[buffer.capacity()], &[len]));
        }
        match &*self.inner {
            Backend::Host => Ok(buffer.host_read()?[..len].to_vec()),
            #[cfg(feature = "gpu")]
            Backend::Wgpu(ctx) => memory::download(ctx.backend(), buffer.wgpu_buffer()?, len),
        }
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Device");
        s.field("kind", &self.kind());
        #[cfg(feature = "gpu")]
        if let Some(info) = self.adapter_info() {
            s.field("adapter", &info.name);
        }
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_device() {
        let device = Device::host();
        assert_eq!(device.kind(), DeviceKind::Host);
        assert!(!device.same_device(&Device::host()));
    }

    #[test]
    fn test_host_upload_download() {
        let device = Device::host();
        let buffer = device.alloc(4).unwrap();
        device.upload(&buffer, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(device.download(&buffer, 4).unwrap(), vec![1.0, 2.0, 3.0, 0.0]);
    }

    #[test]
    fn test_upload_past_capacity_fails() {
        let device = Device::host();
        let buffer = device.alloc(2).unwrap();
        assert!(device.upload(&buffer, &[1.0, 2.0, 3.0]).is_err());
        assert!(device.download(&buffer, 3).is_err());
    }

    #[test]
    fn test_ensure_same() {
        let a = Device::host();
        let b = Device::host();
        assert!(a.ensure_same(&a.clone(), "input").is_ok());
        assert!(matches!(
            a.ensure_same(&b, "input"),
            Err(FfnetError::DeviceMismatch(_))
        ));
    }
}
