//! Host-mirrored device tensors.
//!
//! A [`Tensor`] is a 4-D `f32` array with two independent copies of its
//! contents: a host-visible `Vec<f32>` and a [`DeviceBuffer`] on its
//! [`Device`]. The only reconciliation is explicit: [`push`](Tensor::push)
//! copies host → device, [`pull`](Tensor::pull) copies device → host. Kernels
//! read and write the device copy only.
//!
//! # Layout
//!
//! Dimensions are `[d0, d1, d2, d3]` with `d0` innermost. Matrices use
//! `d0` as the column count and `d1 · d2 · d3` as the row count, so element
//! `(row, col)` lives at `row * d0 + col` in both copies.
//!
//! # Capacity
//!
//! The device buffer only ever grows: [`reset`](Tensor::reset) to a smaller
//! size keeps the existing allocation, and reallocation happens only when a
//! reset asks for more elements than the buffer holds.
//!
//! # Example
//!
//! ```rust
//! use ffnet::{Device, Tensor};
//!
//! # fn main() -> ffnet::FfnetResult<()> {
//! let device = Device::host();
//! let mut t = Tensor::matrix(&device, 4, 8)?;
//! assert_eq!((t.cols(), t.rows()), (4, 8));
//!
//! t.reset_matrix(2, 2)?;
//! assert_eq!(t.capacity(), 32);
//!
//! t.as_mut_slice().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
//! t.push()?;
//! t.as_mut_slice().fill(0.0);
//! t.pull()?;
//! assert_eq!(t.as_slice(), &[1.0, 2.0, 3.0, 4.0]);
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Weak};

use rand::Rng;
use rand_distr::StandardNormal;

use crate::buffer::DeviceBuffer;
use crate::device::Device;
use crate::error::{FfnetError, FfnetResult};
use crate::kernels::Extent;

/// A 4-D `f32` tensor mirrored between host and device.
pub struct Tensor {
    device: Device,
    dims: [usize; 4],
    data: Vec<f32>,
    buffer: Arc<DeviceBuffer>,
    allocations: usize,
}

impl Tensor {
    /// Creates a zero-filled tensor with dimensions `[d0, d1, d2, d3]`.
    ///
    /// # Errors
    ///
    /// Returns `Overflow` if the element count overflows, or a device error
    /// if allocation fails.
    pub fn new(device: &Device, d0: usize, d1: usize, d2: usize, d3: usize) -> FfnetResult<Self> {
        let dims = [d0, d1, d2, d3];
        let len = element_count(dims)?;
        let buffer = device.alloc(len)?;
        Ok(Self {
            device: device.clone(),
            dims,
            data: vec![0.0; len],
            buffer: Arc::new(buffer),
            allocations: 1,
        })
    }

    /// Creates a zero-filled `rows × cols` matrix.
    pub fn matrix(device: &Device, cols: usize, rows: usize) -> FfnetResult<Self> {
        Self::new(device, cols, rows, 1, 1)
    }

    /// Creates a zero-filled vector of `len` elements.
    pub fn vector(device: &Device, len: usize) -> FfnetResult<Self> {
        Self::new(device, len, 1, 1, 1)
    }

    /// Creates a tensor with all dimensions zero.
    pub fn empty(device: &Device) -> FfnetResult<Self> {
        Self::new(device, 0, 0, 0, 0)
    }

    /// Creates a `rows × cols` matrix from host data and pushes it to the device.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` if `data.len() != cols * rows`.
    pub fn from_slice(device: &Device, cols: usize, rows: usize, data: &[f32]) -> FfnetResult<Self> {
        let mut tensor = Self::matrix(device, cols, rows)?;
        if data.len() != tensor.len() {
            return Err(FfnetError::shape_mismatch(&[cols, rows], &[data.len()]));
        }
        tensor.data.copy_from_slice(data);
        tensor.push()?;
        Ok(tensor)
    }

    /// Sets new dimensions.
    ///
    /// The host copy is resized and zeroed. The device buffer is reallocated
    /// only if the new element count exceeds its capacity; otherwise it is
    /// reused and its contents are unspecified. Views taken before the reset
    /// no longer resolve.
    pub fn reset(&mut self, d0: usize, d1: usize, d2: usize, d3: usize) -> FfnetResult<()> {
        let dims = [d0, d1, d2, d3];
        let len = element_count(dims)?;

        if len > self.buffer.capacity() {
            log::debug!(
                "Tensor grows from {} to {} elements ({:?} -> {:?})",
                self.buffer.capacity(),
                len,
                self.dims,
                dims
            );
            self.buffer = Arc::new(self.device.alloc(len)?);
            self.allocations += 1;
        } else {
            self.buffer.bump_epoch();
        }

        self.dims = dims;
        self.data.clear();
        self.data.resize(len, 0.0);
        Ok(())
    }

    /// Resets to a `rows × cols` matrix.
    pub fn reset_matrix(&mut self, cols: usize, rows: usize) -> FfnetResult<()> {
        self.reset(cols, rows, 1, 1)
    }

    /// Fills the host copy with `scale · N(0, 1)` samples and pushes it.
    pub fn random<R: Rng + ?Sized>(&mut self, rng: &mut R, scale: f32) -> FfnetResult<()> {
        for v in self.data.iter_mut() {
            let sample: f32 = rng.sample(StandardNormal);
            *v = sample * scale;
        }
        self.push()
    }

    /// Fills both copies with zeros.
    pub fn zero(&mut self) -> FfnetResult<()> {
        self.data.fill(0.0);
        self.push()
    }

    /// Copies the host copy to the device, blocking until the copy lands.
    pub fn push(&mut self) -> FfnetResult<()> {
        self.device.upload(&self.buffer, &self.data)
    }

    /// Copies the device copy to the host, blocking until outstanding device
    /// work and the transfer have finished.
    pub fn pull(&mut self) -> FfnetResult<()> {
        let data = self.device.download(&self.buffer, self.data.len())?;
        self.data.copy_from_slice(&data);
        Ok(())
    }

    /// Reads the device copy into a new vector without touching the host copy.
    pub fn download(&self) -> FfnetResult<Vec<f32>> {
        self.device.download(&self.buffer, self.len())
    }

    /// Returns the dimensions `[d0, d1, d2, d3]`.
    #[inline]
    pub fn dims(&self) -> [usize; 4] {
        self.dims
    }

    /// Returns the column count (`d0`).
    #[inline]
    pub fn cols(&self) -> usize {
        self.dims[0]
    }

    /// Returns the row count (`d1 · d2 · d3`).
    #[inline]
    pub fn rows(&self) -> usize {
        self.dims[1] * self.dims[2] * self.dims[3]
    }

    /// Returns the logical element count.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the tensor holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the device buffer capacity in elements.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Returns how many device allocations this tensor has made.
    #[inline]
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    /// Returns the host copy.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Returns the host copy mutably. Call [`push`](Self::push) to publish edits.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Returns the device this tensor lives on.
    #[inline]
    pub fn device(&self) -> &Device {
        &self.device
    }

    pub(crate) fn buffer(&self) -> &DeviceBuffer {
        &self.buffer
    }

    pub(crate) fn extent(&self) -> Extent {
        Extent::new(self.rows(), self.cols())
    }

    /// Takes a non-owning view of the current device buffer.
    pub(crate) fn view(&self) -> TensorView {
        TensorView {
            buffer: Arc::downgrade(&self.buffer),
            epoch: self.buffer.epoch(),
            dims: self.dims,
        }
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("dims", &self.dims)
            .field("capacity", &self.buffer.capacity())
            .field("allocations", &self.allocations)
            .field("device", &self.device.kind())
            .finish()
    }
}

/// A non-owning, epoch-stamped reference to a tensor's device buffer.
///
/// Layers keep one per forward input and resolve it in the matching backward
/// pass. Resolution fails once the tensor has been dropped or reset.
#[derive(Debug, Clone)]
pub(crate) struct TensorView {
    buffer: Weak<DeviceBuffer>,
    epoch: u64,
    dims: [usize; 4],
}

impl TensorView {
    /// Returns the buffer if the viewed tensor is unchanged since the view was taken.
    pub(crate) fn resolve(&self, layer: &'static str) -> FfnetResult<Arc<DeviceBuffer>> {
        match self.buffer.upgrade() {
            Some(buffer) if buffer.epoch() == self.epoch => Ok(buffer),
            _ => Err(FfnetError::StaleInput { layer }),
        }
    }

    pub(crate) fn dims(&self) -> [usize; 4] {
        self.dims
    }

    pub(crate) fn cols(&self) -> usize {
        self.dims[0]
    }

    pub(crate) fn rows(&self) -> usize {
        self.dims[1] * self.dims[2] * self.dims[3]
    }
}

fn element_count(dims: [usize; 4]) -> FfnetResult<usize> {
    dims.iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| FfnetError::overflow(format!("tensor dims {:?} overflow usize", dims)))
}
