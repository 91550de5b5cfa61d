//! Data-parallel compute kernels.
//!
//! Each function here is stateless: it takes a [`Device`] plus the device
//! buffers it reads and writes, and runs on that device's backend. On the
//! host backend the work happens in [`cpu`]; on the wgpu backend the kernel is
//! submitted to the queue and the call returns without waiting.
//!
//! # Work Partitioning
//!
//! | Kernel | Unit of work | Grouping |
//! |--------|--------------|----------|
//! | affine, weight/input gradient, activations, loss gradients, Adam | one output element `(row, col)` | [`ELEMENT_TILE`]² tiles |
//! | bias gradient | one output column | [`COLUMN_BLOCK`] columns |
//! | softmax passes | one row | [`SOFTMAX_ROWS_PER_BLOCK`] rows |
//!
//! Kernels with an empty output extent return immediately.

pub mod cpu;

use crate::buffer::DeviceBuffer;
use crate::device::{Backend, Device};
use crate::error::FfnetResult;
use crate::optimizer::AdamStep;

#[cfg(feature = "gpu")]
use crate::gpu::{AdamUniforms, GridUniforms, Kernel};

/// Side of the square tile of output elements handled by one workgroup.
pub const ELEMENT_TILE: usize = 16;

/// Columns per workgroup of the bias-gradient reduction.
pub const COLUMN_BLOCK: usize = 64;

/// Rows per workgroup of both softmax passes.
pub const SOFTMAX_ROWS_PER_BLOCK: usize = 64;

/// A `rows × cols` row-major extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent {
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
}

impl Extent {
    /// Creates an extent.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Returns the element count.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    /// Returns true if the extent holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shape of an affine transform: `rows × in_dim` input, `rows × out_dim` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatmulShape {
    /// Batch rows.
    pub rows: usize,
    /// Input width.
    pub in_dim: usize,
    /// Output width.
    pub out_dim: usize,
}

/// `y = x · w + b`. See [`cpu::affine`].
pub(crate) fn affine(
    device: &Device,
    shape: MatmulShape,
    x: &DeviceBuffer,
    w: &DeviceBuffer,
    b: &DeviceBuffer,
    y: &DeviceBuffer,
) -> FfnetResult<()> {
    let out = Extent::new(shape.rows, shape.out_dim);
    if out.is_empty() {
        return Ok(());
    }
    match device.backend() {
        Backend::Host => {
            let (x, w, b) = (x.host_read()?, w.host_read()?, b.host_read()?);
            cpu::affine(shape, &x, &w, &b, &mut y.host_write()?[..out.len()]);
            Ok(())
        }
        #[cfg(feature = "gpu")]
        Backend::Wgpu(ctx) => ctx.launch(
            Kernel::Affine,
            &GridUniforms::new(shape.rows, shape.out_dim, shape.in_dim)?,
            &[x.wgpu_buffer()?, w.wgpu_buffer()?, b.wgpu_buffer()?, y.wgpu_buffer()?],
            out,
        ),
    }
}

/// `wG = xᵗ · yG`. See [`cpu::weight_grad`].
pub(crate) fn weight_grad(
    device: &Device,
    shape: MatmulShape,
    x: &DeviceBuffer,
    yg: &DeviceBuffer,
    wg: &DeviceBuffer,
) -> FfnetResult<()> {
    let out = Extent::new(shape.in_dim, shape.out_dim);
    if out.is_empty() {
        return Ok(());
    }
    match device.backend() {
        Backend::Host => {
            let (x, yg) = (x.host_read()?, yg.host_read()?);
            cpu::weight_grad(shape, &x, &yg, &mut wg.host_write()?[..out.len()]);
            Ok(())
        }
        #[cfg(feature = "gpu")]
        Backend::Wgpu(ctx) => ctx.launch(
            Kernel::WeightGrad,
            &GridUniforms::new(shape.in_dim, shape.out_dim, shape.rows)?,
            &[x.wgpu_buffer()?, yg.wgpu_buffer()?, wg.wgpu_buffer()?],
            out,
        ),
    }
}

/// `xG = yG · wᵗ`. See [`cpu::input_grad`].
pub(crate) fn input_grad(
    device: &Device,
    shape: MatmulShape,
    yg: &DeviceBuffer,
    w: &DeviceBuffer,
    xg: &DeviceBuffer,
) -> FfnetResult<()> {
    let out = Extent::new(shape.rows, shape.in_dim);
    if out.is_empty() {
        return Ok(());
    }
    match device.backend() {
        Backend::Host => {
            let (yg, w) = (yg.host_read()?, w.host_read()?);
            cpu::input_grad(shape, &yg, &w, &mut xg.host_write()?[..out.len()]);
            Ok(())
        }
        #[cfg(feature = "gpu")]
        Backend::Wgpu(ctx) => ctx.launch(
            Kernel::InputGrad,
            &GridUniforms::new(shape.rows, shape.in_dim, shape.out_dim)?,
            &[yg.wgpu_buffer()?, w.wgpu_buffer()?, xg.wgpu_buffer()?],
            out,
        ),
    }
}

/// `bG[c] = Σᵣ yG[r, c]` over a `rows × cols` gradient.
pub(crate) fn bias_grad(
    device: &Device,
    extent: Extent,
    yg: &DeviceBuffer,
    bg: &DeviceBuffer,
) -> FfnetResult<()> {
    if extent.cols == 0 {
        return Ok(());
    }
    match device.backend() {
        Backend::Host => {
            let yg = yg.host_read()?;
            cpu::bias_grad(extent, &yg, &mut bg.host_write()?[..extent.cols]);
            Ok(())
        }
        #[cfg(feature = "gpu")]
        Backend::Wgpu(ctx) => ctx.launch(
            Kernel::BiasGrad,
            &GridUniforms::new(extent.rows, extent.cols, 0)?,
            &[yg.wgpu_buffer()?, bg.wgpu_buffer()?],
            extent,
        ),
    }
}

/// `y = max(x, 0)`.
pub(crate) fn relu(
    device: &Device,
    extent: Extent,
    x: &DeviceBuffer,
    y: &DeviceBuffer,
) -> FfnetResult<()> {
    elementwise(device, Unary::Relu, extent, x, y)
}

/// Masks `g` in place where `x <= 0`.
pub(crate) fn relu_grad(
    device: &Device,
    extent: Extent,
    x: &DeviceBuffer,
    g: &DeviceBuffer,
) -> FfnetResult<()> {
    elementwise(device, Unary::ReluGrad, extent, x, g)
}

#[derive(Clone, Copy)]
enum Unary {
    Relu,
    ReluGrad,
}

fn elementwise(
    device: &Device,
    op: Unary,
    extent: Extent,
    x: &DeviceBuffer,
    out: &DeviceBuffer,
) -> FfnetResult<()> {
    if extent.is_empty() {
        return Ok(());
    }
    match device.backend() {
        Backend::Host => {
            let x = x.host_read()?;
            let n = extent.len();
            let mut out = out.host_write()?;
            match op {
                Unary::Relu => cpu::relu(&x[..n], &mut out[..n]),
                Unary::ReluGrad => cpu::relu_grad(&x[..n], &mut out[..n]),
            }
            Ok(())
        }
        #[cfg(feature = "gpu")]
        Backend::Wgpu(ctx) => {
            let kernel = match op {
                Unary::Relu => Kernel::Relu,
                Unary::ReluGrad => Kernel::ReluGrad,
            };
            ctx.launch(
                kernel,
                &GridUniforms::new(extent.rows, extent.cols, 0)?,
                &[x.wgpu_buffer()?, out.wgpu_buffer()?],
                extent,
            )
        }
    }
}

/// Softmax pass 1: per-row max and partition sum into `stats` (`2 × rows`).
pub(crate) fn softmax_row_stats(
    device: &Device,
    extent: Extent,
    x: &DeviceBuffer,
    stats: &DeviceBuffer,
) -> FfnetResult<()> {
    if extent.is_empty() {
        return Ok(());
    }
    match device.backend() {
        Backend::Host => {
            let x = x.host_read()?;
            cpu::softmax_row_stats(extent, &x, &mut stats.host_write()?[..2 * extent.rows]);
            Ok(())
        }
        #[cfg(feature = "gpu")]
        Backend::Wgpu(ctx) => ctx.launch(
            Kernel::SoftmaxStats,
            &GridUniforms::new(extent.rows, extent.cols, 0)?,
            &[x.wgpu_buffer()?, stats.wgpu_buffer()?],
            extent,
        ),
    }
}

/// Softmax pass 2: normalizes `x` into `y` using the stats of pass 1.
pub(crate) fn softmax_normalize(
    device: &Device,
    extent: Extent,
    x: &DeviceBuffer,
    stats: &DeviceBuffer,
    y: &DeviceBuffer,
) -> FfnetResult<()> {
    if extent.is_empty() {
        return Ok(());
    }
    match device.backend() {
        Backend::Host => {
            let (x, stats) = (x.host_read()?, stats.host_read()?);
            cpu::softmax_normalize(extent, &x, &stats, &mut y.host_write()?[..extent.len()]);
            Ok(())
        }
        #[cfg(feature = "gpu")]
        Backend::Wgpu(ctx) => ctx.launch(
            Kernel::SoftmaxNormalize,
            &GridUniforms::new(extent.rows, extent.cols, 0)?,
            &[x.wgpu_buffer()?, stats.wgpu_buffer()?, y.wgpu_buffer()?],
            extent,
        ),
    }
}

/// `g = p - onehot(labels)`.
pub(crate) fn softmax_cross_entropy_grad(
    device: &Device,
    extent: Extent,
    p: &DeviceBuffer,
    labels: &DeviceBuffer,
    g: &DeviceBuffer,
) -> FfnetResult<()> {
    binary(device, Binary::SoftmaxCrossEntropy, extent, p, labels, g)
}

/// `g = 2 · (y - t)`.
pub(crate) fn sum_of_squares_grad(
    device: &Device,
    extent: Extent,
    y: &DeviceBuffer,
    t: &DeviceBuffer,
    g: &DeviceBuffer,
) -> FfnetResult<()> {
    binary(device, Binary::SumOfSquares, extent, y, t, g)
}

#[derive(Clone, Copy)]
enum Binary {
    SoftmaxCrossEntropy,
    SumOfSquares,
}

fn binary(
    device: &Device,
    op: Binary,
    extent: Extent,
    a: &DeviceBuffer,
    b: &DeviceBuffer,
    out: &DeviceBuffer,
) -> FfnetResult<()> {
    if extent.is_empty() {
        return Ok(());
    }
    match device.backend() {
        Backend::Host => {
            let (a, b) = (a.host_read()?, b.host_read()?);
            let n = extent.len();
            let mut out = out.host_write()?;
            match op {
                Binary::SoftmaxCrossEntropy => {
                    cpu::softmax_cross_entropy_grad(extent, &a, &b, &mut out[..n])
                }
                Binary::SumOfSquares => cpu::sum_of_squares_grad(&a[..n], &b[..n], &mut out[..n]),
            }
            Ok(())
        }
        #[cfg(feature = "gpu")]
        Backend::Wgpu(ctx) => {
            let kernel = match op {
                Binary::SoftmaxCrossEntropy => Kernel::SoftmaxCrossEntropyGrad,
                Binary::SumOfSquares => Kernel::SumOfSquaresGrad,
            };
            ctx.launch(
                kernel,
                &GridUniforms::new(extent.rows, extent.cols, 0)?,
                &[a.wgpu_buffer()?, b.wgpu_buffer()?, out.wgpu_buffer()?],
                extent,
            )
        }
    }
}

/// One Adam step over a `rows × cols` parameter and its moments.
pub(crate) fn adam_update(
    device: &Device,
    step: &AdamStep,
    extent: Extent,
    param: &DeviceBuffer,
    grad: &DeviceBuffer,
    m: &DeviceBuffer,
    v: &DeviceBuffer,
) -> FfnetResult<()> {
    if extent.is_empty() {
        return Ok(());
    }
    match device.backend() {
        Backend::Host => {
            let n = extent.len();
            let grad = grad.host_read()?;
            let (mut param, mut m, mut v) = (param.host_write()?, m.host_write()?, v.host_write()?);
            cpu::adam_update(step, &mut param[..n], &grad[..n], &mut m[..n], &mut v[..n]);
            Ok(())
        }
        #[cfg(feature = "gpu")]
        Backend::Wgpu(ctx) => ctx.launch(
            Kernel::Adam,
            &AdamUniforms::new(step, extent.rows, extent.cols)?,
            &[
                param.wgpu_buffer()?,
                grad.wgpu_buffer()?,
                m.wgpu_buffer()?,
                v.wgpu_buffer()?,
            ],
            extent,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(device: &Device, data: &[f32]) -> DeviceBuffer {
        let buffer = device.alloc(data.len()).unwrap();
        device.upload(&buffer, data).unwrap();
        buffer
    }

    #[test]
    fn test_extent() {
        let extent = Extent::new(3, 4);
        assert_eq!(extent.len(), 12);
        assert!(!extent.is_empty());
        assert!(Extent::new(0, 4).is_empty());
    }

    #[test]
    fn test_host_affine_uses_logical_extent() {
        let device = Device::host();
        let x = upload(&device, &[1.0, 2.0]);
        let w = upload(&device, &[3.0, 4.0]);
        let b = upload(&device, &[0.5]);
        // Output buffer larger than the logical extent keeps its tail.
        let y = upload(&device, &[9.0, 9.0, 9.0]);
        let shape = MatmulShape {
            rows: 1,
            in_dim: 2,
            out_dim: 1,
        };
        affine(&device, shape, &x, &w, &b, &y).unwrap();
        assert_eq!(device.download(&y, 3).unwrap(), vec![11.5, 9.0, 9.0]);
    }

    #[test]
    fn test_empty_extent_is_skipped() {
        let device = Device::host();
        let x = upload(&device, &[1.0]);
        let y = upload(&device, &[7.0]);
        relu(&device, Extent::new(0, 1), &x, &y).unwrap();
        assert_eq!(device.download(&y, 1).unwrap(), vec![7.0]);
    }

    #[test]
    fn test_aliased_operands_rejected() {
        let device = Device::host();
        let x = upload(&device, &[-1.0, 2.0]);
        assert!(relu_grad(&device, Extent::new(1, 2), &x, &x).is_err());
    }
}
