//! GPU backend for ffnet using wgpu.
//!
//! This module is only available when the `gpu` feature is enabled. Most
//! users only need [`WgpuOptions`] to pick an adapter and then work through
//! [`Device::wgpu`](crate::Device::wgpu).
//!
//! # Example
//!
//! ```rust,no_run
//! use ffnet::gpu::WgpuOptions;
//! use ffnet::{Device, Tensor};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let device = Device::wgpu(WgpuOptions::default())?;
//!
//! let mut tensor = Tensor::from_slice(&device, 2, 2, &[1.0, 2.0, 3.0, 4.0])?;
//! tensor.as_mut_slice().fill(0.0);
//! tensor.pull()?;
//! assert_eq!(tensor.as_slice(), &[1.0, 2.0, 3.0, 4.0]);
//! # Ok(())
//! # }
//! ```
//!
//! # Execution Model
//!
//! All kernels and transfers go through one wgpu queue in program order.
//! Launches return as soon as their command buffer is submitted; only
//! `push`, `pull` and `download` block on the device.
//!
//! # Public API
//!
//! - [`WgpuBackend`] - adapter, device and queue selection
//! - [`Kernel`] - the kernel catalog with entry points and work partitioning
//! - [`GridUniforms`], [`AdamUniforms`] - uniform buffer layouts
//! - [`shaders`] - WGSL sources

mod backend;
mod context;
pub(crate) mod memory;
mod pipeline;
pub mod shaders;
mod uniforms;

pub use backend::{PowerPreference, WgpuBackend, WgpuOptions};
pub use context::GpuContext;
pub use pipeline::{workgroup_count, Dispatch, Kernel, KernelPipelines};
pub use uniforms::{AdamUniforms, GridUniforms};
