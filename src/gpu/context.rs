//! Kernel launch on the wgpu backend.

use bytemuck::Pod;
use wgpu::util::DeviceExt;

use crate::error::{FfnetError, FfnetResult};
use crate::gpu::pipeline::{Kernel, KernelPipelines};
use crate::gpu::{WgpuBackend, WgpuOptions};
use crate::kernels::Extent;

/// A wgpu backend together with its compiled kernels.
pub struct GpuContext {
    backend: WgpuBackend,
    pipelines: KernelPipelines,
}

impl GpuContext {
    /// Initializes the backend and compiles every kernel.
    pub fn new(options: WgpuOptions) -> FfnetResult<Self> {
        let backend = WgpuBackend::init(options)?;

        backend.device().push_error_scope(wgpu::ErrorFilter::Validation);
        let pipelines = KernelPipelines::new(backend.device());
        if let Some(err) = pollster::block_on(backend.device().pop_error_scope()) {
            return Err(FfnetError::launch("pipeline compilation", err.to_string()));
        }

        log::info!("Compiled {} compute kernels", Kernel::ALL.len());
        Ok(Self { backend, pipelines })
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &WgpuBackend {
        &self.backend
    }

    /// Launches `kernel` over `extent` and submits it to the queue.
    ///
    /// `buffers` are bound at `@binding(1..)` in order. The launch does not
    /// wait for the kernel to finish; later launches and transfers on the same
    /// queue observe its writes.
    ///
    /// # Errors
    ///
    /// - `FfnetError::Launch` on a wrong buffer count or a validation error.
    /// - `FfnetError::UnsupportedLimits` if the grid exceeds the per-dimension
    ///   workgroup limit.
    pub(crate) fn launch<U: Pod>(
        &self,
        kernel: Kernel,
        uniforms: &U,
        buffers: &[&wgpu::Buffer],
        extent: Extent,
    ) -> FfnetResult<()> {
        let name = kernel.entry_point();
        let expected = kernel.storage_access().len();
        if buffers.len() != expected {
            return Err(FfnetError::launch(
                name,
                format!("expected {} storage buffers, got {}", expected, buffers.len()),
            ));
        }

        let workgroups = kernel.workgroups(extent);
        let max = self.backend.limits().max_compute_workgroups_per_dimension;
        if workgroups.iter().any(|&n| n > max) {
            return Err(FfnetError::unsupported_limits(format!(
                "{} needs {:?} workgroups, limit is {} per dimension",
                name, workgroups, max
            )));
        }
        if workgroups.contains(&0) {
            return Ok(());
        }

        log::trace!("launch {} {:?} over {}x{}", name, workgroups, extent.rows, extent.cols);

        let device = self.backend.device();
        let compiled = self.pipelines.get(kernel);
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(name),
            contents: bytemuck::bytes_of(uniforms),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let mut entries = Vec::with_capacity(buffers.len() + 1);
        entries.push(wgpu::BindGroupEntry {
            binding: 0,
            resource: uniform_buffer.as_entire_binding(),
        });
        entries.extend(buffers.iter().enumerate().map(|(i, buffer)| wgpu::BindGroupEntry {
            binding: i as u32 + 1,
            resource: buffer.as_entire_binding(),
        }));

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(name),
            layout: &compiled.layout,
            entries: &entries,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(name),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(name),
                timestamp_writes: None,
            });
            pass.set_pipeline(&compiled.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(workgroups[0], workgroups[1], workgroups[2]);
        }
        self.backend.queue().submit(std::iter::once(encoder.finish()));

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(FfnetError::launch(name, err.to_string()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("backend", &self.backend)
            .field("pipelines", &self.pipelines)
            .finish()
    }
}
