//! Device allocation and blocking host transfers.
//!
//! Every transfer is submitted to the backend's single queue and then waits
//! for the device to go idle, so a returned `upload` or `download` has
//! observed every kernel launched before it.

use crate::error::{FfnetError, FfnetResult};
use crate::gpu::WgpuBackend;

/// Allocates a storage buffer of `capacity` elements (at least one).
///
/// # Errors
///
/// - `FfnetError::UnsupportedLimits` if the buffer cannot be bound as storage.
/// - `FfnetError::Allocation` if the device runs out of memory.
pub(crate) fn alloc(backend: &WgpuBackend, capacity: usize) -> FfnetResult<wgpu::Buffer> {
    let size_bytes = (capacity.max(1) * std::mem::size_of::<f32>()) as u64;

    if !backend.supports_buffer_size(size_bytes) {
        return Err(FfnetError::unsupported_limits(format!(
            "buffer of {} bytes exceeds max storage binding size ({} bytes)",
            size_bytes,
            backend.max_storage_buffer_size()
        )));
    }

    let device = backend.device();
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("ffnet tensor"),
        size: size_bytes,
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(FfnetError::Allocation {
            bytes: size_bytes,
            message: err.to_string(),
        });
    }

    Ok(buffer)
}

/// Copies `data` into the front of `buffer` and waits for the copy to land.
pub(crate) fn upload(backend: &WgpuBackend, buffer: &wgpu::Buffer, data: &[f32]) -> FfnetResult<()> {
    if data.is_empty() {
        return Ok(());
    }
    let size_bytes = std::mem::size_of_val(data) as u64;
    if size_bytes > buffer.size() {
        return Err(FfnetError::buffer(format!(
            "upload of {} bytes into a {} byte buffer",
            size_bytes,
            buffer.size()
        )));
    }

    let device = backend.device();
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    backend.queue().write_buffer(buffer, 0, bytemuck::cast_slice(data));
    backend.queue().submit(None);
    backend.poll();
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(FfnetError::buffer(format!("upload failed: {}", err)));
    }
    Ok(())
}

/// Reads the first `len` elements of `buffer` back to the host.
///
/// This operation is synchronous and blocks until every previously
/// submitted kernel and the copy itself have completed.
pub(crate) fn download(backend: &WgpuBackend, buffer: &wgpu::Buffer, len: usize) -> FfnetResult<Vec<f32>> {
    if len == 0 {
        return Ok(Vec::new());
    }
    let size_bytes = (len * std::mem::size_of::<f32>()) as u64;
    if size_bytes > buffer.size() {
        return Err(FfnetError::buffer(format!(
            "download of {} bytes from a {} byte buffer",
            size_bytes,
            buffer.size()
        )));
    }

    let device = backend.device();
    let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("ffnet staging (download)"),
        size: size_bytes,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("ffnet download encoder"),
    });
    encoder.copy_buffer_to_buffer(buffer, 0, &staging_buffer, 0, size_bytes);
    backend.queue().submit(std::iter::once(encoder.finish()));

    let buffer_slice = staging_buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        // The receiver outlives the poll below; a failed send only means it was dropped.
        let _ = tx.send(result);
    });

    backend.poll();

    rx.recv()
        .map_err(|e| FfnetError::buffer(format!("Failed to receive map result: {}", e)))??;

    let data = {
        let mapped = buffer_slice.get_mapped_range();
        bytemuck::cast_slice(&mapped).to_vec()
    };
    staging_buffer.unmap();

    Ok(data)
}
