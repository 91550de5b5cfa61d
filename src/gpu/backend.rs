//! GPU backend initialization and device management.
//!
//! This module provides [`WgpuBackend`], which owns the wgpu adapter, device
//! and the single queue every ffnet kernel is submitted to.

use crate::error::{FfnetError, FfnetResult};
use std::sync::Arc;

/// Power preference for GPU adapter selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerPreference {
    /// Prefer low power consumption (integrated GPU).
    LowPower,
    /// Prefer high performance (discrete GPU).
    #[default]
    HighPerformance,
}

impl From<PowerPreference> for wgpu::PowerPreference {
    fn from(pref: PowerPreference) -> Self {
        match pref {
            PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
            PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
        }
    }
}

/// Options for initializing the wgpu backend.
#[derive(Debug, Clone)]
pub struct WgpuOptions {
    /// Power preference for adapter selection.
    pub power_preference: PowerPreference,
    /// Backend mask (Vulkan, DX12, Metal, ...). `None` lets wgpu pick.
    pub backend: Option<wgpu::Backends>,
    /// Force a specific adapter by name (case-insensitive substring match).
    pub force_adapter_name: Option<String>,
    /// Request the software fallback adapter.
    pub force_fallback_adapter: bool,
    /// Required limits (minimum).
    pub required_limits: wgpu::Limits,
}

impl Default for WgpuOptions {
    fn default() -> Self {
        Self {
            power_preference: PowerPreference::HighPerformance,
            backend: None,
            force_adapter_name: None,
            force_fallback_adapter: false,
            required_limits: wgpu::Limits::default(),
        }
    }
}

impl WgpuOptions {
    /// Creates options for large training workloads.
    ///
    /// Raises the storage binding limit to 1GB so wide layers and large
    /// batches fit in a single buffer.
    pub fn compute() -> Self {
        Self {
            required_limits: wgpu::Limits {
                max_storage_buffer_binding_size: 1 << 30, // 1GB
                max_buffer_size: 1 << 30,
                ..wgpu::Limits::default()
            },
            ..Default::default()
        }
    }

    /// Creates options for integrated GPUs and constrained drivers.
    pub fn low_power() -> Self {
        Self {
            power_preference: PowerPreference::LowPower,
            required_limits: wgpu::Limits::downlevel_defaults(),
            ..Default::default()
        }
    }

    /// Creates options that select the software fallback adapter.
    ///
    /// Useful on CI machines without a physical GPU.
    pub fn fallback() -> Self {
        Self {
            force_fallback_adapter: true,
            required_limits: wgpu::Limits::downlevel_defaults(),
            ..Default::default()
        }
    }
}

/// The wgpu device, queue and adapter info behind a GPU [`Device`](crate::Device).
///
/// # Example
///
/// ```rust,ignore
/// use ffnet::gpu::{WgpuBackend, WgpuOptions};
///
/// let backend = WgpuBackend::init(WgpuOptions::default())?;
/// println!("Using GPU: {}", backend.adapter_info().name);
/// ```
pub struct WgpuBackend {
    /// The wgpu instance.
    pub instance: wgpu::Instance,
    /// The selected adapter.
    pub adapter: wgpu::Adapter,
    /// The wgpu device for resource creation.
    pub device: Arc<wgpu::Device>,
    /// The queue all kernels and transfers are submitted to.
    pub queue: Arc<wgpu::Queue>,
    adapter_info: wgpu::AdapterInfo,
    limits: wgpu::Limits,
}

impl WgpuBackend {
    /// Initializes the GPU backend with the given options.
    ///
    /// # Errors
    ///
    /// - `FfnetError::AdapterNotFound` - No suitable GPU adapter found.
    /// - `FfnetError::UnsupportedLimits` - Adapter is below the required limits.
    /// - `FfnetError::DeviceRequestFailed` - Failed to create the device.
    pub fn init(options: WgpuOptions) -> FfnetResult<Self> {
        let backends = options.backend.unwrap_or(wgpu::Backends::all());
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let adapter = pollster::block_on(Self::request_adapter(&instance, &options, backends))?;
        let adapter_info = adapter.get_info();

        log::info!(
            "Selected GPU adapter: {} ({:?}, {:?})",
            adapter_info.name,
            adapter_info.backend,
            adapter_info.device_type
        );

        Self::check_limits(&adapter.limits(), &options.required_limits)?;

        let (device, queue) = pollster::block_on(Self::request_device(&adapter, &options))?;
        let limits = device.limits();

        Ok(Self {
            instance,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_info,
            limits,
        })
    }

    async fn request_adapter(
        instance: &wgpu::Instance,
        options: &WgpuOptions,
        backends: wgpu::Backends,
    ) -> FfnetResult<wgpu::Adapter> {
        if let Some(ref name_filter) = options.force_adapter_name {
            let needle = name_filter.to_lowercase();
            return instance
                .enumerate_adapters(backends)
                .into_iter()
                .find(|a| a.get_info().name.to_lowercase().contains(&needle))
                .ok_or_else(|| {
                    FfnetError::adapter_not_found(format!(
                        "No adapter matching '{}' found",
                        name_filter
                    ))
                });
        }

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: options.power_preference.into(),
                compatible_surface: None,
                force_fallback_adapter: options.force_fallback_adapter,
            })
            .await;

        match adapter {
            Some(a) => Ok(a),
            None => instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::None,
                    compatible_surface: None,
                    force_fallback_adapter: options.force_fallback_adapter,
                })
                .await
                .ok_or_else(|| {
                    FfnetError::adapter_not_found(
                        "No GPU adapters available. Ensure GPU drivers are installed.",
                    )
                }),
        }
    }

    async fn request_device(
        adapter: &wgpu::Adapter,
        options: &WgpuOptions,
    ) -> FfnetResult<(wgpu::Device, wgpu::Queue)> {
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("ffnet device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: options.required_limits.clone(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        Ok((device, queue))
    }

    fn check_limits(adapter: &wgpu::Limits, required: &wgpu::Limits) -> FfnetResult<()> {
        if adapter.max_storage_buffer_binding_size < required.max_storage_buffer_binding_size {
            return Err(FfnetError::unsupported_limits(format!(
                "max_storage_buffer_binding_size: adapter has {}, required {}",
                adapter.max_storage_buffer_binding_size, required.max_storage_buffer_binding_size
            )));
        }

        if adapter.max_buffer_size < required.max_buffer_size {
            return Err(FfnetError::unsupported_limits(format!(
                "max_buffer_size: adapter has {}, required {}",
                adapter.max_buffer_size, required.max_buffer_size
            )));
        }

        if adapter.max_compute_invocations_per_workgroup < 256 {
            return Err(FfnetError::unsupported_limits(format!(
                "max_compute_invocations_per_workgroup: adapter has {}, kernels use 256",
                adapter.max_compute_invocations_per_workgroup
            )));
        }

        Ok(())
    }

    /// Returns information about the selected adapter.
    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    /// Returns the device limits.
    pub fn limits(&self) -> &wgpu::Limits {
        &self.limits
    }

    /// Returns the maximum storage buffer binding size in bytes.
    pub fn max_storage_buffer_size(&self) -> u64 {
        (self.limits.max_storage_buffer_binding_size as u64).min(self.limits.max_buffer_size)
    }

    /// Returns whether a buffer size (in bytes) can be bound as storage.
    pub fn supports_buffer_size(&self, size_bytes: u64) -> bool {
        size_bytes <= self.max_storage_buffer_size()
    }

    /// Blocks until all submitted work has completed.
    pub fn poll(&self) {
        self.device.poll(wgpu::Maintain::Wait);
    }

    /// Returns a reference to the device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Returns a reference to the queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

impl std::fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("adapter", &self.adapter_info.name)
            .field("backend", &self.adapter_info.backend)
            .field("device_type", &self.adapter_info.device_type)
            .field(
                "max_storage_buffer",
                &self.limits.max_storage_buffer_binding_size,
            )
            .finish()
    }
}
