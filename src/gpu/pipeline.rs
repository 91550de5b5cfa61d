//! Compute pipeline management.
//!
//! Every [`Kernel`] is compiled into its own pipeline when a GPU
//! [`Device`](crate::Device) is created, so launches never compile shaders
//! on the training path.

use crate::gpu::shaders;
use crate::kernels::{Extent, COLUMN_BLOCK, ELEMENT_TILE, SOFTMAX_ROWS_PER_BLOCK};

/// How a kernel maps its output extent onto workgroups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// 2-D grid of `ELEMENT_TILE × ELEMENT_TILE` tiles, one invocation per element.
    Tiles,
    /// One invocation per column, `COLUMN_BLOCK` columns per workgroup.
    Columns,
    /// One invocation per row, `SOFTMAX_ROWS_PER_BLOCK` rows per workgroup.
    Rows,
}

/// The compute kernels of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    /// Affine transform.
    Affine,
    /// Weight gradient.
    WeightGrad,
    /// Input gradient.
    InputGrad,
    /// Bias gradient reduction.
    BiasGrad,
    /// ReLU activation.
    Relu,
    /// ReLU gradient mask.
    ReluGrad,
    /// Softmax pass 1.
    SoftmaxStats,
    /// Softmax pass 2.
    SoftmaxNormalize,
    /// Softmax cross-entropy gradient.
    SoftmaxCrossEntropyGrad,
    /// Sum-of-squares gradient.
    SumOfSquaresGrad,
    /// Adam parameter update.
    Adam,
}

impl Kernel {
    /// All kernels, in pipeline index order.
    pub const ALL: [Kernel; 11] = [
        Kernel::Affine,
        Kernel::WeightGrad,
        Kernel::InputGrad,
        Kernel::BiasGrad,
        Kernel::Relu,
        Kernel::ReluGrad,
        Kernel::SoftmaxStats,
        Kernel::SoftmaxNormalize,
        Kernel::SoftmaxCrossEntropyGrad,
        Kernel::SumOfSquaresGrad,
        Kernel::Adam,
    ];

    /// Returns the WGSL entry point name.
    pub const fn entry_point(self) -> &'static str {
        match self {
            Kernel::Affine => "affine_main",
            Kernel::WeightGrad => "weight_grad_main",
            Kernel::InputGrad => "input_grad_main",
            Kernel::BiasGrad => "bias_grad_main",
            Kernel::Relu => "relu_main",
            Kernel::ReluGrad => "relu_grad_main",
            Kernel::SoftmaxStats => "softmax_stats_main",
            Kernel::SoftmaxNormalize => "softmax_normalize_main",
            Kernel::SoftmaxCrossEntropyGrad => "softmax_ce_grad_main",
            Kernel::SumOfSquaresGrad => "sum_of_squares_grad_main",
            Kernel::Adam => "adam_main",
        }
    }

    /// Returns the WGSL source of the kernel's shader module.
    pub const fn source(self) -> &'static str {
        match self {
            Kernel::Affine => shaders::AFFINE_SHADER,
            Kernel::WeightGrad => shaders::WEIGHT_GRAD_SHADER,
            Kernel::InputGrad => shaders::INPUT_GRAD_SHADER,
            Kernel::BiasGrad => shaders::BIAS_GRAD_SHADER,
            Kernel::Relu => shaders::RELU_SHADER,
            Kernel::ReluGrad => shaders::RELU_GRAD_SHADER,
            Kernel::SoftmaxStats => shaders::SOFTMAX_STATS_SHADER,
            Kernel::SoftmaxNormalize => shaders::SOFTMAX_NORMALIZE_SHADER,
            Kernel::SoftmaxCrossEntropyGrad => shaders::SOFTMAX_CE_GRAD_SHADER,
            Kernel::SumOfSquaresGrad => shaders::SUM_OF_SQUARES_GRAD_SHADER,
            Kernel::Adam => shaders::ADAM_SHADER,
        }
    }

    /// Read-only flag of each storage binding, starting at `@binding(1)`.
    pub const fn storage_access(self) -> &'static [bool] {
        match self {
            Kernel::Affine => &[true, true, true, false],
            Kernel::WeightGrad | Kernel::InputGrad => &[true, true, false],
            Kernel::BiasGrad | Kernel::Relu | Kernel::ReluGrad | Kernel::SoftmaxStats => {
                &[true, false]
            }
            Kernel::SoftmaxNormalize
            | Kernel::SoftmaxCrossEntropyGrad
            | Kernel::SumOfSquaresGrad => &[true, true, false],
            Kernel::Adam => &[false, true, false, false],
        }
    }

    /// Returns the work partitioning of the kernel.
    pub const fn dispatch(self) -> Dispatch {
        match self {
            Kernel::BiasGrad => Dispatch::Columns,
            Kernel::SoftmaxStats | Kernel::SoftmaxNormalize => Dispatch::Rows,
            _ => Dispatch::Tiles,
        }
    }

    /// Returns the workgroup counts covering `extent`.
    pub fn workgroups(self, extent: Extent) -> [u32; 3] {
        match self.dispatch() {
            Dispatch::Tiles => [
                workgroup_count(extent.cols, ELEMENT_TILE),
                workgroup_count(extent.rows, ELEMENT_TILE),
                1,
            ],
            Dispatch::Columns => [workgroup_count(extent.cols, COLUMN_BLOCK), 1, 1],
            Dispatch::Rows => [workgroup_count(extent.rows, SOFTMAX_ROWS_PER_BLOCK), 1, 1],
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// A compiled kernel: pipeline plus the layout its bind groups are built against.
pub(crate) struct CompiledKernel {
    pub(crate) pipeline: wgpu::ComputePipeline,
    pub(crate) layout: wgpu::BindGroupLayout,
}

/// Compiled pipelines for every [`Kernel`].
pub struct KernelPipelines {
    compiled: Vec<CompiledKernel>,
}

impl KernelPipelines {
    /// Compiles all kernels on `device`.
    pub fn new(device: &wgpu::Device) -> Self {
        let compiled = Kernel::ALL
            .iter()
            .map(|&kernel| Self::compile(device, kernel))
            .collect();
        Self { compiled }
    }

    fn compile(device: &wgpu::Device, kernel: Kernel) -> CompiledKernel {
        let name = kernel.entry_point();
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(name),
            source: wgpu::ShaderSource::Wgsl(kernel.source().into()),
        });

        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        entries.extend(kernel.storage_access().iter().enumerate().map(|(i, &read_only)| {
            wgpu::BindGroupLayoutEntry {
                binding: i as u32 + 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }
        }));

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(name),
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(name),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(name),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some(name),
            compilation_options: Default::default(),
            cache: None,
        });

        CompiledKernel { pipeline, layout }
    }

    pub(crate) fn get(&self, kernel: Kernel) -> &CompiledKernel {
        &self.compiled[kernel.index()]
    }
}

impl std::fmt::Debug for KernelPipelines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelPipelines")
            .field("kernels", &self.compiled.len())
            .finish()
    }
}

/// Computes the workgroup count for a given number of elements.
#[inline]
pub fn workgroup_count(total: usize, workgroup_size: usize) -> u32 {
    total.div_ceil(workgroup_size) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workgroup_count() {
        assert_eq!(workgroup_count(0, 64), 0);
        assert_eq!(workgroup_count(1, 64), 1);
        assert_eq!(workgroup_count(64, 64), 1);
        assert_eq!(workgroup_count(65, 64), 2);
        assert_eq!(workgroup_count(129, 64), 3);
    }

    #[test]
    fn test_kernel_index_matches_all() {
        for (i, kernel) in Kernel::ALL.iter().enumerate() {
            assert_eq!(kernel.index(), i);
        }
    }

    #[test]
    fn test_tile_workgroups() {
        let extent = Extent { rows: 64, cols: 33 };
        assert_eq!(Kernel::Affine.workgroups(extent), [3, 4, 1]);
        assert_eq!(Kernel::BiasGrad.workgroups(extent), [1, 1, 1]);
        assert_eq!(Kernel::SoftmaxStats.workgroups(Extent { rows: 65, cols: 10 }), [2, 1, 1]);
    }

    #[test]
    fn test_single_writable_binding_except_adam() {
        for kernel in Kernel::ALL {
            let writable = kernel.storage_access().iter().filter(|r| !**r).count();
            if kernel == Kernel::Adam {
                assert_eq!(writable, 3);
            } else {
                assert_eq!(writable, 1, "{}", kernel.entry_point());
            }
        }
    }
}
