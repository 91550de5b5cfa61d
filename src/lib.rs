//! # ffnet - Feed-Forward Network Training on the GPU
//!
//! A minimal training engine: device-resident tensors, four composable
//! layer types, a per-parameter Adam optimizer, and a network container
//! that drives forward, backward and update passes.
//!
//! ## Architecture
//! - Every tensor has a host copy and a device copy; `push`/`pull` are the
//!   only reconciliation points
//! - Device buffers grow to a high-water mark and are never shrunk
//! - Each kernel runs one invocation per output element (per row for
//!   softmax, per column for the bias gradient)
//! - Two backends: wgpu compute shaders (feature `gpu`) and a rayon host
//!   reference with identical numerics
//!
//! ## Usage
//! ```rust
//! use ffnet::{Device, Network, Tensor, TrainConfig};
//!
//! # fn main() -> ffnet::FfnetResult<()> {
//! let device = Device::host();
//! let mut net = Network::new(&device, TrainConfig::seeded(1))?;
//! net.add_fully_connected(2, 4)?;
//! net.add_relu_fully_connected(4, 1)?;
//! net.add_sum_of_squares()?;
//!
//! let x = Tensor::from_slice(&device, 2, 1, &[0.5, -0.5])?;
//! let target = Tensor::from_slice(&device, 1, 1, &[1.0])?;
//! for _ in 0..10 {
//!     net.forward(&x)?;
//!     net.backward(&target)?;
//!     net.update_weights(0.01)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod config;
pub mod device;
pub mod error;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod kernels;
pub mod layer;
pub mod loss;
pub mod network;
pub mod optimizer;
pub mod tensor;

// Re-exports
pub use buffer::{DeviceBuffer, MAX_BUFFER_BYTES, MAX_BUFFER_ELEMENTS};
pub use config::{
    ConfigError, TrainConfig, ADAM_EPSILON, DEFAULT_BETA1, DEFAULT_BETA2, EPSILON, SOFTMAX_EPSILON,
};
pub use device::{Device, DeviceKind};
pub use error::{FfnetError, FfnetResult};
pub use kernels::{Extent, MatmulShape, COLUMN_BLOCK, ELEMENT_TILE, SOFTMAX_ROWS_PER_BLOCK};
pub use layer::{FullyConnected, Layer, ReluFullyConnected, Softmax, SumOfSquares};
pub use network::Network;
pub use optimizer::{AdamMoments, AdamStep, DecaySchedule};
pub use tensor::Tensor;

#[cfg(feature = "gpu")]
pub use gpu::{WgpuBackend, WgpuOptions};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
