//! Unified error types for ffnet.
//!
//! This module provides [`FfnetError`], a single error type covering shape
//! preconditions, layer call-order violations, and host or GPU backend
//! failures. It uses the `thiserror` crate for ergonomic error handling.
//!
//! Every variant except a `None` result from [`Network::forward`](crate::Network::forward)
//! is unrecoverable for the training run: after a device or shape error the
//! network state is undefined and the driver is expected to stop.
//!
//! # Example
//!
//! ```rust
//! use ffnet::FfnetError;
//!
//! fn check_width(expected: usize, got: usize) -> Result<(), FfnetError> {
//!     if expected != got {
//!         return Err(FfnetError::shape_mismatch(&[expected], &[got]));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_width(4, 4).is_ok());
//! assert!(check_width(4, 5).is_err());
//! ```

use thiserror::Error;

use crate::config::ConfigError;

/// Unified error type for ffnet operations.
///
/// GPU-specific variants are only available when the `gpu` feature is enabled.
#[derive(Error, Debug)]
pub enum FfnetError {
    /// Shape mismatch between expected and actual tensor dimensions.
    ///
    /// Raised when an input width, gradient shape, label count or target
    /// shape does not match what a layer expects.
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Expected dimensions.
        expected: Vec<usize>,
        /// Dimensions actually received.
        got: Vec<usize>,
    },

    /// `backward` was called on a layer that has not seen a `forward` pass.
    #[error("Backward called on {layer} before any forward pass")]
    BackwardBeforeForward {
        /// Layer name.
        layer: &'static str,
    },

    /// The tensor cached by a forward pass was dropped or reset before the
    /// matching backward pass.
    #[error("Forward input of {layer} was dropped or reset before backward")]
    StaleInput {
        /// Layer name.
        layer: &'static str,
    },

    /// A layer past the first position produced no input gradient.
    #[error("Layer {index} produced no input gradient for the preceding layer")]
    MissingGradient {
        /// Position of the layer in the network.
        index: usize,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Integer overflow in size calculations.
    #[error("Integer overflow: {0}")]
    Overflow(String),

    /// A single allocation exceeds the per-buffer limit.
    #[error("Allocation of {requested} elements exceeds limit of {limit}")]
    AllocationTooLarge {
        /// Requested element count.
        requested: usize,
        /// Maximum element count.
        limit: usize,
    },

    /// Tensors or buffers from different devices were combined.
    #[error("Device mismatch: {0}")]
    DeviceMismatch(String),

    /// The host reference backend could not access a buffer.
    #[error("Host buffer error: {0}")]
    HostBuffer(String),

    /// GPU device lost or reported an uncaptured error.
    #[cfg(feature = "gpu")]
    #[error("GPU device error: {0}")]
    DeviceError(#[from] wgpu::Error),

    /// GPU device request failed.
    #[cfg(feature = "gpu")]
    #[error("Failed to create GPU device: {0}")]
    DeviceRequestFailed(#[from] wgpu::RequestDeviceError),

    /// No suitable GPU adapter was found.
    #[cfg(feature = "gpu")]
    #[error("Failed to find suitable GPU adapter: {0}")]
    AdapterNotFound(String),

    /// GPU buffer mapping failed.
    #[cfg(feature = "gpu")]
    #[error("Buffer async error: {0}")]
    BufferAsync(#[from] wgpu::BufferAsyncError),

    /// GPU hardware doesn't support the required limits.
    #[cfg(feature = "gpu")]
    #[error("Unsupported GPU limits: {0}")]
    UnsupportedLimits(String),

    /// Upload or download failed.
    #[cfg(feature = "gpu")]
    #[error("Buffer operation failed: {0}")]
    BufferError(String),

    /// Device memory allocation failed.
    #[cfg(feature = "gpu")]
    #[error("Device allocation of {bytes} bytes failed: {message}")]
    Allocation {
        /// Requested size in bytes.
        bytes: u64,
        /// Message captured from the device error scope.
        message: String,
    },

    /// A kernel launch was rejected by the device.
    #[cfg(feature = "gpu")]
    #[error("Kernel {kernel} failed to launch: {message}")]
    Launch {
        /// Kernel entry point.
        kernel: &'static str,
        /// Message captured from the device error scope.
        message: String,
    },
}

/// Result type alias for ffnet operations.
pub type FfnetResult<T> = Result<T, FfnetError>;

impl FfnetError {
    /// Creates a shape mismatch error.
    pub fn shape_mismatch(expected: &[usize], got: &[usize]) -> Self {
        FfnetError::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }

    /// Creates an overflow error.
    pub fn overflow<S: Into<String>>(msg: S) -> Self {
        FfnetError::Overflow(msg.into())
    }

    /// Creates a device mismatch error.
    pub fn device_mismatch<S: Into<String>>(msg: S) -> Self {
        FfnetError::DeviceMismatch(msg.into())
    }

    /// Creates a host buffer error.
    pub fn host_buffer<S: Into<String>>(msg: S) -> Self {
        FfnetError::HostBuffer(msg.into())
    }

    /// Creates a GPU buffer error.
    #[cfg(feature = "gpu")]
    pub fn buffer<S: Into<String>>(msg: S) -> Self {
        FfnetError::BufferError(msg.into())
    }

    /// Creates a GPU unsupported limits error.
    #[cfg(feature = "gpu")]
    pub fn unsupported_limits<S: Into<String>>(msg: S) -> Self {
        FfnetError::UnsupportedLimits(msg.into())
    }

    /// Creates an adapter not found error.
    #[cfg(feature = "gpu")]
    pub fn adapter_not_found<S: Into<String>>(msg: S) -> Self {
        FfnetError::AdapterNotFound(msg.into())
    }

    /// Creates a kernel launch error.
    #[cfg(feature = "gpu")]
    pub fn launch<S: Into<String>>(kernel: &'static str, msg: S) -> Self {
        FfnetError::Launch {
            kernel,
            message: msg.into(),
        }
    }

    /// Returns true if this is a shape-related precondition failure.
    pub fn is_shape_error(&self) -> bool {
        matches!(self, FfnetError::ShapeMismatch { .. })
    }

    /// Returns true if this error originated in a device backend.
    pub fn is_device_error(&self) -> bool {
        #[cfg(feature = "gpu")]
        {
            if matches!(
                self,
                FfnetError::DeviceError(_)
                    | FfnetError::DeviceRequestFailed(_)
                    | FfnetError::AdapterNotFound(_)
                    | FfnetError::BufferAsync(_)
                    | FfnetError::UnsupportedLimits(_)
                    | FfnetError::BufferError(_)
                    | FfnetError::Allocation { .. }
                    | FfnetError::Launch { .. }
            ) {
                return true;
            }
        }
        matches!(self, FfnetError::HostBuffer(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_display() {
        let err = FfnetError::shape_mismatch(&[8, 4], &[8, 5]);
        assert!(err.is_shape_error());
        assert_eq!(err.to_string(), "Shape mismatch: expected [8, 4], got [8, 5]");
    }

    #[test]
    fn test_backward_before_forward_display() {
        let err = FfnetError::BackwardBeforeForward {
            layer: "FullyConnected",
        };
        assert!(err.to_string().contains("FullyConnected"));
        assert!(!err.is_device_error());
    }

    #[test]
    fn test_config_conversion() {
        let err: FfnetError = ConfigError::InvalidBeta("beta1", 1.5).into();
        assert!(matches!(err, FfnetError::Config(_)));
    }

    #[test]
    fn test_host_buffer_is_device_error() {
        assert!(FfnetError::host_buffer("poisoned").is_device_error());
    }

    #[cfg(feature = "gpu")]
    #[test]
    fn test_launch_display() {
        let err = FfnetError::launch("affine_main", "invalid binding");
        assert!(err.is_device_error());
        assert_eq!(
            err.to_string(),
            "Kernel affine_main failed to launch: invalid binding"
        );
    }
}
