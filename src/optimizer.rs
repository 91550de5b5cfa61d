//! Adam optimizer state.
//!
//! The optimizer is split three ways:
//!
//! - [`DecaySchedule`] - the two running decay powers `β1ᵗ`, `β2ᵗ`, owned by
//!   the network and advanced once per training step.
//! - [`AdamStep`] - the scalars of one update, handed to every layer.
//! - [`AdamMoments`] - the per-parameter `m`/`v` accumulators, owned by the
//!   layer next to the parameter they track.
//!
//! The update rule applied element-wise is:
//!
//! ```text
//! m = β1·m + (1−β1)·g
//! v = β2·v + (1−β2)·g²
//! m̂ = m / (1−β1ᵗ)
//! v̂ = v / (1−β2ᵗ)
//! param -= lr · m̂ / (sqrt(v̂) + ε)
//! ```

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::TrainConfig;
use crate::device::Device;
use crate::error::{FfnetError, FfnetResult};
use crate::kernels;
use crate::tensor::Tensor;

/// Scalars of one Adam update.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AdamStep {
    /// Learning rate.
    pub learning_rate: f32,
    /// First moment decay.
    pub beta1: f32,
    /// Second moment decay.
    pub beta2: f32,
    /// Running power of `beta1` at this step.
    pub beta1_t: f32,
    /// Running power of `beta2` at this step.
    pub beta2_t: f32,
    /// Denominator epsilon.
    pub epsilon: f32,
}

/// Running decay powers shared by every layer of a network.
///
/// Both powers start at their rate (`β1ᵗ = β1` at the first step) and are
/// multiplied by it after every completed update.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DecaySchedule {
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    beta1_t: f32,
    beta2_t: f32,
    steps: u64,
}

impl DecaySchedule {
    /// Creates a schedule at step one.
    pub fn new(config: &TrainConfig) -> Self {
        Self {
            beta1: config.beta1,
            beta2: config.beta2,
            epsilon: config.epsilon,
            beta1_t: config.beta1,
            beta2_t: config.beta2,
            steps: 0,
        }
    }

    /// Returns the update scalars for the current step.
    pub fn step(&self, learning_rate: f32) -> AdamStep {
        AdamStep {
            learning_rate,
            beta1: self.beta1,
            beta2: self.beta2,
            beta1_t: self.beta1_t,
            beta2_t: self.beta2_t,
            epsilon: self.epsilon,
        }
    }

    /// Advances both decay powers by one step.
    pub fn advance(&mut self) {
        self.beta1_t *= self.beta1;
        self.beta2_t *= self.beta2;
        self.steps += 1;
    }

    /// Returns the current `(β1ᵗ, β2ᵗ)`.
    pub fn powers(&self) -> (f32, f32) {
        (self.beta1_t, self.beta2_t)
    }

    /// Returns the number of completed updates.
    pub fn steps(&self) -> u64 {
        self.steps
    }
}

/// First and second moment accumulators for one parameter tensor.
#[derive(Debug)]
pub struct AdamMoments {
    m: Tensor,
    v: Tensor,
}

impl AdamMoments {
    /// Creates zeroed moments for a `rows × cols` parameter.
    pub fn new(device: &Device, cols: usize, rows: usize) -> FfnetResult<Self> {
        Ok(Self {
            m: Tensor::matrix(device, cols, rows)?,
            v: Tensor::matrix(device, cols, rows)?,
        })
    }

    /// Applies one update to `param` using `grad`.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` unless `param`, `grad` and the moments share
    /// dimensions, and `DeviceMismatch` unless they share a device.
    pub fn apply(&mut self, param: &mut Tensor, grad: &Tensor, step: &AdamStep) -> FfnetResult<()> {
        if grad.dims() != param.dims() {
            return Err(FfnetError::shape_mismatch(&param.dims(), &grad.dims()));
        }
        if self.m.dims() != param.dims() {
            return Err(FfnetError::shape_mismatch(&self.m.dims(), &param.dims()));
        }
        param.device().ensure_same(grad.device(), "gradient")?;
        param.device().ensure_same(self.m.device(), "optimizer moments")?;

        kernels::adam_update(
            param.device(),
            step,
            param.extent(),
            param.buffer(),
            grad.buffer(),
            self.m.buffer(),
            self.v.buffer(),
        )
    }

    /// Returns the first moment.
    pub fn m(&self) -> &Tensor {
        &self.m
    }

    /// Returns the second moment.
    pub fn v(&self) -> &Tensor {
        &self.v
    }
}
