//! Training configuration and numeric constants.
//!
//! This module provides [`TrainConfig`], the hyperparameters shared by every
//! layer of a [`Network`](crate::Network): the Adam decay rates, the
//! optimizer epsilon, and the seed for parameter initialization.
//!
//! # Example
//!
//! ```rust
//! use ffnet::TrainConfig;
//!
//! let config = TrainConfig {
//!     init_seed: Some(42),
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! assert_eq!(config.beta1, 0.9);
//! ```

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default first-moment decay rate.
pub const DEFAULT_BETA1: f32 = 0.9;

/// Default second-moment decay rate.
pub const DEFAULT_BETA2: f32 = 0.999;

/// Denominator guard of the Adam update.
pub const ADAM_EPSILON: f32 = 1e-8;

/// Added to every softmax partition sum so an all-underflow row still divides.
pub const SOFTMAX_EPSILON: f32 = 1e-8;

/// Lower clamp for probabilities in host-side loss evaluation.
pub const EPSILON: f32 = 1e-7;

/// Network-wide training hyperparameters.
///
/// The decay rates are fixed for the lifetime of a network; their running
/// powers are tracked by the network itself and advanced once per
/// [`update_weights`](crate::Network::update_weights) call.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrainConfig {
    /// First-moment decay rate (β1).
    pub beta1: f32,

    /// Second-moment decay rate (β2).
    pub beta2: f32,

    /// Adam denominator epsilon.
    pub epsilon: f32,

    /// Seed for parameter initialization. `None` draws one from OS entropy.
    pub init_seed: Option<u64>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            beta1: DEFAULT_BETA1,
            beta2: DEFAULT_BETA2,
            epsilon: ADAM_EPSILON,
            init_seed: None,
        }
    }
}

impl TrainConfig {
    /// Creates the default configuration with a fixed initialization seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            init_seed: Some(seed),
            ..Default::default()
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - `beta1` or `beta2` is outside `[0, 1)`
    /// - `epsilon` is not a positive finite number
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..1.0).contains(&self.beta1) {
            return Err(ConfigError::InvalidBeta("beta1", self.beta1));
        }
        if !(0.0..1.0).contains(&self.beta2) {
            return Err(ConfigError::InvalidBeta("beta2", self.beta2));
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(ConfigError::InvalidEpsilon(self.epsilon));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A decay rate is outside `[0, 1)`.
    #[error("{0} must be in [0, 1), got {1}")]
    InvalidBeta(&'static str, f32),

    /// Epsilon is zero, negative or not finite.
    #[error("epsilon must be positive and finite, got {0}")]
    InvalidEpsilon(f32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrainConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.beta2, 0.999);
        assert!(config.init_seed.is_none());
    }

    #[test]
    fn test_seeded_config() {
        let config = TrainConfig::seeded(7);
        assert_eq!(config.init_seed, Some(7));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_beta() {
        let config = TrainConfig {
            beta1: 1.0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidBeta("beta1", 1.0)));

        let config = TrainConfig {
            beta2: -0.1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_epsilon() {
        let config = TrainConfig {
            epsilon: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TrainConfig {
            epsilon: f32::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
