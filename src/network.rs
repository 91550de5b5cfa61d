//! Feed-forward network container.
//!
//! A [`Network`] owns an ordered list of [`Layer`]s and the shared Adam
//! [`DecaySchedule`]. One training step is:
//!
//! ```text
//! forward(x)          x → layer[0] → layer[1] → … → output
//! backward(target)    target → layer[n-1] → … → layer[0]
//! update_weights(lr)  every layer steps with the current β1ᵗ, β2ᵗ
//! ```
//!
//! Consecutive layer widths are not validated when layers are added; each
//! layer checks its input width during `forward`.
//!
//! # Example
//!
//! ```rust
//! use ffnet::{Device, Network, Tensor, TrainConfig};
//!
//! # fn main() -> ffnet::FfnetResult<()> {
//! let device = Device::host();
//! let mut net = Network::new(&device, TrainConfig::seeded(7))?;
//! net.add_fully_connected(4, 3)?;
//! net.add_softmax()?;
//!
//! let x = Tensor::from_slice(&device, 4, 2, &[0.1, 0.2, 0.3, 0.4, 0.4, 0.3, 0.2, 0.1])?;
//! let labels = Tensor::from_slice(&device, 1, 2, &[0.0, 2.0])?;
//!
//! let probabilities = net.forward(&x)?.expect("non-empty network").download()?;
//! assert_eq!(probabilities.len(), 6);
//! net.backward(&labels)?;
//! net.update_weights(0.01)?;
//! # Ok(())
//! # }
//! ```

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::TrainConfig;
use crate::device::Device;
use crate::error::{FfnetError, FfnetResult};
use crate::layer::{FullyConnected, Layer, ReluFullyConnected, Softmax, SumOfSquares};
use crate::optimizer::DecaySchedule;
use crate::tensor::Tensor;

/// An ordered stack of layers trained with Adam.
#[derive(Debug)]
pub struct Network {
    device: Device,
    config: TrainConfig,
    layers: Vec<Layer>,
    schedule: DecaySchedule,
    rng: StdRng,
}

impl Network {
    /// Creates an empty network on `device`.
    ///
    /// # Errors
    ///
    /// Returns `Config` if `config` fails validation.
    pub fn new(device: &Device, config: TrainConfig) -> FfnetResult<Self> {
        config.validate()?;
        let rng = match config.init_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        log::info!(
            "Network on {:?} device (beta1={}, beta2={}, epsilon={:e}, seed={:?})",
            device.kind(),
            config.beta1,
            config.beta2,
            config.epsilon,
            config.init_seed
        );

        Ok(Self {
            device: device.clone(),
            schedule: DecaySchedule::new(&config),
            config,
            layers: Vec::new(),
            rng,
        })
    }

    /// Appends a [`FullyConnected`] layer.
    pub fn add_fully_connected(&mut self, in_dim: usize, out_dim: usize) -> FfnetResult<()> {
        let layer = FullyConnected::new(&self.device, in_dim, out_dim, &mut self.rng)?;
        self.push(Layer::FullyConnected(layer));
        Ok(())
    }

    /// Appends a [`ReluFullyConnected`] layer.
    pub fn add_relu_fully_connected(&mut self, in_dim: usize, out_dim: usize) -> FfnetResult<()> {
        let layer = ReluFullyConnected::new(&self.device, in_dim, out_dim, &mut self.rng)?;
        self.push(Layer::ReluFullyConnected(layer));
        Ok(())
    }

    /// Appends a [`Softmax`] layer.
    pub fn add_softmax(&mut self) -> FfnetResult<()> {
        let layer = Softmax::new(&self.device)?;
        self.push(Layer::Softmax(layer));
        Ok(())
    }

    /// Appends a [`SumOfSquares`] layer.
    pub fn add_sum_of_squares(&mut self) -> FfnetResult<()> {
        let layer = SumOfSquares::new(&self.device)?;
        self.push(Layer::SumOfSquares(layer));
        Ok(())
    }

    fn push(&mut self, layer: Layer) {
        log::debug!(
            "Layer {} added: {} ({} params)",
            self.layers.len(),
            layer.name(),
            layer.param_count()
        );
        self.layers.push(layer);
    }

    /// Runs `x` through every layer in order.
    ///
    /// Returns `None` if the network has no layers. `x` must stay alive and
    /// unchanged until the matching [`backward`](Self::backward).
    pub fn forward<'a>(&'a mut self, x: &'a Tensor) -> FfnetResult<Option<&'a Tensor>> {
        if self.layers.is_empty() {
            return Ok(None);
        }
        let mut current = x;
        for layer in self.layers.iter_mut() {
            current = layer.forward(current)?;
        }
        Ok(Some(current))
    }

    /// Runs `target` through every layer in reverse order.
    ///
    /// The last layer turns `target` into the loss gradient; each earlier
    /// layer consumes the gradient produced by its successor.
    ///
    /// # Errors
    ///
    /// Returns `MissingGradient` if a layer other than the first produces no
    /// input gradient, plus any layer error.
    pub fn backward(&mut self, target: &Tensor) -> FfnetResult<()> {
        let mut grad = target;
        for (index, layer) in self.layers.iter_mut().enumerate().rev() {
            match layer.backward(grad, index)? {
                Some(g) => grad = g,
                None if index == 0 => break,
                None => return Err(FfnetError::MissingGradient { index }),
            }
        }
        Ok(())
    }

    /// Applies one Adam step to every parameterized layer, then advances the
    /// decay powers.
    pub fn update_weights(&mut self, learning_rate: f32) -> FfnetResult<()> {
        let step = self.schedule.step(learning_rate);
        for layer in self.layers.iter_mut() {
            layer.update_weights(&step)?;
        }
        self.schedule.advance();
        Ok(())
    }

    /// Returns the layers in forward order.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Returns the layers mutably.
    pub fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    /// Returns the number of layers.
    #[inline]
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Returns the total number of learnable parameters.
    pub fn param_count(&self) -> usize {
        self.layers.iter().map(Layer::param_count).sum()
    }

    /// Returns the current `(β1ᵗ, β2ᵗ)`.
    pub fn decay_powers(&self) -> (f32, f32) {
        self.schedule.powers()
    }

    /// Returns the number of completed weight updates.
    pub fn steps(&self) -> u64 {
        self.schedule.steps()
    }

    /// Returns the training configuration.
    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Returns the device every layer lives on.
    pub fn device(&self) -> &Device {
        &self.device
    }
}
