//! Layer implementations.
//!
//! # Variants
//!
//! | Variant | Forward | Backward | Parameters |
//! |---------|---------|----------|------------|
//! | [`FullyConnected`] | `y = x·W + b` | `∂W`, `∂b`, `∂x` (skipped when first) | `W`, `b` |
//! | [`ReluFullyConnected`] | `y = relu(x)·W + b` | `∂W`, `∂b` against `relu(x)`, `∂x` through the mask | `W`, `b` |
//! | [`Softmax`] | row-wise softmax | `p − onehot(label)` | none |
//! | [`SumOfSquares`] | identity | `2·(y − t)` | none |
//!
//! # Weight Layout
//!
//! `W` is a `[in_dim, out_dim]` row-major matrix (`cols = out_dim`), so
//! `W[i, c]` sits at `i * out_dim + c`. `b` is a single row of `out_dim`.
//!
//! # Forward/Backward Contract
//!
//! A layer keeps a non-owning view of its last forward input. `backward`
//! must follow a `forward` on the same layer, and the input tensor must
//! still be alive and not reset in between; otherwise `backward` returns
//! [`BackwardBeforeForward`](crate::FfnetError::BackwardBeforeForward) or
//! [`StaleInput`](crate::FfnetError::StaleInput).

use rand::Rng;

use crate::buffer::DeviceBuffer;
use crate::device::Device;
use crate::error::{FfnetError, FfnetResult};
use crate::kernels::{self, Extent, MatmulShape};
use crate::optimizer::{AdamMoments, AdamStep};
use crate::tensor::{Tensor, TensorView};

// =============================================================================
// FullyConnected
// =============================================================================

/// Affine transform layer with Adam-updated weights and bias.
#[derive(Debug)]
pub struct FullyConnected {
    device: Device,
    in_dim: usize,
    out_dim: usize,
    weights: Tensor,
    bias: Tensor,
    weight_grad: Tensor,
    bias_grad: Tensor,
    weight_moments: AdamMoments,
    bias_moments: AdamMoments,
    output: Tensor,
    input_grad: Tensor,
    input: Option<TensorView>,
}

impl FullyConnected {
    const NAME: &'static str = "FullyConnected";

    /// Creates a layer with `N(0, 1/in_dim)` weights and zero bias.
    pub fn new<R: Rng + ?Sized>(
        device: &Device,
        in_dim: usize,
        out_dim: usize,
        rng: &mut R,
    ) -> FfnetResult<Self> {
        let mut weights = Tensor::matrix(device, out_dim, in_dim)?;
        let scale = if in_dim > 0 { 1.0 / (in_dim as f32).sqrt() } else { 0.0 };
        weights.random(rng, scale)?;

        Ok(Self {
            device: device.clone(),
            in_dim,
            out_dim,
            weights,
            bias: Tensor::vector(device, out_dim)?,
            weight_grad: Tensor::matrix(device, out_dim, in_dim)?,
            bias_grad: Tensor::vector(device, out_dim)?,
            weight_moments: AdamMoments::new(device, out_dim, in_dim)?,
            bias_moments: AdamMoments::new(device, out_dim, 1)?,
            output: Tensor::empty(device)?,
            input_grad: Tensor::empty(device)?,
            input: None,
        })
    }

    /// Computes `x·W + b` for a `rows × in_dim` input.
    pub fn forward(&mut self, x: &Tensor) -> FfnetResult<&Tensor> {
        self.check_input(x)?;
        self.input = Some(x.view());
        self.transform(x)?;
        Ok(&self.output)
    }

    /// Computes weight and bias gradients from `upstream` (`rows × out_dim`)
    /// and, unless `layer_index == 0`, the input gradient.
    pub fn backward(&mut self, upstream: &Tensor, layer_index: usize) -> FfnetResult<Option<&Tensor>> {
        let view = self
            .input
            .as_ref()
            .ok_or(FfnetError::BackwardBeforeForward { layer: Self::NAME })?;
        let input = view.resolve(Self::NAME)?;
        let rows = view.rows();

        self.check_upstream(upstream, rows)?;
        self.parameter_grads(&input, rows, upstream)?;
        if layer_index == 0 {
            return Ok(None);
        }
        self.compute_input_grad(upstream, rows)?;
        Ok(Some(&self.input_grad))
    }

    /// Applies one Adam step to weights and bias.
    pub fn update_weights(&mut self, step: &AdamStep) -> FfnetResult<()> {
        self.weight_moments
            .apply(&mut self.weights, &self.weight_grad, step)?;
        self.bias_moments.apply(&mut self.bias, &self.bias_grad, step)
    }

    /// Returns the input width.
    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    /// Returns the output width.
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    /// Returns the number of learnable parameters.
    pub fn param_count(&self) -> usize {
        self.in_dim * self.out_dim + self.out_dim
    }

    /// Weight matrix `[in_dim, out_dim]`.
    pub fn weights(&self) -> &Tensor {
        &self.weights
    }

    /// Mutable weight matrix. Push after editing the host copy.
    pub fn weights_mut(&mut self) -> &mut Tensor {
        &mut self.weights
    }

    /// Bias row.
    pub fn bias(&self) -> &Tensor {
        &self.bias
    }

    /// Mutable bias row. Push after editing the host copy.
    pub fn bias_mut(&mut self) -> &mut Tensor {
        &mut self.bias
    }

    /// Weight gradient of the last backward pass.
    pub fn weight_grad(&self) -> &Tensor {
        &self.weight_grad
    }

    /// Bias gradient of the last backward pass.
    pub fn bias_grad(&self) -> &Tensor {
        &self.bias_grad
    }

    /// Output of the last forward pass.
    pub fn output(&self) -> &Tensor {
        &self.output
    }

    fn check_input(&self, x: &Tensor) -> FfnetResult<()> {
        self.device.ensure_same(x.device(), "layer input")?;
        if x.cols() != self.in_dim {
            return Err(FfnetError::shape_mismatch(
                &[self.in_dim, x.rows()],
                &[x.cols(), x.rows()],
            ));
        }
        Ok(())
    }

    fn check_upstream(&self, upstream: &Tensor, rows: usize) -> FfnetResult<()> {
        self.device.ensure_same(upstream.device(), "upstream gradient")?;
        if upstream.cols() != self.out_dim || upstream.rows() != rows {
            return Err(FfnetError::shape_mismatch(
                &[self.out_dim, rows],
                &[upstream.cols(), upstream.rows()],
            ));
        }
        Ok(())
    }

    fn shape(&self, rows: usize) -> MatmulShape {
        MatmulShape {
            rows,
            in_dim: self.in_dim,
            out_dim: self.out_dim,
        }
    }

    fn transform(&mut self, input: &Tensor) -> FfnetResult<()> {
        let rows = input.rows();
        self.output.reset_matrix(self.out_dim, rows)?;
        kernels::affine(
            &self.device,
            self.shape(rows),
            input.buffer(),
            self.weights.buffer(),
            self.bias.buffer(),
            self.output.buffer(),
        )
    }

    fn parameter_grads(&mut self, input: &DeviceBuffer, rows: usize, upstream: &Tensor) -> FfnetResult<()> {
        kernels::weight_grad(
            &self.device,
            self.shape(rows),
            input,
            upstream.buffer(),
            self.weight_grad.buffer(),
        )?;
        kernels::bias_grad(
            &self.device,
            Extent::new(rows, self.out_dim),
            upstream.buffer(),
            self.bias_grad.buffer(),
        )
    }

    fn compute_input_grad(&mut self, upstream: &Tensor, rows: usize) -> FfnetResult<()> {
        self.input_grad.reset_matrix(self.in_dim, rows)?;
        kernels::input_grad(
            &self.device,
            self.shape(rows),
            upstream.buffer(),
            self.weights.buffer(),
            self.input_grad.buffer(),
        )
    }
}

// =============================================================================
// ReluFullyConnected
// =============================================================================

/// ReLU followed by an affine transform.
///
/// The activation is applied to the layer's input, not its output, so a
/// chain `FullyConnected → ReluFullyConnected` is a classic hidden layer.
#[derive(Debug)]
pub struct ReluFullyConnected {
    linear: FullyConnected,
    activated: Tensor,
    raw_input: Option<TensorView>,
}

impl ReluFullyConnected {
    const NAME: &'static str = "ReluFullyConnected";

    /// Creates a layer with `N(0, 1/in_dim)` weights and zero bias.
    pub fn new<R: Rng + ?Sized>(
        device: &Device,
        in_dim: usize,
        out_dim: usize,
        rng: &mut R,
    ) -> FfnetResult<Self> {
        Ok(Self {
            linear: FullyConnected::new(device, in_dim, out_dim, rng)?,
            activated: Tensor::empty(device)?,
            raw_input: None,
        })
    }

    /// Computes `relu(x)·W + b`.
    pub fn forward(&mut self, x: &Tensor) -> FfnetResult<&Tensor> {
        self.linear.check_input(x)?;
        self.raw_input = Some(x.view());

        self.activated.reset_matrix(self.linear.in_dim, x.rows())?;
        kernels::relu(
            &self.linear.device,
            x.extent(),
            x.buffer(),
            self.activated.buffer(),
        )?;
        self.linear.transform(&self.activated)?;
        Ok(&self.linear.output)
    }

    /// Computes parameter gradients against `relu(x)` and, unless
    /// `layer_index == 0`, the input gradient masked by `x > 0`.
    pub fn backward(&mut self, upstream: &Tensor, layer_index: usize) -> FfnetResult<Option<&Tensor>> {
        let view = self
            .raw_input
            .as_ref()
            .ok_or(FfnetError::BackwardBeforeForward { layer: Self::NAME })?;
        let raw = view.resolve(Self::NAME)?;
        let extent = Extent::new(view.rows(), view.cols());

        self.linear.check_upstream(upstream, extent.rows)?;
        self.linear
            .parameter_grads(self.activated.buffer(), extent.rows, upstream)?;
        if layer_index == 0 {
            return Ok(None);
        }
        self.linear.compute_input_grad(upstream, extent.rows)?;
        kernels::relu_grad(
            &self.linear.device,
            extent,
            &raw,
            self.linear.input_grad.buffer(),
        )?;
        Ok(Some(&self.linear.input_grad))
    }

    /// Applies one Adam step to weights and bias.
    pub fn update_weights(&mut self, step: &AdamStep) -> FfnetResult<()> {
        self.linear.update_weights(step)
    }

    /// The affine part of the layer.
    pub fn linear(&self) -> &FullyConnected {
        &self.linear
    }

    /// The affine part of the layer, mutably.
    pub fn linear_mut(&mut self) -> &mut FullyConnected {
        &mut self.linear
    }
}

// =============================================================================
// Softmax
// =============================================================================

/// Row-wise softmax with a cross-entropy gradient.
///
/// `backward` takes a label tensor holding one class index per row.
#[derive(Debug)]
pub struct Softmax {
    device: Device,
    probabilities: Tensor,
    row_stats: Tensor,
    loss_grad: Tensor,
    extent: Option<Extent>,
}

impl Softmax {
    const NAME: &'static str = "Softmax";

    /// Creates a softmax layer.
    pub fn new(device: &Device) -> FfnetResult<Self> {
        Ok(Self {
            device: device.clone(),
            probabilities: Tensor::empty(device)?,
            row_stats: Tensor::empty(device)?,
            loss_grad: Tensor::empty(device)?,
            extent: None,
        })
    }

    /// Normalizes every row of `x` to a probability distribution.
    pub fn forward(&mut self, x: &Tensor) -> FfnetResult<&Tensor> {
        self.device.ensure_same(x.device(), "layer input")?;
        let extent = x.extent();
        self.probabilities.reset_matrix(extent.cols, extent.rows)?;
        self.row_stats.reset_matrix(2, extent.rows)?;

        kernels::softmax_row_stats(&self.device, extent, x.buffer(), self.row_stats.buffer())?;
        kernels::softmax_normalize(
            &self.device,
            extent,
            x.buffer(),
            self.row_stats.buffer(),
            self.probabilities.buffer(),
        )?;
        self.extent = Some(extent);
        Ok(&self.probabilities)
    }

    /// Computes `p − onehot(labels)`.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` unless `labels` holds exactly one element per row.
    pub fn backward(&mut self, labels: &Tensor, _layer_index: usize) -> FfnetResult<Option<&Tensor>> {
        let extent = self
            .extent
            .ok_or(FfnetError::BackwardBeforeForward { layer: Self::NAME })?;
        self.device.ensure_same(labels.device(), "labels")?;
        if labels.len() != extent.rows {
            return Err(FfnetError::shape_mismatch(&[extent.rows], &[labels.len()]));
        }

        self.loss_grad.reset_matrix(extent.cols, extent.rows)?;
        kernels::softmax_cross_entropy_grad(
            &self.device,
            extent,
            self.probabilities.buffer(),
            labels.buffer(),
            self.loss_grad.buffer(),
        )?;
        Ok(Some(&self.loss_grad))
    }

    /// Probabilities of the last forward pass.
    pub fn probabilities(&self) -> &Tensor {
        &self.probabilities
    }
}

// =============================================================================
// SumOfSquares
// =============================================================================

/// Identity layer whose backward pass is the sum-of-squares loss gradient.
#[derive(Debug)]
pub struct SumOfSquares {
    device: Device,
    loss_grad: Tensor,
    input: Option<TensorView>,
}

impl SumOfSquares {
    const NAME: &'static str = "SumOfSquares";

    /// Creates a sum-of-squares layer.
    pub fn new(device: &Device) -> FfnetResult<Self> {
        Ok(Self {
            device: device.clone(),
            loss_grad: Tensor::empty(device)?,
            input: None,
        })
    }

    /// Returns `x` unchanged and remembers it as the prediction.
    pub fn forward<'a>(&mut self, x: &'a Tensor) -> FfnetResult<&'a Tensor> {
        self.device.ensure_same(x.device(), "layer input")?;
        self.input = Some(x.view());
        Ok(x)
    }

    /// Computes `2·(prediction − target)`.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` unless `target` has the prediction's dimensions.
    pub fn backward(&mut self, target: &Tensor, _layer_index: usize) -> FfnetResult<Option<&Tensor>> {
        let view = self
            .input
            .as_ref()
            .ok_or(FfnetError::BackwardBeforeForward { layer: Self::NAME })?;
        let prediction = view.resolve(Self::NAME)?;
        self.device.ensure_same(target.device(), "target")?;
        if target.dims() != view.dims() {
            return Err(FfnetError::shape_mismatch(&view.dims(), &target.dims()));
        }

        let [d0, d1, d2, d3] = view.dims();
        self.loss_grad.reset(d0, d1, d2, d3)?;
        kernels::sum_of_squares_grad(
            &self.device,
            Extent::new(view.rows(), view.cols()),
            &prediction,
            target.buffer(),
            self.loss_grad.buffer(),
        )?;
        Ok(Some(&self.loss_grad))
    }
}

// =============================================================================
// Layer
// =============================================================================

/// A network stage: one of the four layer variants.
#[derive(Debug)]
pub enum Layer {
    /// Affine transform.
    FullyConnected(FullyConnected),
    /// ReLU then affine transform.
    ReluFullyConnected(ReluFullyConnected),
    /// Row-wise softmax with cross-entropy gradient.
    Softmax(Softmax),
    /// Identity with sum-of-squares gradient.
    SumOfSquares(SumOfSquares),
}

impl Layer {
    /// Runs the forward pass. The result borrows either the layer's output
    /// tensor or, for [`SumOfSquares`], `x` itself.
    pub fn forward<'a>(&'a mut self, x: &'a Tensor) -> FfnetResult<&'a Tensor> {
        match self {
            Layer::FullyConnected(l) => l.forward(x),
            Layer::ReluFullyConnected(l) => l.forward(x),
            Layer::Softmax(l) => l.forward(x),
            Layer::SumOfSquares(l) => l.forward(x),
        }
    }

    /// Runs the backward pass.
    ///
    /// Returns `None` only for an affine layer at `layer_index == 0`, which
    /// skips its input gradient.
    pub fn backward(&mut self, upstream: &Tensor, layer_index: usize) -> FfnetResult<Option<&Tensor>> {
        match self {
            Layer::FullyConnected(l) => l.backward(upstream, layer_index),
            Layer::ReluFullyConnected(l) => l.backward(upstream, layer_index),
            Layer::Softmax(l) => l.backward(upstream, layer_index),
            Layer::SumOfSquares(l) => l.backward(upstream, layer_index),
        }
    }

    /// Applies one optimizer step. No-op for parameterless layers.
    pub fn update_weights(&mut self, step: &AdamStep) -> FfnetResult<()> {
        match self {
            Layer::FullyConnected(l) => l.update_weights(step),
            Layer::ReluFullyConnected(l) => l.update_weights(step),
            Layer::Softmax(_) | Layer::SumOfSquares(_) => Ok(()),
        }
    }

    /// Returns the variant name.
    pub fn name(&self) -> &'static str {
        match self {
            Layer::FullyConnected(_) => FullyConnected::NAME,
            Layer::ReluFullyConnected(_) => ReluFullyConnected::NAME,
            Layer::Softmax(_) => Softmax::NAME,
            Layer::SumOfSquares(_) => SumOfSquares::NAME,
        }
    }

    /// Returns the number of learnable parameters.
    pub fn param_count(&self) -> usize {
        self.linear().map_or(0, FullyConnected::param_count)
    }

    /// Returns the affine part of a parameterized layer.
    pub fn linear(&self) -> Option<&FullyConnected> {
        match self {
            Layer::FullyConnected(l) => Some(l),
            Layer::ReluFullyConnected(l) => Some(l.linear()),
            Layer::Softmax(_) | Layer::SumOfSquares(_) => None,
        }
    }

    /// Returns the affine part of a parameterized layer, mutably.
    pub fn linear_mut(&mut self) -> Option<&mut FullyConnected> {
        match self {
            Layer::FullyConnected(l) => Some(l),
            Layer::ReluFullyConnected(l) => Some(l.linear_mut()),
            Layer::Softmax(_) | Layer::SumOfSquares(_) => None,
        }
    }
}
