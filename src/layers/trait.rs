//! Layer trait definition for network layers
//!
//! This module defines the core Layer trait that all layer types implement.
//! The trait provides a common interface for inference, training-time forward
//! propagation, and backward propagation with in-place gradient descent.

use crate::error::Result;
use crate::tensor::Tensor;

/// Core trait for network layers.
///
/// Inference goes through [`Layer::forward`], which takes `&self` so that a
/// trained network can be evaluated from several threads at once. Training goes
/// through [`Layer::forward_train`], which additionally remembers whatever the
/// layer needs for its backward pass (recent input, argmax positions, softmax
/// output), followed by [`Layer::backward`].
///
/// # Example
///
/// ```ignore
/// let output = layer.forward_train(&input)?;
/// let grad_output = upstream_gradient(&output);
/// let grad_input = layer.backward(&grad_output, learning_rate)?;
/// ```
pub trait Layer: Send + Sync {
    /// Forward propagation without recording any state.
    ///
    /// # Errors
    ///
    /// Returns a shape mismatch if `input` does not have [`Layer::input_shape`].
    fn forward(&self, input: &Tensor) -> Result<Tensor>;

    /// Forward propagation that records what the backward pass needs.
    fn forward_train(&mut self, input: &Tensor) -> Result<Tensor>;

    /// Backward propagation.
    ///
    /// Takes the gradient of the loss with respect to this layer's output,
    /// applies one gradient descent step with `learning_rate` to the layer's own
    /// parameters, and returns the gradient with respect to the layer's input.
    ///
    /// # Notes
    ///
    /// - Must follow a call to [`Layer::forward_train`]
    /// - The returned gradient is computed with the parameters from before the update
    fn backward(&mut self, gradient: &Tensor, learning_rate: f64) -> Result<Tensor>;

    /// Shape this layer expects as input.
    fn input_shape(&self) -> &[usize];

    /// Shape this layer produces.
    fn output_shape(&self) -> &[usize];

    /// Number of trainable parameters.
    fn parameter_count(&self) -> usize;

    /// Short human-readable layer kind.
    fn name(&self) -> &'static str;
}
