//! Layer abstractions for convolutional networks
//!
//! This module provides the Layer trait and the layer kinds a network is built
//! from: convolution, max pooling, dense, ReLU and the softmax output layer.

mod r#trait;
pub mod convolution;
pub mod dense;
pub mod max_pooling;
pub mod output;
pub mod relu;

// Re-export the Layer trait for convenience
pub use r#trait::Layer;
pub use convolution::ConvolutionLayer;
pub use dense::DenseLayer;
pub use max_pooling::MaxPoolingLayer;
pub use output::{OutputLayer, SoftmaxGradient};
pub use relu::ReluLayer;

use crate::error::{CnnError, Result};
use crate::tensor::Tensor;

/// Fail with a shape mismatch unless `tensor` has exactly `expected` shape.
pub(crate) fn check_shape(context: &str, expected: &[usize], tensor: &Tensor) -> Result<()> {
    if tensor.shape() != expected {
        return Err(CnnError::shape_mismatch(context, expected, tensor.shape()));
    }
    Ok(())
}

/// State remembered by `forward_train`, or an error naming the layer.
pub(crate) fn recorded<'a, T>(state: &'a Option<T>, layer: &str) -> Result<&'a T> {
    state.as_ref().ok_or_else(|| {
        CnnError::InvalidState(format!(
            "{} backward called before a training forward pass",
            layer
        ))
    })
}
